// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! An unreliable datagram endpoint.
//!
//! A [`UdpSocket`] belongs to a single node and talks to the node's network
//! stack through the [`DatagramStack`] trait. Delivery is never confirmed.

use std::error::Error;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;

use wisp_track::entity::{Entity, GetEntity};
use wisp_track::{Id, create, create_id, debug};

use crate::datagram::{Datagram, MAX_UDP_PAYLOAD};

/// Failures reported by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The socket has not been bound to a local address.
    NotBound,
    /// The socket has no peer to send to.
    NotConnected,
    /// The node has no interface that can reach the address.
    NoRoute(Ipv4Addr),
    /// The payload does not fit in one datagram.
    MessageTooLarge { size: usize, max: usize },
    /// Another socket on the node is already bound to the address.
    AddressInUse(SocketAddrV4),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportError::NotBound => write!(f, "socket not bound"),
            TransportError::NotConnected => write!(f, "socket not connected"),
            TransportError::NoRoute(addr) => write!(f, "no route to {addr}"),
            TransportError::MessageTooLarge { size, max } => {
                write!(f, "message of {size} bytes exceeds {max} bytes")
            }
            TransportError::AddressInUse(addr) => write!(f, "address {addr} in use"),
        }
    }
}

impl Error for TransportError {}

/// The part of a node's network stack that sockets use.
pub trait DatagramStack {
    /// Claim a local address. Port 0 asks for an ephemeral port.
    ///
    /// Returns the address actually bound.
    fn bind(&mut self, local: SocketAddrV4) -> Result<SocketAddrV4, TransportError>;

    /// Release an address claimed with [`bind`](DatagramStack::bind).
    fn unbind(&mut self, local: SocketAddrV4);

    /// The local address used to reach `dst`.
    fn source_address(&self, dst: Ipv4Addr) -> Result<Ipv4Addr, TransportError>;

    /// Hand a datagram to the network.
    fn send(&mut self, datagram: Datagram) -> Result<(), TransportError>;

    /// Record a transport failure seen by `reporter`.
    fn report_failure(&mut self, reporter: &Entity, error: &TransportError);

    fn max_payload(&self) -> usize {
        MAX_UDP_PAYLOAD
    }
}

/// A UDP-like socket.
pub struct UdpSocket {
    pub entity: Rc<Entity>,
    local: Option<SocketAddrV4>,
    peer: Option<SocketAddrV4>,
}

impl UdpSocket {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            local: None,
            peer: None,
        }
    }

    /// Bind to `local`. Binding an already bound socket keeps the existing
    /// address.
    pub fn bind(
        &mut self,
        stack: &mut dyn DatagramStack,
        local: SocketAddrV4,
    ) -> Result<SocketAddrV4, TransportError> {
        if let Some(bound) = self.local {
            return Ok(bound);
        }
        let bound = stack.bind(local)?;
        debug!(self.entity ; "bound to {bound}");
        self.local = Some(bound);
        Ok(bound)
    }

    /// Set the default destination.
    pub fn connect(&mut self, peer: SocketAddrV4) {
        self.peer = Some(peer);
    }

    #[must_use]
    pub fn local(&self) -> Option<SocketAddrV4> {
        self.local
    }

    #[must_use]
    pub fn peer(&self) -> Option<SocketAddrV4> {
        self.peer
    }

    /// Send `payload` to the connected peer.
    ///
    /// Returns the id given to the datagram.
    pub fn send(
        &mut self,
        stack: &mut dyn DatagramStack,
        payload: Rc<[u8]>,
    ) -> Result<Id, TransportError> {
        let local = self.local.ok_or(TransportError::NotBound)?;
        let peer = self.peer.ok_or(TransportError::NotConnected)?;
        let max = stack.max_payload();
        if payload.len() > max {
            return Err(TransportError::MessageTooLarge {
                size: payload.len(),
                max,
            });
        }

        let src_ip = if local.ip().is_unspecified() {
            stack.source_address(*peer.ip())?
        } else {
            *local.ip()
        };

        let id = create_id!(self.entity);
        let datagram = Datagram::new(id, SocketAddrV4::new(src_ip, local.port()), peer, payload);
        create!(self.entity ; id, datagram.wire_bytes(), "datagram");
        stack.send(datagram)?;
        Ok(id)
    }

    /// Release the local address.
    pub fn close(&mut self, stack: &mut dyn DatagramStack) {
        if let Some(local) = self.local.take() {
            stack.unbind(local);
            debug!(self.entity ; "closed {local}");
        }
    }
}

impl GetEntity for UdpSocket {
    fn entity(&self) -> &Rc<Entity> {
        &self.entity
    }
}
