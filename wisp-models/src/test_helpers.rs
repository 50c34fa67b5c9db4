// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A stand-alone [`DatagramStack`] for testing applications without a
//! network.

use std::collections::{BTreeSet, VecDeque};
use std::net::{Ipv4Addr, SocketAddrV4};

use wisp_track::entity::Entity;

use crate::datagram::Datagram;
use crate::transport::{DatagramStack, TransportError};

/// First port handed out for port 0 binds.
pub const FIRST_EPHEMERAL_PORT: u16 = 49153;

/// Records every datagram sent and every failure reported.
///
/// Destinations in the same /24 as the stack's own address are reachable;
/// anything else has no route.
pub struct RecordingStack {
    address: Ipv4Addr,
    bound: BTreeSet<u16>,
    next_ephemeral: u16,
    sent: Vec<Datagram>,
    failures: Vec<(String, TransportError)>,
    inject: VecDeque<TransportError>,
}

impl RecordingStack {
    #[must_use]
    pub fn new(address: Ipv4Addr) -> Self {
        Self {
            address,
            bound: BTreeSet::new(),
            next_ephemeral: FIRST_EPHEMERAL_PORT,
            sent: Vec::new(),
            failures: Vec::new(),
            inject: VecDeque::new(),
        }
    }

    /// Make the next call to `send` fail with `error`.
    pub fn fail_next_send(&mut self, error: TransportError) {
        self.inject.push_back(error);
    }

    #[must_use]
    pub fn sent(&self) -> &[Datagram] {
        &self.sent
    }

    #[must_use]
    pub fn failures(&self) -> &[(String, TransportError)] {
        &self.failures
    }

    #[must_use]
    pub fn is_bound(&self, port: u16) -> bool {
        self.bound.contains(&port)
    }
}

impl DatagramStack for RecordingStack {
    fn bind(&mut self, local: SocketAddrV4) -> Result<SocketAddrV4, TransportError> {
        let port = if local.port() == 0 {
            let port = self.next_ephemeral;
            self.next_ephemeral += 1;
            port
        } else {
            local.port()
        };
        if !self.bound.insert(port) {
            return Err(TransportError::AddressInUse(local));
        }
        Ok(SocketAddrV4::new(*local.ip(), port))
    }

    fn unbind(&mut self, local: SocketAddrV4) {
        self.bound.remove(&local.port());
    }

    fn source_address(&self, dst: Ipv4Addr) -> Result<Ipv4Addr, TransportError> {
        if dst.octets()[..3] == self.address.octets()[..3] {
            Ok(self.address)
        } else {
            Err(TransportError::NoRoute(dst))
        }
    }

    fn send(&mut self, datagram: Datagram) -> Result<(), TransportError> {
        if let Some(error) = self.inject.pop_front() {
            return Err(error);
        }
        self.source_address(*datagram.dst().ip())?;
        self.sent.push(datagram);
        Ok(())
    }

    fn report_failure(&mut self, reporter: &Entity, error: &TransportError) {
        self.failures.push((reporter.full_name(), error.clone()));
    }
}
