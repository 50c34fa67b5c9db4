// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! UDP datagrams carried over the simulated network.

use std::fmt;
use std::net::SocketAddrV4;
use std::rc::Rc;

use wisp_track::Id;

/// Size of the UDP header in bytes.
pub const UDP_HEADER_BYTES: usize = 8;

/// Size of the IPv4 header (no options) in bytes.
pub const IPV4_HEADER_BYTES: usize = 20;

/// The largest payload a single IPv4 UDP datagram can carry.
pub const MAX_UDP_PAYLOAD: usize = 65_535 - UDP_HEADER_BYTES - IPV4_HEADER_BYTES;

/// The 8-byte UDP transport header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// Header plus payload length.
    pub length: u16,
    /// Checksums are not modelled and always zero.
    pub checksum: u16,
}

impl UdpHeader {
    #[must_use]
    pub fn new(src_port: u16, dst_port: u16, payload_bytes: usize) -> Self {
        let length = u16::try_from(payload_bytes + UDP_HEADER_BYTES).unwrap_or(u16::MAX);
        Self {
            src_port,
            dst_port,
            length,
            checksum: 0,
        }
    }

    /// Serialise to network byte order.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; UDP_HEADER_BYTES] {
        let mut bytes = [0; UDP_HEADER_BYTES];
        bytes[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.length.to_be_bytes());
        bytes[6..8].copy_from_slice(&self.checksum.to_be_bytes());
        bytes
    }

    /// Parse a header from the start of `bytes`.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < UDP_HEADER_BYTES {
            return None;
        }
        let field = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);
        Some(Self {
            src_port: field(0),
            dst_port: field(2),
            length: field(4),
            checksum: field(6),
        })
    }
}

/// A UDP datagram in flight.
///
/// The payload is shared so that mirrored copies of a datagram are cheap.
#[derive(Clone, Debug)]
pub struct Datagram {
    id: Id,
    src: SocketAddrV4,
    dst: SocketAddrV4,
    header: UdpHeader,
    payload: Rc<[u8]>,
}

impl Datagram {
    #[must_use]
    pub fn new(id: Id, src: SocketAddrV4, dst: SocketAddrV4, payload: Rc<[u8]>) -> Self {
        let header = UdpHeader::new(src.port(), dst.port(), payload.len());
        Self {
            id,
            src,
            dst,
            header,
            payload,
        }
    }

    #[must_use]
    pub fn id(&self) -> Id {
        self.id
    }

    #[must_use]
    pub fn src(&self) -> SocketAddrV4 {
        self.src
    }

    #[must_use]
    pub fn dst(&self) -> SocketAddrV4 {
        self.dst
    }

    #[must_use]
    pub fn header(&self) -> &UdpHeader {
        &self.header
    }

    #[must_use]
    pub fn payload(&self) -> &Rc<[u8]> {
        &self.payload
    }

    /// The transport segment: header followed by payload.
    #[must_use]
    pub fn segment(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(UDP_HEADER_BYTES + self.payload.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Bytes occupied on the wire including the IPv4 and UDP headers.
    #[must_use]
    pub fn wire_bytes(&self) -> usize {
        IPV4_HEADER_BYTES + UDP_HEADER_BYTES + self.payload.len()
    }
}

impl fmt::Display for Datagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} > {} id {} length {}",
            self.src,
            self.dst,
            self.id,
            self.wire_bytes()
        )
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn datagram(payload: &[u8]) -> Datagram {
        Datagram::new(
            Id(7),
            SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 49153),
            SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 9),
            Rc::from(payload),
        )
    }

    #[test]
    fn header_layout() {
        let dgram = datagram(b"Hello world");
        assert_eq!(
            dgram.header().to_bytes(),
            [0xc0, 0x01, 0x00, 0x09, 0x00, 0x13, 0x00, 0x00]
        );
        let segment = dgram.segment();
        assert_eq!(segment.len(), 19);
        assert_eq!(&segment[8..], b"Hello world");
        assert_eq!(UdpHeader::from_bytes(&segment), Some(*dgram.header()));
        assert_eq!(UdpHeader::from_bytes(&segment[..4]), None);
    }

    #[test]
    fn sizes() {
        let dgram = datagram(&[0; 1024]);
        assert_eq!(dgram.header().length, 1032);
        assert_eq!(dgram.wire_bytes(), 1052);
        assert_eq!(
            dgram.to_string(),
            "10.1.1.1:49153 > 10.1.1.2:9 id 7 length 1052"
        );
    }
}
