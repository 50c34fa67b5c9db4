// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Packet captures that can be attached to network devices.
//!
//! A device reports every enqueue (`+`), dequeue (`-`), receive (`r`) and
//! drop (`d`) to each attached [`Capture`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io::Write;

use wisp_engine::time::SimTime;
use wisp_track::Writer;

use crate::datagram::Datagram;

/// The kind of event seen by a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CaptureEvent {
    Enqueue,
    Dequeue,
    Receive,
    Drop,
}

impl CaptureEvent {
    fn symbol(&self) -> char {
        match self {
            CaptureEvent::Enqueue => '+',
            CaptureEvent::Dequeue => '-',
            CaptureEvent::Receive => 'r',
            CaptureEvent::Drop => 'd',
        }
    }
}

impl fmt::Display for CaptureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Receives the events of the devices it is attached to.
pub trait Capture {
    fn record(&self, event: CaptureEvent, now: SimTime, device: &str, datagram: &Datagram);

    /// Flush any buffered output.
    fn flush(&self) {}
}

/// Counts events without keeping the datagrams.
#[derive(Default)]
pub struct CaptureCounter {
    enqueued: Cell<usize>,
    dequeued: Cell<usize>,
    received: Cell<usize>,
    dropped: Cell<usize>,
}

impl CaptureCounter {
    #[must_use]
    pub fn count(&self, event: CaptureEvent) -> usize {
        match event {
            CaptureEvent::Enqueue => self.enqueued.get(),
            CaptureEvent::Dequeue => self.dequeued.get(),
            CaptureEvent::Receive => self.received.get(),
            CaptureEvent::Drop => self.dropped.get(),
        }
    }
}

impl Capture for CaptureCounter {
    fn record(&self, event: CaptureEvent, _now: SimTime, _device: &str, _datagram: &Datagram) {
        let counter = match event {
            CaptureEvent::Enqueue => &self.enqueued,
            CaptureEvent::Dequeue => &self.dequeued,
            CaptureEvent::Receive => &self.received,
            CaptureEvent::Drop => &self.dropped,
        };
        counter.set(counter.get() + 1);
    }
}

/// Writes one text line per event.
///
/// Lines are of the form:
/// `+ 1.000000000 top::link0::dev0 10.1.1.1:49153 > 10.1.1.2:9 id 42 length 1052`
pub struct AsciiTrace {
    writer: RefCell<Writer>,
}

impl AsciiTrace {
    #[must_use]
    pub fn new(writer: Writer) -> Self {
        Self {
            writer: RefCell::new(writer),
        }
    }
}

impl Capture for AsciiTrace {
    fn record(&self, event: CaptureEvent, now: SimTime, device: &str, datagram: &Datagram) {
        // Capture output errors are ignored
        let _ = writeln!(
            self.writer.borrow_mut(),
            "{} {:.9} {} {}",
            event,
            now.as_secs_f64(),
            device,
            datagram
        );
    }

    fn flush(&self) {
        let _ = self.writer.borrow_mut().flush();
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::rc::Rc;

    use wisp_track::Id;

    use super::*;

    fn datagram() -> Datagram {
        Datagram::new(
            Id(42),
            SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 49153),
            SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 9),
            Rc::from(vec![0; 1024]),
        )
    }

    #[test]
    fn counter() {
        let counter = CaptureCounter::default();
        let dgram = datagram();
        counter.record(CaptureEvent::Enqueue, SimTime::ZERO, "dev", &dgram);
        counter.record(CaptureEvent::Enqueue, SimTime::ZERO, "dev", &dgram);
        counter.record(CaptureEvent::Drop, SimTime::ZERO, "dev", &dgram);
        assert_eq!(counter.count(CaptureEvent::Enqueue), 2);
        assert_eq!(counter.count(CaptureEvent::Drop), 1);
        assert_eq!(counter.count(CaptureEvent::Receive), 0);
    }

    #[test]
    fn ascii_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.tr");
        let file = fs::File::create(&path).unwrap();
        let trace = AsciiTrace::new(Box::new(file));

        trace.record(
            CaptureEvent::Enqueue,
            SimTime::from_millis(1000),
            "top::mon0::dev0",
            &datagram(),
        );
        trace.record(
            CaptureEvent::Receive,
            SimTime::from_ns(1_003_683_200),
            "top::mon0::dev1",
            &datagram(),
        );
        trace.flush();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            vec![
                "+ 1.000000000 top::mon0::dev0 10.1.1.1:49153 > 10.1.1.2:9 id 42 length 1052",
                "r 1.003683200 top::mon0::dev1 10.1.1.1:49153 > 10.1.1.2:9 id 42 length 1052",
            ]
        );
    }
}
