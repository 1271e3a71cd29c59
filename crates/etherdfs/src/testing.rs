//! Scripted in-memory server for exercising the engine without a network.
//!
//! The fake link records every frame sent and asks a responder closure for
//! the frames the "wire" should carry back. Those frames reach the receive
//! slot one at a time, each time the stepping ticker is read, the way frames
//! trickle in while the transport polls.

use crate::{
    frame::{self, Header},
    proto::*,
    transport::{LinkLayer, ReceiveSlot, Session, Ticker, Transport},
};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::sync::Arc;

pub const CLIENT: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
pub const SERVER: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);

/// Host drive F:
pub const LOCAL_DRIVE: u8 = 5;
/// Server drive C:
pub const REMOTE_DRIVE: u8 = 2;

type Responder = Box<dyn FnMut(&Header, &[u8]) -> Vec<Vec<u8>>>;

struct Wire {
    slot: Arc<ReceiveSlot>,
    queue: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    failing_sends: usize,
    responder: Responder,
}

pub struct Server {
    wire: Rc<RefCell<Wire>>,
}

impl Server {
    pub fn new<F>(responder: F) -> Server
    where
        F: FnMut(&Header, &[u8]) -> Vec<Vec<u8>> + 'static,
    {
        Server {
            wire: Rc::new(RefCell::new(Wire {
                slot: ReceiveSlot::new(),
                queue: VecDeque::new(),
                sent: Vec::new(),
                failing_sends: 0,
                responder: Box::new(responder),
            })),
        }
    }

    pub fn transport(&self) -> Transport<FakeLink, StepTicker> {
        self.transport_with_sequence(0)
    }

    pub fn transport_with_sequence(&self, sequence: u8) -> Transport<FakeLink, StepTicker> {
        let session = Session {
            local: CLIENT,
            remote: SERVER,
            local_drive: LOCAL_DRIVE,
            remote_drive: REMOTE_DRIVE,
            sequence,
        };
        let slot = self.wire.borrow().slot.clone();
        Transport::new(
            FakeLink {
                wire: self.wire.clone(),
            },
            StepTicker {
                wire: self.wire.clone(),
                tick: Cell::new(0),
            },
            slot,
            session,
        )
    }

    /// Every frame handed to the link, failed sends included
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.wire.borrow().sent.clone()
    }

    /// Payloads of the frames sent
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.sent().into_iter().map(|f| f[HEADER_LEN..].to_vec()).collect()
    }

    /// Make the next `n` sends fail
    pub fn fail_sends(&self, n: usize) {
        self.wire.borrow_mut().failing_sends = n;
    }
}

pub struct FakeLink {
    wire: Rc<RefCell<Wire>>,
}

impl LinkLayer for FakeLink {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut wire = self.wire.borrow_mut();
        wire.sent.push(frame.to_vec());
        if wire.failing_sends > 0 {
            wire.failing_sends -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "link down"));
        }
        let header = match Header::read(frame) {
            Some(header) => header,
            None => return Ok(()),
        };
        let replies = (wire.responder)(&header, &frame[HEADER_LEN..]);
        wire.queue.extend(replies);
        Ok(())
    }

    fn address(&self) -> MacAddr {
        CLIENT
    }
}

/// Advances one tick per read, delivering the next queued frame
pub struct StepTicker {
    wire: Rc<RefCell<Wire>>,
    tick: Cell<u32>,
}

impl Ticker for StepTicker {
    fn now(&self) -> u32 {
        let mut wire = self.wire.borrow_mut();
        let delivered = match wire.queue.front() {
            Some(next) => wire.slot.deliver(next),
            None => false,
        };
        if delivered {
            wire.queue.pop_front();
        }
        self.tick.set(self.tick.get().wrapping_add(1));
        self.tick.get()
    }
}

/// Reply to `req` carrying `result` and `data`
pub fn reply(req: &Header, result: u16, data: &[u8]) -> Vec<u8> {
    let header = Header {
        dst: req.src,
        src: SERVER,
        ethertype: ETHERTYPE,
        version: PROTOCOL_VERSION,
        sequence: req.sequence,
        drive: result as u8,
        op: (result >> 8) as u8,
    };
    let mut buf = vec![0u8; HEADER_LEN + data.len()];
    buf[HEADER_LEN..].copy_from_slice(data);
    frame::encode(&mut buf, &header, data.len()).unwrap();
    buf
}
