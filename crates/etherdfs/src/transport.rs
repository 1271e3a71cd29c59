//! Request/reply exchange over the link layer.
//!
//! One request is in flight at a time. Every request gets a fresh sequence
//! number, is sent up to [`ATTEMPTS`] times, and each attempt waits about
//! 100ms for a reply carrying the same sequence number. Frames that fail
//! validation are dropped and the wait goes on.

use crate::{
    error::Error,
    frame::{self, Expect, Header},
    proto::*,
    serialize,
    utils::Result,
};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Send attempts per exchange
pub const ATTEMPTS: usize = 3;

/// Ticks to wait for a reply before sending again
pub const TIMEOUT_TICKS: u32 = 2;

/// Raw frame send capability and the address frames are sent from
pub trait LinkLayer {
    /// Fire-and-forget transmission of a complete frame
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    fn address(&self) -> MacAddr;
}

/// Free-running coarse tick source
pub trait Ticker {
    fn now(&self) -> u32;
}

/// 18.2 Hz ticks counted from the moment of creation
#[derive(Clone, Debug)]
pub struct BiosTicker {
    epoch: Instant,
}

impl BiosTicker {
    pub fn new() -> BiosTicker {
        BiosTicker {
            epoch: Instant::now(),
        }
    }
}

impl Default for BiosTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticker for BiosTicker {
    fn now(&self) -> u32 {
        (self.epoch.elapsed().as_millis() * 182 / 10_000) as u32
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    /// A buffer of this length was handed to the producer
    Pending(usize),
    /// A frame of this length is waiting to be examined
    Full(usize),
}

struct SlotInner {
    state: SlotState,
    buf: [u8; FRAME_SIZE],
}

/// The single receive buffer shared with the link producer
pub struct ReceiveSlot {
    inner: Mutex<SlotInner>,
}

impl Default for ReceiveSlot {
    fn default() -> Self {
        ReceiveSlot {
            inner: Mutex::new(SlotInner {
                state: SlotState::Empty,
                buf: [0; FRAME_SIZE],
            }),
        }
    }
}

impl ReceiveSlot {
    pub fn new() -> Arc<ReceiveSlot> {
        Arc::new(Default::default())
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SlotState {
        self.lock().state
    }

    /// First half of the receive handoff: claim the buffer for a frame of
    /// `len` bytes. Refused ("no buffer") if the frame is larger than the
    /// buffer or the buffer is in use.
    pub fn reserve(&self, len: usize) -> Option<Reservation<'_>> {
        let mut inner = self.lock();
        if len > FRAME_SIZE || inner.state != SlotState::Empty {
            return None;
        }
        inner.state = SlotState::Pending(len);
        Some(Reservation {
            inner,
            len,
            confirmed: false,
        })
    }

    /// Copy a whole frame in, both halves of the handoff at once
    pub fn deliver(&self, frame: &[u8]) -> bool {
        match self.reserve(frame.len()) {
            Some(mut r) => {
                r.buffer().copy_from_slice(frame);
                r.confirm();
                true
            }
            None => false,
        }
    }

    /// Mark the buffer empty, dropping whatever it holds
    pub fn clear(&self) {
        self.lock().state = SlotState::Empty;
    }

    fn take(&self) -> Option<(MutexGuard<'_, SlotInner>, usize)> {
        let inner = self.lock();
        match inner.state {
            SlotState::Full(len) => Some((inner, len)),
            _ => None,
        }
    }
}

/// A claimed receive buffer. Dropping it unconfirmed gives the buffer back.
pub struct Reservation<'a> {
    inner: MutexGuard<'a, SlotInner>,
    len: usize,
    confirmed: bool,
}

impl<'a> Reservation<'a> {
    pub fn buffer(&mut self) -> &mut [u8] {
        &mut self.inner.buf[..self.len]
    }

    /// Second half of the handoff: the buffer now holds the frame
    pub fn confirm(mut self) {
        self.inner.state = SlotState::Full(self.len);
        self.confirmed = true;
    }
}

impl<'a> Drop for Reservation<'a> {
    fn drop(&mut self) {
        if !self.confirmed {
            self.inner.state = SlotState::Empty;
        }
    }
}

/// Addresses, drives and sequence counter of the one mapped share
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub local: MacAddr,
    pub remote: MacAddr,
    /// Drive number the host sees
    pub local_drive: u8,
    /// Drive number on the server
    pub remote_drive: u8,
    pub sequence: u8,
}

/// A validated reply, borrowed from the receive slot until dropped
pub struct Reply<'a> {
    inner: MutexGuard<'a, SlotInner>,
    len: usize,
    header: Header,
}

impl<'a> Reply<'a> {
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Result code: zero on success, a host error code otherwise
    pub fn result(&self) -> u16 {
        self.header.result()
    }

    /// Operation specific reply data, after the result code
    pub fn data(&self) -> &[u8] {
        &self.inner.buf[HEADER_LEN..self.len]
    }
}

impl<'a> Drop for Reply<'a> {
    fn drop(&mut self) {
        self.inner.state = SlotState::Empty;
    }
}

/// Owner of the send buffer and the receive slot
pub struct Transport<L, T> {
    link: L,
    ticker: T,
    slot: Arc<ReceiveSlot>,
    session: Session,
    send_buf: [u8; FRAME_SIZE],
}

impl<L: LinkLayer, T: Ticker> Transport<L, T> {
    pub fn new(link: L, ticker: T, slot: Arc<ReceiveSlot>, session: Session) -> Transport<L, T> {
        Transport {
            link,
            ticker,
            slot,
            session,
            send_buf: [0; FRAME_SIZE],
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn slot(&self) -> &Arc<ReceiveSlot> {
        &self.slot
    }

    /// Give back the link and the ticker
    pub fn into_parts(self) -> (L, T) {
        (self.link, self.ticker)
    }

    /// Send `req` and wait for the matching reply.
    ///
    /// With `discovery` set the reply may come from any address. The session
    /// is left alone, the sender is in the reply header.
    pub fn exchange(&mut self, req: &Request, discovery: bool) -> Result<Reply<'_>> {
        let op = Op::from(req);
        let len = serialize::write_payload(&mut self.send_buf[HEADER_LEN..], req).map_err(|e| {
            log::debug!("{:?} request not sent: {}", op, e);
            Error::local(crate::error::code::GENERAL)
        })?;

        self.session.sequence = self.session.sequence.wrapping_add(1);
        let header = Header::request(
            self.session.remote,
            self.session.local,
            self.session.sequence,
            self.session.remote_drive,
            op,
        );
        let frame_len = frame::encode(&mut self.send_buf, &header, len)
            .map_err(|_| Error::local(crate::error::code::GENERAL))?;
        let expect = Expect {
            local: self.session.local,
            remote: self.session.remote,
            sequence: self.session.sequence,
            discovery,
        };

        log::debug!(
            "-> {:?} seq {} ({} bytes)",
            op,
            self.session.sequence,
            len
        );

        self.slot.clear();
        for attempt in 0..ATTEMPTS {
            if attempt > 0 {
                log::debug!("Retrying {:?} seq {} (attempt {})", op, expect.sequence, attempt + 1);
            }
            if let Err(e) = self.link.send(&self.send_buf[..frame_len]) {
                log::warn!("Failed to send {:?}: {}", op, e);
            }
            let start = self.ticker.now();

            loop {
                if let Some((mut inner, len)) = self.slot.take() {
                    match frame::accept(&inner.buf[..len], &expect) {
                        Some(header) => {
                            log::debug!("<- {:?} seq {} result {}", op, expect.sequence, header.result());
                            return Ok(Reply { inner, len, header });
                        }
                        None => inner.state = SlotState::Empty,
                    }
                }
                if self.ticker.now().wrapping_sub(start) >= TIMEOUT_TICKS {
                    break;
                }
                std::hint::spin_loop();
            }
        }

        log::warn!("No reply to {:?} after {} attempts", op, ATTEMPTS);
        Err(Error::no_reply())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{self, Server};

    #[test]
    fn reservation_handoff() {
        let slot = ReceiveSlot::new();
        assert!(slot.reserve(FRAME_SIZE + 1).is_none());

        let mut r = slot.reserve(64).unwrap();
        assert_eq!(r.buffer().len(), 64);
        r.confirm();
        assert_eq!(slot.state(), SlotState::Full(64));
        assert!(slot.reserve(10).is_none());
        assert!(!slot.deliver(&[0; 10]));

        slot.clear();
        drop(slot.reserve(10).unwrap());
        assert_eq!(slot.state(), SlotState::Empty);
        assert!(slot.deliver(&[0; 10]));
    }

    #[test]
    fn sequence_increments_and_wraps() {
        let server = Server::new(|req, _| vec![testing::reply(req, 0, &[0; 6])]);
        let mut transport = server.transport_with_sequence(253);

        for _ in 0..5 {
            transport.exchange(&Request::DiskSpace, false).unwrap();
        }
        let seqs: Vec<u8> = server.sent().iter().map(|f| f[57]).collect();
        assert_eq!(seqs, vec![254, 255, 0, 1, 2]);
    }

    #[test]
    fn retry_exhaustion_sends_three_times() {
        let server = Server::new(|_, _| vec![]);
        let mut transport = server.transport();

        let err = transport.exchange(&Request::DiskSpace, false).err().unwrap();
        assert_eq!(err.kind(), Some(ErrorKind::NoReply));
        assert_eq!(server.sent().len(), ATTEMPTS);
    }

    #[test]
    fn noise_does_not_end_the_wait() {
        let server = Server::new(|req, _| {
            let mut stale = testing::reply(req, 0, &[0; 6]);
            stale[57] = stale[57].wrapping_sub(1);
            let short = testing::reply(req, 0, &[])[..HEADER_LEN - 1].to_vec();
            vec![stale, short]
        });
        let mut transport = server.transport();
        assert!(transport.exchange(&Request::DiskSpace, false).is_err());
        assert_eq!(server.sent().len(), ATTEMPTS);
    }

    #[test]
    fn valid_reply_after_noise_completes_the_attempt() {
        let server = Server::new(|req, _| {
            let mut stale = testing::reply(req, 0, &[]);
            stale[57] = stale[57].wrapping_add(7);
            vec![stale, testing::reply(req, 0x0005, &[1, 2])]
        });
        let mut transport = server.transport();
        let reply = transport.exchange(&Request::DiskSpace, false).unwrap();
        assert_eq!(reply.result(), 5);
        assert_eq!(reply.data(), &[1, 2]);
        drop(reply);
        assert_eq!(server.sent().len(), 1);
        assert_eq!(transport.slot().state(), SlotState::Empty);
    }

    #[test]
    fn send_failure_counts_as_lost_frame() {
        let server = Server::new(|req, _| vec![testing::reply(req, 0, &[])]);
        server.fail_sends(1);
        let mut transport = server.transport();
        assert!(transport.exchange(&Request::DiskSpace, false).is_ok());
        assert_eq!(server.sent().len(), 2);
    }

    #[test]
    fn oversized_payload_is_a_local_error() {
        let server = Server::new(|req, _| vec![testing::reply(req, 0, &[])]);
        let mut transport = server.transport();
        let path = vec![b'A'; MAX_PAYLOAD + 1];
        let err = transport
            .exchange(&Request::Delete { path: &path }, false)
            .err()
            .unwrap();
        assert_eq!(err.kind(), Some(ErrorKind::Local));
        assert!(server.sent().is_empty());
        assert_eq!(transport.session().sequence, 0);
    }

    #[test]
    fn discovery_accepts_any_sender() {
        let server = Server::new(|req, _| vec![testing::reply(req, 0, &[0; 6])]);
        let mut transport = server.transport();
        transport.session_mut().remote = MacAddr::BROADCAST;

        assert!(transport.exchange(&Request::DiskSpace, false).is_err());
        assert_eq!(&server.sent()[0][0..6], &MacAddr::BROADCAST.0);

        let reply = transport.exchange(&Request::DiskSpace, true).unwrap();
        assert_eq!(reply.header().src, testing::SERVER);
        drop(reply);
        assert_eq!(transport.session().remote, MacAddr::BROADCAST);
    }
}
