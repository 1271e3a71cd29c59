//! Frame codec: the fixed 60-byte header in front of every payload.

use crate::{io_err, proto::*};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Cursor, Read, Result, Write};

/// Header fields of a frame
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
    pub version: u8,
    pub sequence: u8,
    /// Target drive of a request. Low byte of the result code in a reply.
    pub drive: u8,
    /// Operation of a request. High byte of the result code in a reply.
    pub op: u8,
}

impl Header {
    /// Header of a request frame
    pub fn request(dst: MacAddr, src: MacAddr, sequence: u8, drive: u8, op: Op) -> Header {
        Header {
            dst,
            src,
            ethertype: ETHERTYPE,
            version: PROTOCOL_VERSION,
            sequence,
            drive,
            op: op as u8,
        }
    }

    /// Write the header into the first 60 bytes of `buf`
    pub fn write(&self, buf: &mut [u8]) -> Result<usize> {
        let mut w = Cursor::new(buf);
        w.write_all(&self.dst.0)?;
        w.write_all(&self.src.0)?;
        w.write_u16::<BigEndian>(self.ethertype)?;
        w.write_all(&[0u8; 42])?;
        w.write_u8(self.version)?;
        w.write_u8(self.sequence)?;
        w.write_u8(self.drive)?;
        w.write_u8(self.op)?;
        Ok(w.position() as usize)
    }

    /// Read the header of an arrived frame. Frames shorter than a header give `None`.
    pub fn read(frame: &[u8]) -> Option<Header> {
        if frame.len() < HEADER_LEN {
            return None;
        }
        let mut r = frame;
        let mut dst = MacAddr::default();
        let mut src = MacAddr::default();
        r.read_exact(&mut dst.0).ok()?;
        r.read_exact(&mut src.0).ok()?;
        let ethertype = r.read_u16::<BigEndian>().ok()?;
        let mut r = &frame[56..];
        Some(Header {
            dst,
            src,
            ethertype,
            version: r.read_u8().ok()?,
            sequence: r.read_u8().ok()?,
            drive: r.read_u8().ok()?,
            op: r.read_u8().ok()?,
        })
    }

    /// Result code of a reply, carried where a request has its drive and op
    pub fn result(&self) -> u16 {
        u16::from(self.op) << 8 | u16::from(self.drive)
    }
}

/// Build a request frame in `buf`, whose payload is already in place at
/// offset 60. Returns the frame length.
pub fn encode(buf: &mut [u8], header: &Header, payload_len: usize) -> Result<usize> {
    if payload_len > MAX_PAYLOAD || HEADER_LEN + payload_len > buf.len() {
        return Err(io_err!(InvalidInput, "Payload too long"));
    }
    header.write(buf)?;
    Ok(HEADER_LEN + payload_len)
}

/// What a valid reply must look like
#[derive(Copy, Clone, Debug)]
pub struct Expect {
    pub local: MacAddr,
    pub remote: MacAddr,
    pub sequence: u8,
    /// Accept any source address
    pub discovery: bool,
}

/// Reason an arrived frame was discarded
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    Short(usize),
    Destination(MacAddr),
    Source(MacAddr),
    Ethertype(u16),
    Sequence(u8),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Rejection::Short(len) => write!(f, "short frame ({} bytes)", len),
            Rejection::Destination(mac) => write!(f, "not addressed to us ({})", mac),
            Rejection::Source(mac) => write!(f, "unexpected source {}", mac),
            Rejection::Ethertype(t) => write!(f, "foreign ethertype {:#06x}", t),
            Rejection::Sequence(seq) => write!(f, "stale sequence {}", seq),
        }
    }
}

/// Validate an arrived frame against the exchange in progress
pub fn check(frame: &[u8], expect: &Expect) -> ::std::result::Result<Header, Rejection> {
    let header = Header::read(frame).ok_or(Rejection::Short(frame.len()))?;
    if header.dst != expect.local {
        return Err(Rejection::Destination(header.dst));
    }
    if !expect.discovery && header.src != expect.remote {
        return Err(Rejection::Source(header.src));
    }
    if header.ethertype != ETHERTYPE {
        return Err(Rejection::Ethertype(header.ethertype));
    }
    if header.sequence != expect.sequence {
        return Err(Rejection::Sequence(header.sequence));
    }
    Ok(header)
}

/// Like [`check`], logging and dropping the reason
pub fn accept(frame: &[u8], expect: &Expect) -> Option<Header> {
    match check(frame, expect) {
        Ok(header) => Some(header),
        Err(reason) => {
            log::trace!("Discarding frame: {}", reason);
            None
        }
    }
}
