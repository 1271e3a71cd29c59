//! Serialize/deserialize request payloads and caller records into/from binary.

use crate::{io_err, proto::*};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Result;
use std::mem;
use std::ops::{Shl, Shr};

macro_rules! decode {
    ($decoder:expr) => {
        Decodable::decode(&mut $decoder)?
    };

    ($typ:ident, $buf:expr) => {
        $typ::from_bits_retain(decode!($buf))
    };
}

/// A serializing specific result to overload operators on `Result`
///
/// # Overloaded operators
/// <<, >>, ?
pub struct SResult<T>(pub ::std::io::Result<T>);

/// A wrapper class of WriteBytesExt to provide operator overloads
/// for serializing
///
/// Operator '<<' serializes the right hand side argument into
/// the left hand side encoder
#[derive(Clone, Debug)]
pub struct Encoder<W> {
    writer: W,
    bytes: usize,
}

impl<W: WriteBytesExt> Encoder<W> {
    pub fn new(writer: W) -> Encoder<W> {
        Encoder { writer, bytes: 0 }
    }

    /// Return total bytes written
    pub fn bytes_written(&self) -> usize {
        self.bytes
    }

    /// Encode data, equivalent to: encoder << data
    pub fn encode<T: Encodable + ?Sized>(&mut self, data: &T) -> Result<usize> {
        let bytes = data.encode(&mut self.writer)?;
        self.bytes += bytes;
        Ok(bytes)
    }

    /// Get inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<'a, T: Encodable + ?Sized, W: WriteBytesExt> Shl<&'a T> for Encoder<W> {
    type Output = SResult<Encoder<W>>;
    fn shl(mut self, rhs: &'a T) -> Self::Output {
        match self.encode(rhs) {
            Ok(_) => SResult(Ok(self)),
            Err(e) => SResult(Err(e)),
        }
    }
}

impl<'a, T: Encodable + ?Sized, W: WriteBytesExt> Shl<&'a T> for SResult<Encoder<W>> {
    type Output = Self;
    fn shl(self, rhs: &'a T) -> Self::Output {
        match self.0 {
            Ok(mut encoder) => match encoder.encode(rhs) {
                Ok(_) => SResult(Ok(encoder)),
                Err(e) => SResult(Err(e)),
            },
            Err(e) => SResult(Err(e)),
        }
    }
}

/// A wrapper class of ReadBytesExt to provide operator overloads
/// for deserializing
#[derive(Clone, Debug)]
pub struct Decoder<R> {
    reader: R,
}

impl<R: ReadBytesExt> Decoder<R> {
    pub fn new(reader: R) -> Decoder<R> {
        Decoder { reader }
    }
    pub fn decode<T: Decodable>(&mut self) -> Result<T> {
        Decodable::decode(&mut self.reader)
    }
    /// Get inner reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<'a, T: Decodable, R: ReadBytesExt> Shr<&'a mut T> for Decoder<R> {
    type Output = SResult<Decoder<R>>;
    fn shr(mut self, rhs: &'a mut T) -> Self::Output {
        match self.decode() {
            Ok(r) => {
                *rhs = r;
                SResult(Ok(self))
            }
            Err(e) => SResult(Err(e)),
        }
    }
}

impl<'a, T: Decodable, R: ReadBytesExt> Shr<&'a mut T> for SResult<Decoder<R>> {
    type Output = Self;
    fn shr(self, rhs: &'a mut T) -> Self::Output {
        match self.0 {
            Ok(mut decoder) => match decoder.decode() {
                Ok(r) => {
                    *rhs = r;
                    SResult(Ok(decoder))
                }
                Err(e) => SResult(Err(e)),
            },
            Err(e) => SResult(Err(e)),
        }
    }
}

/// Trait representing a type which can be serialized into binary
pub trait Encodable {
    /// Encode self to w and returns the number of bytes encoded
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize>;
}

impl Encodable for u8 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u8(*self).and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for u16 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u16::<LittleEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for u32 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u32::<LittleEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

/// Raw bytes, without any length prefix
impl Encodable for [u8] {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_all(self).and(Ok(self.len()))
    }
}

impl Encodable for Attributes {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        self.bits().encode(w)
    }
}

impl Encodable for FileIdentity {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        self.0.encode(w)
    }
}

impl Encodable for FcbName {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        self.0[..].encode(w)
    }
}

impl Encodable for DosTimestamp {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        self.0.encode(w)
    }
}

/// The 32-byte directory entry record
impl Encodable for DirEntry {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w)
            << &self.name
            << &self.attributes
            << &[0u8; 10][..]
            << &self.time
            << &self.date
            << &self.start_cluster
            << &self.size
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

/// The 21-byte search block kept at the start of the DTA
impl Encodable for SearchContinuation {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w)
            << &(self.drive | SearchContinuation::REMOTE)
            << &self.template
            << &self.attributes
            << &self.entry
            << &self.parent
            << &[0u8; 4][..]
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl<'a> Encodable for Request<'a> {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        use crate::Request::*;

        let buf = Encoder::new(w);

        let buf = match *self {
            RemoveDir { path } | MakeDir { path } | ChangeDir { path } => buf << path,
            Close { ref identity } => buf << identity,
            Read {
                ref offset,
                ref identity,
                ref count,
            } => buf << offset << identity << count,
            Write {
                ref offset,
                ref identity,
                data,
            } => buf << offset << identity << data,
            Request::DiskSpace => SResult(Ok(buf)),
            GetAttr { path } | Delete { path } | Open { path } | Create { path } => buf << path,
            Rename { from, to } => {
                let len = u8::try_from(from.len())
                    .map_err(|_| io_err!(InvalidInput, "Source path too long"))?;
                buf << &len << from << to
            }
            FindFirst {
                ref attributes,
                path,
            } => buf << &0u16 << attributes << path,
            FindNext {
                ref entry,
                ref attributes,
                ref template,
            } => buf << entry << attributes << template,
        };

        match buf {
            SResult(Ok(b)) => Ok(b.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

/// Trait representing a type which can be deserialized from binary
pub trait Decodable: Sized {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self>;
}

impl Decodable for u8 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u8()
    }
}

impl Decodable for u16 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u16::<LittleEndian>()
    }
}

impl Decodable for u32 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u32::<LittleEndian>()
    }
}

impl Decodable for FileIdentity {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(FileIdentity(decode!(*r)))
    }
}

impl Decodable for FcbName {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let mut name = FcbName::default();
        r.read_exact(&mut name.0)?;
        Ok(name)
    }
}

impl Decodable for DosTimestamp {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(DosTimestamp(decode!(*r)))
    }
}

/// GETATTR reply data: time, date, size, attributes
impl Decodable for FileAttr {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let time: u16 = decode!(*r);
        let date: u16 = decode!(*r);
        Ok(FileAttr {
            timestamp: DosTimestamp::from_parts(time, date),
            size: decode!(*r),
            attributes: decode!(Attributes, *r),
        })
    }
}

impl Decodable for DirEntry {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let name = decode!(*r);
        let attributes = decode!(Attributes, *r);
        let mut reserved = [0u8; 10];
        r.read_exact(&mut reserved)?;
        Ok(DirEntry {
            name,
            attributes,
            time: decode!(*r),
            date: decode!(*r),
            start_cluster: decode!(*r),
            size: decode!(*r),
        })
    }
}

impl Decodable for SearchContinuation {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let drive: u8 = decode!(*r);
        let search = SearchContinuation {
            drive: drive & 0x1f,
            template: decode!(*r),
            attributes: decode!(Attributes, *r),
            entry: decode!(*r),
            parent: decode!(*r),
        };
        let mut reserved = [0u8; 4];
        r.read_exact(&mut reserved)?;
        Ok(search)
    }
}

/// Marshal a request into the payload area of a frame
pub fn write_payload(buf: &mut [u8], req: &Request) -> Result<usize> {
    let mut w = buf;
    req.encode(&mut w)
}

/// Store a search continuation into the first 21 bytes of a DTA
pub fn write_dta(dta: &mut [u8], search: &SearchContinuation) -> Result<usize> {
    let mut w = dta;
    search.encode(&mut w)
}

/// Load a search continuation from a DTA
pub fn read_dta(mut dta: &[u8]) -> Result<SearchContinuation> {
    Decodable::decode(&mut dta)
}

#[test]
fn encoder_test1() {
    let expected: Vec<u8> = (0..10).collect();
    let mut encoder = Vec::new();
    for i in 0..10 {
        (&(i as u8)).encode(&mut encoder).unwrap();
    }
    assert_eq!(expected, encoder);
}

#[test]
fn decoder_shr_chain() {
    let data = [0x34u8, 0x12, 0x00, 0x02, 0xff, 0x00];
    let (mut a, mut b, mut c) = (0u16, 0u16, 0u16);
    match Decoder::new(&data[..]) >> &mut a >> &mut b >> &mut c {
        SResult(Ok(_)) => (),
        SResult(Err(e)) => panic!("{}", e),
    }
    assert_eq!((a, b, c), (0x1234, 0x0200, 0x00ff));

    let mut d = 0u32;
    assert!(matches!(Decoder::new(&data[..4]) >> &mut a >> &mut d, SResult(Err(_))));
}

#[test]
fn payload_layouts() {
    let mut buf = [0u8; 64];

    let n = write_payload(&mut buf, &Request::Open { path: b"\\A.TXT" }).unwrap();
    assert_eq!(&buf[..n], b"\\A.TXT");

    let n = write_payload(
        &mut buf,
        &Request::Read {
            offset: 0x0102_0304,
            identity: FileIdentity(42),
            count: 50,
        },
    )
    .unwrap();
    assert_eq!(&buf[..n], &[0x04, 0x03, 0x02, 0x01, 42, 0, 50, 0]);

    let n = write_payload(
        &mut buf,
        &Request::Rename {
            from: b"\\OLD",
            to: b"\\NEW.TXT",
        },
    )
    .unwrap();
    assert_eq!(&buf[..n], b"\x04\\OLD\\NEW.TXT");

    let n = write_payload(
        &mut buf,
        &Request::FindFirst {
            attributes: Attributes::DIRECTORY,
            path: b"\\*.*",
        },
    )
    .unwrap();
    assert_eq!(&buf[..n], b"\x00\x00\x10\\*.*");

    let n = write_payload(
        &mut buf,
        &Request::FindNext {
            entry: 3,
            attributes: Attributes::empty(),
            template: FcbName::from_path(b"\\????????.???"),
        },
    )
    .unwrap();
    assert_eq!(&buf[..n], b"\x03\x00\x00???????????");

    assert_eq!(write_payload(&mut buf, &Request::DiskSpace).unwrap(), 0);
}

#[test]
fn payload_overflow_is_an_error() {
    let mut buf = [0u8; 4];
    assert!(write_payload(&mut buf, &Request::Delete { path: b"\\TOOLONG" }).is_err());
}

#[test]
fn dta_image() {
    let search = SearchContinuation {
        drive: 5,
        template: FcbName::from_path(b"F:\\*.TXT"),
        attributes: Attributes::ARCHIVE,
        entry: 7,
        parent: 0,
    };
    let mut dta = [0u8; 64];
    assert_eq!(write_dta(&mut dta, &search).unwrap(), SearchContinuation::DTA_SIZE);
    assert_eq!(dta[0], 0x85);
    assert_eq!(&dta[1..12], b"*       TXT");
    assert_eq!(dta[13], 7);
    assert_eq!(read_dta(&dta).unwrap(), search);
}

#[test]
fn dir_entry_record() {
    let entry = DirEntry {
        name: FcbName::from_path(b"README.TXT"),
        attributes: Attributes::ARCHIVE,
        time: 0x1234,
        date: 0x5678,
        start_cluster: 0,
        size: 100,
    };
    let mut buf = Vec::new();
    assert_eq!(entry.encode(&mut buf).unwrap(), DirEntry::SIZE);
    assert_eq!(&buf[22..24], &[0x34, 0x12]);
    assert_eq!(&buf[28..32], &[100, 0, 0, 0]);
    let decoded: DirEntry = Decodable::decode(&mut &buf[..]).unwrap();
    assert_eq!(decoded, entry);
}
