//! EtherDFS protocol data types and constants.
//!
//! # Frame layout
//!
//! ```text
//! 0..6    destination address
//! 6..12   source address
//! 12..14  ethertype 0xEDF5
//! 14..56  padding
//! 56      protocol version
//! 57      sequence number
//! 58      remote drive (reply: result code, low byte)
//! 59      operation code (reply: result code, high byte)
//! 60..    payload
//! ```

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use enum_primitive::*;

use crate::io_err;

/// Largest frame sent or received, headers included
pub const FRAME_SIZE: usize = 1090;

/// Offset of the request payload
pub const HEADER_LEN: usize = 60;

/// Offset of the result code in a reply. The reply payload starts here.
pub const RESULT_OFFSET: usize = 58;

/// Largest request payload
pub const MAX_PAYLOAD: usize = FRAME_SIZE - HEADER_LEN;

/// Largest chunk asked for by a single READ exchange
pub const READ_CHUNK: usize = FRAME_SIZE - HEADER_LEN;

/// Largest chunk carried by a single WRITE exchange (offset[4] identity[2] data)
pub const WRITE_CHUNK: usize = FRAME_SIZE - HEADER_LEN - 6;

/// Private ethertype of the protocol
pub const ETHERTYPE: u16 = 0xEDF5;

/// Protocol version, must match the server's exactly
pub const PROTOCOL_VERSION: u8 = 2;

/// Host function group of redirector calls
pub const REDIRECTOR_FUNCTION: u8 = 0x11;

/// Open mode bits that select read, write or read/write access
pub const OPEN_ACCESS_MASK: u16 = 0x0003;

/// Device information word of a file opened on a network drive
pub const DEV_INFO_NETWORK: u16 = 0x8040;

/// Link-layer (ethernet) address
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = std::io::Error;

    /// Parse `xx:xx:xx:xx:xx:xx`
    fn from_str(s: &str) -> std::io::Result<Self> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| io_err!(InvalidInput, "Invalid MAC address"))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| io_err!(InvalidInput, "Invalid MAC address"))?;
        }
        if parts.next().is_some() {
            return Err(io_err!(InvalidInput, "Invalid MAC address"));
        }
        Ok(MacAddr(octets))
    }
}

bitflags! {
    /// DOS file attributes
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN    = 0x02;
        const SYSTEM    = 0x04;
        const VOLUME    = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE   = 0x20;
        const DEVICE    = 0x40;
    }
}

enum_from_primitive! {
    #[doc = "Redirector subfunction, also used as the wire operation code"]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub enum Op {
        InstallCheck    = 0x00,
        RemoveDir       = 0x01,
        MakeDir         = 0x03,
        ChangeDir       = 0x05,
        Close           = 0x06,
        Commit          = 0x07,
        Read            = 0x08,
        Write           = 0x09,
        Lock            = 0x0A,
        Unlock          = 0x0B,
        DiskSpace       = 0x0C,
        SetAttr         = 0x0E,
        GetAttr         = 0x0F,
        Rename          = 0x11,
        Delete          = 0x13,
        Open            = 0x16,
        Create          = 0x17,
        FindFirst       = 0x1B,
        FindNext        = 0x1C,
        SeekFromEnd     = 0x21,
        Legacy2D        = 0x2D,
        SpecialOpen     = 0x2E,
    }
}

impl Op {
    /// Highest subfunction the redirector knows about
    pub const LAST: u8 = 0x2E;

    /// If the call works on an open file and carries the drive in its handle
    pub fn is_handle_op(&self) -> bool {
        use crate::Op::*;

        matches!(
            *self,
            Close | Commit | Read | Write | Lock | Unlock | SeekFromEnd | Legacy2D
        )
    }

    /// If the call names its target with a fully qualified path
    pub fn is_path_op(&self) -> bool {
        use crate::Op::*;

        matches!(
            *self,
            GetAttr | Delete | Open | Create | MakeDir | RemoveDir | ChangeDir | Rename
        )
    }
}

/// Opaque per-open-file token issued by the server ("start sector").
///
/// Only stored and replayed, never interpreted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileIdentity(pub u16);

/// Space padded 8.3 name, as kept in FCBs and directory entries
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FcbName(pub [u8; 11]);

impl Default for FcbName {
    fn default() -> Self {
        FcbName([b' '; 11])
    }
}

impl FcbName {
    /// Build the FCB form of the last component of `path`.
    ///
    /// `C:\DIR\FILE.TXT` gives `FILE    TXT`, `????????.???` keeps its
    /// wildcards, and `..` gives an all-blank name.
    pub fn from_path(path: &[u8]) -> FcbName {
        let name = match path.iter().rposition(|&c| c == b'\\') {
            Some(i) => &path[i + 1..],
            None => path,
        };

        let mut fcb = FcbName::default();
        let mut i = 0;
        for &c in name {
            if c == b'.' {
                i = 8;
            } else if i < fcb.0.len() {
                fcb.0[i] = c;
                i += 1;
            }
        }
        fcb
    }

    pub fn as_bytes(&self) -> &[u8; 11] {
        &self.0
    }
}

impl fmt::Display for FcbName {
    /// `FILE    TXT` is shown as `FILE.TXT`
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let trim = |s: &[u8]| {
            let end = s.iter().rposition(|&c| c != b' ').map_or(0, |i| i + 1);
            String::from_utf8_lossy(&s[..end]).into_owned()
        };
        let (base, ext) = (trim(&self.0[..8]), trim(&self.0[8..]));
        if ext.is_empty() {
            write!(f, "{}", base)
        } else {
            write!(f, "{}.{}", base, ext)
        }
    }
}

impl fmt::Debug for FcbName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

/// Packed DOS time (low word) and date (high word)
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DosTimestamp(pub u32);

impl DosTimestamp {
    pub fn from_parts(time: u16, date: u16) -> DosTimestamp {
        DosTimestamp(u32::from(date) << 16 | u32::from(time))
    }

    pub fn time(&self) -> u16 {
        self.0 as u16
    }

    pub fn date(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn year(&self) -> u16 {
        1980 + (self.date() >> 9)
    }

    pub fn month(&self) -> u8 {
        ((self.date() >> 5) & 0x0f) as u8
    }

    pub fn day(&self) -> u8 {
        (self.date() & 0x1f) as u8
    }

    pub fn hour(&self) -> u8 {
        (self.time() >> 11) as u8
    }

    pub fn minute(&self) -> u8 {
        ((self.time() >> 5) & 0x3f) as u8
    }

    /// Seconds, with the two second resolution of the format
    pub fn second(&self) -> u8 {
        ((self.time() & 0x1f) << 1) as u8
    }
}

impl fmt::Display for DosTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

/// Per-open-file record owned by the caller (the host's SFT entry).
///
/// Filled in by OPEN/CREATE, then passed back on every call for that file.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FileHandle {
    pub open_mode: u16,
    pub attributes: Attributes,
    /// Network flag and drive number (low 6 bits)
    pub dev_info: u16,
    pub identity: FileIdentity,
    pub timestamp: DosTimestamp,
    pub size: u32,
    pub position: u32,
    pub name: FcbName,
}

impl FileHandle {
    /// A handle about to be opened with the given host open mode
    pub fn with_mode(open_mode: u16) -> FileHandle {
        FileHandle {
            open_mode,
            ..Default::default()
        }
    }

    /// Drive the file lives on
    pub fn drive(&self) -> u8 {
        (self.dev_info & 0x3f) as u8
    }

    pub fn is_write_only(&self) -> bool {
        self.open_mode & 1 != 0
    }

    pub fn is_read_only(&self) -> bool {
        self.open_mode & OPEN_ACCESS_MASK == 0
    }
}

/// Result of GETATTR
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FileAttr {
    pub attributes: Attributes,
    pub size: u32,
    pub timestamp: DosTimestamp,
}

/// 32-byte directory entry returned by FINDFIRST/FINDNEXT
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DirEntry {
    pub name: FcbName,
    pub attributes: Attributes,
    pub time: u16,
    pub date: u16,
    /// Always zero, clusters mean nothing on a network drive
    pub start_cluster: u16,
    pub size: u32,
}

impl DirEntry {
    pub const SIZE: usize = 32;

    pub fn timestamp(&self) -> DosTimestamp {
        DosTimestamp::from_parts(self.time, self.date)
    }

    pub fn is_dir(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }
}

/// Result of DISKSPACE
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DiskSpace {
    pub sectors_per_cluster: u16,
    pub total_clusters: u16,
    pub bytes_per_sector: u16,
    pub free_clusters: u16,
}

impl DiskSpace {
    pub fn cluster_size(&self) -> u64 {
        u64::from(self.sectors_per_cluster) * u64::from(self.bytes_per_sector)
    }

    pub fn total_bytes(&self) -> u64 {
        self.cluster_size() * u64::from(self.total_clusters)
    }

    pub fn free_bytes(&self) -> u64 {
        self.cluster_size() * u64::from(self.free_clusters)
    }
}

/// Directory search cursor kept by the caller between FINDFIRST and FINDNEXT.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchContinuation {
    /// Drive number being searched
    pub drive: u8,
    pub template: FcbName,
    pub attributes: Attributes,
    /// Index of the last entry returned
    pub entry: u16,
    pub parent: u16,
}

impl SearchContinuation {
    /// Size of the search block at the start of the DTA
    pub const DTA_SIZE: usize = 21;

    /// Bit set in the drive byte of searches on remote drives
    pub const REMOTE: u8 = 0x80;
}

/// A request, ready to be marshalled into the payload of a frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request<'a> {
    RemoveDir {
        path: &'a [u8],
    },
    MakeDir {
        path: &'a [u8],
    },
    ChangeDir {
        path: &'a [u8],
    },
    Close {
        identity: FileIdentity,
    },
    Read {
        offset: u32,
        identity: FileIdentity,
        count: u16,
    },
    Write {
        offset: u32,
        identity: FileIdentity,
        data: &'a [u8],
    },
    DiskSpace,
    GetAttr {
        path: &'a [u8],
    },
    Rename {
        from: &'a [u8],
        to: &'a [u8],
    },
    Delete {
        path: &'a [u8],
    },
    Open {
        path: &'a [u8],
    },
    Create {
        path: &'a [u8],
    },
    FindFirst {
        attributes: Attributes,
        path: &'a [u8],
    },
    FindNext {
        entry: u16,
        attributes: Attributes,
        template: FcbName,
    },
}

impl<'a> From<&'a Request<'a>> for Op {
    fn from(req: &'a Request<'a>) -> Op {
        match *req {
            Request::RemoveDir { .. } => Op::RemoveDir,
            Request::MakeDir { .. } => Op::MakeDir,
            Request::ChangeDir { .. } => Op::ChangeDir,
            Request::Close { .. } => Op::Close,
            Request::Read { .. } => Op::Read,
            Request::Write { .. } => Op::Write,
            Request::DiskSpace => Op::DiskSpace,
            Request::GetAttr { .. } => Op::GetAttr,
            Request::Rename { .. } => Op::Rename,
            Request::Delete { .. } => Op::Delete,
            Request::Open { .. } => Op::Open,
            Request::Create { .. } => Op::Create,
            Request::FindFirst { .. } => Op::FindFirst,
            Request::FindNext { .. } => Op::FindNext,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn mac_parse_and_display() {
        let mac: MacAddr = "00:1a:2B:3c:4D:5e".parse().unwrap();
        assert_eq!(mac, MacAddr([0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]));
        assert_eq!(mac.to_string(), "00:1A:2B:3C:4D:5E");

        assert!("00:1a:2b:3c:4d".parse::<MacAddr>().is_err());
        assert!("00:1a:2b:3c:4d:5e:6f".parse::<MacAddr>().is_err());
        assert!("001a2b3c4d5e".parse::<MacAddr>().is_err());
        assert!("zz:1a:2b:3c:4d:5e".parse::<MacAddr>().is_err());
    }

    #[test]
    fn op_codes() {
        assert_eq!(Op::from_u8(0x16), Some(Op::Open));
        assert_eq!(Op::from_u8(0x2D), Some(Op::Legacy2D));
        assert_eq!(Op::from_u8(0x02), None);
        assert!(Op::Read.is_handle_op());
        assert!(!Op::Read.is_path_op());
        assert!(Op::Rename.is_path_op());
        assert!(!Op::FindFirst.is_path_op() && !Op::FindFirst.is_handle_op());
    }

    #[test]
    fn fcb_names() {
        assert_eq!(FcbName::from_path(b"C:\\DIR\\FILE.TXT").as_bytes(), b"FILE    TXT");
        assert_eq!(FcbName::from_path(b"\\????????.???").as_bytes(), b"???????????");
        assert_eq!(FcbName::from_path(b"C:\\..").as_bytes(), b"           ");
        assert_eq!(FcbName::from_path(b"C:\\VERYLONGNAME.TEXT").as_bytes(), b"VERYLONGTEX");
        assert_eq!(FcbName::from_path(b"C:\\README").to_string(), "README");
        assert_eq!(FcbName::from_path(b"C:\\A.B").to_string(), "A.B");
    }

    #[test]
    fn dos_timestamp_fields() {
        // 2017-03-14 15:26:58
        let date = (37 << 9) | (3 << 5) | 14;
        let time = (15 << 11) | (26 << 5) | 29;
        let ts = DosTimestamp::from_parts(time, date);
        assert_eq!(ts.year(), 2017);
        assert_eq!(ts.month(), 3);
        assert_eq!(ts.day(), 14);
        assert_eq!(ts.hour(), 15);
        assert_eq!(ts.minute(), 26);
        assert_eq!(ts.second(), 58);
        assert_eq!(ts.to_string(), "2017-03-14 15:26:58");
    }

    #[test]
    fn handle_access_bits() {
        assert!(FileHandle::with_mode(0).is_read_only());
        assert!(FileHandle::with_mode(1).is_write_only());
        let rw = FileHandle::with_mode(2);
        assert!(!rw.is_read_only() && !rw.is_write_only());

        let h = FileHandle {
            dev_info: DEV_INFO_NETWORK | 5,
            ..Default::default()
        };
        assert_eq!(h.drive(), 5);
    }
}
