//! Redirector operations and the protocol-backed dispatcher.
//!
//! Each supported call is marshalled into one or more exchanges with the
//! server, and the reply is unmarshalled into the records the caller owns.

use crate::{
    error::{Error, code},
    proto::*,
    serialize::{Decodable, Decoder, SResult},
    transport::{LinkLayer, Reply, Session, Ticker, Transport},
    utils::{self, Result},
};

/// Redirector calls for one managed drive.
///
/// Every method has a default implementation that returns
/// [`Error::unsupported`], so implementors only provide the calls they handle.
/// Paths are fully qualified (`X:\DIR\FILE.TXT`), as the host hands them over.
pub trait Redirector {
    /// Remove a directory. Refused if `path` is `cwd` or one of its ancestors.
    fn remove_dir(&mut self, _path: &[u8], _cwd: &[u8]) -> Result<()> {
        Err(Error::unsupported())
    }

    fn make_dir(&mut self, _path: &[u8]) -> Result<()> {
        Err(Error::unsupported())
    }

    /// Check that a directory exists. Updating the current directory is the
    /// caller's job.
    fn change_dir(&mut self, _path: &[u8]) -> Result<()> {
        Err(Error::unsupported())
    }

    fn close(&mut self, _file: &mut FileHandle) -> Result<()> {
        Err(Error::unsupported())
    }

    fn commit(&mut self, _file: &mut FileHandle) -> Result<()> {
        Err(Error::unsupported())
    }

    /// Read up to `buf.len()` bytes at the file position, advancing it.
    /// Returns the number of bytes read, short at end of file.
    fn read(&mut self, _file: &mut FileHandle, _buf: &mut [u8]) -> Result<usize> {
        Err(Error::unsupported())
    }

    /// Write `data` at the file position, advancing it and growing the size.
    /// Returns the number of bytes written.
    ///
    /// A failure after some chunks went through is reported as an error, but
    /// the position and size already account for the acknowledged chunks.
    fn write(&mut self, _file: &mut FileHandle, _data: &[u8]) -> Result<usize> {
        Err(Error::unsupported())
    }

    fn lock(&mut self, _file: &mut FileHandle) -> Result<()> {
        Err(Error::unsupported())
    }

    fn unlock(&mut self, _file: &mut FileHandle) -> Result<()> {
        Err(Error::unsupported())
    }

    fn disk_space(&mut self) -> Result<DiskSpace> {
        Err(Error::unsupported())
    }

    fn set_attr(&mut self, _path: &[u8], _attributes: Attributes) -> Result<()> {
        Err(Error::unsupported())
    }

    fn get_attr(&mut self, _path: &[u8]) -> Result<FileAttr> {
        Err(Error::unsupported())
    }

    fn rename(&mut self, _from: &[u8], _to: &[u8]) -> Result<()> {
        Err(Error::unsupported())
    }

    fn delete(&mut self, _path: &[u8]) -> Result<()> {
        Err(Error::unsupported())
    }

    /// Open an existing file, filling in `file`
    fn open(&mut self, _path: &[u8], _file: &mut FileHandle) -> Result<()> {
        Err(Error::unsupported())
    }

    /// Create or truncate a file, filling in `file`
    fn create(&mut self, _path: &[u8], _file: &mut FileHandle) -> Result<()> {
        Err(Error::unsupported())
    }

    /// Start a directory search, initializing `search`
    fn find_first(
        &mut self,
        _path: &[u8],
        _attributes: Attributes,
        _search: &mut SearchContinuation,
    ) -> Result<DirEntry> {
        Err(Error::unsupported())
    }

    /// Continue a directory search
    fn find_next(&mut self, _search: &mut SearchContinuation) -> Result<DirEntry> {
        Err(Error::unsupported())
    }

    /// Move the file position relative to the end of the file
    fn seek_from_end(&mut self, _file: &mut FileHandle) -> Result<u32> {
        Err(Error::unsupported())
    }

    /// Extended open (open, create or truncate in one call)
    fn special_open(&mut self, _path: &[u8], _file: &mut FileHandle) -> Result<()> {
        Err(Error::unsupported())
    }
}

/// Result code and length checks shared by every reply
fn check(reply: &Reply, len: usize) -> Result<()> {
    match reply.result() {
        0 if reply.data().len() == len => Ok(()),
        0 => {
            log::debug!("Reply of {} bytes, expected {}", reply.data().len(), len);
            Err(Error::protocol())
        }
        result => Err(Error::server(result)),
    }
}

/// Path as sent on the wire, without its drive prefix
fn wire_path(path: &[u8], short: u16) -> Result<&[u8]> {
    utils::strip_drive(path).ok_or(Error::local(short))
}

/// Directory entry of a FINDFIRST/FINDNEXT reply:
/// attributes, name, time, date, size
fn found_entry(mut data: &[u8]) -> Result<DirEntry> {
    let attributes = Attributes::from_bits_retain(Decodable::decode(&mut data)?);
    Ok(DirEntry {
        attributes,
        name: Decodable::decode(&mut data)?,
        time: Decodable::decode(&mut data)?,
        date: Decodable::decode(&mut data)?,
        start_cluster: 0,
        size: Decodable::decode(&mut data)?,
    })
}

/// [`Redirector`] that forwards calls to an EtherDFS server
pub struct Dispatcher<L, T> {
    transport: Transport<L, T>,
}

impl<L: LinkLayer, T: Ticker> Dispatcher<L, T> {
    pub fn new(transport: Transport<L, T>) -> Dispatcher<L, T> {
        Dispatcher { transport }
    }

    pub fn session(&self) -> &Session {
        self.transport.session()
    }

    pub fn transport(&self) -> &Transport<L, T> {
        &self.transport
    }

    pub fn into_inner(self) -> Transport<L, T> {
        self.transport
    }

    /// Find the server by broadcasting a DISKSPACE query, adopting the
    /// address of whoever answers it properly. On failure the session keeps
    /// the remote address it had.
    pub fn discover(&mut self) -> Result<MacAddr> {
        let previous = self.transport.session().remote;
        self.transport.session_mut().remote = MacAddr::BROADCAST;
        let found = self.find_server();

        let session = self.transport.session_mut();
        match found {
            Ok(mac) => {
                log::info!("Server found at {}", mac);
                session.remote = mac;
                Ok(mac)
            }
            Err(e) => {
                session.remote = previous;
                Err(e)
            }
        }
    }

    /// Sender of a well-formed DISKSPACE reply to a broadcast
    fn find_server(&mut self) -> Result<MacAddr> {
        let reply = self.transport.exchange(&Request::DiskSpace, true)?;
        if reply.data().len() != 6 {
            return Err(Error::protocol());
        }
        Ok(reply.header().src)
    }

    /// Exchange whose successful reply carries nothing but the result code
    fn simple(&mut self, req: &Request) -> Result<()> {
        let reply = self.transport.exchange(req, false)?;
        check(&reply, 0)
    }

    fn open_or_create(&mut self, path: &[u8], file: &mut FileHandle, create: bool) -> Result<()> {
        if path.len() < 2 || utils::has_wildcards(path) {
            return Err(Error::local(code::PATH_NOT_FOUND));
        }
        let path = wire_path(path, code::PATH_NOT_FOUND)?;
        let req = if create {
            Request::Create { path }
        } else {
            Request::Open { path }
        };

        let local_drive = self.transport.session().local_drive;
        let reply = self.transport.exchange(&req, false)?;
        check(&reply, 22)?;

        let mut data = reply.data();
        let attributes: u8 = Decodable::decode(&mut data)?;
        let name: FcbName = Decodable::decode(&mut data)?;
        let timestamp: DosTimestamp = Decodable::decode(&mut data)?;
        let size: u32 = Decodable::decode(&mut data)?;
        let identity: FileIdentity = Decodable::decode(&mut data)?;

        *file = FileHandle {
            open_mode: file.open_mode & 0xfff0 | 2,
            attributes: Attributes::from_bits_retain(attributes),
            dev_info: DEV_INFO_NETWORK | u16::from(local_drive),
            identity,
            timestamp,
            size,
            position: 0,
            name,
        };
        Ok(())
    }
}

impl<L: LinkLayer, T: Ticker> Redirector for Dispatcher<L, T> {
    fn remove_dir(&mut self, path: &[u8], cwd: &[u8]) -> Result<()> {
        if utils::contains_dir(path, cwd) {
            return Err(Error::local(code::CURRENT_DIRECTORY));
        }
        let path = wire_path(path, code::GENERAL)?;
        self.simple(&Request::RemoveDir { path })
    }

    fn make_dir(&mut self, path: &[u8]) -> Result<()> {
        let path = wire_path(path, code::GENERAL)?;
        self.simple(&Request::MakeDir { path })
    }

    fn change_dir(&mut self, path: &[u8]) -> Result<()> {
        let path = wire_path(path, code::PATH_NOT_FOUND)?;
        self.simple(&Request::ChangeDir { path })
            .map_err(|e| e.or_code(code::PATH_NOT_FOUND))
    }

    fn close(&mut self, file: &mut FileHandle) -> Result<()> {
        let req = Request::Close {
            identity: file.identity,
        };
        match self.transport.exchange(&req, false) {
            Ok(reply) => match reply.result() {
                0 => Ok(()),
                result => Err(Error::server(result)),
            },
            Err(e) => {
                log::warn!("Close of {:?} not acknowledged: {}", file.name, e);
                Ok(())
            }
        }
    }

    fn commit(&mut self, _file: &mut FileHandle) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, file: &mut FileHandle, buf: &mut [u8]) -> Result<usize> {
        if file.is_write_only() {
            return Err(Error::local(code::ACCESS_DENIED));
        }

        let total = buf.len();
        let mut done = 0;
        while done < total {
            let chunk = (total - done).min(READ_CHUNK);
            let req = Request::Read {
                offset: file.position.wrapping_add(done as u32),
                identity: file.identity,
                count: chunk as u16,
            };
            let reply = self.transport.exchange(&req, false)?;
            if reply.result() != 0 {
                return Err(Error::server(reply.result()));
            }
            let data = reply.data();
            if data.len() > chunk {
                return Err(Error::protocol());
            }
            buf[done..done + data.len()].copy_from_slice(data);
            done += data.len();
            if data.len() < chunk {
                break;
            }
        }

        file.position = file.position.wrapping_add(done as u32);
        Ok(done)
    }

    fn write(&mut self, file: &mut FileHandle, data: &[u8]) -> Result<usize> {
        if file.is_read_only() {
            return Err(Error::local(code::ACCESS_DENIED));
        }

        let mut done = 0;
        while done < data.len() {
            let chunk = (data.len() - done).min(WRITE_CHUNK);
            let req = Request::Write {
                offset: file.position,
                identity: file.identity,
                data: &data[done..done + chunk],
            };
            let reply = self.transport.exchange(&req, false)?;
            check(&reply, 2)?;
            let written: u16 = Decodable::decode(&mut reply.data())?;
            let written = (written as usize).min(chunk);

            done += written;
            file.position = file.position.wrapping_add(written as u32);
            if file.position > file.size {
                file.size = file.position;
            }
            if written < chunk {
                break;
            }
        }
        Ok(done)
    }

    fn disk_space(&mut self) -> Result<DiskSpace> {
        let reply = self.transport.exchange(&Request::DiskSpace, false)?;
        if reply.data().len() != 6 {
            return Err(Error::protocol());
        }

        let mut space = DiskSpace {
            sectors_per_cluster: reply.result(),
            ..Default::default()
        };
        match Decoder::new(reply.data())
            >> &mut space.total_clusters
            >> &mut space.bytes_per_sector
            >> &mut space.free_clusters
        {
            SResult(Ok(_)) => Ok(space),
            SResult(Err(e)) => Err(e.into()),
        }
    }

    fn get_attr(&mut self, path: &[u8]) -> Result<FileAttr> {
        let path = wire_path(path, code::GENERAL)?;
        let reply = self.transport.exchange(&Request::GetAttr { path }, false)?;
        check(&reply, 9)?;
        Ok(Decodable::decode(&mut reply.data())?)
    }

    fn rename(&mut self, from: &[u8], to: &[u8]) -> Result<()> {
        if utils::path_drive(from) != utils::path_drive(to) {
            return Err(Error::local(code::GENERAL));
        }
        let from = wire_path(from, code::GENERAL)?;
        let to = wire_path(to, code::GENERAL)?;
        self.simple(&Request::Rename { from, to })
    }

    fn delete(&mut self, path: &[u8]) -> Result<()> {
        let path = wire_path(path, code::GENERAL)?;
        self.simple(&Request::Delete { path })
    }

    fn open(&mut self, path: &[u8], file: &mut FileHandle) -> Result<()> {
        self.open_or_create(path, file, false)
    }

    fn create(&mut self, path: &[u8], file: &mut FileHandle) -> Result<()> {
        self.open_or_create(path, file, true)
    }

    fn find_first(
        &mut self,
        path: &[u8],
        attributes: Attributes,
        search: &mut SearchContinuation,
    ) -> Result<DirEntry> {
        let local_drive = self.transport.session().local_drive;
        let wire = wire_path(path, code::FILE_NOT_FOUND)?;
        let entry = {
            let reply = self
                .transport
                .exchange(&Request::FindFirst { attributes, path: wire }, false)
                .map_err(|e| e.or_code(code::FILE_NOT_FOUND))?;
            check(&reply, 20).map_err(|e| e.or_code(code::FILE_NOT_FOUND))?;
            found_entry(reply.data())?
        };

        *search = SearchContinuation {
            drive: local_drive,
            template: FcbName::from_path(path),
            attributes,
            entry: 0,
            parent: 0,
        };
        Ok(entry)
    }

    fn find_next(&mut self, search: &mut SearchContinuation) -> Result<DirEntry> {
        let entry = search.entry.wrapping_add(1);
        let req = Request::FindNext {
            entry,
            attributes: search.attributes,
            template: search.template,
        };
        let found = {
            let reply = self
                .transport
                .exchange(&req, false)
                .map_err(|e| e.or_code(code::NO_MORE_FILES))?;
            check(&reply, 20).map_err(|e| e.or_code(code::NO_MORE_FILES))?;
            found_entry(reply.data())?
        };

        search.entry = entry;
        Ok(found)
    }
}
