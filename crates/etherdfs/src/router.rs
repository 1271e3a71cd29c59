//! Call router: picks the calls aimed at the managed drive.
//!
//! Everything else (unknown subfunctions, the install check, calls for other
//! drives) is handed back untouched so the previous handler can have it.

use crate::{
    error::Error,
    proto::*,
    redir::Redirector,
    utils::{self, Result},
};
use num_traits::FromPrimitive;

/// A redirector call, borrowing the records the host owns
#[derive(Debug)]
pub enum Call<'a> {
    InstallCheck,
    RemoveDir {
        path: &'a [u8],
        cwd: &'a [u8],
    },
    MakeDir {
        path: &'a [u8],
    },
    ChangeDir {
        path: &'a [u8],
    },
    Close {
        file: &'a mut FileHandle,
    },
    Commit {
        file: &'a mut FileHandle,
    },
    Read {
        file: &'a mut FileHandle,
        buf: &'a mut [u8],
    },
    Write {
        file: &'a mut FileHandle,
        data: &'a [u8],
    },
    Lock {
        file: &'a mut FileHandle,
    },
    Unlock {
        file: &'a mut FileHandle,
    },
    DiskSpace {
        cwd: &'a [u8],
    },
    SetAttr {
        cwd: &'a [u8],
        path: &'a [u8],
        attributes: Attributes,
    },
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
        file: &'a mut FileHandle,
    },
    Create {
        path: &'a [u8],
        file: &'a mut FileHandle,
    },
    FindFirst {
        cwd: &'a [u8],
        path: &'a [u8],
        attributes: Attributes,
        search: &'a mut SearchContinuation,
    },
    FindNext {
        search: &'a mut SearchContinuation,
    },
    SeekFromEnd {
        file: &'a mut FileHandle,
    },
    Legacy2D {
        file: &'a mut FileHandle,
    },
    SpecialOpen {
        cwd: &'a [u8],
        path: &'a [u8],
        file: &'a mut FileHandle,
    },
    /// Any other subfunction
    Other(u8),
}

impl<'a> Call<'a> {
    pub fn subfunction(&self) -> u8 {
        use crate::Call::*;

        #[rustfmt::skip]
        let op = match *self {
            InstallCheck            => Op::InstallCheck,
            RemoveDir { .. }        => Op::RemoveDir,
            MakeDir { .. }          => Op::MakeDir,
            ChangeDir { .. }        => Op::ChangeDir,
            Close { .. }            => Op::Close,
            Commit { .. }           => Op::Commit,
            Read { .. }             => Op::Read,
            Write { .. }            => Op::Write,
            Lock { .. }             => Op::Lock,
            Unlock { .. }           => Op::Unlock,
            Call::DiskSpace { .. }  => Op::DiskSpace,
            SetAttr { .. }          => Op::SetAttr,
            GetAttr { .. }          => Op::GetAttr,
            Rename { .. }           => Op::Rename,
            Delete { .. }           => Op::Delete,
            Open { .. }             => Op::Open,
            Create { .. }           => Op::Create,
            FindFirst { .. }        => Op::FindFirst,
            FindNext { .. }         => Op::FindNext,
            SeekFromEnd { .. }      => Op::SeekFromEnd,
            Legacy2D { .. }         => Op::Legacy2D,
            SpecialOpen { .. }      => Op::SpecialOpen,
            Other(subfunction)      => return subfunction,
        };
        op as u8
    }

    /// Drive the call is aimed at, if one can be told
    pub fn drive(&self) -> Option<u8> {
        use crate::Call::*;

        #[rustfmt::skip]
        let drive = match *self {
            Close { ref file } | Commit { ref file } | Read { ref file, .. }
            | Write { ref file, .. } | Lock { ref file } | Unlock { ref file }
            | SeekFromEnd { ref file } | Legacy2D { ref file }              => Some(file.drive()),
            FindNext { ref search }                                         => Some(search.drive & 0x1f),
            GetAttr { path } | Delete { path } | Open { path, .. } | Create { path, .. }
            | MakeDir { path } | RemoveDir { path, .. } | ChangeDir { path }
            | Rename { from: path, .. }                                     => utils::path_drive(path),
            Call::DiskSpace { cwd } | SetAttr { cwd, .. } | FindFirst { cwd, .. }
            | SpecialOpen { cwd, .. }                                       => utils::path_drive(cwd),
            InstallCheck | Other(_)                                         => None,
        };
        drive
    }
}

/// Successful outcome of a handled call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Done,
    /// Bytes read or written
    Transferred(usize),
    Attributes(FileAttr),
    Found(DirEntry),
    DiskSpace(DiskSpace),
    /// New file position
    Position(u32),
    /// Bare value for the host's result register
    Code(u16),
}

pub enum Routed<'a> {
    /// The call was for the managed drive and has been carried out
    Handled(Result<Reply>),
    /// Not ours, hand it to the previous handler unmodified
    Chain(Call<'a>),
}

/// Whatever handled redirector calls before us
pub trait Passthrough {
    fn chain(&mut self, call: Call) -> Result<Reply>;
}

/// Fixed answer to subfunction 0x2D, the value MSCDEX gives
pub const LEGACY_2D_RESULT: u16 = 2;

/// If the subfunction is one the router may claim. The install check
/// belongs to the previous handler.
pub fn is_supported(subfunction: u8) -> bool {
    subfunction != Op::InstallCheck as u8 && Op::from_u8(subfunction).is_some()
}

/// Routes calls for one local drive to a [`Redirector`]
pub struct Router<R> {
    redir: R,
    drive: u8,
}

impl<R: Redirector> Router<R> {
    pub fn new(redir: R, drive: u8) -> Router<R> {
        Router { redir, drive }
    }

    pub fn drive(&self) -> u8 {
        self.drive
    }

    pub fn redirector(&self) -> &R {
        &self.redir
    }

    pub fn redirector_mut(&mut self) -> &mut R {
        &mut self.redir
    }

    pub fn route<'a>(&mut self, call: Call<'a>) -> Routed<'a> {
        let subfunction = call.subfunction();
        if !is_supported(subfunction) {
            return Routed::Chain(call);
        }
        match call.drive() {
            Some(drive) if drive == self.drive => (),
            _ => {
                log::trace!("Chaining subfunction {:#04x}", subfunction);
                return Routed::Chain(call);
            }
        }
        log::info!(
            "{:?} on {}:",
            Op::from_u8(subfunction),
            utils::drive_letter(self.drive)
        );
        Routed::Handled(self.dispatch(call))
    }

    /// Route the call, giving `prev` whatever is not ours
    pub fn call<P: Passthrough>(&mut self, call: Call, prev: &mut P) -> Result<Reply> {
        match self.route(call) {
            Routed::Handled(result) => result,
            Routed::Chain(call) => prev.chain(call),
        }
    }

    #[rustfmt::skip]
    fn dispatch(&mut self, call: Call) -> Result<Reply> {
        use crate::Call::*;

        let redir = &mut self.redir;
        match call {
            RemoveDir { path, cwd }                         => redir.remove_dir(path, cwd).map(|_| Reply::Done),
            MakeDir { path }                                => redir.make_dir(path).map(|_| Reply::Done),
            ChangeDir { path }                              => redir.change_dir(path).map(|_| Reply::Done),
            Close { file }                                  => redir.close(file).map(|_| Reply::Done),
            Commit { file }                                 => redir.commit(file).map(|_| Reply::Done),
            Read { file, buf }                              => redir.read(file, buf).map(Reply::Transferred),
            Write { file, data }                            => redir.write(file, data).map(Reply::Transferred),
            Lock { file }                                   => redir.lock(file).map(|_| Reply::Done),
            Unlock { file }                                 => redir.unlock(file).map(|_| Reply::Done),
            Call::DiskSpace { .. }                          => redir.disk_space().map(Reply::DiskSpace),
            SetAttr { path, attributes, .. }                => redir.set_attr(path, attributes).map(|_| Reply::Done),
            GetAttr { path }                                => redir.get_attr(path).map(Reply::Attributes),
            Rename { from, to }                             => redir.rename(from, to).map(|_| Reply::Done),
            Delete { path }                                 => redir.delete(path).map(|_| Reply::Done),
            Open { path, file }                             => redir.open(path, file).map(|_| Reply::Done),
            Create { path, file }                           => redir.create(path, file).map(|_| Reply::Done),
            FindFirst { path, attributes, search, .. }      => redir.find_first(path, attributes, search).map(Reply::Found),
            FindNext { search }                             => redir.find_next(search).map(Reply::Found),
            SeekFromEnd { file }                            => redir.seek_from_end(file).map(Reply::Position),
            Legacy2D { .. }                                 => Ok(Reply::Code(LEGACY_2D_RESULT)),
            SpecialOpen { path, file, .. }                  => redir.special_open(path, file).map(|_| Reply::Done),
            InstallCheck | Other(_)                         => Err(Error::unsupported()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;

    /// Records what reached it and succeeds
    #[derive(Default)]
    struct Recorder {
        calls: Vec<&'static str>,
    }

    impl Redirector for Recorder {
        fn make_dir(&mut self, _path: &[u8]) -> Result<()> {
            self.calls.push("mkdir");
            Ok(())
        }

        fn read(&mut self, _file: &mut FileHandle, buf: &mut [u8]) -> Result<usize> {
            self.calls.push("read");
            Ok(buf.len())
        }

        fn find_next(&mut self, _search: &mut SearchContinuation) -> Result<DirEntry> {
            self.calls.push("findnext");
            Ok(DirEntry::default())
        }

        fn disk_space(&mut self) -> Result<DiskSpace> {
            self.calls.push("diskspace");
            Ok(DiskSpace::default())
        }

        fn rename(&mut self, _from: &[u8], _to: &[u8]) -> Result<()> {
            self.calls.push("rename");
            Ok(())
        }
    }

    struct Previous(usize);

    impl Passthrough for Previous {
        fn chain(&mut self, _call: Call) -> Result<Reply> {
            self.0 += 1;
            Ok(Reply::Code(0xffff))
        }
    }

    const F: u8 = 5;

    fn router() -> Router<Recorder> {
        Router::new(Recorder::default(), F)
    }

    fn handled(routed: Routed) -> Result<Reply> {
        match routed {
            Routed::Handled(result) => result,
            Routed::Chain(call) => panic!("{:?} was chained", call),
        }
    }

    #[test]
    fn supported_table() {
        assert!(!is_supported(0x00));
        assert!(is_supported(0x01));
        assert!(!is_supported(0x02));
        assert!(is_supported(0x2D));
        assert!(is_supported(0x2E));
        assert!(!is_supported(0x2F));
        assert!(!is_supported(0xFF));
    }

    #[test]
    fn path_calls_use_the_path_drive() {
        let mut r = router();
        assert!(handled(r.route(Call::MakeDir { path: b"f:\\NEW" })).is_ok());
        assert!(matches!(r.route(Call::MakeDir { path: b"C:\\NEW" }), Routed::Chain(_)));
        assert!(matches!(r.route(Call::MakeDir { path: b"" }), Routed::Chain(_)));

        let routed = r.route(Call::Rename {
            from: b"F:\\A",
            to: b"F:\\B",
        });
        assert!(handled(routed).is_ok());
        assert_eq!(r.redirector().calls, vec!["mkdir", "rename"]);
    }

    #[test]
    fn handle_calls_use_the_handle_drive() {
        let mut r = router();
        let mut file = FileHandle {
            dev_info: DEV_INFO_NETWORK | u16::from(F),
            ..Default::default()
        };
        let mut buf = [0u8; 8];
        let reply = handled(r.route(Call::Read {
            file: &mut file,
            buf: &mut buf,
        }));
        assert_eq!(reply.unwrap(), Reply::Transferred(8));

        let mut other = FileHandle {
            dev_info: 2,
            ..Default::default()
        };
        let routed = r.route(Call::Read {
            file: &mut other,
            buf: &mut buf,
        });
        assert!(matches!(routed, Routed::Chain(_)));
    }

    #[test]
    fn find_next_uses_the_search_drive() {
        let mut r = router();
        let mut search = SearchContinuation {
            drive: F | SearchContinuation::REMOTE,
            ..Default::default()
        };
        assert!(handled(r.route(Call::FindNext { search: &mut search })).is_ok());
        search.drive = 2;
        assert!(matches!(r.route(Call::FindNext { search: &mut search }), Routed::Chain(_)));
    }

    #[test]
    fn other_calls_use_the_current_directory() {
        let mut r = router();
        assert!(handled(r.route(Call::DiskSpace { cwd: b"F:\\GAMES" })).is_ok());
        assert!(matches!(r.route(Call::DiskSpace { cwd: b"A:\\" }), Routed::Chain(_)));
    }

    #[test]
    fn install_check_and_unknown_are_chained() {
        let mut r = router();
        let mut prev = Previous(0);
        assert_eq!(r.call(Call::InstallCheck, &mut prev).unwrap(), Reply::Code(0xffff));
        assert_eq!(r.call(Call::Other(0x02), &mut prev).unwrap(), Reply::Code(0xffff));
        assert_eq!(r.call(Call::Other(0x30), &mut prev).unwrap(), Reply::Code(0xffff));
        assert_eq!(prev.0, 3);
        assert!(r.redirector().calls.is_empty());
    }

    #[test]
    fn unimplemented_calls_fail_with_the_generic_code() {
        let mut r = router();
        let mut file = FileHandle {
            dev_info: u16::from(F),
            ..Default::default()
        };
        let err = handled(r.route(Call::Lock { file: &mut file })).err().unwrap();
        assert_eq!(err.code(), code::GENERAL);

        let reply = handled(r.route(Call::Legacy2D { file: &mut file })).unwrap();
        assert_eq!(reply, Reply::Code(LEGACY_2D_RESULT));
        assert_eq!(LEGACY_2D_RESULT, 2);
    }
}
