//! Error type and host error codes.
//!
//! Every redirector operation ends with either success or a single host error
//! code. [`Error::Dos`] carries that code together with the layer that produced
//! it, so callers can both answer the host and log something meaningful.

use std::{error as stderror, fmt, io};

/// DOS error codes reported back to the host.
pub mod code {
    /// File not found. Also the generic failure code of the redirector.
    pub const FILE_NOT_FOUND: u16 = 2;
    /// Path not found
    pub const PATH_NOT_FOUND: u16 = 3;
    /// Access denied
    pub const ACCESS_DENIED: u16 = 5;
    /// Attempted to remove the current directory
    pub const CURRENT_DIRECTORY: u16 = 16;
    /// No more files
    pub const NO_MORE_FILES: u16 = 18;

    /// Code used for transport failures, malformed replies and unsupported calls
    pub const GENERAL: u16 = FILE_NOT_FOUND;
}

/// Human readable text for a host error code.
pub mod string {
    use super::code::*;

    pub fn describe(code: u16) -> &'static str {
        match code {
            0 => "success",
            FILE_NOT_FOUND => "file not found",
            PATH_NOT_FOUND => "path not found",
            ACCESS_DENIED => "access denied",
            CURRENT_DIRECTORY => "attempted to remove current directory",
            NO_MORE_FILES => "no more files",
            _ => "unknown error",
        }
    }
}

/// Which layer rejected the call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Arguments were rejected before anything was sent
    Local,
    /// No valid reply after every attempt
    NoReply,
    /// A reply arrived but did not have the shape the operation expects
    Protocol,
    /// The server answered with a nonzero result code
    Server,
    /// The operation is not implemented by the redirector
    Unsupported,
}

#[derive(Debug)]
pub enum Error {
    /// Failure of a redirector call, with the host code to report
    Dos { kind: ErrorKind, code: u16 },
    /// Configuration or link-layer setup failure
    Io(io::Error),
}

impl Error {
    pub fn local(code: u16) -> Error {
        Error::Dos {
            kind: ErrorKind::Local,
            code,
        }
    }

    pub fn no_reply() -> Error {
        Error::Dos {
            kind: ErrorKind::NoReply,
            code: code::GENERAL,
        }
    }

    pub fn protocol() -> Error {
        Error::Dos {
            kind: ErrorKind::Protocol,
            code: code::GENERAL,
        }
    }

    pub fn server(code: u16) -> Error {
        Error::Dos {
            kind: ErrorKind::Server,
            code,
        }
    }

    pub fn unsupported() -> Error {
        Error::Dos {
            kind: ErrorKind::Unsupported,
            code: code::GENERAL,
        }
    }

    /// Replace the host code of transport and protocol failures.
    ///
    /// Some calls report their own code when the network lets them down
    /// (CHDIR says "path not found", FINDNEXT says "no more files").
    /// Local and server-reported codes are kept as they are.
    pub fn or_code(self, fallback: u16) -> Error {
        match self {
            Error::Dos {
                kind: kind @ (ErrorKind::NoReply | ErrorKind::Protocol),
                ..
            } => Error::Dos {
                kind,
                code: fallback,
            },
            e => e,
        }
    }

    /// Get the host error code
    pub fn code(&self) -> u16 {
        match *self {
            Error::Dos { code, .. } => code,
            Error::Io(_) => code::GENERAL,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match *self {
            Error::Dos { kind, .. } => Some(kind),
            Error::Io(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Dos { kind, code } => {
                write!(f, "{:?}: {} (code {})", kind, string::describe(code), code)
            }
            Error::Io(ref e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl stderror::Error for Error {
    fn source(&self) -> Option<&(dyn stderror::Error + 'static)> {
        match *self {
            Error::Dos { .. } => None,
            Error::Io(ref e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
