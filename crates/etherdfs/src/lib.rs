#![forbid(unsafe_code)]
//! Client-side engine of the EtherDFS network drive protocol.
//!
//! A host operating system hands file system calls for one drive letter to a
//! redirector. This crate turns those calls into request frames addressed to
//! an EtherDFS server on the local ethernet segment, waits for the matching
//! reply, and fills in the records the host owns (file handles, directory
//! entries, search state).
//!
//! # Overview
//!
//! - [`proto`] holds the wire constants and the records shared with the host.
//! - [`serialize`] and [`frame`] build and check frames.
//! - [`transport`] runs one request/reply exchange at a time, with retries,
//!   over any [`LinkLayer`].
//! - [`redir`] implements the [`Redirector`] calls on top of the transport.
//! - [`router`] decides which host calls belong to the managed drive and
//!   which ones go to the previous handler.
//! - [`config`] parses the server address and drive mapping.
//!
//! # Example
//!
//! ```no_run
//! use etherdfs::{Config, BiosTicker, LinkLayer, MacAddr, ReceiveSlot, Redirector};
//!
//! struct Link;
//!
//! impl LinkLayer for Link {
//!     fn send(&mut self, _frame: &[u8]) -> std::io::Result<()> {
//!         // Hand the frame to the network interface
//!         Ok(())
//!     }
//!
//!     fn address(&self) -> MacAddr {
//!         MacAddr([0x02, 0, 0, 0, 0, 1])
//!     }
//! }
//!
//! fn main() -> etherdfs::Result<()> {
//!     // Server C: as local F:, server found by broadcast
//!     let config = Config::new("::", "C-F")?;
//!     // The receive path of the link calls slot.deliver(frame)
//!     let slot = ReceiveSlot::new();
//!     let mut redir = config.connect(Link, BiosTicker::new(), slot)?;
//!     redir.make_dir(b"F:\\NEWDIR")?;
//!     Ok(())
//! }
//! ```
//!
//! # Errors
//!
//! Failures carry the host's numeric error codes (see [`error::code`]):
//! codes sent back by the server are passed through, and the engine uses
//! its own codes for calls it refuses locally. A lost server is reported as
//! [`ErrorKind::NoReply`].
pub mod config;
pub mod error;
pub mod frame;
pub mod proto;
pub mod redir;
pub mod router;
pub mod serialize;
pub mod transport;
#[macro_use]
pub mod utils;

#[cfg(test)]
mod testing;

pub use crate::config::{Config, DriveMapping, ServerAddr};
pub use crate::error::Error;
pub use crate::error::ErrorKind;
pub use crate::error::string as errstr;
pub use crate::proto::*;
pub use crate::redir::{Dispatcher, Redirector};
pub use crate::router::{Call, Passthrough, Routed, Router};
pub use crate::transport::{BiosTicker, LinkLayer, ReceiveSlot, Session, Ticker, Transport};
pub use crate::utils::Result;
