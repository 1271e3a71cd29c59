//! Startup configuration: server address, drive mapping and link channel.

use crate::{
    error::Error,
    io_err,
    proto::MacAddr,
    redir::Dispatcher,
    transport::{LinkLayer, ReceiveSlot, Session, Ticker, Transport},
    utils::{self, Result},
};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Where the server is
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ServerAddr {
    /// Find it with a broadcast, written `::`
    Auto,
    Fixed(MacAddr),
}

impl FromStr for ServerAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "::" => Ok(ServerAddr::Auto),
            _ => Ok(ServerAddr::Fixed(s.parse()?)),
        }
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ServerAddr::Auto => write!(f, "::"),
            ServerAddr::Fixed(mac) => write!(f, "{}", mac),
        }
    }
}

/// A server drive made visible under a local drive letter, written `R-L`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DriveMapping {
    pub remote: u8,
    pub local: u8,
}

impl FromStr for DriveMapping {
    type Err = Error;

    /// `C-F` maps the server's C: to the local F:
    fn from_str(s: &str) -> Result<Self> {
        match s.as_bytes() {
            &[remote, b'-', local] => Ok(DriveMapping {
                remote: utils::drive_number(remote)
                    .ok_or_else(|| io_err!(InvalidInput, "Invalid remote drive"))?,
                local: utils::drive_number(local)
                    .ok_or_else(|| io_err!(InvalidInput, "Invalid local drive"))?,
            }),
            _ => Err(io_err!(InvalidInput, "Drive mapping must look like C-F").into()),
        }
    }
}

impl fmt::Display for DriveMapping {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            utils::drive_letter(self.remote),
            utils::drive_letter(self.local)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub server: ServerAddr,
    pub mapping: DriveMapping,
    /// Link channel to use instead of the default one
    pub channel: Option<String>,
}

impl Config {
    pub fn new(server: &str, mapping: &str) -> Result<Config> {
        Ok(Config {
            server: server.parse()?,
            mapping: mapping.parse()?,
            channel: None,
        })
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Config {
        self.channel = Some(channel.into());
        self
    }

    /// Fresh session for a link with the given address
    pub fn session(&self, local: MacAddr) -> Session {
        Session {
            local,
            remote: match self.server {
                ServerAddr::Auto => MacAddr::BROADCAST,
                ServerAddr::Fixed(mac) => mac,
            },
            local_drive: self.mapping.local,
            remote_drive: self.mapping.remote,
            sequence: 0,
        }
    }

    /// Set up the dispatcher, looking for the server first if its address
    /// was not given.
    pub fn connect<L, T>(&self, link: L, ticker: T, slot: Arc<ReceiveSlot>) -> Result<Dispatcher<L, T>>
    where
        L: LinkLayer,
        T: Ticker,
    {
        let session = self.session(link.address());
        let mut redir = Dispatcher::new(Transport::new(link, ticker, slot, session));
        if self.server == ServerAddr::Auto {
            let mac = redir.discover()?;
            log::info!("Using server {}", mac);
        }
        Ok(redir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{self, Server};

    #[test]
    fn parse_server() {
        assert_eq!("::".parse::<ServerAddr>().unwrap(), ServerAddr::Auto);
        assert_eq!(
            "02:00:00:00:00:02".parse::<ServerAddr>().unwrap(),
            ServerAddr::Fixed(testing::SERVER)
        );
        assert!(":".parse::<ServerAddr>().is_err());
        assert!("02:00:00:00:00".parse::<ServerAddr>().is_err());
    }

    #[test]
    fn parse_mapping() {
        let m: DriveMapping = "C-F".parse().unwrap();
        assert_eq!((m.remote, m.local), (2, 5));
        assert_eq!("d-e".parse::<DriveMapping>().unwrap().to_string(), "D-E");
        assert!("C:F".parse::<DriveMapping>().is_err());
        assert!("CF".parse::<DriveMapping>().is_err());
        assert!("1-F".parse::<DriveMapping>().is_err());
    }

    #[test]
    fn session_from_config() {
        let config = Config::new("::", "C-F").unwrap().with_channel("eth1");
        assert_eq!(config.channel.as_deref(), Some("eth1"));
        let session = config.session(testing::CLIENT);
        assert_eq!(session.remote, MacAddr::BROADCAST);
        assert_eq!(session.local_drive, 5);
        assert_eq!(session.remote_drive, 2);
    }

    #[test]
    fn connect_discovers_the_server() {
        let server = Server::new(|req, _| vec![testing::reply(req, 1, &[0; 6])]);
        let transport = server.transport();
        let slot = transport.slot().clone();
        let (link, ticker) = transport.into_parts();

        let config = Config::new("::", "C-F").unwrap();
        let redir = config.connect(link, ticker, slot).unwrap();
        assert_eq!(redir.session().remote, testing::SERVER);
        assert_eq!(redir.session().local_drive, 5);
        assert_eq!(server.sent().len(), 1);
    }

    #[test]
    fn connect_to_a_known_server_sends_nothing() {
        let server = Server::new(|_, _| vec![]);
        let transport = server.transport();
        let slot = transport.slot().clone();
        let (link, ticker) = transport.into_parts();

        let config = Config::new("02:00:00:00:00:02", "C-F").unwrap();
        let redir = config.connect(link, ticker, slot).unwrap();
        assert_eq!(redir.session().remote, testing::SERVER);
        assert!(server.sent().is_empty());
    }

    #[test]
    fn connect_fails_without_server() {
        let server = Server::new(|_, _| vec![]);
        let transport = server.transport();
        let slot = transport.slot().clone();
        let (link, ticker) = transport.into_parts();

        let config = Config::new("::", "C-F").unwrap();
        let err = config.connect(link, ticker, slot).err().unwrap();
        assert_eq!(err.kind(), Some(ErrorKind::NoReply));
        assert_eq!(server.sent().len(), 3);
    }
}
