//! Raw ethernet link on a Linux packet socket.

use {
    etherdfs::{LinkLayer, MacAddr, ReceiveSlot, ETHERTYPE},
    nix::{
        libc,
        net::if_::if_nametoindex,
        sys::socket::{
            bind, recv, send, socket, AddressFamily, LinkAddr, MsgFlags, SockFlag, SockProtocol,
            SockType, SockaddrLike,
        },
    },
    std::{
        fs,
        io,
        os::fd::{AsRawFd, OwnedFd},
        sync::Arc,
        thread,
    },
};

/// Largest ethernet frame without FCS
const MAX_ETHERNET_FRAME: usize = 1514;

pub struct RawLink {
    fd: OwnedFd,
    address: MacAddr,
}

impl RawLink {
    /// Open a packet socket on `interface` that only sees EtherDFS frames,
    /// and start feeding them into `slot`.
    pub fn open(interface: &str, slot: Arc<ReceiveSlot>) -> io::Result<RawLink> {
        let address = hardware_address(interface)?;
        let index = if_nametoindex(interface)?;

        let fd = socket(
            AddressFamily::Packet,
            SockType::Raw,
            SockFlag::SOCK_CLOEXEC,
            SockProtocol::EthAll,
        )?;
        bind(fd.as_raw_fd(), &link_addr(index)?)?;

        let rx = fd.try_clone()?;
        thread::Builder::new()
            .name("ethdfs-rx".to_owned())
            .spawn(move || receive(rx, slot))?;

        log::info!("Listening on {} ({})", interface, address);
        Ok(RawLink { fd, address })
    }
}

impl LinkLayer for RawLink {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let sent = send(self.fd.as_raw_fd(), frame, MsgFlags::empty())?;
        if sent != frame.len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "Short frame write"));
        }
        Ok(())
    }

    fn address(&self) -> MacAddr {
        self.address
    }
}

/// Receive loop: every frame is offered to the slot, and dropped if the
/// slot is busy.
fn receive(fd: OwnedFd, slot: Arc<ReceiveSlot>) {
    let mut buf = [0u8; MAX_ETHERNET_FRAME];
    loop {
        match recv(fd.as_raw_fd(), &mut buf, MsgFlags::empty()) {
            Ok(n) => {
                if !slot.deliver(&buf[..n]) {
                    log::trace!("Dropped frame of {} bytes, no buffer", n);
                }
            }
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => {
                log::error!("Receive failed: {}", e);
                return;
            }
        }
    }
}

fn link_addr(index: u32) -> io::Result<LinkAddr> {
    let sll = libc::sockaddr_ll {
        sll_family: libc::AF_PACKET as u16,
        sll_protocol: ETHERTYPE.to_be(),
        sll_ifindex: index as i32,
        sll_hatype: 0,
        sll_pkttype: 0,
        sll_halen: 0,
        sll_addr: [0; 8],
    };
    // SAFETY: `sll` is a fully initialized sockaddr_ll and the length passed
    // is its exact size.
    unsafe {
        LinkAddr::from_raw(
            &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
            Some(std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t),
        )
    }
    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Bad link address"))
}

fn hardware_address(interface: &str) -> io::Result<MacAddr> {
    let path = format!("/sys/class/net/{}/address", interface);
    fs::read_to_string(path)?.trim().parse()
}
