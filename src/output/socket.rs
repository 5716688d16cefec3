//! Raw link-layer socket bound to one network interface (Linux `AF_PACKET`).

use log::{debug, trace};
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use super::colorlight::Link;

const ETH_ALEN: u8 = 6;
const MAX_SEGMENTS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("failed to create socket: {0}")]
    Create(#[source] io::Error),
    #[error("invalid interface name {0:?}")]
    InterfaceName(String),
    #[error("failed to find interface {name}: {source}")]
    Interface {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Raw socket sending complete Ethernet frames out of one interface.
///
/// Closed on drop.
pub struct RawSocket {
    fd: OwnedFd,
    address: libc::sockaddr_ll,
    interface: String,
}

impl RawSocket {
    /// Open a raw socket and resolve `interface` (e.g. `eth0`).
    ///
    /// Needs `CAP_NET_RAW`.
    pub fn open(interface: &str) -> Result<Self, SocketError> {
        // SAFETY: plain syscall, result checked below.
        let raw = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, 0) };
        if raw == -1 {
            return Err(SocketError::Create(io::Error::last_os_error()));
        }
        // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let name = CString::new(interface)
            .map_err(|_| SocketError::InterfaceName(interface.to_string()))?;
        // SAFETY: `name` is a valid NUL-terminated string.
        let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if index == 0 {
            return Err(SocketError::Interface {
                name: interface.to_string(),
                source: io::Error::last_os_error(),
            });
        }

        // SAFETY: sockaddr_ll is plain old data; all-zero is a valid value.
        let mut address: libc::sockaddr_ll = unsafe { mem::zeroed() };
        address.sll_family = libc::AF_PACKET as libc::c_ushort;
        address.sll_ifindex = index as libc::c_int;
        address.sll_halen = ETH_ALEN;

        debug!("Opened raw socket on {} (index {})", interface, index);

        Ok(Self {
            fd,
            address,
            interface: interface.to_string(),
        })
    }
}

impl Link for RawSocket {
    fn send(&mut self, segments: &[&[u8]]) -> io::Result<usize> {
        if segments.len() > MAX_SEGMENTS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "too many packet segments",
            ));
        }

        let mut iov = [libc::iovec {
            iov_base: std::ptr::null_mut(),
            iov_len: 0,
        }; MAX_SEGMENTS];
        for (slot, segment) in iov.iter_mut().zip(segments) {
            slot.iov_base = segment.as_ptr() as *mut libc::c_void;
            slot.iov_len = segment.len();
        }

        // SAFETY: msghdr is plain old data; all-zero is a valid value.
        let mut message: libc::msghdr = unsafe { mem::zeroed() };
        message.msg_name = &mut self.address as *mut libc::sockaddr_ll as *mut libc::c_void;
        message.msg_namelen = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
        message.msg_iov = iov.as_mut_ptr();
        message.msg_iovlen = segments.len() as _;

        // SAFETY: every pointer in `message` refers to memory that outlives the
        // call; the kernel only reads through the iovecs.
        let sent = unsafe { libc::sendmsg(self.fd.as_raw_fd(), &message, 0) };
        if sent < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(sent as usize)
    }
}

impl Drop for RawSocket {
    fn drop(&mut self) {
        trace!("Closing raw socket on {}", self.interface);
    }
}
