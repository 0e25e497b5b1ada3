//! Listener construction and connection acceptance.

use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use nix::sys::socket::{
    AddressFamily, Backlog, SockType, SockaddrIn, SockaddrIn6, SockaddrStorage, UnixAddr, accept,
    bind, getpeername, listen,
};
#[cfg(target_os = "linux")]
use nix::sys::socket::VsockAddr;

use crate::addr::{self, ListenAddress};
use crate::error::{Result, ServeError};
use crate::fdutil::qualified_socket;

/// A bound, listening, nonblocking, close-on-exec socket.
#[derive(Debug)]
pub struct Listener {
    fd: OwnedFd,
}

impl Listener {
    /// Create the listening socket for `address`.
    ///
    /// `backlog` is clamped to `[0, SOMAXCONN]`; `None` means the platform
    /// maximum. All failures here are setup errors.
    pub fn bind(address: &ListenAddress, ty: SockType, backlog: Option<i32>) -> Result<Self> {
        let fd = qualified_socket(address_family(address), ty)?;
        match address {
            ListenAddress::Inet(sa) => bind(fd.as_raw_fd(), &SockaddrIn::from(*sa))?,
            ListenAddress::Inet6(sa) => bind(fd.as_raw_fd(), &SockaddrIn6::from(*sa))?,
            ListenAddress::Unix(path) => bind(fd.as_raw_fd(), &UnixAddr::new(path)?)?,
            #[cfg(target_os = "linux")]
            ListenAddress::Vsock { port, cid } => {
                bind(fd.as_raw_fd(), &VsockAddr::new(*cid, *port))?
            }
        }
        listen(&fd, clamp_backlog(backlog))?;
        Ok(Self { fd })
    }

    /// Accept one connection, returning the connection socket and the peer
    /// address serialized for the worker's `REMOTE` variable.
    ///
    /// Errors carry the accept errno untouched; the event loop classifies
    /// them into transient and fatal.
    pub fn accept_remote(&self) -> Result<(OwnedFd, String)> {
        let conn = accept(self.fd.as_raw_fd())?;
        // SAFETY: freshly accepted descriptor, exclusively owned here.
        let conn = unsafe { OwnedFd::from_raw_fd(conn) };
        let peer = getpeername::<SockaddrStorage>(conn.as_raw_fd())?;
        match addr::serialize_peer(&peer) {
            Some(remote) => Ok((conn, remote)),
            // Dropping `conn` closes the descriptor.
            None => Err(ServeError::UnsupportedFamily),
        }
    }

    pub fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

fn address_family(address: &ListenAddress) -> AddressFamily {
    match address {
        ListenAddress::Inet(_) => AddressFamily::Inet,
        ListenAddress::Inet6(_) => AddressFamily::Inet6,
        ListenAddress::Unix(_) => AddressFamily::Unix,
        #[cfg(target_os = "linux")]
        ListenAddress::Vsock { .. } => AddressFamily::Vsock,
    }
}

fn clamp_backlog(requested: Option<i32>) -> Backlog {
    match requested {
        // Backlog::new rejects values above SOMAXCONN, completing the clamp.
        Some(n) => Backlog::new(n.max(0)).unwrap_or(Backlog::MAXCONN),
        None => Backlog::MAXCONN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::socket::getsockname;
    use std::io::Write;
    use std::net::TcpStream;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_unix_listener_accepts_unnamed_peer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serve.sock");
        let address = ListenAddress::Unix(path.clone());
        let listener = Listener::bind(&address, SockType::Stream, None).unwrap();

        let mut client = UnixStream::connect(&path).unwrap();
        client.write_all(b"x").unwrap();
        let (_conn, remote) = listener.accept_remote().unwrap();
        assert_eq!(remote, "");
    }

    #[test]
    fn test_inet_listener_reports_peer_address() {
        let address: ListenAddress = "inet 127.0.0.1 0".parse().unwrap();
        let listener = Listener::bind(&address, SockType::Stream, Some(8)).unwrap();

        let local = getsockname::<SockaddrStorage>(listener.as_fd().as_raw_fd()).unwrap();
        let port = local.as_sockaddr_in().unwrap().port();
        let _client = TcpStream::connect(("127.0.0.1", port)).unwrap();

        let (_conn, remote) = listener.accept_remote().unwrap();
        assert!(remote.starts_with("127.0.0.1 "), "remote was {remote:?}");
    }

    #[test]
    fn test_accept_without_client_is_nonblocking() {
        let dir = tempfile::tempdir().unwrap();
        let address = ListenAddress::Unix(dir.path().join("idle.sock"));
        let listener = Listener::bind(&address, SockType::Stream, None).unwrap();
        match listener.accept_remote() {
            Err(ServeError::Sys(errno)) => {
                assert!(matches!(
                    errno,
                    nix::errno::Errno::EAGAIN | nix::errno::Errno::EWOULDBLOCK
                ));
            }
            other => panic!("expected EAGAIN, got {other:?}"),
        }
    }

    #[test]
    fn test_backlog_clamp() {
        assert_eq!(clamp_backlog(Some(-5)), Backlog::new(0).unwrap());
        assert_eq!(clamp_backlog(Some(i32::MAX)), Backlog::MAXCONN);
        assert_eq!(clamp_backlog(None), Backlog::MAXCONN);
    }
}
