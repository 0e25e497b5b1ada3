//! Descriptor helpers: nonblocking and close-on-exec flags, and the
//! half-nonblocking pipe the supervisor hangs off every worker's stderr.

use std::io;
use std::os::unix::io::{AsRawFd, OwnedFd};

use nix::sys::socket::{AddressFamily, SockFlag, SockType, socket};

use crate::error::Result;

/// Set `O_NONBLOCK` on a descriptor, preserving its other flags.
pub fn set_nonblocking(fd: &impl AsRawFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Set `FD_CLOEXEC` on a descriptor.
#[cfg_attr(
    any(target_os = "linux", target_os = "android", target_os = "freebsd"),
    allow(dead_code)
)]
pub fn set_cloexec(fd: &impl AsRawFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(raw, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Create a pipe whose write end only is nonblocking.
///
/// The read end stays blocking: the supervisor only reads it after poll
/// reports readiness. The write end becomes a worker's stderr, and must not
/// let a slow supervisor block a child that flushes. A `pipe2(O_NONBLOCK)`
/// style call is unsuitable here because it flags both ends.
///
/// Returns `(read_end, write_end)`. On failure both ends are closed and the
/// original error is returned.
pub fn half_pipe() -> Result<(OwnedFd, OwnedFd)> {
    let (rd, wr) = nix::unistd::pipe()?;
    set_nonblocking(&wr)?;
    Ok((rd, wr))
}

/// Create a socket that is both nonblocking and close-on-exec.
///
/// Where the kernel accepts the flags at creation they are applied
/// atomically; elsewhere they are applied after the fact, and a failure to
/// set either flag is logged but not fatal.
pub fn qualified_socket(family: AddressFamily, ty: SockType) -> Result<OwnedFd> {
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    {
        Ok(socket(
            family,
            ty,
            SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC,
            None,
        )?)
    }
    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    {
        let fd = socket(family, ty, SockFlag::empty(), None)?;
        if let Err(err) = set_nonblocking(&fd) {
            tracing::warn!(error = %err, "could not make socket nonblocking");
        }
        if let Err(err) = set_cloexec(&fd) {
            tracing::warn!(error = %err, "could not make socket close-on-exec");
        }
        Ok(fd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fd_flags(fd: &impl AsRawFd) -> i32 {
        unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) }
    }

    #[test]
    fn test_half_pipe_flag_asymmetry() {
        let (rd, wr) = half_pipe().unwrap();
        assert_eq!(fd_flags(&rd) & libc::O_NONBLOCK, 0);
        assert_ne!(fd_flags(&wr) & libc::O_NONBLOCK, 0);
    }

    #[test]
    fn test_set_nonblocking() {
        let (rd, _wr) = nix::unistd::pipe().unwrap();
        assert_eq!(fd_flags(&rd) & libc::O_NONBLOCK, 0);
        set_nonblocking(&rd).unwrap();
        assert_ne!(fd_flags(&rd) & libc::O_NONBLOCK, 0);
    }

    #[test]
    fn test_qualified_socket_flags() {
        let fd = qualified_socket(AddressFamily::Inet, SockType::Stream).unwrap();
        assert_ne!(fd_flags(&fd) & libc::O_NONBLOCK, 0);
        let fdflags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFD) };
        assert_ne!(fdflags & libc::FD_CLOEXEC, 0);
    }
}
