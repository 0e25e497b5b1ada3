//! Listening-address grammar and peer-address serialization.
//!
//! Addresses are space-separated token strings whose first token names the
//! address family: `inet 127.0.0.1 4869`, `inet6 ::1 4869`, `unix
//! /run/app.sock`, or (Linux) `vsock <port> <cid>`. The same grammar is used
//! in both directions: parsing `-a` on the way in, and serializing an
//! accepted peer address into the worker's `REMOTE` variable on the way out.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};
use std::path::PathBuf;
use std::str::FromStr;

use nix::sys::socket::{SockaddrStorage, UnixAddr};

use crate::error::ServeError;

/// Port used when the address string omits one entirely (`-a` absent).
pub const DEFAULT_PORT: u16 = 4869;

/// Path bound when `unix` is given without a path token.
pub const DEFAULT_UNIX_PATH: &str = "serve.sock";

/// Longest textual IPv6 address accepted, matching `INET6_ADDRSTRLEN - 1`.
const INET6_TEXT_MAX: usize = 45;

/// A parsed listening address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    Inet(SocketAddrV4),
    Inet6(SocketAddrV6),
    Unix(PathBuf),
    #[cfg(target_os = "linux")]
    Vsock { port: u32, cid: u32 },
}

impl Default for ListenAddress {
    fn default() -> Self {
        Self::Inet(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT))
    }
}

impl FromStr for ListenAddress {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, rest) = match s.split_once(' ') {
            Some((tag, rest)) => (tag, Some(rest)),
            None => (s, None),
        };
        match tag {
            "inet" => parse_inet(rest.ok_or_else(|| invalid("inet", s))?),
            "inet6" => parse_inet6(rest.ok_or_else(|| invalid("inet6", s))?),
            "unix" => parse_unix(rest),
            #[cfg(target_os = "linux")]
            "vsock" => parse_vsock(rest.ok_or_else(|| invalid("vsock", s))?),
            _ => Err(ServeError::Address(format!(
                "unsupported address family '{}'",
                tag
            ))),
        }
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet(sa) => write!(f, "inet {} {}", sa.ip(), sa.port()),
            Self::Inet6(sa) => write!(f, "inet6 {} {}", sa.ip(), sa.port()),
            Self::Unix(path) => write!(f, "unix {}", path.display()),
            #[cfg(target_os = "linux")]
            Self::Vsock { port, cid } => write!(f, "vsock {} {}", port, cid),
        }
    }
}

fn invalid(family: &str, s: &str) -> ServeError {
    ServeError::Address(format!("invalid {} address '{}'", family, s))
}

fn parse_port(s: &str) -> Result<u16, ServeError> {
    let port: u32 = s
        .parse()
        .map_err(|_| ServeError::Address("port contains non-digit character".into()))?;
    u16::try_from(port).map_err(|_| ServeError::Address("port number exceeds 65535".into()))
}

fn parse_inet(rest: &str) -> Result<ListenAddress, ServeError> {
    let (addr, port) = rest.split_once(' ').ok_or_else(|| invalid("inet", rest))?;
    let ip = Ipv4Addr::from_str(addr).map_err(|_| invalid("inet", rest))?;
    Ok(ListenAddress::Inet(SocketAddrV4::new(ip, parse_port(port)?)))
}

fn parse_inet6(rest: &str) -> Result<ListenAddress, ServeError> {
    let (addr, port) = rest.split_once(' ').ok_or_else(|| invalid("inet6", rest))?;
    if addr.len() > INET6_TEXT_MAX {
        return Err(invalid("inet6", rest));
    }
    let ip = Ipv6Addr::from_str(addr).map_err(|_| invalid("inet6", rest))?;
    Ok(ListenAddress::Inet6(SocketAddrV6::new(
        ip,
        parse_port(port)?,
        0,
        0,
    )))
}

fn parse_unix(rest: Option<&str>) -> Result<ListenAddress, ServeError> {
    let path = match rest {
        Some(p) if !p.is_empty() => PathBuf::from(p),
        _ => PathBuf::from(DEFAULT_UNIX_PATH),
    };
    // UnixAddr enforces the platform's sun_path capacity.
    UnixAddr::new(&path)
        .map_err(|_| ServeError::Address(format!("unix socket path '{}' is too long", path.display())))?;
    Ok(ListenAddress::Unix(path))
}

#[cfg(target_os = "linux")]
fn parse_vsock(rest: &str) -> Result<ListenAddress, ServeError> {
    let (port, cid) = rest.split_once(' ').ok_or_else(|| {
        ServeError::Address("vsock address needs a port and a context identifier".into())
    })?;
    let port: u32 = port
        .parse()
        .map_err(|_| ServeError::Address("could not parse vsock port number".into()))?;
    let cid: u32 = cid
        .parse()
        .map_err(|_| ServeError::Address("could not parse vsock context identifier".into()))?;
    Ok(ListenAddress::Vsock { port, cid })
}

/// Serialize an accepted peer address in the `-a` grammar of its family,
/// without the leading family tag. This is the value workers see in
/// `$REMOTE`. Returns `None` for families serve does not speak.
pub fn serialize_peer(addr: &SockaddrStorage) -> Option<String> {
    if let Some(sin) = addr.as_sockaddr_in() {
        return Some(format!("{} {}", sin.ip(), sin.port()));
    }
    if let Some(sin6) = addr.as_sockaddr_in6() {
        return Some(format!("{} {}", sin6.ip(), sin6.port()));
    }
    if let Some(unix) = addr.as_unix_addr() {
        // Unnamed peers (the common case for unix clients) serialize empty.
        return Some(
            unix.path()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        );
    }
    #[cfg(target_os = "linux")]
    if let Some(vsock) = addr.as_vsock_addr() {
        return Some(format!("{} {}", vsock.port(), vsock.cid()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inet() {
        let addr: ListenAddress = "inet 127.0.0.1 5000".parse().unwrap();
        assert_eq!(
            addr,
            ListenAddress::Inet(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 5000))
        );
    }

    #[test]
    fn test_parse_inet_port_bounds() {
        assert!("inet 127.0.0.1 0".parse::<ListenAddress>().is_ok());
        assert!("inet 127.0.0.1 65535".parse::<ListenAddress>().is_ok());
        let err = "inet 127.0.0.1 65536".parse::<ListenAddress>().unwrap_err();
        assert!(err.to_string().contains("65535"));
    }

    #[test]
    fn test_parse_inet_rejects_garbage() {
        assert!("inet 127.0.0.1".parse::<ListenAddress>().is_err());
        assert!("inet".parse::<ListenAddress>().is_err());
        assert!("inet 999.0.0.1 80".parse::<ListenAddress>().is_err());
        assert!("inet 127.0.0.1 80x".parse::<ListenAddress>().is_err());
    }

    #[test]
    fn test_parse_inet6() {
        let addr: ListenAddress = "inet6 ::1 6000".parse().unwrap();
        assert_eq!(
            addr,
            ListenAddress::Inet6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 6000, 0, 0))
        );
    }

    #[test]
    fn test_parse_inet6_text_too_long() {
        let long = format!("inet6 {} 80", "0".repeat(46));
        assert!(long.parse::<ListenAddress>().is_err());
    }

    #[test]
    fn test_parse_unix_default_path() {
        assert_eq!(
            "unix".parse::<ListenAddress>().unwrap(),
            ListenAddress::Unix(PathBuf::from(DEFAULT_UNIX_PATH))
        );
        assert_eq!(
            "unix /tmp/x.sock".parse::<ListenAddress>().unwrap(),
            ListenAddress::Unix(PathBuf::from("/tmp/x.sock"))
        );
    }

    #[test]
    fn test_parse_unix_path_too_long() {
        let long = format!("unix /{}", "a".repeat(200));
        let err = long.parse::<ListenAddress>().unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parse_vsock() {
        assert_eq!(
            "vsock 1234 3".parse::<ListenAddress>().unwrap(),
            ListenAddress::Vsock { port: 1234, cid: 3 }
        );
        assert!("vsock 1234".parse::<ListenAddress>().is_err());
        assert!("vsock x 3".parse::<ListenAddress>().is_err());
    }

    #[test]
    fn test_unknown_family() {
        let err = "x25 12345".parse::<ListenAddress>().unwrap_err();
        assert!(err.to_string().contains("unsupported address family"));
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["inet 0.0.0.0 4869", "inet6 ::1 80", "unix serve.sock"] {
            let addr: ListenAddress = s.parse().unwrap();
            assert_eq!(addr.to_string(), s);
            assert_eq!(addr.to_string().parse::<ListenAddress>().unwrap(), addr);
        }
    }

    #[test]
    fn test_default_address() {
        assert_eq!(ListenAddress::default().to_string(), "inet 0.0.0.0 4869");
    }
}
