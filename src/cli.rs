//! Command-line interface definitions using clap.

use clap::{Parser, ValueEnum};
use nix::sys::socket::SockType;

use crate::addr::ListenAddress;
use crate::logging::{LogFormat, LogLevel};

/// serve - turn any shell command into a network service
///
/// One worker process is forked per accepted connection, with its stdin and
/// stdout bound to the connection socket and its stderr relayed line by
/// line, tagged with the worker pid.
#[derive(Parser, Debug)]
#[command(name = "serve", version, about, long_about = None)]
pub struct Cli {
    /// Listening address: 'inet <addr> <port>', 'inet6 <addr> <port>',
    /// 'unix [path]', or 'vsock <port> <cid>'.
    #[arg(short = 'a', long, default_value_t = ListenAddress::default())]
    pub address: ListenAddress,

    /// Listen backlog, clamped to [0, SOMAXCONN].
    #[arg(short = 'b', long)]
    pub backlog: Option<i32>,

    /// Socket type.
    #[arg(short = 't', long = "type", value_enum, default_value_t = SocketType::Stream)]
    pub socket_type: SocketType,

    /// Socket protocol (accepted but not implemented; stream semantics are
    /// used regardless).
    #[arg(short = 'p', long)]
    pub protocol: Option<String>,

    /// Cap on concurrent workers; the effective cap never exceeds what the
    /// open-file limit can carry.
    #[arg(long, env = "SERVE_MAX_WORKERS")]
    pub max_workers: Option<usize>,

    /// Log level for diagnostics on stderr.
    #[arg(long, env = "SERVE_LOG_LEVEL", value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    /// Log format for diagnostics on stderr.
    #[arg(long, env = "SERVE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Command run for each connection, via `sh -c`.
    pub command: String,
}

/// Socket types accepted by `-t`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    Stream,
    Dgram,
    Seqpacket,
}

impl From<SocketType> for SockType {
    fn from(ty: SocketType) -> Self {
        match ty {
            SocketType::Stream => SockType::Stream,
            SocketType::Dgram => SockType::Datagram,
            SocketType::Seqpacket => SockType::SeqPacket,
        }
    }
}
