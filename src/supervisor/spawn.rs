//! The fork dance: turning one accepted connection into one worker.

use std::os::unix::io::{AsRawFd, OwnedFd};

use nix::unistd::{ForkResult, dup2, fork};

use crate::command::CommandLine;
use crate::error::Result;
use crate::fdutil;
use crate::supervisor::table::WorkerTable;
use crate::supervisor::worker::Worker;

/// Fork a worker for `sock`, wiring the socket to its stdin and stdout and
/// a fresh half-nonblocking pipe to its stderr.
///
/// On success the parent owns the pipe's read end inside a new table entry
/// and has closed everything else; the connection socket lives on only
/// through the child's duplicated descriptors. On failure every descriptor
/// created here is closed by drop and the originating error is returned
/// untouched.
pub(crate) fn add_worker(
    table: &mut WorkerTable,
    command: &CommandLine,
    sock: OwnedFd,
    remote: &str,
) -> Result<()> {
    let (rp, wp) = fdutil::half_pipe()?;
    // SAFETY: the supervisor is single-threaded; the child closes inherited
    // descriptors, wires its stdio, and execs.
    match unsafe { fork() }? {
        ForkResult::Child => {
            // Inherited pipe read ends must not leak into the worker, or
            // siblings would hold each other's stderr open.
            table.clear();
            // SAFETY: no other thread exists between fork and exec.
            unsafe { std::env::set_var("REMOTE", remote) };
            let sock_fd = sock.as_raw_fd();
            let _ = dup2(sock_fd, libc::STDIN_FILENO);
            let _ = dup2(sock_fd, libc::STDOUT_FILENO);
            let _ = dup2(wp.as_raw_fd(), libc::STDERR_FILENO);
            drop(sock);
            drop(rp);
            drop(wp);
            let errno = command.exec();
            eprintln!("could not start worker command: {errno}");
            std::process::abort();
        }
        ForkResult::Parent { child } => {
            drop(wp);
            table.push(Worker::new(child, rp));
            drop(sock);
            println!("Process {} created ({})", child, remote);
            Ok(())
        }
    }
}
