//! Worker records and the stderr line demultiplexer.
//!
//! Workers are arbitrary user programs; line-buffering their stderr in the
//! supervisor yields one uniform, PID-tagged stream on supervisor stdout
//! regardless of how a child buffers its own output.

use std::io::{self, Write};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

use crate::error::{Result, ServeError};

/// Upper bound on bytes buffered for a single unterminated stderr line.
pub const LINE_BUFFER_MAX: usize = 65_534;

/// Bytes consumed from a worker's pipe per readiness event.
const READ_CHUNK: usize = 128;

/// One worker subprocess: its pid, the read end of its stderr pipe, and the
/// bytes of an incomplete stderr line carried across reads.
///
/// Dropping a worker closes its pipe; the pid itself is reaped by the event
/// loop's sweep, never here.
pub struct Worker {
    pid: Pid,
    pipe: OwnedFd,
    ebuf: Vec<u8>,
}

impl Worker {
    pub fn new(pid: Pid, pipe: OwnedFd) -> Self {
        Self {
            pid,
            pipe,
            ebuf: Vec::new(),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn pipe_fd(&self) -> BorrowedFd<'_> {
        self.pipe.as_fd()
    }

    /// Consume one readiness event on the stderr pipe.
    ///
    /// Reads up to [`READ_CHUNK`] bytes, then emits `<pid>: <line>` on
    /// supervisor stdout for every complete line now buffered. A zero-length
    /// read (EOF) is legal and flushes nothing; whatever partial line is
    /// buffered stays for the reaper. Returns the number of lines emitted.
    ///
    /// Fails with [`ServeError::LineOverflow`] when a single logical line
    /// has outgrown [`LINE_BUFFER_MAX`]; the event loop reports this and
    /// keeps the worker, which is expected to exit on its own.
    pub fn drain_stderr(&mut self) -> Result<usize> {
        if self.ebuf.len() > LINE_BUFFER_MAX - READ_CHUNK {
            return Err(ServeError::LineOverflow);
        }
        let mut chunk = [0u8; READ_CHUNK];
        let n = nix::unistd::read(self.pipe.as_raw_fd(), &mut chunk)?;
        self.ebuf.extend_from_slice(&chunk[..n]);

        let mut emitted = 0;
        while let Some(line) = next_line(&mut self.ebuf) {
            emit_tagged(&mut io::stdout().lock(), self.pid, &line);
            emitted += 1;
        }
        Ok(emitted)
    }

    /// Nonblocking exit probe.
    ///
    /// Returns the status to report when the child has terminated: the exit
    /// code for a normal exit, `128 + signo` for a signal death. `None`
    /// means still alive (a `waitpid` error keeps the worker too; the next
    /// sweep retries).
    pub fn try_wait(&self) -> Option<i32> {
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => Some(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => Some(128 + signal as i32),
            Ok(_) | Err(_) => None,
        }
    }

    /// Flush a trailing un-newlined stderr fragment, tagged like a regular
    /// relay line but on supervisor stderr. Called by the reaper at exit.
    pub fn flush_residual(&mut self) {
        if self.ebuf.is_empty() {
            return;
        }
        emit_tagged(&mut io::stderr().lock(), self.pid, &self.ebuf);
        self.ebuf.clear();
    }
}

/// Drain the first complete line (without its newline) from `buf`.
///
/// After a `None` return the buffer holds no newline byte at all, which is
/// the invariant the residual flush relies on.
fn next_line(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let mut line: Vec<u8> = buf.drain(..=pos).collect();
    line.pop();
    Some(line)
}

/// Write `<pid>: <bytes>\n` to a stream, byte-oriented and best-effort: a
/// failed write to our own stdio must not take the worker down.
fn emit_tagged(out: &mut impl Write, pid: Pid, bytes: &[u8]) {
    let _ = write!(out, "{}: ", pid);
    let _ = out.write_all(bytes);
    let _ = out.write_all(b"\n");
}
