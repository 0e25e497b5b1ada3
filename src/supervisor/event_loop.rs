//! The supervisor event loop, one `resume` iteration at a time.
//!
//! Each iteration runs a fixed sequence: reap terminated workers, poll for
//! readiness, admit at most one new connection, forward readable stderr.
//! All state lives in [`Supervisor`]; dropping it releases the listener and
//! every worker pipe on any exit path.

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use crate::command::CommandLine;
use crate::error::{Result, ServeError};
use crate::listener::Listener;
use crate::supervisor::spawn;
use crate::supervisor::table::WorkerTable;

/// Poll timeout while the worker table is full. Admission is re-evaluated
/// this often as workers exit; until then the kernel's listen backlog
/// throttles incoming connections.
const CAPACITY_POLL_MS: u8 = 50;

/// Descriptors the supervisor itself keeps out of the worker budget: the
/// listener plus one slot of headroom for the accept in flight.
const FD_HEADROOM: usize = 2;

/// What one `resume` iteration accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Nothing advanced; the driver may yield the scheduler.
    Idle,
    /// At least one connection, reap, or stderr line was processed.
    Advanced,
}

/// The owned state of the supervisor: listener, command, cap, workers.
pub struct Supervisor {
    listener: Listener,
    command: CommandLine,
    max_workers: usize,
    table: WorkerTable,
}

impl Supervisor {
    pub fn new(listener: Listener, command: CommandLine, requested_cap: Option<usize>) -> Self {
        Self {
            listener,
            command,
            max_workers: worker_cap(requested_cap),
            table: WorkerTable::new(),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run one iteration: reap, poll, admit, forward.
    ///
    /// `Ok(Idle)` licenses the driver to yield; `Err` is fatal to this
    /// iteration only (the driver reports it and keeps looping).
    pub fn resume(&mut self) -> Result<Progress> {
        let reaped = self.table.reap();
        let at_capacity = self.table.len() >= self.max_workers;

        // Slot 0 is the listener; slots 1..N are workers 0..N-1.
        let mut pfds = Vec::with_capacity(self.table.len() + 1);
        pfds.push(PollFd::new(self.listener.as_fd(), PollFlags::POLLIN));
        for worker in self.table.iter() {
            pfds.push(PollFd::new(worker.pipe_fd(), PollFlags::POLLIN));
        }

        // At capacity the listener is deliberately left out of the poll set.
        let polled = if at_capacity {
            poll(&mut pfds[1..], PollTimeout::from(CAPACITY_POLL_MS))
        } else {
            poll(&mut pfds, PollTimeout::NONE)
        };
        match polled {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(Progress::Idle),
            Err(errno) => return Err(errno.into()),
        }

        let listener_ready = !at_capacity
            && pfds[0]
                .revents()
                .unwrap_or(PollFlags::empty())
                .contains(PollFlags::POLLIN);
        let worker_revents: Vec<PollFlags> = pfds[1..]
            .iter()
            .map(|pfd| pfd.revents().unwrap_or(PollFlags::empty()))
            .collect();
        drop(pfds);

        let mut progress = reaped > 0;
        if listener_ready {
            progress |= self.admit()?;
        }
        // Admission only appends, so the indexes captured at poll time still
        // name the same workers.
        for (index, revents) in worker_revents.iter().enumerate() {
            progress |= self.forward(index, *revents);
        }

        Ok(if progress {
            Progress::Advanced
        } else {
            Progress::Idle
        })
    }

    /// Accept one connection and fork a worker for it.
    ///
    /// Transient accept failures are survived but still count as progress,
    /// so the driver does not sleep through a retry burst.
    fn admit(&mut self) -> Result<bool> {
        match self.listener.accept_remote() {
            Ok((sock, remote)) => {
                spawn::add_worker(&mut self.table, &self.command, sock, &remote)?;
                Ok(true)
            }
            Err(ServeError::Sys(errno)) if !accept_error_is_fatal(errno) => {
                tracing::warn!(error = %errno, "transient accept failure");
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    /// Forward one worker's readable stderr. Per-worker failures are
    /// diagnosed and survived: the worker is expected to exit on its own
    /// and be reaped.
    fn forward(&mut self, index: usize, revents: PollFlags) -> bool {
        let Some(worker) = self.table.get_mut(index) else {
            return false;
        };
        let pid = worker.pid();
        if revents.contains(PollFlags::POLLERR) {
            tracing::warn!(pid = pid.as_raw(), "worker has a pipe error");
            return false;
        }
        if !revents.contains(PollFlags::POLLIN) {
            return false;
        }
        match worker.drain_stderr() {
            Ok(lines) => lines > 0,
            Err(err) => {
                tracing::warn!(
                    pid = pid.as_raw(),
                    error = %err,
                    "could not forward worker stderr"
                );
                false
            }
        }
    }
}

/// The admission cap: the requested ceiling bounded by the descriptor
/// budget, since every live worker charges one pipe read end.
fn worker_cap(requested: Option<usize>) -> usize {
    // sysconf returns -1 when the limit is indeterminate.
    let open_max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    let ceiling = usize::try_from(open_max)
        .unwrap_or(1024)
        .saturating_sub(FD_HEADROOM);
    requested.unwrap_or(usize::MAX).min(ceiling)
}

/// Classify an accept errno. `ECONNABORTED` (the peer gave up), `EINTR`,
/// and `EMFILE` (descriptor pressure that worker exits will relieve) are
/// transient; everything else fails the iteration.
pub(crate) const fn accept_error_is_fatal(errno: Errno) -> bool {
    !matches!(errno, Errno::ECONNABORTED | Errno::EINTR | Errno::EMFILE)
}
