//! The supervisor: a single-threaded, readiness-driven multiplexer that
//! accepts connections, forks one worker per connection, and relays each
//! worker's stderr line by line.
//!
//! # Architecture
//!
//! ```text
//!                ┌──────────────────┐
//!                │    Supervisor    │ accept / fork / poll / reap
//!                └────────┬─────────┘
//!                         │ one fork per accepted connection
//!          ┌──────────────┼──────────────┐
//!    ┌─────▼─────┐  ┌─────▼─────┐  ┌─────▼─────┐
//!    │ Worker 1  │  │ Worker 2  │  │ Worker N  │
//!    │ sh -c cmd │  │ sh -c cmd │  │ sh -c cmd │
//!    └───────────┘  └───────────┘  └───────────┘
//!     stdin/stdout = connection socket (kernel proxies, not us)
//!     stderr       = pipe back to the supervisor, line-framed
//! ```
//!
//! The supervisor never blocks on worker I/O beyond a bounded poll timeout,
//! holds no locks, and owns every descriptor it opens: the set of open fds
//! is always {std streams} ∪ {listener} ∪ {one pipe read end per worker}.

pub mod driver;
pub mod event_loop;
mod spawn;
mod table;
pub mod worker;

pub use event_loop::Supervisor;
