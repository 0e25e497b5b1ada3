//! The user-supplied command and its exec primitive.

use std::ffi::CString;

use nix::errno::Errno;
use nix::unistd::execvp;

use crate::error::{Result, ServeError};

/// The shell command run for each accepted connection.
///
/// The command string is kept as a `CString` so the exec path performs no
/// allocation or validation after `fork`.
#[derive(Debug, Clone)]
pub struct CommandLine {
    command: CString,
}

impl CommandLine {
    pub fn new(command: &str) -> Result<Self> {
        let command = CString::new(command).map_err(|_| ServeError::NulInCommand)?;
        Ok(Self { command })
    }

    /// Replace the current process image with `sh -c <command>`.
    ///
    /// Must only be called in a forked child after its stdio has been wired
    /// to the connection socket and the stderr pipe. Only returns on
    /// failure, yielding the exec errno; the caller is expected to report
    /// and abort.
    pub fn exec(&self) -> Errno {
        match execvp(c"sh", &[c"sh", c"-c", self.command.as_c_str()]) {
            Ok(infallible) => match infallible {},
            Err(errno) => errno,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_rejects_interior_nul() {
        assert!(matches!(
            CommandLine::new("echo \0 hi"),
            Err(ServeError::NulInCommand)
        ));
        assert!(CommandLine::new("echo hi").is_ok());
    }
}
