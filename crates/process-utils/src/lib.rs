//! Child-process plumbing shared by the prober and the encoder engine.
//!
//! - [`tokio_command`] / [`std_command`] build commands that never pop a
//!   console window on Windows.
//! - [`ToolOutputReader`] splits child output on `\r` as well as `\n`, which
//!   is how ffmpeg rewrites its status line.
//! - [`spawn_process_waiter`] reports a child's exit code through a oneshot
//!   channel and kills the child when a cancellation token fires.

use std::ffi::OsStr;

#[cfg(feature = "tokio")]
mod record_reader;
#[cfg(feature = "tokio")]
mod waiter;

#[cfg(feature = "tokio")]
pub use record_reader::ToolOutputReader;
#[cfg(feature = "tokio")]
pub use waiter::{ExitOutcome, spawn_process_waiter};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `std::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
pub fn std_command(program: impl AsRef<OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.no_window();
    cmd
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` for an external media tool.
///
/// `LC_ALL=C` keeps the tool's diagnostic text in the untranslated form the
/// line parsers expect.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.env("LC_ALL", "C");
    cmd.no_window();
    cmd
}

/// Query `<program> -version` and return the first line of its output.
pub fn detect_version(program: impl AsRef<OsStr>) -> Option<String> {
    std_command(program)
        .arg("-version")
        .output()
        .ok()
        .and_then(|output| {
            String::from_utf8(output.stdout)
                .ok()
                .and_then(|s| s.lines().next().map(|l| l.to_string()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_version_of_missing_binary_is_none() {
        assert!(detect_version("definitely-not-a-real-binary-5b1c").is_none());
    }

    #[cfg(feature = "tokio")]
    #[test]
    fn tokio_command_forces_c_locale() {
        let cmd = tokio_command("ffmpeg");
        let locale = cmd
            .as_std()
            .get_envs()
            .find(|(key, _)| *key == "LC_ALL")
            .and_then(|(_, value)| value);
        assert_eq!(locale, Some(OsStr::new("C")));
    }
}
