//! The `adb` bridge tool and the parsers for its output.
//!
//! [`AdbBridge`] builds the command lines; the submodules turn the text that
//! comes back into records:
//!
//! - [`devices`]: `adb devices -l`
//! - [`listing`]: `ls -l -a` run through `adb shell`
//! - [`space`]: `df` run through `adb shell`
//!
//! Process spawning sits behind [`CommandRunner`] so everything above this
//! module can run against [`ScriptedRunner`] instead of a real device.

pub mod devices;
pub mod listing;
pub mod permissions;
pub mod runner;
pub mod space;

pub use devices::{parse_devices, Device};
pub use listing::{parse_line, parse_listing, RemoteEntry};
pub use runner::{BridgeError, CommandOutput, CommandRunner, ProcessRunner, ScriptedRunner};
pub use space::{parse_free_space, parse_size};

use crate::location::shell_quote;

/// Default bridge executable, looked up on `PATH`.
pub const DEFAULT_ADB_PROGRAM: &str = "adb";

/// Command lines for the bridge tool, run through a [`CommandRunner`].
#[derive(Debug, Clone)]
pub struct AdbBridge<R = ProcessRunner> {
    program: String,
    runner: R,
}

impl Default for AdbBridge<ProcessRunner> {
    fn default() -> Self {
        Self::new(DEFAULT_ADB_PROGRAM, ProcessRunner)
    }
}

impl<R: CommandRunner> AdbBridge<R> {
    pub fn new(program: impl Into<String>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    /// Path or name of the bridge executable.
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// `adb devices -l`
    pub fn devices(&self) -> Result<CommandOutput, BridgeError> {
        self.run(&["devices", "-l"])
    }

    /// `adb -s <device> shell <command>`
    ///
    /// `command` is handed to the device's shell as a single argument, so
    /// any paths inside it must already be quoted.
    pub fn shell(&self, device: &str, command: &str) -> Result<CommandOutput, BridgeError> {
        self.run(&["-s", device, "shell", command])
    }

    /// `ls -l -a <path>` on `device`.
    pub fn list_directory(&self, device: &str, path: &str) -> Result<CommandOutput, BridgeError> {
        self.shell(device, &listing_command(path))
    }

    /// `df <path>` on `device`.
    pub fn disk_free(&self, device: &str, path: &str) -> Result<CommandOutput, BridgeError> {
        self.shell(device, &df_command(path))
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput, BridgeError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let output = self.runner.run(&self.program, &args)?;
        tracing::debug!(
            program = %self.program,
            ?args,
            status = ?output.status,
            bytes = output.text.len(),
            "bridge command finished"
        );
        Ok(output)
    }
}

/// Remote command that lists `path`.
pub fn listing_command(path: &str) -> String {
    format!("ls -l -a {}", shell_quote(path))
}

/// Remote command that reports free space for `path`.
pub fn df_command(path: &str) -> String {
    format!("df {}", shell_quote(path))
}
