//! Running the bridge tool as a child process.
//!
//! Every invocation blocks until the child exits. `Command::output` waits on
//! and reaps the child before returning, on success and on error alike, so
//! no process handle outlives the call that spawned it.

use std::io::ErrorKind;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use thiserror::Error;

/// Errors raised while starting the bridge tool.
///
/// A tool that starts and then fails is not an error at this level; its
/// exit status is reported in [`CommandOutput`].
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The bridge executable could not be found.
    #[error("bridge tool not found: {0}")]
    NotFound(String),

    /// The bridge executable exists but could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Output of one finished bridge invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the child was killed by a signal.
    pub status: Option<i32>,
    /// Standard output followed by standard error, lossily decoded.
    pub text: String,
}

impl CommandOutput {
    /// Output of a child that exited with status 0.
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            text: text.into(),
        }
    }

    /// Output of a child that exited with a non-zero status.
    pub fn failure(status: i32, text: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            text: text.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == Some(0)
    }

    /// First non-blank output line, used as an error summary.
    pub fn summary(&self) -> String {
        self.text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| match self.status {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            })
    }
}

/// Something that can run a program to completion.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, BridgeError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, BridgeError> {
        tracing::trace!(program, ?args, "spawning bridge tool");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => BridgeError::NotFound(program.to_string()),
                _ => BridgeError::Spawn {
                    program: program.to_string(),
                    source: e,
                },
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            status: output.status.code(),
            text,
        })
    }
}

/// A runner that answers from a script instead of spawning processes.
///
/// Each rule pairs an exact argument list with the output to return.
/// Unmatched invocations exit with status 1 and no output. Every invocation
/// is recorded so callers can assert on what would have been run.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<(Vec<String>, CommandOutput)>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `args` with `output`.
    pub fn on(mut self, args: &[&str], output: CommandOutput) -> Self {
        let args = args.iter().map(|a| a.to_string()).collect();
        self.rules.push((args, output));
        self
    }

    /// Argument lists seen so far, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, _program: &str, args: &[String]) -> Result<CommandOutput, BridgeError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(args.to_vec());

        let output = self
            .rules
            .iter()
            .find(|(expected, _)| expected.as_slice() == args)
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::failure(1, ""));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_uses_first_non_blank_line() {
        let output = CommandOutput::failure(1, "\n  ls: /nope: No such file or directory\nmore\n");
        assert_eq!(output.summary(), "ls: /nope: No such file or directory");
    }

    #[test]
    fn test_summary_falls_back_to_status() {
        assert_eq!(CommandOutput::failure(255, "").summary(), "exit status 255");
        let killed = CommandOutput {
            status: None,
            text: String::new(),
        };
        assert_eq!(killed.summary(), "terminated by signal");
    }

    #[test]
    fn test_scripted_runner_matches_exact_args() {
        let runner = ScriptedRunner::new().on(&["devices", "-l"], CommandOutput::success("x"));

        let hit = runner
            .run("adb", &["devices".to_string(), "-l".to_string()])
            .unwrap();
        assert!(hit.succeeded());
        assert_eq!(hit.text, "x");

        let miss = runner.run("adb", &["devices".to_string()]).unwrap();
        assert!(!miss.succeeded());
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn test_process_runner_missing_program() {
        let result = ProcessRunner.run("/nonexistent/adbfs-test-adb", &[]);
        assert!(matches!(result, Err(BridgeError::NotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_merges_streams() {
        let args = vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()];
        let output = ProcessRunner.run("sh", &args).unwrap();
        assert_eq!(output.status, Some(3));
        assert_eq!(output.text, "out\nerr\n");
    }
}
