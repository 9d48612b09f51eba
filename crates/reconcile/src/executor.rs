//! Command execution boundary
//!
//! Every observation and mutation of the system goes through a
//! [`CommandExecutor`]. Commands are argument vectors handed straight to the
//! OS; nothing is interpreted by a shell.

use crate::error::{Error, Result};
use crate::types::{CommandLine, CommandResult};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;

/// Runs a command synchronously and reports its exit code and output
pub trait CommandExecutor: Send + Sync {
    /// Run `command` to completion
    ///
    /// A non-zero exit is a normal result, not an error. Errors are reserved
    /// for commands that could not be started.
    fn execute(&self, command: &CommandLine) -> Result<CommandResult>;

    /// Run a command and require success
    fn execute_checked(&self, command: &CommandLine) -> Result<CommandResult> {
        let result = self.execute(command)?;
        if !result.success() {
            return Err(Error::CommandFailed {
                command: command.display(),
                result,
            });
        }
        Ok(result)
    }
}

/// Executor backed by real processes
#[derive(Debug, Default, Clone)]
pub struct SystemExecutor;

impl SystemExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for SystemExecutor {
    fn execute(&self, command: &CommandLine) -> Result<CommandResult> {
        log::debug!("exec: {}", command.display());

        let spawn_error = |source| Error::Spawn {
            program: command.program.clone(),
            source,
        };

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        // stdin is fed from its own thread while stdout and stderr drain
        let stdin = command.stdin.as_deref().zip(child.stdin.take());
        let output = thread::scope(|scope| {
            let writer =
                stdin.map(|(input, mut pipe)| scope.spawn(move || pipe.write_all(input.as_bytes())));
            let output = child.wait_with_output();
            match writer.map(thread::ScopedJoinHandle::join) {
                // a child may exit without reading all of its input
                Some(Ok(Err(e))) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
                Some(Err(_)) => Err(io::Error::other("stdin writer panicked")),
                _ => output,
            }
        })
        .map_err(spawn_error)?;
        let result = CommandResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        log::trace!("exit {} from {}", result.exit_code, command.program);
        Ok(result)
    }
}

/// Executor that replays canned results
///
/// Each rule matches commands whose rendered form starts with a prefix and
/// answers with its queued results in order; the last queued result repeats
/// once the queue is drained. Every call is logged, so tests can assert on
/// exactly which commands ran.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<(String, VecDeque<CommandResult>)>>,
    calls: Mutex<Vec<CommandLine>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `results`, in order
    pub fn on(self, prefix: &str, results: impl IntoIterator<Item = CommandResult>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push((prefix.to_string(), results.into_iter().collect()));
        }
        self
    }

    /// Rendered form of every command executed so far
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.iter().map(CommandLine::display).collect())
            .unwrap_or_default()
    }

    /// Every command executed so far, including stdin payloads
    pub fn commands(&self) -> Vec<CommandLine> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Rendered commands whose program is `program`
    pub fn calls_to(&self, program: &str) -> Vec<String> {
        self.commands()
            .iter()
            .filter(|c| c.program == program)
            .map(CommandLine::display)
            .collect()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, command: &CommandLine) -> Result<CommandResult> {
        let rendered = command.display();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }

        let mut rules = self.rules.lock().map_err(|_| Error::Spawn {
            program: command.program.clone(),
            source: std::io::Error::other("scripted executor poisoned"),
        })?;

        // Longest matching prefix wins so specific rules can shadow general ones
        let rule = rules
            .iter_mut()
            .filter(|(prefix, _)| rendered.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());

        match rule {
            Some((_, queue)) if queue.len() > 1 => Ok(queue.pop_front().unwrap_or_else(|| {
                CommandResult::failed(127, "scripted executor: empty queue")
            })),
            Some((_, queue)) => queue.front().cloned().ok_or_else(|| Error::Spawn {
                program: command.program.clone(),
                source: std::io::Error::other("scripted executor: no results queued"),
            }),
            None => Err(Error::Spawn {
                program: command.program.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no scripted result for: {rendered}"),
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_replays_queue_then_repeats_last() {
        let exec = ScriptedExecutor::new().on(
            "lsuser",
            [CommandResult::failed(2, "missing"), CommandResult::ok("alice:\n")],
        );
        let cmd = CommandLine::new("lsuser").arg("alice");

        assert_eq!(exec.execute(&cmd).unwrap().exit_code, 2);
        assert!(exec.execute(&cmd).unwrap().success());
        assert!(exec.execute(&cmd).unwrap().success());
        assert_eq!(exec.calls().len(), 3);
    }

    #[test]
    fn test_scripted_prefers_longest_prefix() {
        let exec = ScriptedExecutor::new()
            .on("lsgroup", [CommandResult::ok("generic")])
            .on("lsgroup -c", [CommandResult::ok("colon")]);

        let colon = CommandLine::new("lsgroup").args(["-c", "staff"]);
        let stanza = CommandLine::new("lsgroup").args(["-f", "staff"]);
        assert_eq!(exec.execute(&colon).unwrap().stdout, "colon");
        assert_eq!(exec.execute(&stanza).unwrap().stdout, "generic");
    }

    #[test]
    fn test_scripted_unknown_command_is_spawn_error() {
        let exec = ScriptedExecutor::new();
        let err = exec.execute(&CommandLine::new("mkuser")).unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[test]
    fn test_execute_checked_rejects_nonzero_exit() {
        let exec = ScriptedExecutor::new().on("rmdev", [CommandResult::failed(1, "busy")]);
        let err = exec
            .execute_checked(&CommandLine::new("rmdev").args(["-l", "hdisk3"]))
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
        assert_eq!(exec.calls_to("rmdev"), vec!["rmdev -l hdisk3"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_system_executor_feeds_stdin() {
        let result = SystemExecutor::new()
            .execute(&CommandLine::new("cat").stdin("alice:secret\n"))
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "alice:secret\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_executor_large_stdin_and_stdout() {
        let input = "0123456789abcdef\n".repeat(64 * 1024);
        let result = SystemExecutor::new()
            .execute(&CommandLine::new("cat").stdin(input.clone()))
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.len(), input.len());
    }
}
