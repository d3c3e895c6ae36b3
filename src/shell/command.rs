use std::time::Duration;

use log::{debug, warn};

use crate::shell::session::{ExecError, ShellSession};

/// How long a single command may run before it's reported as failed
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Anything that can be sent to a shell as one line: a [`ShellCommand`] or a [`CommandChain`]
pub trait Execute {
    /// Commands in execution order
    fn commands(&self) -> &[ShellCommand];

    /// Commands joined with `; ` into the line written to the shell
    fn line(&self) -> String {
        self.commands()
            .iter()
            .map(|cmd| cmd.text.as_str())
            .collect::<Vec<&str>>()
            .join("; ")
    }

    /// Members run one after another, so their timeouts add up
    fn timeout(&self) -> Duration {
        self.commands().iter().map(|cmd| cmd.timeout).sum()
    }

    /// A new chain with these commands followed by `other`'s commands
    fn chain(&self, other: &dyn Execute) -> CommandChain {
        let mut commands = self.commands().to_vec();
        commands.extend_from_slice(other.commands());
        CommandChain { commands }
    }

    /// Run against `session`, or a throwaway session if none is given
    ///
    /// Returns true only if the whole line exited 0 within the timeout. Because commands in a
    /// chain are joined with `;`, an early command can fail without failing the line. Failures
    /// are logged, never returned.
    fn execute(&self, session: Option<&mut ShellSession>) -> bool {
        let line = self.line();
        let timeout = self.timeout();
        let result = match session {
            Some(session) => session.run(&line, timeout),
            None => ShellSession::scoped(|session| session.run(&line, timeout)).and_then(|r| r),
        };

        match result {
            Ok(_) => {
                debug!("Command succeeded: {}", line);
                true
            }
            Err(ExecError::Exit { code, output }) => {
                warn!("Command `{}` exited with code {}", line, code);
                if !output.is_empty() {
                    warn!("Output of `{}`:\n{}", line, output);
                }
                false
            }
            Err(err) => {
                warn!("Command `{}` failed: {}", line, err);
                false
            }
        }
    }
}

/// A single line shell command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellCommand {
    text: String,
    timeout: Duration,
}

impl ShellCommand {
    pub fn new(text: impl Into<String>) -> ShellCommand {
        ShellCommand { text: text.into(), timeout: DEFAULT_TIMEOUT }
    }

    pub fn with_timeout(self, timeout: Duration) -> ShellCommand {
        ShellCommand { timeout, ..self }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Execute for ShellCommand {
    fn commands(&self) -> &[ShellCommand] {
        std::slice::from_ref(self)
    }
}

/// An ordered sequence of commands executed as one line
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandChain {
    commands: Vec<ShellCommand>,
}

impl Execute for CommandChain {
    fn commands(&self) -> &[ShellCommand] {
        &self.commands
    }
}

impl FromIterator<ShellCommand> for CommandChain {
    fn from_iter<I: IntoIterator<Item = ShellCommand>>(iter: I) -> Self {
        CommandChain { commands: iter.into_iter().collect() }
    }
}
