use std::io;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use thiserror::Error;

/// Login shell, so environment modules are initialised like they are on a cluster login node
static DEFAULT_SHELL: &str = "bash";
static DEFAULT_SHELL_ARGS: &[&str] = &["--login"];

/// Printed by the shell after each line with the line's exit status
static DONE_MARKER: &str = "__jobarray_done__";

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("command must be a single non-empty line: {0:?}")]
    InvalidCommand(String),

    #[error("can't start shell {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("lost contact with shell: {0}")]
    Io(#[from] io::Error),

    #[error("no exit status after {0:?}")]
    Timeout(Duration),

    #[error("exit code {code}")]
    Exit { code: i32, output: String },

    #[error("shell process has exited")]
    Closed,
}

/// A persistent shell process
///
/// Each call to [`ShellSession::run`] writes one line to the shell's stdin and blocks until the
/// shell reports the line's exit status, or the timeout runs out. State (working directory,
/// exported variables, loaded modules, activated environments) carries over between lines.
///
/// A session isn't meant to be shared: callers serialise access through `&mut self`. The shell
/// process is killed and reaped exactly once, on [`ShellSession::close`] or when the session is
/// dropped.
pub struct ShellSession {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    lines: Receiver<String>,
    sequence: u64,
}

impl ShellSession {
    /// Start the default login shell
    pub fn open() -> Result<ShellSession, ExecError> {
        ShellSession::spawn(DEFAULT_SHELL, DEFAULT_SHELL_ARGS)
    }

    /// Start `program` with `args` as a shell reading commands from stdin
    pub fn spawn(program: &str, args: &[&str]) -> Result<ShellSession, ExecError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ExecError::Spawn { program: program.to_string(), source })?;
        info!("Started shell session {} (pid {})", program, child.id());

        let stdout = child.stdout.take().ok_or(ExecError::Closed)?;
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf).trim_end_matches(['\n', '\r']).to_string();
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut stdin = child.stdin.take().ok_or(ExecError::Closed)?;
        // diagnostics end up in the captured output
        stdin.write_all(b"exec 2>&1\n")?;
        stdin.flush()?;

        Ok(ShellSession { child: Some(child), stdin: Some(stdin), lines: rx, sequence: 0 })
    }

    /// Open a session, hand it to `f`, and close it again whatever `f` returns
    pub fn scoped<T>(f: impl FnOnce(&mut ShellSession) -> T) -> Result<T, ExecError> {
        let mut session = ShellSession::open()?;
        let result = f(&mut session);
        session.close();
        Ok(result)
    }

    /// Run one line and return everything it printed
    ///
    /// The line goes through `eval` so a syntax error fails only this line, not the session.
    /// Stdin of the line is `/dev/null` so a command can't swallow the status marker. Output
    /// from a line that timed out earlier is discarded.
    pub fn run(&mut self, line: &str, timeout: Duration) -> Result<String, ExecError> {
        if line.trim().is_empty() || line.contains(['\n', '\r', '\0']) {
            return Err(ExecError::InvalidCommand(line.to_string()));
        }

        self.sequence += 1;
        let marker = format!("{}{} ", DONE_MARKER, self.sequence);
        let stdin = self.stdin.as_mut().ok_or(ExecError::Closed)?;
        debug!("Shell line {}: {}", self.sequence, line);
        write!(stdin, "{{ eval {}\n}} < /dev/null\necho \"{}$?\"\n", quote(line), marker)?;
        stdin.flush()?;

        let deadline = Instant::now() + timeout;
        let mut output: Vec<String> = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let received = match self.lines.recv_timeout(remaining) {
                Ok(received) => received,
                Err(RecvTimeoutError::Timeout) => return Err(ExecError::Timeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => return Err(ExecError::Closed),
            };

            // output without a trailing newline shares a line with the marker
            match received.find(DONE_MARKER) {
                None => output.push(received),
                Some(pos) => {
                    if pos > 0 {
                        output.push(received[..pos].to_string());
                    }
                    if let Some(status) = received[pos..].strip_prefix(&marker) {
                        let code = status.trim().parse::<i32>().unwrap_or(-1);
                        let output = output.join("\n");
                        return match code {
                            0 => Ok(output),
                            _ => Err(ExecError::Exit { code, output }),
                        };
                    }
                    debug!("Discarding stale status line: {}", &received[pos..]);
                }
            }
        }
    }

    /// Terminate the shell process
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            drop(self.stdin.take());
            if let Err(err) = child.kill() {
                debug!("Shell {} already gone: {}", child.id(), err);
            }
            match child.wait() {
                Ok(status) => info!("Closed shell session (pid {}, {})", child.id(), status),
                Err(err) => warn!("Can't reap shell session {}: {}", child.id(), err),
            }
        }
    }
}

/// Quote `text` as a single shell word, leaving plain words unchanged
pub fn quote(text: &str) -> String {
    let plain = !text.is_empty()
        && text.chars().all(|c| c.is_ascii_alphanumeric() || "_-./+:@%,=".contains(c));
    if plain {
        text.to_string()
    } else {
        format!("'{}'", text.replace('\'', r"'\''"))
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
