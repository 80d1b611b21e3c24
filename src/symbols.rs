//! Backtrace address symbolication
//!
//! Shells out to a binutils-style `addr2line` for every address. There is no
//! caching: log volume is human paced and each frame is resolved on its own.

use crate::cancel::CancelToken;
use crate::classify::hex_literal;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Flags: pretty-print, function names, demangle, basenames only
const ADDR2LINE_FLAGS: &str = "-pfCs";

/// How often a running resolver is checked for exit, cancellation or timeout
const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("firmware binary not found: {}", .0.display())]
    MissingBinary(PathBuf),

    #[error("failed to spawn {}: {source}", tool.display())]
    Spawn {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("resolver exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("resolver produced no output")]
    EmptyOutput,

    #[error("resolution cancelled")]
    Cancelled,

    #[error("resolver did not finish within {0:?}")]
    TimedOut(Duration),
}

/// A symbolicated address as printed by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub function: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl ResolvedLocation {
    /// Parse `function at file:line` output. Anything else is kept verbatim as the function.
    pub fn parse(output: &str) -> Self {
        let output = strip_discriminator(output.trim());
        if let Some((function, location)) = output.rsplit_once(" at ") {
            if let Some((file, line)) = location.rsplit_once(':') {
                return Self {
                    function: function.trim().to_string(),
                    file: Some(file.to_string()),
                    line: line.trim().parse().ok(),
                };
            }
        }
        Self {
            function: output.to_string(),
            file: None,
            line: None,
        }
    }

    /// Whether the resolver knew the symbol (`??` marks unknown)
    pub fn is_known(&self) -> bool {
        !self.function.starts_with("??")
    }
}

impl std::fmt::Display for ResolvedLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{} at {}:{}", self.function, file, line),
            (Some(file), None) => write!(f, "{} at {}:?", self.function, file),
            _ => f.write_str(&self.function),
        }
    }
}

/// Newer binutils append `(discriminator N)` to the location
fn strip_discriminator(output: &str) -> &str {
    match output.find(" (discriminator") {
        Some(index) => output[..index].trim_end(),
        None => output,
    }
}

/// Maps a raw program-counter token to a source location
pub trait SymbolResolver {
    fn resolve(&self, address: &str, cancel: &CancelToken)
        -> Result<ResolvedLocation, ResolveError>;
}

/// `addr2line` run against the firmware ELF
#[derive(Debug, Clone)]
pub struct Addr2Line {
    tool: PathBuf,
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl Addr2Line {
    pub fn new(tool: impl Into<PathBuf>, binary: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            binary: binary.into(),
            timeout: None,
        }
    }

    /// Kill the resolver if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn wait(&self, child: &mut Child, cancel: &CancelToken) -> Result<ExitStatus, ResolveError> {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(source) => {
                    kill(child);
                    return Err(ResolveError::Spawn {
                        tool: self.tool.clone(),
                        source,
                    });
                }
            }

            if cancel.is_cancelled() {
                kill(child);
                return Err(ResolveError::Cancelled);
            }
            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    kill(child);
                    return Err(ResolveError::TimedOut(timeout));
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl SymbolResolver for Addr2Line {
    fn resolve(
        &self,
        address: &str,
        cancel: &CancelToken,
    ) -> Result<ResolvedLocation, ResolveError> {
        if !self.binary.is_file() {
            return Err(ResolveError::MissingBinary(self.binary.clone()));
        }
        let literal = hex_literal(address).unwrap_or(address);

        log::debug!("resolving {} with {}", literal, self.tool.display());
        let mut child = Command::new(&self.tool)
            .arg("-e")
            .arg(&self.binary)
            .arg(ADDR2LINE_FLAGS)
            .arg(literal)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ResolveError::Spawn {
                tool: self.tool.clone(),
                source,
            })?;

        // Drained while the child runs so a full pipe cannot stall it
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child, cancel)?;
        let stdout = collect(stdout);
        if !status.success() {
            let stderr = collect(stderr);
            return Err(ResolveError::Failed {
                status,
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Err(ResolveError::EmptyOutput);
        }
        // Inlined frames print several lines; the first is the innermost
        let first = stdout.lines().next().unwrap_or(stdout);
        Ok(ResolvedLocation::parse(first))
    }
}

fn drain<P: Read + Send + 'static>(pipe: Option<P>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            bytes
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    let bytes = reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes).to_string()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
