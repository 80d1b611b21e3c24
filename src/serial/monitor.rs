//! Live device log monitor
//!
//! Owns the serial connection lifecycle:
//! - Searching: locate the device once; no match ends the run
//! - Connecting: open the port, falling back to Backoff on failure
//! - Streaming: read, classify, symbolicate and render line by line
//! - Backoff: drop the handle, pause briefly, reconnect
//!
//! Every state checks the cancel token, and reads are bounded by the port
//! timeout, so an operator interrupt is honoured within one read timeout.

use crate::cancel::CancelToken;
use crate::classify::{classify, decode_line, ClassifiedLine, DecodeError};
use crate::config::{DecodePolicy, MonitorConfig};
use crate::render::Renderer;
use crate::serial::port::{
    find_device, LineReader, PortConfig, ReadEvent, SerialBackend, SerialError,
};
use crate::symbols::{ResolveError, ResolvedLocation, SymbolResolver};
use colored::Colorize;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("no serial device matching '{device_id}' found")]
    DeviceNotFound { device_id: String },

    #[error("undecodable line from device ({source}): {line}")]
    Decode {
        #[source]
        source: DecodeError,
        line: String,
    },

    #[error(transparent)]
    Enumerate(SerialError),

    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

/// Counters reported when the monitor stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Lines rendered, blank ones included
    pub lines: usize,
    /// Backtrace addresses symbolicated
    pub resolved: usize,
    /// Backtrace addresses the resolver failed on
    pub unresolved: usize,
    /// Lines dropped by the skip decode policy
    pub skipped: usize,
    /// Times an established stream was lost
    pub disconnects: usize,
}

impl MonitorStats {
    /// Print summary statistics
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(70).dimmed());
        println!("{}", "--- Monitor Summary ---".cyan().bold());
        println!("Total lines: {}", self.lines);
        println!(
            "Backtrace frames: {} resolved, {}",
            self.resolved.to_string().green(),
            if self.unresolved > 0 {
                format!("{} unresolved", self.unresolved).red().to_string()
            } else {
                "0 unresolved".to_string()
            }
        );
        if self.skipped > 0 {
            println!("Skipped lines: {}", self.skipped.to_string().yellow());
        }
        println!("Disconnects: {}", self.disconnects);
        println!("{}", "=".repeat(70).dimmed());
    }
}

enum State<C> {
    Connecting,
    Streaming(LineReader<C>),
    Backoff,
}

/// Serial log monitor with backtrace symbolication
pub struct SerialMonitor<B, R, W> {
    config: MonitorConfig,
    backend: B,
    resolver: R,
    renderer: Renderer,
    sink: W,
    cancel: CancelToken,
    stats: MonitorStats,
}

impl<B, R, W> SerialMonitor<B, R, W>
where
    B: SerialBackend,
    R: SymbolResolver,
    W: Write,
{
    /// Create a new serial monitor with the given configuration
    pub fn new(config: MonitorConfig, backend: B, resolver: R, sink: W, cancel: CancelToken) -> Self {
        let renderer = Renderer::new(config.palette.clone()).with_timestamps(config.timestamps);
        Self {
            config,
            backend,
            resolver,
            renderer,
            sink,
            cancel,
            stats: MonitorStats::default(),
        }
    }

    /// Run until cancelled. Only a missing device, enumeration failure,
    /// strict decode failure or a broken output sink end the run early.
    pub fn run(&mut self) -> Result<MonitorStats, MonitorError> {
        if self.cancel.is_cancelled() {
            return Ok(self.stats.clone());
        }

        let device = find_device(&self.backend, &self.config.device_id)
            .map_err(MonitorError::Enumerate)?
            .ok_or_else(|| MonitorError::DeviceNotFound {
                device_id: self.config.device_id.clone(),
            })?;

        self.status(&format!(
            "{} Opening port {} ({})",
            "[*]".cyan().bold(),
            device.path.white().bold(),
            device.descriptor()
        ))?;

        let port_config = PortConfig::new(&device.path)
            .with_baud_rate(self.config.baud_rate)
            .with_timeout(self.config.read_timeout);

        let mut state = State::Connecting;
        while !self.cancel.is_cancelled() {
            state = match state {
                State::Connecting => match self.backend.open(&port_config) {
                    Ok(connection) => {
                        log::info!(
                            "connected to {} at {} baud",
                            port_config.port_path,
                            port_config.baud_rate
                        );
                        State::Streaming(LineReader::new(connection))
                    }
                    Err(e) => {
                        log::debug!("{}", e);
                        State::Backoff
                    }
                },

                State::Streaming(mut reader) => match reader.read_line() {
                    Ok(ReadEvent::Line(raw)) => {
                        self.process_line(&raw)?;
                        State::Streaming(reader)
                    }
                    Ok(ReadEvent::Idle) => State::Streaming(reader),
                    Ok(ReadEvent::Closed) => {
                        self.lost_connection(&reader, "device closed the stream");
                        State::Backoff
                    }
                    Err(e) => {
                        self.lost_connection(&reader, &e.to_string());
                        State::Backoff
                    }
                },

                State::Backoff => {
                    self.pause(self.config.backoff);
                    State::Connecting
                }
            };
        }

        log::info!("monitor cancelled");
        Ok(self.stats.clone())
    }

    /// Decode, classify, optionally symbolicate, and render one raw line
    fn process_line(&mut self, raw: &[u8]) -> Result<(), MonitorError> {
        let text = match decode_line(raw) {
            Ok(text) => text,
            Err(source) => {
                let line = String::from_utf8_lossy(raw).trim().to_string();
                match self.config.decode_policy {
                    DecodePolicy::Strict => return Err(MonitorError::Decode { source, line }),
                    DecodePolicy::Skip => {
                        log::warn!("skipping undecodable line ({}): {}", source, line);
                        self.stats.skipped += 1;
                        return Ok(());
                    }
                }
            }
        };
        let classified = classify(text);
        let location = match classified {
            ClassifiedLine::Backtrace { address, .. } => self.resolve(address),
            _ => None,
        };

        self.stats.lines += 1;
        let rendered = self.renderer.render(&classified, location.as_ref());
        self.status(&rendered)
    }

    fn resolve(&mut self, address: &str) -> Option<ResolvedLocation> {
        match self.resolver.resolve(address, &self.cancel) {
            Ok(location) => {
                if location.is_known() {
                    self.stats.resolved += 1;
                } else {
                    log::debug!("no symbol for {} in the firmware ELF", address);
                    self.stats.unresolved += 1;
                }
                Some(location)
            }
            Err(ResolveError::Cancelled) => None,
            Err(e @ ResolveError::MissingBinary(_)) => {
                log::debug!("cannot resolve {}: {}", address, e);
                self.stats.unresolved += 1;
                None
            }
            Err(e) => {
                log::warn!("cannot resolve {}: {}", address, e);
                self.stats.unresolved += 1;
                None
            }
        }
    }

    fn lost_connection<C: io::Read>(&mut self, reader: &LineReader<C>, reason: &str) {
        self.stats.disconnects += 1;
        if !reader.pending().is_empty() {
            log::debug!("dropping {} bytes of an incomplete line", reader.pending().len());
        }
        log::warn!("connection lost ({}), waiting for device", reason);
    }

    /// Sleep for `duration`, waking early on cancellation
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let slice = self.config.read_timeout;
        while !self.cancel.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(slice.min(deadline - now));
        }
    }

    fn status(&mut self, line: &str) -> Result<(), MonitorError> {
        writeln!(self.sink, "{}", line)
            .and_then(|_| self.sink.flush())
            .map_err(MonitorError::Output)
    }
}

#[cfg(test)]
impl<B, R, W> SerialMonitor<B, R, W> {
    fn sink(&self) -> &W {
        &self.sink
    }
}
