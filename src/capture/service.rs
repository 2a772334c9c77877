use crate::capture::channel::{ByteStream, Channel};
use crate::capture::decode::TextAccumulator;
use crate::capture::process::{ProcessChannel, stop_child};
use crate::metrics::Metrics;
use crate::models::{CaptureMode, CaptureSettings, CapturedOutput, ChannelCapture, Charset};
use std::io;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that can occur while capturing
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("stream I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to start reader thread: {0}")]
    ReaderSpawn(#[source] io::Error),
}

/// Consecutive-poll bookkeeping for one drain.
#[derive(Debug, Default)]
struct DrainState {
    idle_polls: u32,
}

impl DrainState {
    fn record_data(&mut self) {
        self.idle_polls = 0;
    }

    fn record_idle(&mut self) -> u32 {
        self.idle_polls += 1;
        self.idle_polls
    }
}

/// Drains channels and streams into text.
///
/// Two strategies, picked per call or through [`CaptureMode`] in
/// [`capture_command`](Self::capture_command):
///
/// - **Polling** ([`drain`](Self::drain)): keeps polling until the channel
///   closes. Never truncates a slow but live producer.
/// - **Timeout** ([`read_all`](Self::read_all)): bounded waits per chunk;
///   gives up after `stall_limit` silent periods.
///
/// The service is stateless between calls apart from shared metrics.
pub struct StreamCapture {
    pub(crate) settings: CaptureSettings,
    pub(crate) metrics: Arc<Metrics>,
}

impl StreamCapture {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Record into shared metrics instead of a private instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.settings.chunk_size.max(1)
    }

    /// Drain both streams of `channel` until it closes.
    ///
    /// Data is always drained before closure is checked. Once the channel
    /// reports closed, one more pass picks up anything that arrived in
    /// between; bytes arriving after that pass are not guaranteed to be
    /// captured. While the channel is open but silent, the loop sleeps
    /// `poll_interval` between polls. Waking the draining thread early
    /// (`Thread::unpark`) is logged and polling simply resumes.
    ///
    /// A non-zero exit status is logged, not returned as an error.
    ///
    /// # Errors
    /// [`CaptureError::Io`] if either stream fails.
    pub fn drain<C>(&self, channel: &mut C, charset: Charset) -> Result<ChannelCapture, CaptureError>
    where
        C: Channel + ?Sized,
    {
        let mut output = TextAccumulator::new(charset);
        let mut error = TextAccumulator::new(charset);
        let mut chunk = vec![0u8; self.chunk_size()];
        let mut state = DrainState::default();
        let poll_interval = self.settings.poll_interval();

        let closed = loop {
            if self.pump_channel(channel, &mut chunk, &mut output, &mut error)? > 0 {
                state.record_data();
                continue;
            }

            if !channel.is_open() {
                // Data may have landed between the last pump and the closure check
                if self.pump_channel(channel, &mut chunk, &mut output, &mut error)? > 0 {
                    state.record_data();
                    continue;
                }
                break true;
            }

            let idle_polls = state.record_idle();
            self.metrics.record_stall();
            if let Some(limit) = self.settings.max_idle_polls {
                if idle_polls >= limit {
                    tracing::warn!(
                        "Channel still open after {} idle polls - stopped draining, output may be incomplete",
                        idle_polls
                    );
                    break false;
                }
            }

            wait_backoff(poll_interval);
        };

        let exit_status = if closed {
            channel
                .exit_status()
                .unwrap_or(ChannelCapture::UNKNOWN_EXIT_STATUS)
        } else {
            ChannelCapture::UNKNOWN_EXIT_STATUS
        };

        let captured = CapturedOutput {
            output: output.finish(),
            error: error.finish(),
        };
        Ok(self.complete(captured, exit_status, closed))
    }

    /// Spawn `command` and capture it using the configured [`CaptureMode`].
    ///
    /// Extra environment variables from the settings are applied first.
    pub fn capture_command(
        &self,
        command: &mut Command,
        charset: Charset,
    ) -> Result<ChannelCapture, CaptureError> {
        for (key, value) in &self.settings.environment {
            command.env(key, value);
        }

        match self.settings.mode {
            CaptureMode::Polling => {
                let mut channel = ProcessChannel::spawn(command)?;
                self.drain(&mut channel, charset)
            }
            CaptureMode::Timeout => self.capture_with_timeouts(command, charset),
        }
    }

    fn capture_with_timeouts(
        &self,
        command: &mut Command,
        charset: Charset,
    ) -> Result<ChannelCapture, CaptureError> {
        let description = format!("{:?}", command);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| CaptureError::Spawn {
            command: description.clone(),
            source,
        })?;
        tracing::info!("Spawned {} (pid {})", description, child.id());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let timeout = self.settings.read_timeout();

        let (output, error) = thread::scope(|scope| {
            let error_reader = scope.spawn(|| match stderr {
                Some(stream) => self.read_all(stream, charset, timeout),
                None => Ok(String::new()),
            });
            let output = match stdout {
                Some(stream) => self.read_all(stream, charset, timeout),
                None => Ok(String::new()),
            };
            let error = error_reader.join().unwrap_or_else(|_| {
                Err(CaptureError::Io(io::Error::other("stderr reader panicked")))
            });
            (output, error)
        });
        let captured = match (output, error) {
            (Ok(output), Ok(error)) => CapturedOutput { output, error },
            (Err(e), _) | (_, Err(e)) => {
                stop_child(&mut child, &description);
                return Err(e);
            }
        };

        // Output going quiet does not mean the process is gone; give it one
        // read timeout to exit before giving up on it.
        let deadline = Instant::now() + timeout;
        let exited = loop {
            match child.try_wait()? {
                Some(status) => {
                    break status.code();
                }
                None if Instant::now() >= deadline => {
                    tracing::warn!(
                        "{} is still running after its output went quiet - killing it",
                        description
                    );
                    stop_child(&mut child, &description);
                    break None;
                }
                None => thread::sleep(Duration::from_millis(10)),
            }
        };

        let exit_status = exited.unwrap_or(ChannelCapture::UNKNOWN_EXIT_STATUS);
        Ok(self.complete(captured, exit_status, exited.is_some()))
    }

    fn complete(&self, captured: CapturedOutput, exit_status: i32, closed: bool) -> ChannelCapture {
        if closed && exit_status != 0 {
            self.metrics.record_non_zero_exit();
            tracing::warn!("The channel finished with a non-zero exit status: {}", exit_status);
        }
        self.metrics.record_capture_completed();

        tracing::debug!(
            "Capture complete - {} output chars, {} error chars, exit status {}",
            captured.output.len(),
            captured.error.len(),
            exit_status
        );

        ChannelCapture {
            captured,
            exit_status,
        }
    }

    fn pump_channel<C>(
        &self,
        channel: &mut C,
        chunk: &mut [u8],
        output: &mut TextAccumulator,
        error: &mut TextAccumulator,
    ) -> Result<usize, CaptureError>
    where
        C: Channel + ?Sized,
    {
        let streams = channel.streams();
        let mut received = self.pump_stream(streams.output, chunk, output)?;
        if let Some(error_stream) = streams.error {
            received += self.pump_stream(error_stream, chunk, error)?;
        }
        Ok(received)
    }

    fn pump_stream(
        &self,
        stream: &mut dyn ByteStream,
        chunk: &mut [u8],
        sink: &mut TextAccumulator,
    ) -> io::Result<usize> {
        let mut received = 0;
        while stream.available()? > 0 {
            match stream.read_chunk(chunk)? {
                Some(0) | None => break,
                Some(count) => {
                    sink.append(&chunk[..count]);
                    received += count;
                }
            }
        }

        if received > 0 {
            self.metrics.record_bytes(received);
            tracing::trace!("Drained {} bytes", received);
        }
        Ok(received)
    }
}

/// Sleep between polls; an early wake-up is logged and otherwise ignored.
fn wait_backoff(interval: Duration) {
    let started = Instant::now();
    thread::park_timeout(interval);
    let waited = started.elapsed();
    if waited < interval {
        tracing::warn!(
            "The delay before the next poll was interrupted after {:?} - continuing capture",
            waited
        );
    }
}
