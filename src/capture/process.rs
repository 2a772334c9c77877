use crate::capture::channel::{Channel, ChannelStreams, StreamBuffer};
use crate::capture::service::CaptureError;
use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Instant;

const PIPE_BUFFER_SIZE: usize = 8 * 1024;

const PIPE_THREAD_NAME: &str = "stagehand-pipe";

/// Build a command that runs `script` through the platform shell.
pub fn shell_command(script: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(["/C", script]);
        command
    } else {
        let mut command = Command::new("sh");
        command.args(["-c", script]);
        command
    }
}

/// A local child process seen as a [`Channel`].
///
/// One pump thread per pipe moves bytes into a [`StreamBuffer`] as they
/// arrive, so `available()` never blocks. The channel reports closed only
/// once the process has exited and both pipes have hit end of file; output
/// written just before exit is therefore never lost to the closure race.
pub struct ProcessChannel {
    child: Child,
    description: String,
    output: StreamBuffer,
    error: StreamBuffer,
    exit_status: Option<i32>,
    started: Instant,
}

impl ProcessChannel {
    /// Spawn `command` with piped stdout/stderr and a null stdin.
    pub fn spawn(command: &mut Command) -> Result<Self, CaptureError> {
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

        let output = StreamBuffer::new();
        let error = StreamBuffer::new();
        let pumps = start_pump(child.stdout.take(), output.clone())
            .and_then(|()| start_pump(child.stderr.take(), error.clone()));
        if let Err(e) = pumps {
            // Without a pump the channel could never close
            stop_child(&mut child, &description);
            return Err(CaptureError::ReaderSpawn(e));
        }

        Ok(Self {
            child,
            description,
            output,
            error,
            exit_status: None,
            started: Instant::now(),
        })
    }

    /// Spawn `script` through the platform shell.
    pub fn shell(script: &str) -> Result<Self, CaptureError> {
        Self::spawn(&mut shell_command(script))
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Kill the process. Its pipes close once it is gone.
    pub fn kill(&mut self) -> io::Result<()> {
        tracing::info!("Killing {}", self.description);
        self.child.kill()
    }

    fn poll_exit(&mut self) {
        if self.exit_status.is_some() {
            return;
        }

        match self.child.try_wait() {
            Ok(Some(status)) => {
                let code = status.code().unwrap_or(-1);
                tracing::info!(
                    "{} exited in {:.2}s with exit code {}",
                    self.description,
                    self.started.elapsed().as_secs_f32(),
                    code
                );
                self.exit_status = Some(code);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Failed to query status of {}: {}", self.description, e);
                self.exit_status = Some(-1);
            }
        }
    }
}

impl Channel for ProcessChannel {
    fn is_open(&mut self) -> bool {
        self.poll_exit();
        self.exit_status.is_none() || !(self.output.is_closed() && self.error.is_closed())
    }

    fn exit_status(&mut self) -> Option<i32> {
        self.poll_exit();
        self.exit_status
    }

    fn streams(&mut self) -> ChannelStreams<'_> {
        ChannelStreams {
            output: &mut self.output,
            error: Some(&mut self.error),
        }
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        if self.exit_status.is_none() {
            tracing::info!("{} is still running as its channel is dropped", self.description);
            stop_child(&mut self.child, &self.description);
        }
    }
}

/// Kill `child` unless it has already exited, then reap it.
pub(crate) fn stop_child(child: &mut Child, description: &str) {
    match child.try_wait() {
        Ok(Some(_)) => return,
        Ok(None) => {}
        Err(e) => tracing::warn!("Failed to query status of {}: {}", description, e),
    }

    if let Err(e) = child.kill() {
        tracing::warn!("Failed to kill {}: {}", description, e);
    }
    match child.wait() {
        Ok(status) => tracing::info!("Stopped {} ({})", description, status),
        Err(e) => tracing::warn!("Failed to reap {}: {}", description, e),
    }
}

fn start_pump<R>(pipe: Option<R>, buffer: StreamBuffer) -> io::Result<()>
where
    R: Read + Send + 'static,
{
    let Some(pipe) = pipe else {
        buffer.close();
        return Ok(());
    };

    thread::Builder::new()
        .name(PIPE_THREAD_NAME.to_string())
        .spawn(move || pump_pipe(pipe, buffer))
        .map(|_| ())
}

fn pump_pipe<R: Read>(mut pipe: R, buffer: StreamBuffer) {
    let mut chunk = [0u8; PIPE_BUFFER_SIZE];
    loop {
        match pipe.read(&mut chunk) {
            Ok(0) => {
                buffer.close();
                return;
            }
            Ok(count) => buffer.push(&chunk[..count]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                buffer.fail(e);
                return;
            }
        }
    }
}
