use crate::capture::decode::TextAccumulator;
use crate::capture::service::{CaptureError, StreamCapture};
use crate::models::Charset;
use std::io::{self, Read};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

/// Chunks the reader may buffer ahead of the consumer.
const READER_QUEUE_DEPTH: usize = 4;

const READER_THREAD_NAME: &str = "stagehand-reader";

enum ReadEvent {
    Chunk(Vec<u8>),
    Finished,
    Failed(io::Error),
}

impl StreamCapture {
    /// Read `stream` to its end, or until it stalls.
    ///
    /// A reader thread pulls chunks off the blocking stream and hands them
    /// over a bounded queue. Each chunk may take up to `timeout` to arrive.
    /// After `stall_limit` silent timeouts in a row the producer is assumed
    /// to be done and the text read so far is returned. A slow producer that
    /// is still alive can be cut short this way.
    ///
    /// If the stream never ends, the reader thread stays blocked on it after
    /// this returns and exits once the stream closes.
    ///
    /// # Errors
    /// [`CaptureError::Io`] if the stream fails, [`CaptureError::ReaderSpawn`]
    /// if the reader thread cannot be started.
    pub fn read_all<R>(&self, stream: R, charset: Charset, timeout: Duration) -> Result<String, CaptureError>
    where
        R: Read + Send + 'static,
    {
        let (event_tx, event_rx) = mpsc::sync_channel(READER_QUEUE_DEPTH);
        let chunk_size = self.chunk_size();

        thread::Builder::new()
            .name(READER_THREAD_NAME.to_string())
            .spawn(move || pump_reader(stream, chunk_size, event_tx))
            .map_err(CaptureError::ReaderSpawn)?;

        let mut text = TextAccumulator::new(charset);
        let stall_limit = self.settings.stall_limit.max(1);
        let mut stalls = 0u32;

        loop {
            match event_rx.recv_timeout(timeout) {
                Ok(ReadEvent::Chunk(bytes)) => {
                    stalls = 0;
                    self.metrics.record_bytes(bytes.len());
                    text.append(&bytes);
                }
                Ok(ReadEvent::Finished) => {
                    tracing::debug!("Stream reached end of input");
                    break;
                }
                Ok(ReadEvent::Failed(error)) => return Err(CaptureError::Io(error)),
                Err(RecvTimeoutError::Timeout) => {
                    stalls += 1;
                    self.metrics.record_stall();
                    tracing::debug!("No data within {:?} ({}/{})", timeout, stalls, stall_limit);
                    if stalls >= stall_limit {
                        tracing::warn!(
                            "Stream silent for {} consecutive timeouts - assuming the producer is done",
                            stalls
                        );
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!("Reader stopped without reaching end of input - ending capture");
                    break;
                }
            }
        }

        Ok(text.finish())
    }
}

fn pump_reader<R: Read>(mut stream: R, chunk_size: usize, events: SyncSender<ReadEvent>) {
    let mut buf = vec![0u8; chunk_size];
    loop {
        let event = match stream.read(&mut buf) {
            Ok(0) => ReadEvent::Finished,
            Ok(count) => ReadEvent::Chunk(buf[..count].to_vec()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => ReadEvent::Failed(e),
        };

        let last = !matches!(event, ReadEvent::Chunk(_));
        // Consumer gone: nobody wants the rest
        if events.send(event).is_err() || last {
            return;
        }
    }
}
