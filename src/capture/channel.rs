use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A byte stream that can say how much it holds without blocking.
///
/// `read_chunk` returns `Ok(None)` once the stream has ended, and `Ok(Some(0))`
/// when it is merely empty for now.
pub trait ByteStream {
    /// Bytes that can be read right now without blocking.
    fn available(&mut self) -> io::Result<usize>;

    /// Read up to `buf.len()` bytes.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

/// Both streams of a channel, borrowed together.
pub struct ChannelStreams<'a> {
    pub output: &'a mut dyn ByteStream,
    pub error: Option<&'a mut dyn ByteStream>,
}

/// A live producer: a local process, a remote exec session, a test script.
pub trait Channel {
    /// Whether the producer may still yield data.
    fn is_open(&mut self) -> bool;

    /// The producer's final status. Only meaningful once `is_open` is false.
    fn exit_status(&mut self) -> Option<i32>;

    fn streams(&mut self) -> ChannelStreams<'_>;
}

/// A complete, in-memory stream: everything is available, then it ends.
impl ByteStream for &[u8] {
    fn available(&mut self) -> io::Result<usize> {
        Ok(self.len())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        if self.is_empty() {
            return Ok(None);
        }
        let count = buf.len().min(self.len());
        let (head, tail) = self.split_at(count);
        buf[..count].copy_from_slice(head);
        *self = tail;
        Ok(Some(count))
    }
}

#[derive(Debug, Default)]
struct BufferState {
    bytes: VecDeque<u8>,
    closed: bool,
    error: Option<io::Error>,
}

/// A shared byte buffer fed by a producer and read as a [`ByteStream`].
///
/// Clones share the same buffer: one clone goes to whatever produces bytes
/// (a pipe pump thread, a test script), another is read by the drain loop.
#[derive(Debug, Clone, Default)]
pub struct StreamBuffer {
    state: Arc<Mutex<BufferState>>,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append bytes; ignored once the buffer is closed.
    pub fn push(&self, data: &[u8]) {
        let mut state = self.lock();
        if !state.closed {
            state.bytes.extend(data);
        }
    }

    /// Mark the end of the stream. Buffered bytes stay readable.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    /// End the stream with an error, reported once by the next read.
    pub fn fail(&self, error: io::Error) {
        let mut state = self.lock();
        state.error = Some(error);
        state.closed = true;
    }

    /// Whether the producer has finished (buffered bytes may remain).
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ByteStream for StreamBuffer {
    fn available(&mut self) -> io::Result<usize> {
        let mut state = self.lock();
        if let Some(error) = state.error.take() {
            return Err(error);
        }
        Ok(state.bytes.len())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let mut state = self.lock();
        if let Some(error) = state.error.take() {
            return Err(error);
        }
        if state.bytes.is_empty() {
            return Ok(if state.closed { None } else { Some(0) });
        }

        let count = buf.len().min(state.bytes.len());
        for (slot, byte) in buf.iter_mut().zip(state.bytes.drain(..count)) {
            *slot = byte;
        }
        Ok(Some(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_stream_reads_then_ends() {
        let mut stream: &[u8] = b"abcdef";
        let mut buf = [0u8; 4];

        assert_eq!(stream.available().unwrap(), 6);
        assert_eq!(stream.read_chunk(&mut buf).unwrap(), Some(4));
        assert_eq!(&buf, b"abcd");
        assert_eq!(stream.read_chunk(&mut buf).unwrap(), Some(2));
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(stream.read_chunk(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_stream_buffer_distinguishes_empty_from_ended() {
        let producer = StreamBuffer::new();
        let mut reader = producer.clone();
        let mut buf = [0u8; 8];

        assert_eq!(reader.read_chunk(&mut buf).unwrap(), Some(0));

        producer.push(b"hi");
        producer.close();
        producer.push(b"ignored");

        assert!(reader.is_closed());
        assert_eq!(reader.available().unwrap(), 2);
        assert_eq!(reader.read_chunk(&mut buf).unwrap(), Some(2));
        assert_eq!(&buf[..2], b"hi");
        assert_eq!(reader.read_chunk(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_stream_buffer_reports_error_once() {
        let producer = StreamBuffer::new();
        let mut reader = producer.clone();

        producer.fail(io::Error::new(io::ErrorKind::BrokenPipe, "pipe gone"));

        let error = reader.available().unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(reader.available().unwrap(), 0);
        assert_eq!(reader.read_chunk(&mut [0u8; 4]).unwrap(), None);
    }
}
