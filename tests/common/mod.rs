//! Shared test doubles for the integration tests

#![allow(dead_code)]

use stagehand::capture::{Channel, ChannelStreams, StreamBuffer};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;

/// One scripted event, released when the drain loop finds no data and asks
/// whether the channel is still open.
#[derive(Debug, Clone)]
enum Release {
    Output(Vec<u8>),
    Error(Vec<u8>),
    Idle,
}

/// A channel that replays a fixed script, then closes with an exit status.
///
/// Every `is_open` call releases the next scripted event and reports open;
/// once the script is exhausted the channel reports closed.
pub struct ScriptedChannel {
    output: StreamBuffer,
    error: StreamBuffer,
    script: VecDeque<Release>,
    exit_status: Option<i32>,
    open_checks: Arc<AtomicUsize>,
}

impl ScriptedChannel {
    pub fn new(exit_status: i32) -> Self {
        Self {
            output: StreamBuffer::new(),
            error: StreamBuffer::new(),
            script: VecDeque::new(),
            exit_status: Some(exit_status),
            open_checks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn output(mut self, bytes: &[u8]) -> Self {
        self.script.push_back(Release::Output(bytes.to_vec()));
        self
    }

    pub fn error(mut self, bytes: &[u8]) -> Self {
        self.script.push_back(Release::Error(bytes.to_vec()));
        self
    }

    /// One poll in which nothing arrives.
    pub fn idle(mut self) -> Self {
        self.script.push_back(Release::Idle);
        self
    }

    /// Never report an exit status.
    pub fn without_exit_status(mut self) -> Self {
        self.exit_status = None;
        self
    }

    /// Producer side of the output stream, for pushing bytes from another thread.
    pub fn output_feed(&self) -> StreamBuffer {
        self.output.clone()
    }

    pub fn open_checks(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.open_checks)
    }
}

impl Channel for ScriptedChannel {
    fn is_open(&mut self) -> bool {
        self.open_checks.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(Release::Output(bytes)) => self.output.push(&bytes),
            Some(Release::Error(bytes)) => self.error.push(&bytes),
            Some(Release::Idle) => {}
            None => return false,
        }
        true
    }

    fn exit_status(&mut self) -> Option<i32> {
        self.exit_status
    }

    fn streams(&mut self) -> ChannelStreams<'_> {
        ChannelStreams {
            output: &mut self.output,
            error: Some(&mut self.error),
        }
    }
}

/// A blocking reader fed chunk by chunk through a channel.
///
/// `read` blocks until the next chunk arrives and reports end of input once
/// every sender is dropped.
pub struct ChannelReader {
    chunks: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

impl ChannelReader {
    pub fn new(chunks: Receiver<Vec<u8>>) -> Self {
        Self {
            chunks,
            pending: VecDeque::new(),
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.chunks.recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(_) => return Ok(0),
            }
        }

        let count = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}
