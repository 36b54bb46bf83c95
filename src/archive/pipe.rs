//! Bounded byte pipes between blocking tar code and async runtime streams
//!
//! The tar codec is synchronous and runs on a blocking worker; bollard moves
//! archives as async byte streams. A bounded channel sits in between so the
//! faster side waits for the slower one and no archive is held in full.

use bytes::Bytes;
use std::io::{self, Read, Write};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Bytes accumulated before a chunk is handed to the channel
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks in flight before the producer blocks
pub const PIPE_CAPACITY: usize = 8;

/// Blocking writer feeding an async stream of chunks
///
/// Must be used from a blocking context (`spawn_blocking`); call `flush` once
/// done to hand over the final partial chunk.
pub struct ChunkWriter {
    tx: mpsc::Sender<Bytes>,
    buf: Vec<u8>,
}

impl ChunkWriter {
    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK_SIZE)));
        self.tx
            .blocking_send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive consumer went away"))
    }
}

impl Write for ChunkWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

/// Writer half for a blocking producer and the stream its chunks arrive on
pub fn chunk_writer(capacity: usize) -> (ChunkWriter, ReceiverStream<Bytes>) {
    let (tx, rx) = mpsc::channel(capacity);
    let writer = ChunkWriter {
        tx,
        buf: Vec::with_capacity(CHUNK_SIZE),
    };
    (writer, ReceiverStream::new(rx))
}

/// Blocking reader draining chunks pushed from async code
///
/// A closed channel reads as end of stream; an `Err` chunk surfaces as a read error.
pub struct ChunkReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    current: Bytes,
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.current.is_empty() {
            match self.rx.blocking_recv() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => return Err(e),
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current.split_to(n));
        Ok(n)
    }
}

/// Sender for async code and the blocking reader it feeds
pub fn chunk_reader(capacity: usize) -> (mpsc::Sender<io::Result<Bytes>>, ChunkReader) {
    let (tx, rx) = mpsc::channel(capacity);
    let reader = ChunkReader {
        rx,
        current: Bytes::new(),
    };
    (tx, reader)
}
