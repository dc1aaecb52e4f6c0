//! Bounded byte pipe: the byte half of a pipeline channel pair.
//!
//! ```text
//!   ByteWriter ─┐
//!   ByteWriter ─┼─▶ [VecDeque<u8>, bounded] ──▶ ByteReader
//!   ByteWriter ─┘
//!       ├── writers park when the buffer is full
//!       ├── the reader parks when it is empty
//!       ├── last writer dropped → EOF
//!       └── reader dropped → BrokenPipe for every writer
//! ```
//!
//! Writers are cloneable because one pipeline position may be a function
//! whose body runs several commands against the same output. EOF is only
//! signalled once every clone is gone.
//!
//! All state, including the closed flags and both wakers, lives under one
//! `std::sync::Mutex`. Critical sections are a few deque operations, and
//! `Drop` can always take the lock without an executor.

use std::collections::VecDeque;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Default capacity, the same as a Linux pipe.
pub const PIPE_BUFFER_SIZE: usize = 64 * 1024;

struct State {
    buffer: VecDeque<u8>,
    capacity: usize,
    writers: usize,
    reader_alive: bool,
    reader_waker: Option<Waker>,
    /// Every parked writer; all are woken when space frees up.
    writer_wakers: Vec<Waker>,
}

struct Shared {
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct ByteWriter {
    shared: Arc<Shared>,
    /// Set once `poll_shutdown` has released this handle's writer slot.
    released: bool,
}

pub struct ByteReader {
    shared: Arc<Shared>,
}

/// Create a pipe holding at most `capacity` unread bytes.
pub fn byte_pipe(capacity: usize) -> (ByteWriter, ByteReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buffer: VecDeque::with_capacity(capacity.min(8192)),
            capacity: capacity.max(1),
            writers: 1,
            reader_alive: true,
            reader_waker: None,
            writer_wakers: Vec::new(),
        }),
    });
    (
        ByteWriter {
            shared: shared.clone(),
            released: false,
        },
        ByteReader { shared },
    )
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
}

impl ByteWriter {
    /// Write as much of `data` as fits, parking while the buffer is full.
    pub async fn write_bytes(&self, data: &[u8]) -> io::Result<usize> {
        poll_fn(|cx| self.poll_write_some(cx, data)).await
    }

    /// Write all of `data`.
    pub async fn write_all_bytes(&self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let n = self.write_bytes(data).await?;
            data = &data[n..];
        }
        Ok(())
    }

    /// True once the reading end has been dropped.
    pub fn is_reader_gone(&self) -> bool {
        !self.shared.lock().reader_alive
    }

    fn poll_write_some(&self, cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let mut state = self.shared.lock();
        if !state.reader_alive {
            return Poll::Ready(Err(broken_pipe()));
        }
        let room = state.capacity.saturating_sub(state.buffer.len());
        if room == 0 {
            if !state.writer_wakers.iter().any(|w| w.will_wake(cx.waker())) {
                state.writer_wakers.push(cx.waker().clone());
            }
            return Poll::Pending;
        }
        let n = room.min(data.len());
        state.buffer.extend(&data[..n]);
        if let Some(w) = state.reader_waker.take() {
            w.wake();
        }
        Poll::Ready(Ok(n))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut state = self.shared.lock();
        state.writers = state.writers.saturating_sub(1);
        if state.writers == 0 {
            if let Some(w) = state.reader_waker.take() {
                w.wake();
            }
        }
    }
}

impl Clone for ByteWriter {
    fn clone(&self) -> Self {
        self.shared.lock().writers += 1;
        Self {
            shared: self.shared.clone(),
            released: false,
        }
    }
}

impl Drop for ByteWriter {
    fn drop(&mut self) {
        self.release();
    }
}

impl AsyncWrite for ByteWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.poll_write_some(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.release();
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for ByteReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = self.shared.lock();
        if state.buffer.is_empty() {
            if state.writers == 0 {
                return Poll::Ready(Ok(()));
            }
            state.reader_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let n = buf.remaining().min(state.buffer.len());
        let (front, back) = state.buffer.as_slices();
        let from_front = n.min(front.len());
        buf.put_slice(&front[..from_front]);
        buf.put_slice(&back[..n - from_front]);
        state.buffer.drain(..n);

        for w in state.writer_wakers.drain(..) {
            w.wake();
        }
        Poll::Ready(Ok(()))
    }
}

impl Drop for ByteReader {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.reader_alive = false;
        state.buffer.clear();
        for w in state.writer_wakers.drain(..) {
            w.wake();
        }
    }
}

impl std::fmt::Debug for ByteWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteWriter").finish()
    }
}

impl std::fmt::Debug for ByteReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteReader").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn eof_waits_for_every_writer_clone() {
        let (writer, mut reader) = byte_pipe(64);
        let second = writer.clone();

        writer.write_all_bytes(b"one ").await.unwrap();
        drop(writer);
        second.write_all_bytes(b"two").await.unwrap();

        let read = tokio::spawn(async move {
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.unwrap();
            out
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!read.is_finished(), "EOF before the last writer was dropped");

        drop(second);
        assert_eq!(read.await.unwrap(), b"one two");
    }

    #[tokio::test]
    async fn small_buffer_applies_backpressure_without_loss() {
        let (writer, mut reader) = byte_pipe(7);
        let data: Vec<u8> = (0..5_000u32).map(|i| (i % 251) as u8).collect();
        let expected = data.clone();

        let write = tokio::spawn(async move { writer.write_all_bytes(&data).await });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        write.await.unwrap().unwrap();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn concurrent_writers_all_get_through() {
        let (writer, mut reader) = byte_pipe(16);
        let tasks: Vec<_> = (0..4u8)
            .map(|id| {
                let w = writer.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        w.write_all_bytes(&[id]).await.unwrap();
                    }
                })
            })
            .collect();
        drop(writer);

        let mut out = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(5), reader.read_to_end(&mut out));
        read.await.expect("writers deadlocked").unwrap();
        for t in tasks {
            t.await.unwrap();
        }
        for id in 0..4u8 {
            assert_eq!(out.iter().filter(|b| **b == id).count(), 100);
        }
    }

    #[tokio::test]
    async fn dropped_reader_unblocks_parked_writer() {
        let (writer, reader) = byte_pipe(4);
        let write = tokio::spawn(async move { writer.write_all_bytes(&[0u8; 64]).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(reader);

        let result = tokio::time::timeout(Duration::from_secs(2), write)
            .await
            .expect("writer stayed parked after reader drop")
            .unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn shutdown_counts_as_dropping_the_handle() {
        let (mut writer, mut reader) = byte_pipe(64);
        writer.write_all(b"bye").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"bye");
        assert!(!writer.is_reader_gone());
        drop(reader);
        assert!(writer.is_reader_gone());
    }
}
