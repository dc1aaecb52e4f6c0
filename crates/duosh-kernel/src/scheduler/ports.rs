//! Per-command descriptor tables.
//!
//! Every running form sees a [`Ports`] table indexed by fd. A port pairs a
//! byte stream with a value stream, and the two are independent: nothing
//! orders a byte write relative to a value write on the same port.
//!
//! ```text
//!   fd 0  InPort  { bytes: AsyncRead,  values: mpsc::Receiver<Value> }
//!   fd 1  OutPort { bytes: AsyncWrite, values: mpsc::Sender<Value> | discard }
//!   fd 2  OutPort { ... }
//! ```
//!
//! Ends are reference counted. A pipe reaches EOF when the last clone of
//! its writing end is dropped, so the table must not be kept alive longer
//! than the command that owns it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};

use crate::ast::RedirMode;
use crate::interpreter::{ErrorCause, EvalResult, Value};

use super::byte_pipe::byte_pipe;

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Default capacity of a value channel.
pub const VALUE_BUFFER_SIZE: usize = 32;

#[derive(Clone)]
pub enum ValueSink {
    Channel(mpsc::Sender<Value>),
    /// Values written to a file redirection vanish.
    Discard,
}

/// The writing side of a port.
#[derive(Clone)]
pub struct OutPort {
    bytes: Arc<Mutex<BoxedWriter>>,
    values: ValueSink,
}

impl OutPort {
    pub fn new(bytes: BoxedWriter, values: ValueSink) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(bytes)),
            values,
        }
    }

    /// Accepts and drops everything.
    pub fn null() -> Self {
        Self::new(Box::new(tokio::io::sink()), ValueSink::Discard)
    }

    pub async fn write_bytes(&self, data: &[u8]) -> EvalResult {
        let mut w = self.bytes.lock().await;
        w.write_all(data).await.map_err(ErrorCause::from)?;
        w.flush().await.map_err(ErrorCause::from)?;
        Ok(())
    }

    pub async fn write_str(&self, s: &str) -> EvalResult {
        self.write_bytes(s.as_bytes()).await
    }

    pub async fn put(&self, value: Value) -> EvalResult {
        match &self.values {
            ValueSink::Channel(tx) => tx.send(value).await.map_err(|_| ErrorCause::ReaderGone.into()),
            ValueSink::Discard => Ok(()),
        }
    }

    /// Shared handle on the byte writer, for pumping a child process.
    pub fn byte_writer(&self) -> Arc<Mutex<BoxedWriter>> {
        self.bytes.clone()
    }
}

/// Byte side of an [`InPort`]. `partial` holds the start of a line whose
/// read was interrupted, so a cancelled `read_line` loses nothing.
struct ByteSource {
    reader: BufReader<BoxedReader>,
    partial: Vec<u8>,
}

/// The reading side of a port.
///
/// Reads are cancel-safe: dropping a pending `read_line` or `recv` leaves
/// every unconsumed byte and value with the port for the next reader.
#[derive(Clone)]
pub struct InPort {
    bytes: Arc<Mutex<ByteSource>>,
    values: Option<Arc<Mutex<mpsc::Receiver<Value>>>>,
}

impl InPort {
    pub fn new(bytes: BoxedReader, values: Option<mpsc::Receiver<Value>>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(ByteSource {
                reader: BufReader::new(bytes),
                partial: Vec::new(),
            })),
            values: values.map(|rx| Arc::new(Mutex::new(rx))),
        }
    }

    /// Immediately at EOF on both streams.
    pub fn empty() -> Self {
        Self::new(Box::new(tokio::io::empty()), None)
    }

    /// Input with fixed contents: `bytes` on the byte side, `values` queued
    /// on the value side.
    pub fn preloaded(bytes: Vec<u8>, values: Vec<Value>) -> Self {
        let (tx, rx) = mpsc::channel(values.len().max(1));
        for v in values {
            // Capacity covers every value, so this never fails.
            let _ = tx.try_send(v);
        }
        Self::new(Box::new(std::io::Cursor::new(bytes)), Some(rx))
    }

    /// Next value, or `None` once every writer is gone.
    pub async fn recv(&self) -> Option<Value> {
        let rx = self.values.as_ref()?;
        rx.lock().await.recv().await
    }

    /// Next line without its terminator, or `None` at EOF.
    pub async fn read_line(&self) -> EvalResult<Option<String>> {
        let mut guard = self.bytes.lock().await;
        let ByteSource { reader, partial } = &mut *guard;
        // Only `fill_buf` awaits, and it consumes nothing; bytes move into
        // `partial` synchronously.
        let mut terminated = false;
        loop {
            let buf = reader.fill_buf().await.map_err(ErrorCause::from)?;
            if buf.is_empty() {
                if partial.is_empty() {
                    return Ok(None);
                }
                break;
            }
            match buf.iter().position(|b| *b == b'\n') {
                Some(i) => {
                    partial.extend_from_slice(&buf[..i]);
                    reader.consume(i + 1);
                    terminated = true;
                    break;
                }
                None => {
                    let n = buf.len();
                    partial.extend_from_slice(buf);
                    reader.consume(n);
                }
            }
        }
        let mut line = String::from_utf8_lossy(&std::mem::take(partial)).into_owned();
        if terminated && line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    pub async fn read_to_end(&self) -> EvalResult<Vec<u8>> {
        let mut guard = self.bytes.lock().await;
        let ByteSource { reader, partial } = &mut *guard;
        reader.read_to_end(partial).await.map_err(ErrorCause::from)?;
        Ok(std::mem::take(partial))
    }

    /// Read up to `buf.len()` bytes; 0 means EOF.
    pub async fn read_some(&self, buf: &mut [u8]) -> EvalResult<usize> {
        let mut guard = self.bytes.lock().await;
        let ByteSource { reader, partial } = &mut *guard;
        if !partial.is_empty() {
            let n = partial.len().min(buf.len());
            buf[..n].copy_from_slice(&partial[..n]);
            partial.drain(..n);
            return Ok(n);
        }
        Ok(reader.read(buf).await.map_err(ErrorCause::from)?)
    }
}

/// Read both sub-streams of `input` to the end, concurrently so neither
/// writer blocks on a full buffer. A read error ends the byte side early.
pub async fn drain(input: InPort) -> (Vec<u8>, Vec<Value>) {
    let values = async {
        let mut out = Vec::new();
        while let Some(v) = input.recv().await {
            out.push(v);
        }
        out
    };
    let bytes = async { input.read_to_end().await.unwrap_or_default() };
    let (bytes, values) = tokio::join!(bytes, values);
    (bytes, values)
}

/// One descriptor slot. Most slots use one side only; `<>` redirections
/// fill both.
#[derive(Clone, Default)]
pub struct Port {
    pub input: Option<InPort>,
    pub output: Option<OutPort>,
}

impl Port {
    pub fn input(port: InPort) -> Self {
        Self {
            input: Some(port),
            output: None,
        }
    }

    pub fn output(port: OutPort) -> Self {
        Self {
            input: None,
            output: Some(port),
        }
    }
}

/// A command's private descriptor table. Closed fds have no entry.
#[derive(Clone, Default)]
pub struct Ports {
    table: BTreeMap<u32, Port>,
}

impl Ports {
    /// Standard table: fd 0 reads `stdin`, fds 1 and 2 write.
    pub fn standard(stdin: InPort, stdout: OutPort, stderr: OutPort) -> Self {
        Self {
            table: BTreeMap::from([
                (0, Port::input(stdin)),
                (1, Port::output(stdout)),
                (2, Port::output(stderr)),
            ]),
        }
    }

    pub fn get(&self, fd: u32) -> Option<&Port> {
        self.table.get(&fd)
    }

    /// Install `port` at `fd`, or close it with `None`.
    pub fn set(&mut self, fd: u32, port: Option<Port>) {
        match port {
            Some(port) => self.table.insert(fd, port),
            None => self.table.remove(&fd),
        };
    }

    pub fn input(&self, fd: u32) -> Option<&InPort> {
        self.get(fd).and_then(|p| p.input.as_ref())
    }

    pub fn output(&self, fd: u32) -> Option<&OutPort> {
        self.get(fd).and_then(|p| p.output.as_ref())
    }

    /// `dst>&src`
    pub fn dup(&mut self, src: u32, dst: u32) -> Result<(), ErrorCause> {
        let port = self
            .get(src)
            .cloned()
            .ok_or_else(|| ErrorCause::Io(format!("fd {src} is not open")))?;
        self.set(dst, Some(port));
        Ok(())
    }

    /// Output port at `fd`, or an error naming the closed descriptor.
    pub fn expect_output(&self, fd: u32) -> Result<&OutPort, ErrorCause> {
        self.output(fd)
            .ok_or_else(|| ErrorCause::Io(format!("fd {fd} is not open for writing")))
    }
}

impl fmt::Debug for Ports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open: Vec<String> = self
            .table
            .iter()
            .map(|(fd, p)| {
                let dir = match (p.input.is_some(), p.output.is_some()) {
                    (true, true) => "rw",
                    (true, false) => "r",
                    (false, true) => "w",
                    (false, false) => "-",
                };
                format!("{fd}:{dir}")
            })
            .collect();
        f.debug_tuple("Ports").field(&open).finish()
    }
}

/// A connected channel pair: the write end for one command and the read
/// end for the next.
pub fn port_pair(pipe_capacity: usize, value_capacity: usize) -> (OutPort, InPort) {
    let (bw, br) = byte_pipe(pipe_capacity);
    let (tx, rx) = mpsc::channel(value_capacity.max(1));
    (
        OutPort::new(Box::new(bw), ValueSink::Channel(tx)),
        InPort::new(Box::new(br), Some(rx)),
    )
}

/// Open a file for a redirection.
pub async fn open_redirect(path: &Path, mode: RedirMode) -> Result<Port, ErrorCause> {
    let io_err = |e: std::io::Error| ErrorCause::Io(format!("{}: {e}", path.display()));
    let mut opts = OpenOptions::new();
    match mode {
        RedirMode::Read => {
            let file = opts.read(true).open(path).await.map_err(io_err)?;
            Ok(Port::input(InPort::new(Box::new(file), None)))
        }
        RedirMode::Write => {
            let file = opts
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .await
                .map_err(io_err)?;
            Ok(Port::output(OutPort::new(Box::new(file), ValueSink::Discard)))
        }
        RedirMode::Append => {
            let file = opts
                .append(true)
                .create(true)
                .open(path)
                .await
                .map_err(io_err)?;
            Ok(Port::output(OutPort::new(Box::new(file), ValueSink::Discard)))
        }
        RedirMode::ReadWrite => {
            let file = opts
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .await
                .map_err(io_err)?;
            let writer = file.try_clone().await.map_err(io_err)?;
            Ok(Port {
                input: Some(InPort::new(Box::new(file), None)),
                output: Some(OutPort::new(Box::new(writer), ValueSink::Discard)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn interrupted_line_read_keeps_its_bytes() {
        let (out, input) = port_pair(64, 4);
        out.write_str("ab").await.unwrap();

        let pending = tokio::time::timeout(Duration::from_millis(20), input.read_line()).await;
        assert!(pending.is_err(), "no newline yet");

        out.write_str("c\nrest").await.unwrap();
        drop(out);
        assert_eq!(input.read_line().await.unwrap().as_deref(), Some("abc"));
        assert_eq!(input.read_to_end().await.unwrap(), b"rest");
    }

    #[test]
    fn high_descriptors_are_sparse() {
        let mut ports = Ports::default();
        ports.set(3_000_000_000, Some(Port::output(OutPort::null())));
        assert!(ports.output(3_000_000_000).is_some());
        ports.set(3_000_000_000, None);
        assert!(ports.get(3_000_000_000).is_none());
    }

    #[tokio::test]
    async fn pair_carries_both_streams_independently() {
        let (out, input) = port_pair(64, 4);
        out.put("v1".into()).await.unwrap();
        out.write_str("line\n").await.unwrap();
        out.put("v2".into()).await.unwrap();
        drop(out);

        assert_eq!(input.read_line().await.unwrap(), Some("line".to_string()));
        assert_eq!(input.read_line().await.unwrap(), None);
        assert_eq!(input.recv().await, Some(Value::from("v1")));
        assert_eq!(input.recv().await, Some(Value::from("v2")));
        assert_eq!(input.recv().await, None);
    }

    #[tokio::test]
    async fn writing_after_reader_drop_is_reader_gone() {
        let (out, input) = port_pair(64, 4);
        drop(input);
        let err = out.put("x".into()).await.unwrap_err();
        assert!(err.is_reader_gone());
        let err = out.write_str("x").await.unwrap_err();
        assert!(err.is_reader_gone());
    }

    #[tokio::test]
    async fn dup_and_close() {
        let mut ports = Ports::standard(InPort::empty(), OutPort::null(), OutPort::null());
        ports.set(1, None);
        assert!(ports.expect_output(1).is_err());
        ports.dup(2, 1).unwrap();
        assert!(ports.output(1).is_some());
        assert!(ports.dup(7, 1).is_err());
    }

    #[tokio::test]
    async fn preloaded_input() {
        let input = InPort::preloaded(b"a\r\nb".to_vec(), vec!["v".into()]);
        assert_eq!(input.read_line().await.unwrap().as_deref(), Some("a"));
        assert_eq!(input.read_line().await.unwrap().as_deref(), Some("b"));
        assert_eq!(input.recv().await, Some(Value::from("v")));
    }

    #[tokio::test]
    async fn file_redirections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let port = open_redirect(&path, RedirMode::Write).await.unwrap();
        let out = port.output.unwrap();
        out.write_str("first\n").await.unwrap();
        out.put("dropped".into()).await.unwrap();
        drop(out);

        let port = open_redirect(&path, RedirMode::Append).await.unwrap();
        port.output.unwrap().write_str("second\n").await.unwrap();

        let port = open_redirect(&path, RedirMode::Read).await.unwrap();
        let text = port.input.unwrap().read_to_end().await.unwrap();
        assert_eq!(text, b"first\nsecond\n");

        let missing = open_redirect(&dir.path().join("nope"), RedirMode::Read).await;
        assert!(matches!(missing, Err(ErrorCause::Io(_))));
    }
}
