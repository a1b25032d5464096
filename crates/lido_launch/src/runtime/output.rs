//! Child output capture
//!
//! Reader tasks own the child's pipes and send raw chunks over a channel; the
//! supervisor owns the [`OutputBuffer`] the chunks are appended to.

use std::borrow::Cow;
use std::io::Write;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Per-stream capacity before the oldest bytes are discarded
pub const MAX_BUFFER_BYTES: usize = 4 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Raw bytes read from one of the child's pipes
#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub data: Vec<u8>,
}

/// Append-only stdout/stderr accumulator
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    limit: usize,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_BUFFER_BYTES)
    }
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            limit: limit.max(1),
        }
    }

    pub fn append(&mut self, chunk: &OutputChunk) {
        let buf = match chunk.stream {
            OutputStream::Stdout => &mut self.stdout,
            OutputStream::Stderr => &mut self.stderr,
        };
        buf.extend_from_slice(&chunk.data);
        if buf.len() > self.limit {
            let mut excess = buf.len() - self.limit;
            // Never keep the tail of a split UTF-8 sequence
            while excess < buf.len() && is_continuation(buf[excess]) {
                excess += 1;
            }
            buf.drain(..excess);
        }
    }

    pub fn stdout(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// The last `lines` non-empty lines of a stream
    pub fn tail(&self, stream: OutputStream, lines: usize) -> String {
        let text = match stream {
            OutputStream::Stdout => self.stdout(),
            OutputStream::Stderr => self.stderr(),
        };
        let mut tail: Vec<&str> = text
            .lines()
            .rev()
            .filter(|line| !line.trim().is_empty())
            .take(lines)
            .collect();
        tail.reverse();
        tail.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }

    pub fn clear(&mut self) {
        self.stdout.clear();
        self.stderr.clear();
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}

/// Take the child's pipes and stream their contents as chunks.
///
/// The receiver yields `None` once both pipes reach EOF.
pub fn spawn_readers(child: &mut Child) -> mpsc::UnboundedReceiver<OutputChunk> {
    let (tx, rx) = mpsc::unbounded_channel();

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(read_stream(stdout, OutputStream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(read_stream(stderr, OutputStream::Stderr, tx));
    }

    rx
}

async fn read_stream<R>(mut reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<OutputChunk>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = OutputChunk {
                    stream,
                    data: buf[..n].to_vec(),
                };
                if tx.send(chunk).is_err() {
                    break;
                }
            }
            Err(e) => {
                log::debug!("Output reader stopped: {}", e);
                break;
            }
        }
    }
}

/// Echo a chunk: raw to the console when verbose, otherwise to the debug log
pub fn mirror(name: &str, chunk: &OutputChunk, verbose: bool) {
    if verbose {
        let result = match chunk.stream {
            OutputStream::Stdout => echo(&mut std::io::stdout().lock(), chunk),
            OutputStream::Stderr => echo(&mut std::io::stderr().lock(), chunk),
        };
        if let Err(e) = result {
            log::debug!("[{}] Failed to mirror output: {}", name, e);
        }
        return;
    }

    if log::log_enabled!(log::Level::Debug) {
        for line in String::from_utf8_lossy(&chunk.data).lines() {
            if !line.trim().is_empty() {
                log::debug!("[{}] {}", name, line);
            }
        }
    }
}

/// Write a chunk verbatim, partial lines included
fn echo<W: Write>(out: &mut W, chunk: &OutputChunk) -> std::io::Result<()> {
    out.write_all(&chunk.data)?;
    out.flush()
}

/// Keep draining a ready service's pipes so the child never blocks on a
/// full pipe.
pub fn spawn_forwarder(
    name: String,
    mut rx: mpsc::UnboundedReceiver<OutputChunk>,
    verbose: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            mirror(&name, &chunk, verbose);
        }
        log::debug!("[{}] Output closed", name);
    })
}
