// MIT License - Copyright (c) 2021 TJForc
// Line-oriented TCP transport shared by the client session and the simulator

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info};

use crate::error::{Result, TpiError};

/// Line terminator sent by the client.
pub const CLIENT_TERMINATOR: &str = "\n";

/// Line terminator sent by the simulator.
pub const SERVER_TERMINATOR: &str = "\r\n";

/// Open a TCP connection to the module, bounded by `connect_timeout_ms`.
pub async fn connect(host: &str, port: u16, connect_timeout_ms: u64) -> Result<TcpStream> {
    info!("Connecting to Envisalink at {}:{}", host, port);

    let stream = timeout(
        Duration::from_millis(connect_timeout_ms),
        TcpStream::connect((host, port)),
    )
    .await
    .map_err(|_| TpiError::ConnectionTimeout)?
    .map_err(|e| {
        error!("TCP connect failed: {}", e);
        TpiError::Io(e)
    })?;

    stream.set_nodelay(true)?;
    debug!("TCP socket connected");
    Ok(stream)
}

/// Split a stream into a line reader and a shareable line writer.
pub fn split(stream: TcpStream, terminator: &'static str) -> (LineReader, LineWriter) {
    let (reader, writer) = stream.into_split();
    (LineReader::new(reader), LineWriter::new(writer, terminator))
}

/// Reads `\n`-terminated lines, tolerating `\r\n`, across partial reads.
pub struct LineReader {
    reader: OwnedReadHalf,
    buf: Vec<u8>,
    leftover: Vec<u8>,
    ready: std::collections::VecDeque<String>,
}

impl LineReader {
    pub fn new(reader: OwnedReadHalf) -> Self {
        Self {
            reader,
            buf: vec![0u8; 4096],
            leftover: Vec::new(),
            ready: Default::default(),
        }
    }

    /// Next non-empty line, or `None` once the peer has closed the connection.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }

            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                debug!("Reader: connection closed");
                return Ok(None);
            }

            let mut data = std::mem::take(&mut self.leftover);
            data.extend_from_slice(&self.buf[..n]);
            self.ready.extend(split_lines(&data, &mut self.leftover));
        }
    }
}

/// Split a buffer into complete lines. An unterminated tail is saved in `leftover`.
pub fn split_lines(data: &[u8], leftover: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    let mut start = 0;

    for (i, b) in data.iter().enumerate() {
        if *b == b'\n' {
            let line = String::from_utf8_lossy(&data[start..i]);
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                lines.push(line.to_string());
            }
            start = i + 1;
        }
    }

    if start < data.len() {
        leftover.extend_from_slice(&data[start..]);
    }

    lines
}

/// Cloneable writer. Each call holds the lock for all of its lines so
/// frames from concurrent tasks never interleave.
#[derive(Clone)]
pub struct LineWriter {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    terminator: &'static str,
}

impl LineWriter {
    pub fn new(writer: OwnedWriteHalf, terminator: &'static str) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            terminator,
        }
    }

    pub async fn send_line(&self, line: &str) -> Result<()> {
        self.send_lines(std::slice::from_ref(&line)).await
    }

    pub async fn send_lines<S: AsRef<str>>(&self, lines: &[S]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        for line in lines {
            let line = line.as_ref();
            debug!("TX > {}", line);
            writer
                .write_all(format!("{line}{}", self.terminator).as_bytes())
                .await?;
        }
        writer.flush().await?;
        Ok(())
    }

    /// Close the write side; the peer sees end of stream.
    pub async fn shutdown(&self) -> Result<()> {
        self.writer.lock().await.shutdown().await?;
        Ok(())
    }
}
