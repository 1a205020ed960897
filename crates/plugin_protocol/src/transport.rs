//! Framed byte transport between a plugin and its host.
//!
//! Every frame is a 4-byte big-endian length followed by the body. The same
//! framing runs over TCP, Unix domain sockets and in-memory duplex pipes, and
//! the runtime only ever sees the object-safe [`FrameSource`] / [`FrameSink`]
//! halves.

use crate::codec::MAX_FRAME_SIZE;
use crate::error::ProtocolError;
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tracing::debug;

/// Inbound half of a framed connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Receive the next frame body.
    /// Returns None once the peer has closed the stream.
    async fn recv_frame(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Outbound half of a framed connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame body.
    async fn send_frame(&mut self, body: &[u8]) -> io::Result<()>;

    /// Terminate the write side gracefully.
    async fn close(&mut self) -> io::Result<()>;
}

/// Reads length-prefixed frames from any async reader.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin + Send> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads one frame. A clean end of stream before a length prefix yields `None`.
    pub async fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut len_bytes = [0u8; 4];
        match self.inner.read_exact(&mut len_bytes).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }

        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Frame too large: {} bytes", len),
            ));
        }

        let mut body = vec![0u8; len];
        self.inner.read_exact(&mut body).await?;
        Ok(Some(body))
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FrameSource for FrameReader<R> {
    async fn recv_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.read_frame().await
    }
}

/// Writes length-prefixed frames to any async writer.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_frame(&mut self, body: &[u8]) -> io::Result<()> {
        if body.len() > MAX_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Frame too large: {} bytes", body.len()),
            ));
        }
        let len = body.len() as u32;
        self.inner.write_all(&len.to_be_bytes()).await?;
        self.inner.write_all(body).await?;
        self.inner.flush().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FrameSink for FrameWriter<W> {
    async fn send_frame(&mut self, body: &[u8]) -> io::Result<()> {
        self.write_frame(body).await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.shutdown().await
    }
}

/// Where the host listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportAddress {
    /// `host:port`, resolved at connect time.
    Tcp(String),
    /// Filesystem path of a Unix domain socket.
    Unix(PathBuf),
}

impl TransportAddress {
    /// Parses `tcp://host:port`, `host:port`, `unix:/path`, `unix:///path` or `/path`.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let raw = raw.trim();
        let invalid = || ProtocolError::InvalidAddress(raw.to_string());

        if let Some(rest) = raw.strip_prefix("unix:") {
            let path = rest.strip_prefix("//").unwrap_or(rest);
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(TransportAddress::Unix(PathBuf::from(path)));
        }

        if raw.starts_with('/') {
            return Ok(TransportAddress::Unix(PathBuf::from(raw)));
        }

        let host_port = raw.strip_prefix("tcp://").unwrap_or(raw);
        match host_port.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(TransportAddress::Tcp(host_port.to_string()))
            }
            _ => Err(invalid()),
        }
    }
}

impl FromStr for TransportAddress {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransportAddress::parse(s)
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportAddress::Tcp(addr) => write!(f, "tcp://{}", addr),
            TransportAddress::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// The platform's conventional host address.
pub fn default_address() -> TransportAddress {
    if cfg!(windows) {
        TransportAddress::Tcp("127.0.0.1:50051".to_string())
    } else {
        TransportAddress::Unix(PathBuf::from("/tmp/dragonfly_plugin.sock"))
    }
}

/// Boxed halves of an open connection.
pub type FramePair = (Box<dyn FrameSource>, Box<dyn FrameSink>);

/// Opens a connection to the host and splits it into framed halves.
pub async fn connect(address: &TransportAddress) -> Result<FramePair, ProtocolError> {
    match address {
        TransportAddress::Tcp(addr) => {
            let stream = tokio::net::TcpStream::connect(addr.as_str()).await?;
            stream.set_nodelay(true)?;
            debug!("🔌 Connected to host over TCP at {}", addr);
            let (read, write) = stream.into_split();
            Ok((Box::new(FrameReader::new(read)), Box::new(FrameWriter::new(write))))
        }
        #[cfg(unix)]
        TransportAddress::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path).await?;
            debug!("🔌 Connected to host over Unix socket at {}", path.display());
            let (read, write) = stream.into_split();
            Ok((Box::new(FrameReader::new(read)), Box::new(FrameWriter::new(write))))
        }
        #[cfg(not(unix))]
        TransportAddress::Unix(path) => Err(ProtocolError::InvalidAddress(format!(
            "Unix sockets are unavailable on this platform: {}",
            path.display()
        ))),
    }
}

/// One end of an in-memory framed connection.
pub struct MemoryEnd {
    pub reader: FrameReader<ReadHalf<DuplexStream>>,
    pub writer: FrameWriter<WriteHalf<DuplexStream>>,
}

impl MemoryEnd {
    pub fn into_boxed(self) -> FramePair {
        (Box::new(self.reader), Box::new(self.writer))
    }
}

/// Two connected in-memory ends, each buffering up to `capacity` bytes.
pub fn memory_pair(capacity: usize) -> (MemoryEnd, MemoryEnd) {
    let (a, b) = tokio::io::duplex(capacity);
    let split = |stream: DuplexStream| {
        let (read, write) = tokio::io::split(stream);
        MemoryEnd {
            reader: FrameReader::new(read),
            writer: FrameWriter::new(write),
        }
    };
    (split(a), split(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_forms() {
        assert_eq!(
            TransportAddress::parse("tcp://127.0.0.1:50051").unwrap(),
            TransportAddress::Tcp("127.0.0.1:50051".to_string())
        );
        assert_eq!(
            TransportAddress::parse("localhost:9000").unwrap(),
            TransportAddress::Tcp("localhost:9000".to_string())
        );
    }

    #[test]
    fn parses_unix_forms() {
        let expected = TransportAddress::Unix(PathBuf::from("/tmp/df.sock"));
        assert_eq!(TransportAddress::parse("unix:///tmp/df.sock").unwrap(), expected);
        assert_eq!(TransportAddress::parse("unix:/tmp/df.sock").unwrap(), expected);
        assert_eq!(TransportAddress::parse("/tmp/df.sock").unwrap(), expected);
    }

    #[test]
    fn rejects_garbage() {
        assert!(TransportAddress::parse("").is_err());
        assert!(TransportAddress::parse("unix:").is_err());
        assert!(TransportAddress::parse("localhost").is_err());
        assert!(TransportAddress::parse("host:notaport").is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for raw in ["tcp://10.0.0.1:1234", "unix:///var/run/df.sock"] {
            let addr = TransportAddress::parse(raw).unwrap();
            assert_eq!(addr.to_string(), raw);
        }
    }

    #[tokio::test]
    async fn frames_cross_a_memory_pair_in_order() {
        let (mut a, mut b) = memory_pair(1024);
        a.writer.write_frame(b"first").await.unwrap();
        a.writer.write_frame(b"").await.unwrap();
        a.writer.write_frame(b"third").await.unwrap();
        a.writer.shutdown().await.unwrap();

        assert_eq!(b.reader.read_frame().await.unwrap(), Some(b"first".to_vec()));
        assert_eq!(b.reader.read_frame().await.unwrap(), Some(Vec::new()));
        assert_eq!(b.reader.read_frame().await.unwrap(), Some(b"third".to_vec()));
        assert_eq!(b.reader.read_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_invalid_data() {
        let (a, mut b) = tokio::io::duplex(64);
        let mut raw = a;
        raw.write_all(&((MAX_FRAME_SIZE as u32) + 1).to_be_bytes()).await.unwrap();
        let mut reader = FrameReader::new(&mut b);
        let err = reader.read_frame().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
