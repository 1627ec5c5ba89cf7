//! A single TCP (optionally TLS) channel to one broker.
//!
//! The connection exchanges length-prefixed frames: every write is a
//! complete `i32 size | payload` request, every read starts with the 4-byte
//! size and then consumes exactly that many bytes. The configured response
//! timeout bounds the size read; once the size has arrived the body is
//! assumed to follow.
//!
//! Any I/O failure or malformed length leaves the stream in an unknown
//! state, so the owner drops the connection and lazily reopens on next use.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::config::ClientConfig;
use crate::constants::MAX_FRAME_SIZE;
use crate::error::{Error, Result};

use super::tls;

/// Read granularity of the streaming body reader.
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub struct BrokerConnection {
    stream: Box<dyn Stream>,
    address: String,
}

impl std::fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConnection")
            .field("address", &self.address)
            .finish()
    }
}

impl BrokerConnection {
    /// Dial `address`, establishing TLS when the config enables it.
    pub async fn connect(address: &str, config: &ClientConfig) -> Result<Self> {
        let tcp = timeout(config.connect_timeout(), TcpStream::connect(address))
            .await
            .map_err(|_| Error::Io(io::ErrorKind::TimedOut))??;
        tcp.set_nodelay(true)?;

        let keepalive = TcpKeepalive::new().with_time(config.keepalive());
        SockRef::from(&tcp).set_tcp_keepalive(&keepalive)?;

        if config.tls_enabled {
            // validate() guarantees the options are present and complete.
            let options = config
                .tls
                .as_ref()
                .ok_or_else(|| Error::Config("tls is enabled but no tls options are set".to_string()))?;
            let connector = tls::build_connector(options)?;
            let host = address.rsplit_once(':').map(|(h, _)| h).unwrap_or(address);
            let name = tls::server_name(options, host)?;
            let stream = connector.connect(name, tcp).await?;
            debug!(address, "established tls connection");
            Ok(Self {
                stream: Box::new(stream),
                address: address.to_string(),
            })
        } else {
            debug!(address, "established connection");
            Ok(Self {
                stream: Box::new(tcp),
                address: address.to_string(),
            })
        }
    }

    /// Wrap an already-established stream. Used by tests to run the frame
    /// protocol over an in-memory duplex.
    #[cfg(test)]
    pub(crate) fn from_stream(
        stream: impl AsyncRead + AsyncWrite + Unpin + Send + 'static,
        address: String,
    ) -> Self {
        Self {
            stream: Box::new(stream),
            address,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Write one complete request frame.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.stream.write_all(payload).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read the 4-byte frame length. The timeout applies here: once a
    /// broker has started answering, the body is on its way.
    pub async fn recv_frame_len(&mut self, read_timeout: Duration) -> Result<usize> {
        let mut len_buf = [0u8; 4];
        timeout(read_timeout, self.stream.read_exact(&mut len_buf))
            .await
            .map_err(|_| Error::Io(io::ErrorKind::TimedOut))??;

        let size = i32::from_be_bytes(len_buf);
        if !(0..=MAX_FRAME_SIZE).contains(&size) {
            return Err(Error::BadLength(size));
        }
        Ok(size as usize)
    }

    /// Read one complete response frame, returning its payload.
    pub async fn recv(&mut self, read_timeout: Duration) -> Result<Bytes> {
        let size = self.recv_frame_len(read_timeout).await?;
        let mut payload = vec![0u8; size];
        self.stream.read_exact(&mut payload).await?;
        debug!(address = %self.address, size, "received frame");
        Ok(Bytes::from(payload))
    }

    /// Read exactly `n` bytes of an in-flight frame body.
    pub async fn recv_exact(&mut self, n: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; n];
        self.stream.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Read the next slice of an in-flight frame body, at most
    /// `remaining` bytes. Returns an error on EOF before `remaining`
    /// reaches zero.
    pub async fn recv_chunk(&mut self, remaining: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; remaining.min(STREAM_CHUNK_SIZE)];
        let n = self.stream.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::Io(io::ErrorKind::UnexpectedEof));
        }
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.put_i32(payload.len() as i32);
        frame.extend_from_slice(payload);
        frame
    }

    #[tokio::test]
    async fn test_recv_reads_length_prefixed_frame() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut conn = BrokerConnection::from_stream(client, "test:9092".to_string());

        server.write_all(&framed(b"response")).await.unwrap();

        let payload = conn.recv(Duration::from_secs(1)).await.unwrap();
        assert_eq!(payload, Bytes::from_static(b"response"));
    }

    #[tokio::test]
    async fn test_recv_times_out_without_data() {
        let (client, _server) = tokio::io::duplex(64);
        let mut conn = BrokerConnection::from_stream(client, "test:9092".to_string());

        let result = conn.recv(Duration::from_millis(20)).await;
        assert_eq!(result, Err(Error::Io(io::ErrorKind::TimedOut)));
    }

    #[tokio::test]
    async fn test_recv_rejects_negative_length() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut conn = BrokerConnection::from_stream(client, "test:9092".to_string());

        server.write_all(&(-2i32).to_be_bytes()).await.unwrap();

        let result = conn.recv(Duration::from_secs(1)).await;
        assert_eq!(result, Err(Error::BadLength(-2)));
    }

    #[tokio::test]
    async fn test_recv_rejects_oversized_length() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut conn = BrokerConnection::from_stream(client, "test:9092".to_string());

        server
            .write_all(&(MAX_FRAME_SIZE + 1).to_be_bytes())
            .await
            .unwrap();

        let result = conn.recv(Duration::from_secs(1)).await;
        assert_eq!(result, Err(Error::BadLength(MAX_FRAME_SIZE + 1)));
    }

    #[tokio::test]
    async fn test_recv_short_body_is_io_error() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut conn = BrokerConnection::from_stream(client, "test:9092".to_string());

        server.write_all(&10i32.to_be_bytes()).await.unwrap();
        server.write_all(b"abc").await.unwrap();
        drop(server);

        let result = conn.recv(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_send_then_recv_round_trip() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut conn = BrokerConnection::from_stream(client, "test:9092".to_string());

        conn.send(&framed(b"ping")).await.unwrap();

        let mut request = vec![0u8; 8];
        server.read_exact(&mut request).await.unwrap();
        assert_eq!(&request[4..], b"ping");

        server.write_all(&framed(b"pong")).await.unwrap();
        let payload = conn.recv(Duration::from_secs(1)).await.unwrap();
        assert_eq!(payload, Bytes::from_static(b"pong"));
    }

    #[tokio::test]
    async fn test_recv_chunk_drains_incrementally() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut conn = BrokerConnection::from_stream(client, "test:9092".to_string());

        server.write_all(&framed(b"streamed-body")).await.unwrap();

        let mut remaining = conn.recv_frame_len(Duration::from_secs(1)).await.unwrap();
        assert_eq!(remaining, 13);
        let mut collected = Vec::new();
        while remaining > 0 {
            let chunk = conn.recv_chunk(remaining).await.unwrap();
            remaining -= chunk.len();
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, b"streamed-body");
    }
}
