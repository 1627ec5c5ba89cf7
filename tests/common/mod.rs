//! Scripted in-process broker for integration tests.
//!
//! Speaks just enough of the wire format to exercise the client: it reads
//! framed requests, hands them to a test-supplied handler, and writes the
//! handler's body back under the request's correlation id. Each accepted
//! connection gets its own serve loop, so tests can observe reconnects.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One parsed request as seen by the mock broker.
#[derive(Debug, Clone)]
pub struct RequestFrame {
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
    pub client_id: Option<String>,
    pub body: Bytes,
}

/// Returns the response body for a request, or `None` to drop the
/// connection.
pub type Handler = Arc<dyn Fn(&RequestFrame) -> Option<Vec<u8>> + Send + Sync>;

/// A shared log of every request the mock broker received.
pub type RequestLog = Arc<Mutex<Vec<RequestFrame>>>;

pub fn request_log() -> RequestLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Bind a mock broker on an ephemeral port and serve until the test ends.
pub async fn spawn_broker(log: RequestLog, handler: Handler) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let log = log.clone();
            let handler = handler.clone();
            tokio::spawn(serve_connection(stream, log, handler));
        }
    });
    address
}

async fn serve_connection(mut stream: TcpStream, log: RequestLog, handler: Handler) {
    while let Some(request) = read_request(&mut stream).await {
        log.lock().unwrap().push(request.clone());
        let Some(body) = handler(&request) else {
            break;
        };
        if write_response(&mut stream, request.correlation_id, &body)
            .await
            .is_err()
        {
            break;
        }
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<RequestFrame> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.ok()?;
    let len = i32::from_be_bytes(len_buf);
    if len < 0 {
        return None;
    }
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await.ok()?;

    let mut buf = Bytes::from(payload);
    let api_key = buf.get_i16();
    let api_version = buf.get_i16();
    let correlation_id = buf.get_i32();
    let client_len = buf.get_i16();
    let client_id = if client_len < 0 {
        None
    } else {
        let raw = buf.split_to(client_len as usize);
        Some(String::from_utf8(raw.to_vec()).unwrap())
    };

    Some(RequestFrame {
        api_key,
        api_version,
        correlation_id,
        client_id,
        body: buf,
    })
}

async fn write_response(
    stream: &mut TcpStream,
    correlation_id: i32,
    body: &[u8],
) -> std::io::Result<()> {
    let mut frame = BytesMut::with_capacity(8 + body.len());
    frame.put_i32(4 + body.len() as i32);
    frame.put_i32(correlation_id);
    frame.put_slice(body);
    stream.write_all(&frame).await
}

pub fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_i16(s.len() as i16);
    buf.put_slice(s.as_bytes());
}

/// ApiVersions v0 response body advertising `ranges` of (api, min, max).
pub fn api_versions_body(ranges: &[(i16, i16, i16)]) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i16(0); // error_code
    body.put_i32(ranges.len() as i32);
    for (api, min, max) in ranges {
        body.put_i16(*api);
        body.put_i16(*min);
        body.put_i16(*max);
    }
    body.to_vec()
}

/// A version table where every API this client speaks is pinned to v0,
/// apart from ApiVersions itself.
pub fn v0_table() -> Vec<(i16, i16, i16)> {
    vec![
        (0, 0, 0),
        (1, 0, 0),
        (2, 0, 0),
        (3, 0, 0),
        (8, 0, 0),
        (9, 0, 0),
        (10, 0, 0),
        (11, 0, 0),
        (12, 0, 0),
        (13, 0, 0),
        (14, 0, 0),
        (15, 0, 0),
        (16, 0, 0),
        (17, 0, 0),
        (18, 0, 1),
        (35, 0, 0),
        (36, 0, 0),
    ]
}

/// Metadata v0 response body: one broker list plus `topics` of
/// (name, partition ids), every partition led by `leader`.
pub fn metadata_v0_body(
    brokers: &[(i32, &str, i32)],
    topics: &[(&str, &[i32])],
    leader: i32,
) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_i32(brokers.len() as i32);
    for (node_id, host, port) in brokers {
        body.put_i32(*node_id);
        put_string(&mut body, host);
        body.put_i32(*port);
    }
    body.put_i32(topics.len() as i32);
    for (name, partitions) in topics {
        body.put_i16(0); // topic error
        put_string(&mut body, name);
        body.put_i32(partitions.len() as i32);
        for partition in *partitions {
            body.put_i16(0); // partition error
            body.put_i32(*partition);
            body.put_i32(leader);
            body.put_i32(1); // replicas
            body.put_i32(leader);
            body.put_i32(1); // isr
            body.put_i32(leader);
        }
    }
    body.to_vec()
}

/// Split a `host:port` address string.
pub fn split_address(address: &str) -> (String, i32) {
    let (host, port) = address.rsplit_once(':').unwrap();
    (host.to_string(), port.parse().unwrap())
}
