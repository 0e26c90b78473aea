//! Minimal HTTP/1.1 file server used to exercise real requests in tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use url::Url;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// Advertise and honour `Range` requests.
    pub ranges: bool,
    /// Send `Content-Length` on 206 responses.
    pub ranged_content_length: bool,
    /// Send `Content-Length` on full-body 200 responses.
    pub whole_content_length: bool,
    /// Answer every request with 404.
    pub not_found: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            ranges: true,
            ranged_content_length: true,
            whole_content_length: true,
            not_found: false,
        }
    }
}

#[derive(Default)]
struct Counters {
    requests: AtomicUsize,
    ranged: AtomicUsize,
}

pub struct TestServer {
    addr: SocketAddr,
    counters: Arc<Counters>,
    stall: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(body: Vec<u8>, ranges: bool) -> Self {
        Self::start_with(
            body,
            ServerOptions {
                ranges,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn start_with(body: Vec<u8>, options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = Arc::new(body);
        let counters = Arc::new(Counters::default());
        let stall = Arc::new(AtomicUsize::new(usize::MAX));

        let handle = {
            let counters = counters.clone();
            let stall = stall.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let body = body.clone();
                    let counters = counters.clone();
                    let stall = stall.load(Ordering::SeqCst);
                    tokio::spawn(async move {
                        let _ = serve(socket, &body, options, &counters, stall).await;
                    });
                }
            })
        };

        Self {
            addr,
            counters,
            stall,
            handle,
        }
    }

    /// Responses started after this call send `bytes` body bytes and then hang.
    pub fn stall_after(&self, bytes: usize) {
        self.stall.store(bytes, Ordering::SeqCst);
    }

    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://{}/{}", self.addr, path)).unwrap()
    }

    pub fn request_count(&self) -> usize {
        self.counters.requests.load(Ordering::SeqCst)
    }

    pub fn ranged_request_count(&self) -> usize {
        self.counters.ranged.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut socket: TcpStream,
    body: &[u8],
    options: ServerOptions,
    counters: &Counters,
    stall: usize,
) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }
    counters.requests.fetch_add(1, Ordering::SeqCst);

    let head = String::from_utf8_lossy(&request).into_owned();
    let range = head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("range")
            .then(|| value.trim().to_string())
    });
    if range.is_some() {
        counters.ranged.fetch_add(1, Ordering::SeqCst);
    }

    if options.not_found {
        socket
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await?;
        return socket.shutdown().await;
    }

    let mut response = String::new();
    let payload = match range
        .filter(|_| options.ranges)
        .and_then(|r| parse_range(&r, body.len()))
    {
        Some((start, end)) => {
            response.push_str("HTTP/1.1 206 Partial Content\r\n");
            response.push_str(&format!("Content-Range: bytes {}-{}/{}\r\n", start, end, body.len()));
            if options.ranged_content_length {
                response.push_str(&format!("Content-Length: {}\r\n", end - start + 1));
            }
            &body[start..=end]
        }
        None => {
            response.push_str("HTTP/1.1 200 OK\r\n");
            if options.whole_content_length {
                response.push_str(&format!("Content-Length: {}\r\n", body.len()));
            }
            body
        }
    };
    if options.ranges {
        response.push_str("Accept-Ranges: bytes\r\n");
    }
    response.push_str("Content-Disposition: attachment; filename=\"served.bin\"\r\n");
    response.push_str("Connection: close\r\n\r\n");

    socket.write_all(response.as_bytes()).await?;
    if stall < payload.len() {
        socket.write_all(&payload[..stall]).await?;
        std::future::pending::<()>().await;
    }
    socket.write_all(payload).await?;
    socket.shutdown().await
}

/// Inclusive `bytes=start-end` within a body of `len` bytes.
fn parse_range(value: &str, len: usize) -> Option<(usize, usize)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let last = len.checked_sub(1)?;
    let start: usize = start.trim().parse().ok()?;
    let end: usize = match end.trim() {
        "" => last,
        e => e.parse().ok()?,
    };
    let end = end.min(last);
    (start <= end).then_some((start, end))
}
