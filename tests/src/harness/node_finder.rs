//! Canned HTTP node finder.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub struct MockNodeFinder {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl MockNodeFinder {
    /// Serve `bodies` in turn, repeating the last one. An empty body is
    /// answered with 200 and no content.
    pub async fn start(bodies: Vec<&'static str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind node finder");
        let addr = listener.local_addr().expect("node finder address");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            while let Ok((mut tcp, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let body = bodies
                    .get(n)
                    .or(bodies.last())
                    .copied()
                    .unwrap_or_default();
                let mut buf = [0u8; 2048];
                let _ = tcp.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = tcp.write_all(reply.as_bytes()).await;
                let _ = tcp.shutdown().await;
            }
        });

        Self { addr, hits }
    }

    pub fn url(&self) -> String {
        format!("http://{}/node-finder", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}
