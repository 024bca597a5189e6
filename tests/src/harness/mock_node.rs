//! Scripted ledger node.
//!
//! Every inbound request is recorded and handed to the script, which returns
//! the frames to send back. Replies for different requests are written by
//! independent tasks, so a `Delay` lets a test answer calls out of order.

use futures::{SinkExt, StreamExt};
use node_client::Endpoint;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// One step of a scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    /// `{"id", "result"}` for the request
    Result(Value),
    /// `{"id", "error": {code, message}}` for the request
    Error { code: i64, message: String },
    /// Notification carrying the request's `subscriberId`
    Notify { method: String, params: Value },
    /// Wait before the following steps
    Delay(Duration),
    /// Close the connection from the node side
    Close,
}

impl Reply {
    pub fn notify(method: &str, params: Value) -> Self {
        Self::Notify {
            method: method.to_string(),
            params,
        }
    }

    pub fn error(code: i64, message: &str) -> Self {
        Self::Error {
            code,
            message: message.to_string(),
        }
    }
}

pub type Script = Arc<dyn Fn(&Value) -> Vec<Reply> + Send + Sync>;

enum Outbound {
    Frame(Value),
    Close,
}

pub struct MockNode {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Value>>>,
    connections: Arc<AtomicUsize>,
}

impl MockNode {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock node");
        let addr = listener.local_addr().expect("mock node address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let log = Arc::clone(&requests);
        let counter = Arc::clone(&connections);
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(tcp, Arc::clone(&script), Arc::clone(&log)));
            }
        });

        Self {
            addr,
            requests,
            connections,
        }
    }

    /// Node that answers every request with `result`.
    pub async fn answering(result: Value) -> Self {
        Self::start(Arc::new(move |_: &Value| vec![Reply::Result(result.clone())])).await
    }

    pub fn url(&self) -> String {
        format!("ws://{}/rpc", self.addr)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::parse(&self.url()).expect("mock node endpoint")
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }

    pub fn requests_for(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r["method"] == method)
            .cloned()
            .collect()
    }

    /// Accepted TCP connections
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn serve(tcp: tokio::net::TcpStream, script: Script, log: Arc<Mutex<Vec<Value>>>) {
    let Ok(ws) = tokio_tungstenite::accept_async(tcp).await else {
        return;
    };
    let (mut sink, mut stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();

    tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            match outbound {
                Outbound::Frame(frame) => {
                    if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                        return;
                    }
                }
                Outbound::Close => {
                    let _ = sink.close().await;
                    return;
                }
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        log.lock().push(request.clone());

        let replies = script(&request);
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            for reply in replies {
                let outbound = match reply {
                    Reply::Result(result) => {
                        Outbound::Frame(json!({"id": request["id"], "result": result}))
                    }
                    Reply::Error { code, message } => Outbound::Frame(json!({
                        "id": request["id"],
                        "error": {"code": code, "message": message}
                    })),
                    Reply::Notify { method, mut params } => {
                        params["subscriberId"] = request["params"]["subscriberId"].clone();
                        Outbound::Frame(json!({"method": method, "params": params}))
                    }
                    Reply::Delay(duration) => {
                        tokio::time::sleep(duration).await;
                        continue;
                    }
                    Reply::Close => Outbound::Close,
                };
                if out_tx.send(outbound).is_err() {
                    return;
                }
            }
        });
    }
}
