//! One physical WebSocket connection.
//!
//! Establishment (TCP connect, optional TLS, upgrade handshake) runs through
//! the [`CallDispatcher`]. Once upgraded, a driver task owns the stream and
//! reports everything to its owner as [`TransportEvent`]s over an unbounded
//! channel, in order. Dropping the [`TransportSocket`] cancels establishment
//! or shuts the driver down.

use crate::adapters::dispatcher::{CallDispatcher, Canceller};
use crate::adapters::handshake;
use crate::domain::config::TransportConfig;
use crate::domain::error::{ClientError, ClientResult};
use crate::domain::peer::Endpoint;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Longest close reason that fits a control frame.
const MAX_CLOSE_REASON_BYTES: usize = 123;

/// How long a closing or released socket waits for the peer's close reply.
const DROP_LINGER: Duration = Duration::from_secs(5);

/// What a socket reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Upgrade accepted; the socket can carry messages
    Open,
    /// One complete inbound message
    Message(Bytes),
    /// The peer sent a close frame
    Closing { code: u16, reason: String },
    /// The connection is gone after an orderly close
    Closed { code: u16, reason: String },
    /// Establishment or the live connection failed
    Failure(ClientError),
}

enum Command {
    Send(Vec<u8>),
    Close { code: u16, reason: String },
}

/// Handle to one physical connection.
pub struct TransportSocket {
    endpoint: Endpoint,
    commands: mpsc::UnboundedSender<Command>,
    establishment: Canceller,
}

impl TransportSocket {
    /// Start connecting to `endpoint`. Progress arrives on `events`.
    pub fn open(
        endpoint: Endpoint,
        config: &TransportConfig,
        dispatcher: &CallDispatcher,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let handle = dispatcher.enqueue(establish(endpoint.clone(), config.clone()));
        let establishment = handle.canceller();

        let ping_interval = config.ping_interval;
        let driver_endpoint = endpoint.clone();
        tokio::spawn(async move {
            match handle.wait().await {
                Ok(stream) => {
                    info!(endpoint = %driver_endpoint, "WebSocket connected");
                    if events.send(TransportEvent::Open).is_err() {
                        return;
                    }
                    drive(stream, commands_rx, events, ping_interval, &driver_endpoint).await;
                }
                Err(ClientError::Cancelled) => {
                    debug!(endpoint = %driver_endpoint, "Connection attempt cancelled");
                    let _ = events.send(TransportEvent::Failure(ClientError::Cancelled));
                }
                Err(e) => {
                    warn!(endpoint = %driver_endpoint, error = %e, "Connection attempt failed");
                    let _ = events.send(TransportEvent::Failure(e));
                }
            }
        });

        Self {
            endpoint,
            commands: commands_tx,
            establishment,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Queue one message. Returns false if the driver is gone.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        self.commands.send(Command::Send(bytes)).is_ok()
    }

    /// Start an orderly close. Invalid codes are rejected before anything is
    /// sent.
    pub fn close(&self, code: u16, reason: &str) -> Result<(), ClientError> {
        handshake::validate_close_code(code)?;
        if reason.len() > MAX_CLOSE_REASON_BYTES {
            return Err(ClientError::protocol(format!(
                "reason.size() > {}: {}",
                MAX_CLOSE_REASON_BYTES, reason
            )));
        }
        self.commands
            .send(Command::Close {
                code,
                reason: reason.to_string(),
            })
            .map_err(|_| ClientError::transport("socket is not running"))
    }

    /// Abort a connection attempt that has not completed yet.
    pub fn cancel(&self) -> bool {
        self.establishment.cancel()
    }
}

impl Drop for TransportSocket {
    fn drop(&mut self) {
        // no-op once established; the driver notices the closed command channel
        self.establishment.cancel();
    }
}

async fn establish(endpoint: Endpoint, config: TransportConfig) -> ClientResult<WsStream> {
    let attempt = async {
        trace!(endpoint = %endpoint, "Opening TCP connection");
        let tcp = TcpStream::connect((endpoint.connect_host(), endpoint.port())).await?;
        tcp.set_nodelay(true)?;

        let mut stream = if endpoint.is_secure() {
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(config.accept_invalid_certs)
                .danger_accept_invalid_hostnames(config.accept_invalid_certs)
                .build()?;
            let connector = tokio_native_tls::TlsConnector::from(connector);
            MaybeTlsStream::NativeTls(connector.connect(endpoint.connect_host(), tcp).await?)
        } else {
            MaybeTlsStream::Plain(tcp)
        };

        let leftover =
            handshake::perform(&mut stream, &endpoint, config.max_handshake_bytes).await?;
        Ok(WebSocketStream::from_partially_read(stream, leftover, Role::Client, None).await)
    };

    match config.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, attempt).await.map_err(|_| {
            ClientError::Timeout(format!("connecting to {} took longer than {:?}", endpoint, limit))
        })?,
        None => attempt.await,
    }
}

async fn drive(
    stream: WsStream,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
    ping_interval: Option<Duration>,
    endpoint: &Endpoint,
) {
    let (mut sink, mut source) = stream.split();
    let mut ping = ping_interval.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });
    let mut peer_close: Option<(u16, String)> = None;
    let mut closing_locally = false;
    let mut close_deadline: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            command = commands.recv(), if !closing_locally => match command {
                Some(Command::Send(bytes)) => {
                    let message = match String::from_utf8(bytes) {
                        Ok(text) => Message::Text(text.into()),
                        Err(e) => Message::Binary(e.into_bytes().into()),
                    };
                    if let Err(e) = sink.send(message).await {
                        let _ = events.send(TransportEvent::Failure(e.into()));
                        return;
                    }
                }
                Some(Command::Close { code, reason }) => {
                    debug!(endpoint = %endpoint, code, "Closing WebSocket");
                    closing_locally = true;
                    close_deadline = Some(tokio::time::Instant::now() + DROP_LINGER);
                    peer_close = Some((code, reason.clone()));
                    let frame = CloseFrame { code: CloseCode::from(code), reason: reason.into() };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        let _ = events.send(TransportEvent::Failure(e.into()));
                        return;
                    }
                }
                None => {
                    // owner dropped the socket; give the peer a moment to acknowledge
                    let frame = CloseFrame {
                        code: CloseCode::from(NORMAL_CLOSURE),
                        reason: "".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    let _ = tokio::time::timeout(DROP_LINGER, async {
                        while let Some(Ok(_)) = source.next().await {}
                    })
                    .await;
                    debug!(endpoint = %endpoint, "Socket released");
                    return;
                }
            },
            _ = async {
                match close_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                let (code, reason) = peer_close.take().unwrap_or((NORMAL_CLOSURE, String::new()));
                debug!(endpoint = %endpoint, code, "Peer did not acknowledge close");
                let _ = events.send(TransportEvent::Closed { code, reason });
                return;
            },
            _ = async {
                match ping.as_mut() {
                    Some(interval) => { interval.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                trace!(endpoint = %endpoint, "Sending keep-alive ping");
                if let Err(e) = sink.send(Message::Ping(Bytes::new())).await {
                    let _ = events.send(TransportEvent::Failure(e.into()));
                    return;
                }
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(Bytes::copy_from_slice(text.as_bytes())));
                }
                Some(Ok(Message::Binary(data))) => {
                    let _ = events.send(TransportEvent::Message(data));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                        .unwrap_or((NORMAL_CLOSURE, String::new()));
                    if !closing_locally {
                        debug!(endpoint = %endpoint, code, reason = %reason, "Peer is closing");
                        let _ = events.send(TransportEvent::Closing { code, reason: reason.clone() });
                    }
                    peer_close = Some((code, reason));
                    // flushes the queued close reply
                    let _ = sink.flush().await;
                }
                Some(Ok(_)) => {}
                Some(Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)) | None => {
                    let (code, reason) = peer_close.take().unwrap_or((NORMAL_CLOSURE, String::new()));
                    info!(endpoint = %endpoint, code, "WebSocket closed");
                    let _ = events.send(TransportEvent::Closed { code, reason });
                    return;
                }
                Some(Err(e)) => {
                    warn!(endpoint = %endpoint, error = %e, "WebSocket failed");
                    let _ = events.send(TransportEvent::Failure(e.into()));
                    return;
                }
            },
        }
    }
}
