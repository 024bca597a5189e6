//! Connection supervisor: owns at most one [`TransportSocket`] and its state
//! machine.
//!
//! - `connect()` is idempotent: CLOSED starts a session, CONNECTING and OPEN
//!   join the current one, FAILURE fails fast until the cool-down elapses.
//! - An error or a close the peer started moves to FAILURE, fails all live
//!   work through the [`InboundSink`] and arms the cool-down timer, which
//!   resets to CLOSED unless another transition happens first.
//! - Every session has its own event channel and number. Events that arrive
//!   after a session ended are discarded.
//!
//! State transitions and socket creation happen under one lock.

use crate::adapters::dispatcher::CallDispatcher;
use crate::adapters::transport::{TransportEvent, TransportSocket, NORMAL_CLOSURE};
use crate::domain::config::{ConnectionConfig, TransportConfig};
use crate::domain::error::{ClientError, ClientResult};
use crate::domain::peer::Endpoint;
use crate::domain::state::ConnectionState;
use crate::ports::inbound::InboundSink;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const TRANSITION_CHANNEL_CAPACITY: usize = 64;

struct Inner {
    state: ConnectionState,
    session: u64,
    socket: Option<TransportSocket>,
    failed_at: Option<Instant>,
    cooldown_timer: Option<JoinHandle<()>>,
    last_error: Option<ClientError>,
}

struct Shared {
    endpoint: Endpoint,
    transport: TransportConfig,
    cooldown: Duration,
    dispatcher: CallDispatcher,
    sink: Arc<dyn InboundSink>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
}

/// Supervises the single physical connection to one node.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    shared: Arc<Shared>,
}

impl ConnectionSupervisor {
    pub fn new(
        endpoint: Endpoint,
        transport: TransportConfig,
        connection: &ConnectionConfig,
        dispatcher: CallDispatcher,
        sink: Arc<dyn InboundSink>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Closed);
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                endpoint,
                transport,
                cooldown: connection.cooldown,
                dispatcher,
                sink,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Closed,
                    session: 0,
                    socket: None,
                    failed_at: None,
                    cooldown_timer: None,
                    last_error: None,
                }),
                state_tx,
                transitions,
            }),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Latest state first, then every change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Every transition from now on
    pub fn transitions(&self) -> broadcast::Receiver<ConnectionState> {
        self.shared.transitions.subscribe()
    }

    /// Time left in the current cool-down, if in FAILURE
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let inner = self.shared.inner.lock();
        self.shared.remaining_cooldown(&inner)
    }

    /// Resolve once the connection is OPEN.
    pub async fn connect(&self) -> ClientResult<()> {
        let mut state_rx = self.shared.state_tx.subscribe();
        {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                ConnectionState::Closed => Shared::start_session(&self.shared, &mut inner),
                ConnectionState::Connecting | ConnectionState::Open => {}
                ConnectionState::Failure => {
                    let remaining = self.shared.remaining_cooldown(&inner).unwrap_or_default();
                    return Err(ClientError::CoolingDown {
                        remaining_ms: remaining.as_millis() as u64,
                    });
                }
            }
        }

        loop {
            let state = *state_rx.borrow_and_update();
            match state {
                ConnectionState::Open => return Ok(()),
                ConnectionState::Connecting => {}
                ConnectionState::Closed | ConnectionState::Failure => {
                    return Err(self.shared.last_error());
                }
            }
            if state_rx.changed().await.is_err() {
                return Err(ClientError::transport("connection supervisor dropped"));
            }
        }
    }

    /// Queue one message on the open socket. Returns false unless OPEN.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        let inner = self.shared.inner.lock();
        match (&inner.state, &inner.socket) {
            (ConnectionState::Open, Some(socket)) => socket.send(bytes),
            _ => false,
        }
    }

    /// Close deliberately. Ends in CLOSED without a cool-down; live work is
    /// failed.
    pub fn close(&self) {
        let error = ClientError::transport("connection closed by client");
        let ended = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                ConnectionState::Connecting | ConnectionState::Open => {
                    if let Some(socket) = inner.socket.take() {
                        if !socket.cancel() {
                            let _ = socket.close(NORMAL_CLOSURE, "");
                        }
                    }
                    inner.session += 1;
                    inner.last_error = Some(error.clone());
                    self.shared.transition(&mut inner, ConnectionState::Closed);
                    true
                }
                ConnectionState::Closed | ConnectionState::Failure => false,
            }
        };
        if ended {
            info!(endpoint = %self.shared.endpoint, "Connection closed locally");
            self.shared.sink.on_connection_lost(&error);
        }
    }
}

impl Shared {
    fn start_session(shared: &Arc<Shared>, inner: &mut Inner) {
        inner.session += 1;
        inner.last_error = None;
        let session = inner.session;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        inner.socket = Some(TransportSocket::open(
            shared.endpoint.clone(),
            &shared.transport,
            &shared.dispatcher,
            events_tx,
        ));
        shared.transition(inner, ConnectionState::Connecting);
        debug!(endpoint = %shared.endpoint, session, "Started connection session");

        tokio::spawn(pump(Arc::downgrade(shared), session, events_rx));
    }

    /// Apply one event. Returns false when the session is over.
    fn handle_event(self: &Arc<Self>, session: u64, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Message(bytes) => {
                let current = {
                    let inner = self.inner.lock();
                    inner.session == session && inner.state == ConnectionState::Open
                };
                if !current {
                    debug!(session, "Discarding message from a finished session");
                    return false;
                }
                self.sink.on_message(&bytes);
                true
            }
            TransportEvent::Open => {
                let mut inner = self.inner.lock();
                if inner.session != session || inner.state != ConnectionState::Connecting {
                    return false;
                }
                info!(endpoint = %self.endpoint, session, "Connection open");
                self.transition(&mut inner, ConnectionState::Open);
                true
            }
            TransportEvent::Closing { code, reason } => {
                debug!(endpoint = %self.endpoint, session, code, reason = %reason, "Peer started close");
                true
            }
            TransportEvent::Closed { code, reason } => {
                self.session_failed(
                    session,
                    ClientError::transport(format!(
                        "connection closed by peer: {} {}",
                        code, reason
                    )),
                );
                false
            }
            TransportEvent::Failure(error) => {
                self.session_failed(session, error);
                false
            }
        }
    }

    /// FAILURE: drop the socket, arm the cool-down, fail live work.
    fn session_failed(self: &Arc<Self>, session: u64, error: ClientError) {
        {
            let mut inner = self.inner.lock();
            if inner.session != session {
                return;
            }
            warn!(endpoint = %self.endpoint, session, error = %error, "Connection failed");
            inner.session += 1;
            inner.socket = None;
            inner.last_error = Some(error.clone());
            inner.failed_at = Some(Instant::now());
            self.transition(&mut inner, ConnectionState::Failure);

            let weak = Arc::downgrade(self);
            let epoch = inner.session;
            let cooldown = self.cooldown;
            inner.cooldown_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(cooldown).await;
                if let Some(shared) = weak.upgrade() {
                    shared.cooldown_elapsed(epoch);
                }
            }));
        }
        self.sink.on_connection_lost(&error);
    }

    fn cooldown_elapsed(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.session == epoch && inner.state == ConnectionState::Failure {
            debug!(endpoint = %self.endpoint, "Cool-down elapsed");
            // the timer is finishing on its own
            inner.cooldown_timer = None;
            self.transition(&mut inner, ConnectionState::Closed);
        }
    }

    fn transition(&self, inner: &mut Inner, next: ConnectionState) {
        if next != ConnectionState::Failure {
            if let Some(timer) = inner.cooldown_timer.take() {
                timer.abort();
            }
            inner.failed_at = None;
        }
        let previous = inner.state;
        inner.state = next;
        debug!(endpoint = %self.endpoint, from = %previous, to = %next, "Connection state transition");
        self.state_tx.send_replace(next);
        let _ = self.transitions.send(next);
    }

    fn remaining_cooldown(&self, inner: &Inner) -> Option<Duration> {
        match (inner.state, inner.failed_at) {
            (ConnectionState::Failure, Some(at)) => {
                Some(self.cooldown.saturating_sub(at.elapsed()))
            }
            _ => None,
        }
    }

    fn last_error(&self) -> ClientError {
        self.inner
            .lock()
            .last_error
            .clone()
            .unwrap_or_else(|| ClientError::transport("connection closed"))
    }
}

/// Feeds one session's transport events into the supervisor.
async fn pump(
    shared: Weak<Shared>,
    session: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        if !shared.handle_event(session, event) {
            return;
        }
    }
    // driver ended without a terminal event
    if let Some(shared) = shared.upgrade() {
        shared.session_failed(session, ClientError::transport("transport stopped"));
    }
}
