//! JSON-RPC channel over one supervised connection.
//!
//! Calls are correlated by request id, subscriptions by subscriber id. Both
//! tables are filled by the [`MessageRouter`] running on the supervisor's
//! session pump, so any number of calls and subscriptions share one socket.

use crate::adapters::connection::ConnectionSupervisor;
use crate::adapters::dispatcher::CallDispatcher;
use crate::adapters::pending::PendingCallStore;
use crate::adapters::router::MessageRouter;
use crate::adapters::subscriptions::{NotificationReceiver, SubscriptionRegistry};
use crate::domain::atom::{Atom, AtomQuery, NodeInfo, ReceivedAtom};
use crate::domain::config::{ClientConfig, ProtocolConfig};
use crate::domain::correlation::CorrelationId;
use crate::domain::envelope::{with_subscriber_id, Request, SUBSCRIBER_ID_FIELD};
use crate::domain::error::{ClientError, ClientResult, RpcError};
use crate::domain::peer::Endpoint;
use crate::domain::state::ConnectionState;
use crate::domain::submission::{AtomSubmissionState, AtomSubmissionUpdate};
use crate::ports::inbound::InboundSink;
use crate::ports::outbound::{SystemTimeSource, TimeSource};
use futures::Stream;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

struct ChannelInner {
    supervisor: ConnectionSupervisor,
    pending: Arc<PendingCallStore>,
    subscriptions: Arc<SubscriptionRegistry>,
    protocol: ProtocolConfig,
    clock: Arc<dyn TimeSource>,
}

/// Multiplexed JSON-RPC client for one node. Cheap to clone.
#[derive(Clone)]
pub struct RpcChannel {
    inner: Arc<ChannelInner>,
}

impl RpcChannel {
    pub fn new(endpoint: Endpoint, config: &ClientConfig, dispatcher: CallDispatcher) -> Self {
        Self::with_time_source(endpoint, config, dispatcher, Arc::new(SystemTimeSource))
    }

    pub fn with_time_source(
        endpoint: Endpoint,
        config: &ClientConfig,
        dispatcher: CallDispatcher,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let pending = Arc::new(PendingCallStore::new());
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let router: Arc<dyn InboundSink> = Arc::new(MessageRouter::new(
            Arc::clone(&pending),
            Arc::clone(&subscriptions),
        ));
        let supervisor = ConnectionSupervisor::new(
            endpoint,
            config.transport.clone(),
            &config.connection,
            dispatcher,
            router,
        );
        Self {
            inner: Arc::new(ChannelInner {
                supervisor,
                pending,
                subscriptions,
                protocol: config.protocol.clone(),
                clock,
            }),
        }
    }

    /// Endpoint URL this channel talks to
    pub fn location(&self) -> &str {
        self.inner.supervisor.endpoint().as_str()
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.inner.supervisor.endpoint()
    }

    /// Connection state, latest value first
    pub fn status(&self) -> watch::Receiver<ConnectionState> {
        self.inner.supervisor.watch_state()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.supervisor.state()
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.inner.supervisor
    }

    /// Calls still waiting for a response
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.pending_count()
    }

    /// Subscriptions still routed
    pub fn active_subscriptions(&self) -> usize {
        self.inner.subscriptions.active_count()
    }

    /// Issue one call and wait for its response.
    pub async fn call(&self, method: &str, params: Value) -> ClientResult<Value> {
        self.inner.supervisor.connect().await?;

        let (id, response) = self.inner.pending.register(method);
        let _guard = PendingGuard {
            store: &self.inner.pending,
            id,
        };

        let bytes = Request::new(id, method, params).to_bytes()?;
        if !self.inner.supervisor.send(bytes) {
            return Err(ClientError::transport(format!(
                "failed to send {} to {}",
                method,
                self.location()
            )));
        }
        trace!(correlation_id = %id, method, "Request sent");

        response
            .await
            .unwrap_or_else(|_| Err(ClientError::transport("call abandoned by the channel")))
    }

    /// Open a server-push subscription.
    ///
    /// `subscriberId` is added to `params`. The stream yields the `params` of
    /// every `notification_method` notification for this subscriber until it
    /// is dropped; a failed subscribe call or a lost connection yields one
    /// `Err` and ends it.
    pub fn subscribe(&self, method: &str, params: Value, notification_method: &str) -> Subscription {
        let subscriber_id = CorrelationId::new();
        let params = match with_subscriber_id(params, subscriber_id) {
            Ok(params) => params,
            Err(e) => return Subscription::failed(self.clone(), subscriber_id, e),
        };

        // route first so no early notification is lost
        let receiver = self.inner.subscriptions.register(subscriber_id, notification_method);

        let channel = self.clone();
        let method = method.to_string();
        let call_task = tokio::spawn(async move {
            match channel.call(&method, params).await {
                Ok(_) => debug!(subscriber_id = %subscriber_id, method = %method, "Subscription acknowledged"),
                Err(e) => {
                    debug!(subscriber_id = %subscriber_id, method = %method, error = %e, "Subscribe call failed");
                    channel.inner.subscriptions.fail(&subscriber_id, e);
                }
            }
        });

        Subscription {
            channel: self.clone(),
            subscriber_id,
            receiver,
            call_task: Some(call_task),
            finished: false,
            cancelled: false,
        }
    }

    /// Stream atoms matching `query`, each stamped with its receipt time.
    pub fn get_atoms(&self, query: AtomQuery) -> AtomStream {
        let protocol = &self.inner.protocol;
        let subscription = self.subscribe(
            &protocol.atoms_subscribe,
            json!({ "query": query.0 }),
            &protocol.atoms_update,
        );
        AtomStream {
            subscription,
            buffered: VecDeque::new(),
            clock: Arc::clone(&self.inner.clock),
            finished: false,
        }
    }

    /// Submit an atom and follow it to a terminal state.
    ///
    /// The stream yields `Submitting` at once, `Submitted` when the node
    /// acknowledges, and ends after exactly one `Stored` or `Failed`.
    pub fn submit_atom(&self, atom: Atom) -> SubmissionStream {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let clock = Arc::clone(&self.inner.clock);
        let _ = updates_tx.send((
            AtomSubmissionUpdate::new(
                atom.id.clone(),
                AtomSubmissionState::Submitting,
                None,
                clock.now_ms(),
            ),
            None,
        ));

        let channel = self.clone();
        let task = tokio::spawn(async move {
            channel.follow_submission(atom, updates_tx).await;
        });

        SubmissionStream {
            updates: updates_rx,
            task,
        }
    }

    async fn follow_submission(
        &self,
        atom: Atom,
        updates: mpsc::UnboundedSender<(AtomSubmissionUpdate, Option<ClientError>)>,
    ) {
        let protocol = &self.inner.protocol;
        let clock = &self.inner.clock;
        let subscriber_id = CorrelationId::new();
        let mut notifications = self
            .inner
            .subscriptions
            .register(subscriber_id, &protocol.submission_update);
        let _route = RouteGuard {
            registry: &self.inner.subscriptions,
            id: subscriber_id,
        };

        let failed = |err: ClientError| {
            (
                AtomSubmissionUpdate::new(
                    atom.id.clone(),
                    AtomSubmissionState::Failed,
                    Some(err.to_string()),
                    clock.now_ms(),
                ),
                Some(err),
            )
        };

        let params = json!({
            SUBSCRIBER_ID_FIELD: subscriber_id.to_string(),
            "atom": atom.payload,
        });
        let call = self.call(&protocol.submit_atom, params);
        tokio::pin!(call);
        let mut acknowledged = false;

        loop {
            tokio::select! {
                biased;
                result = &mut call, if !acknowledged => {
                    acknowledged = true;
                    match result {
                        Ok(_) => {
                            debug!(atom_id = %atom.id, "Atom submitted");
                            let _ = updates.send((
                                AtomSubmissionUpdate::new(
                                    atom.id.clone(),
                                    AtomSubmissionState::Submitted,
                                    None,
                                    clock.now_ms(),
                                ),
                                None,
                            ));
                        }
                        Err(e) => {
                            warn!(atom_id = %atom.id, error = %e, "Atom submission failed");
                            let _ = updates.send(failed(e));
                            return;
                        }
                    }
                }
                item = notifications.recv() => {
                    let update = match item {
                        Some(Ok(params)) => AtomSubmissionUpdate::from_notification(
                            atom.id.clone(),
                            &params,
                            clock.now_ms(),
                        ),
                        Some(Err(e)) => Err(e),
                        None => Err(ClientError::transport("submission route closed")),
                    };
                    match update {
                        Ok(update) => {
                            let done = update.is_complete();
                            debug!(atom_id = %atom.id, state = %update.state, "Submission update");
                            let _ = updates.send((update, None));
                            if done {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!(atom_id = %atom.id, error = %e, "Submission tracking failed");
                            let _ = updates.send(failed(e));
                            return;
                        }
                    }
                }
            }
        }
    }

    /// `Network.getSelf`
    pub async fn get_self(&self) -> ClientResult<NodeInfo> {
        let result = self.call(&self.inner.protocol.get_self, json!({})).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// `Network.getLivePeers`
    pub async fn get_live_peers(&self) -> ClientResult<Vec<NodeInfo>> {
        let result = self
            .call(&self.inner.protocol.get_live_peers, json!({}))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// `Ledger.getAtoms` by hid; `None` when the node does not have it.
    pub async fn get_atom(&self, hid: &str) -> ClientResult<Option<Value>> {
        let result = self
            .call(&self.inner.protocol.get_atoms, json!({ "hid": hid }))
            .await?;
        match result {
            Value::Array(mut atoms) => Ok(if atoms.is_empty() {
                None
            } else {
                Some(atoms.swap_remove(0))
            }),
            Value::Null => Ok(None),
            other => Err(ClientError::protocol(format!(
                "expected a list of atoms, got {}",
                other
            ))),
        }
    }

    /// Close the connection if nothing is using it. Returns false while calls
    /// or subscriptions are live.
    pub fn try_close(&self) -> bool {
        if self.inner.pending.pending_count() > 0 || self.inner.subscriptions.active_count() > 0 {
            return false;
        }
        self.inner.supervisor.close();
        true
    }

    /// Fire-and-forget `Subscription.cancel`.
    fn send_cancel(&self, subscriber_id: CorrelationId) {
        let request = Request::new(
            CorrelationId::new(),
            self.inner.protocol.subscription_cancel.as_str(),
            json!({ SUBSCRIBER_ID_FIELD: subscriber_id.to_string() }),
        );
        let sent = request
            .to_bytes()
            .map(|bytes| self.inner.supervisor.send(bytes))
            .unwrap_or(false);
        if sent {
            debug!(subscriber_id = %subscriber_id, "Sent subscription cancel");
        } else {
            trace!(subscriber_id = %subscriber_id, "Subscription cancel not sent");
        }
    }
}

/// Removes a pending call whose caller stopped waiting.
struct PendingGuard<'a> {
    store: &'a PendingCallStore,
    id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        // no-op once the call has resolved
        self.store.cancel(&self.id);
    }
}

struct RouteGuard<'a> {
    registry: &'a SubscriptionRegistry,
    id: CorrelationId,
}

impl Drop for RouteGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

/// A live server-push subscription. Dropping it cancels.
pub struct Subscription {
    channel: RpcChannel,
    subscriber_id: CorrelationId,
    receiver: NotificationReceiver,
    call_task: Option<JoinHandle<()>>,
    finished: bool,
    cancelled: bool,
}

impl Subscription {
    fn failed(channel: RpcChannel, subscriber_id: CorrelationId, error: ClientError) -> Self {
        let (tx, receiver) = mpsc::unbounded_channel();
        let _ = tx.send(Err(error));
        Self {
            channel,
            subscriber_id,
            receiver,
            call_task: None,
            finished: false,
            cancelled: true,
        }
    }

    pub fn subscriber_id(&self) -> CorrelationId {
        self.subscriber_id
    }

    /// Stop local delivery, then tell the node. Safe to call repeatedly.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        let was_routed = self.channel.inner.subscriptions.remove(&self.subscriber_id);
        self.receiver.close();
        if let Some(task) = self.call_task.take() {
            task.abort();
        }
        if was_routed && !self.finished {
            self.channel.send_cancel(self.subscriber_id);
        }
        self.finished = true;
    }
}

impl Stream for Subscription {
    type Item = ClientResult<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(Ok(params))) => Poll::Ready(Some(Ok(params))),
            Poll::Ready(Some(Err(e))) => {
                self.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Atoms pushed for one query. Never ends on its own.
pub struct AtomStream {
    subscription: Subscription,
    buffered: VecDeque<ReceivedAtom>,
    clock: Arc<dyn TimeSource>,
    finished: bool,
}

impl AtomStream {
    pub fn subscriber_id(&self) -> CorrelationId {
        self.subscription.subscriber_id()
    }

    pub fn cancel(&mut self) {
        self.subscription.cancel();
    }
}

impl Stream for AtomStream {
    type Item = ClientResult<ReceivedAtom>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(atom) = self.buffered.pop_front() {
                return Poll::Ready(Some(Ok(atom)));
            }
            if self.finished {
                return Poll::Ready(None);
            }
            let params = match Pin::new(&mut self.subscription).poll_next(cx) {
                Poll::Ready(Some(Ok(params))) => params,
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            };

            match params.get("atoms").and_then(Value::as_array) {
                Some(atoms) => {
                    let received_at_ms = self.clock.now_ms();
                    let atoms: Vec<ReceivedAtom> = atoms
                        .iter()
                        .cloned()
                        .map(|payload| ReceivedAtom {
                            payload,
                            received_at_ms,
                        })
                        .collect();
                    self.buffered.extend(atoms);
                }
                None => {
                    self.finished = true;
                    self.subscription.cancel();
                    return Poll::Ready(Some(Err(ClientError::protocol(
                        "atoms update has no atoms array",
                    ))));
                }
            }
        }
    }
}

/// Progress of one submission. Dropping it stops tracking.
pub struct SubmissionStream {
    updates: mpsc::UnboundedReceiver<(AtomSubmissionUpdate, Option<ClientError>)>,
    task: JoinHandle<()>,
}

impl SubmissionStream {
    /// Drain the stream; `Ok` on `Stored`, `Err` on `Failed`.
    pub async fn wait_stored(mut self) -> ClientResult<AtomSubmissionUpdate> {
        while let Some((update, cause)) = self.updates.recv().await {
            match update.state {
                AtomSubmissionState::Stored => return Ok(update),
                AtomSubmissionState::Failed => {
                    return Err(cause.unwrap_or_else(|| {
                        ClientError::Rpc(RpcError::new(
                            None,
                            update
                                .message
                                .unwrap_or_else(|| "atom submission failed".to_string()),
                        ))
                    }))
                }
                _ => {}
            }
        }
        Err(ClientError::Cancelled)
    }
}

impl Stream for SubmissionStream {
    type Item = AtomSubmissionUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.updates
            .poll_recv(cx)
            .map(|item| item.map(|(update, _)| update))
    }
}

impl Drop for SubmissionStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
