//! ---
//! spine_section: "02-messaging-ipc-data-model"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Transport implementations for messaging layers."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
//! In-process broker with AMQP-like exchange, queue and binding semantics.
//!
//! Used by tests and single-process deployments. Cloning an [`InMemoryBroker`]
//! yields another handle onto the same broker state, so several components on
//! different threads can share one bus.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use spine_msg::DeliveryTag;
use tracing::{debug, trace};

use crate::topic::topic_matches;
use crate::{
    Binding, Broker, Delivery, ExchangeKind, ExchangeSpec, Poll, QueueSpec, Result, Session,
    TransportError,
};

#[derive(Debug, Clone)]
struct StoredMessage {
    routing_key: String,
    payload: Vec<u8>,
}

#[derive(Debug)]
struct QueueState {
    spec: QueueSpec,
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<u64, StoredMessage>,
}

impl QueueState {
    fn new(spec: QueueSpec) -> Self {
        Self {
            spec,
            ready: VecDeque::new(),
            unacked: HashMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    exchanges: HashMap<String, ExchangeSpec>,
    queues: HashMap<String, QueueState>,
    bindings: Vec<Binding>,
    next_tag: u64,
    publish_count: u64,
    generation: u64,
    refuse_connections: bool,
}

impl BrokerState {
    fn route(&mut self, exchange: &ExchangeSpec, routing_key: &str, payload: &[u8]) -> usize {
        let mut targets: Vec<String> = self
            .bindings
            .iter()
            .filter(|binding| binding.exchange == exchange.name)
            .filter(|binding| match exchange.kind {
                ExchangeKind::Topic => topic_matches(&binding.routing_key, routing_key),
                ExchangeKind::Direct => binding.routing_key == routing_key,
                ExchangeKind::Fanout => true,
            })
            .map(|binding| binding.queue.clone())
            .collect();
        targets.sort();
        targets.dedup();

        let mut routed = 0;
        for name in targets {
            if let Some(queue) = self.queues.get_mut(&name) {
                queue.ready.push_back(StoredMessage {
                    routing_key: routing_key.to_owned(),
                    payload: payload.to_vec(),
                });
                routed += 1;
            }
        }
        routed
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BrokerState>,
    arrivals: Condvar,
}

/// Handle onto a shared in-process broker.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of publish calls accepted so far, across all sessions.
    pub fn publish_count(&self) -> u64 {
        self.shared.state.lock().publish_count
    }

    /// Messages waiting in `queue` that no consumer has taken yet.
    pub fn queue_depth(&self, queue: &str) -> Option<usize> {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.len())
    }

    /// Messages delivered from `queue` but not yet acknowledged.
    pub fn unacked_count(&self, queue: &str) -> Option<usize> {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.unacked.len())
    }

    /// Declared exchange, if any.
    pub fn exchange(&self, name: &str) -> Option<ExchangeSpec> {
        self.shared.state.lock().exchanges.get(name).cloned()
    }

    /// Declared queue, if any.
    pub fn queue(&self, name: &str) -> Option<QueueSpec> {
        self.shared
            .state
            .lock()
            .queues
            .get(name)
            .map(|q| q.spec.clone())
    }

    /// Routing keys bound to `queue`.
    pub fn bindings_for(&self, queue: &str) -> Vec<Binding> {
        self.shared
            .state
            .lock()
            .bindings
            .iter()
            .filter(|b| b.queue == queue)
            .cloned()
            .collect()
    }

    /// Drop every open session; their next operation fails with
    /// [`TransportError::ConnectionLost`].
    pub fn disconnect_all(&self) {
        let mut state = self.shared.state.lock();
        state.generation += 1;
        drop(state);
        self.shared.arrivals.notify_all();
    }

    /// Make subsequent [`Broker::connect`] calls fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.state.lock().refuse_connections = refuse;
    }
}

impl Broker for InMemoryBroker {
    type Session = InMemorySession;

    fn connect(&self, url: &str) -> Result<InMemorySession> {
        let state = self.shared.state.lock();
        if state.refuse_connections {
            return Err(TransportError::Connect(format!(
                "in-memory broker refused connection to {url}"
            )));
        }
        debug!(url, "in-memory session opened");
        Ok(InMemorySession {
            shared: self.shared.clone(),
            generation: state.generation,
            consuming: None,
            held: Vec::new(),
            closed: false,
        })
    }
}

/// Session on an [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemorySession {
    shared: Arc<Shared>,
    generation: u64,
    consuming: Option<String>,
    /// Delivery tags handed out by this session and not yet acknowledged.
    held: Vec<u64>,
    closed: bool,
}

impl InMemorySession {
    fn check_open(&self, state: &BrokerState) -> Result<()> {
        if self.closed {
            return Err(TransportError::ConnectionLost("session closed".into()));
        }
        if state.generation != self.generation {
            return Err(TransportError::ConnectionLost(
                "broker dropped the connection".into(),
            ));
        }
        Ok(())
    }

    /// Put held deliveries back at the head of their queue, as a broker does
    /// when a channel closes with unacknowledged messages.
    fn requeue_held(&mut self, state: &mut BrokerState) {
        let Some(queue_name) = &self.consuming else {
            return;
        };
        let Some(queue) = state.queues.get_mut(queue_name) else {
            return;
        };
        for tag in self.held.drain(..).rev() {
            if let Some(message) = queue.unacked.remove(&tag) {
                queue.ready.push_front(message);
            }
        }
    }
}

impl Session for InMemorySession {
    fn declare_exchange(&mut self, exchange: &ExchangeSpec) -> Result<()> {
        let mut state = self.shared.state.lock();
        self.check_open(&state)?;
        match state.exchanges.get(&exchange.name) {
            Some(existing) if existing != exchange => Err(TransportError::PreconditionFailed(
                format!(
                    "exchange '{}' exists as {} (durable={}), requested {} (durable={})",
                    exchange.name, existing.kind, existing.durable, exchange.kind, exchange.durable
                ),
            )),
            Some(_) => Ok(()),
            None => {
                state
                    .exchanges
                    .insert(exchange.name.clone(), exchange.clone());
                Ok(())
            }
        }
    }

    fn declare_queue(&mut self, queue: &QueueSpec) -> Result<()> {
        let mut state = self.shared.state.lock();
        self.check_open(&state)?;
        match state.queues.get(&queue.name) {
            Some(existing) if existing.spec != *queue => {
                Err(TransportError::PreconditionFailed(format!(
                    "queue '{}' exists with different parameters",
                    queue.name
                )))
            }
            Some(_) => Ok(()),
            None => {
                state
                    .queues
                    .insert(queue.name.clone(), QueueState::new(queue.clone()));
                Ok(())
            }
        }
    }

    fn bind_queue(&mut self, binding: &Binding) -> Result<()> {
        let mut state = self.shared.state.lock();
        self.check_open(&state)?;
        if !state.exchanges.contains_key(&binding.exchange) {
            return Err(TransportError::NotFound(format!(
                "exchange '{}'",
                binding.exchange
            )));
        }
        if !state.queues.contains_key(&binding.queue) {
            return Err(TransportError::NotFound(format!("queue '{}'", binding.queue)));
        }
        if !state.bindings.contains(binding) {
            state.bindings.push(binding.clone());
        }
        Ok(())
    }

    fn consume(&mut self, queue: &str, consumer_tag: &str) -> Result<()> {
        let state = self.shared.state.lock();
        self.check_open(&state)?;
        if !state.queues.contains_key(queue) {
            return Err(TransportError::NotFound(format!("queue '{queue}'")));
        }
        debug!(queue, consumer_tag, "in-memory consumer registered");
        self.consuming = Some(queue.to_owned());
        Ok(())
    }

    fn publish(&mut self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()> {
        let mut state = self.shared.state.lock();
        self.check_open(&state)?;
        let spec = state
            .exchanges
            .get(exchange)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("exchange '{exchange}'")))?;
        state.publish_count += 1;
        let routed = state.route(&spec, routing_key, payload);
        trace!(exchange, routing_key, routed, "in-memory publish");
        drop(state);
        if routed > 0 {
            self.shared.arrivals.notify_all();
        }
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Poll> {
        let queue_name = self
            .consuming
            .clone()
            .ok_or_else(|| TransportError::Protocol("poll called before consume".into()))?;
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            self.check_open(&state)?;
            let tag = state.next_tag + 1;
            let queue = state
                .queues
                .get_mut(&queue_name)
                .ok_or_else(|| TransportError::NotFound(format!("queue '{queue_name}'")))?;
            if let Some(message) = queue.ready.pop_front() {
                queue.unacked.insert(tag, message.clone());
                state.next_tag = tag;
                self.held.push(tag);
                return Ok(Poll::Delivery(Delivery {
                    tag: DeliveryTag(tag),
                    routing_key: message.routing_key,
                    payload: message.payload,
                }));
            }
            if self
                .shared
                .arrivals
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                self.check_open(&state)?;
                return Ok(Poll::Idle);
            }
        }
    }

    fn ack(&mut self, tag: DeliveryTag) -> Result<()> {
        let mut state = self.shared.state.lock();
        self.check_open(&state)?;
        let position = self
            .held
            .iter()
            .position(|held| *held == tag.0)
            .ok_or_else(|| {
                TransportError::PreconditionFailed(format!("unknown delivery tag {tag}"))
            })?;
        self.held.remove(position);
        if let Some(queue) = self
            .consuming
            .as_ref()
            .and_then(|name| state.queues.get_mut(name))
        {
            queue.unacked.remove(&tag.0);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let shared = self.shared.clone();
        let mut state = shared.state.lock();
        self.requeue_held(&mut state);
        self.closed = true;
        drop(state);
        shared.arrivals.notify_all();
        debug!("in-memory session closed");
        Ok(())
    }
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
