//! ---
//! spine_section: "15-testing-qa-runbook"
//! spine_subsection: "tests"
//! spine_type: "test"
//! spine_scope: "code"
//! spine_description: "Components exchanging envelopes over a shared broker."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use spine_core::{
    inbox_routing_key, ComponentIdentity, ComponentRuntime, Envelope, Handler, Handlers,
    Lifecycle, NoopHandler, RuntimeMetrics, StopHandle,
};
use spine_transport::InMemoryBroker;

const POLL: Duration = Duration::from_millis(10);
const DEADLINE: Duration = Duration::from_secs(5);

type Outcome = spine_core::Result<(Lifecycle, RuntimeMetrics)>;

struct Running {
    stop: StopHandle,
    thread: JoinHandle<Outcome>,
}

impl Running {
    /// Wait for the component to exit on its own; stop it and fail if it does not.
    fn join(self) -> (Lifecycle, RuntimeMetrics) {
        let started = Instant::now();
        while !self.thread.is_finished() {
            if started.elapsed() > DEADLINE {
                self.stop.stop();
                let _ = self.thread.join();
                panic!("component did not stop within {DEADLINE:?}");
            }
            thread::sleep(Duration::from_millis(5));
        }
        self.thread
            .join()
            .expect("component thread panicked")
            .expect("component failed")
    }
}

/// Start `name` on its own thread and return once its inbox is consumed.
fn spawn_component<H>(broker: &InMemoryBroker, name: &str, handler: H) -> Running
where
    H: Handler + Send + 'static,
{
    let (ready_tx, ready_rx) = mpsc::channel();
    let handler = ReadySignal {
        inner: handler,
        ready: Some(ready_tx),
    };
    let identity = ComponentIdentity::new(name, "memory://local").expect("identity");
    let mut runtime =
        ComponentRuntime::new(identity, broker.clone(), handler).with_poll_interval(POLL);
    let stop = runtime.stop_handle();

    let thread = thread::spawn(move || -> Outcome {
        runtime.start()?;
        Ok((runtime.state(), runtime.metrics()))
    });
    ready_rx
        .recv_timeout(DEADLINE)
        .expect("component never became ready");
    Running { stop, thread }
}

/// Reports readiness once `on_start` has run, then delegates.
struct ReadySignal<H> {
    inner: H,
    ready: Option<mpsc::Sender<()>>,
}

impl<H: Handler> Handler for ReadySignal<H> {
    fn on_start(&mut self, ctx: &mut spine_core::Context<'_>) -> spine_core::HandlerResult {
        self.inner.on_start(ctx)?;
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(());
        }
        Ok(())
    }

    fn on_message(
        &mut self,
        ctx: &mut spine_core::Context<'_>,
        envelope: Envelope,
    ) -> spine_core::HandlerResult {
        self.inner.on_message(ctx, envelope)
    }

    fn on_command(
        &mut self,
        ctx: &mut spine_core::Context<'_>,
        envelope: Envelope,
    ) -> spine_core::HandlerResult {
        self.inner.on_command(ctx, envelope)
    }

    fn on_query(
        &mut self,
        ctx: &mut spine_core::Context<'_>,
        envelope: Envelope,
    ) -> spine_core::HandlerResult {
        self.inner.on_query(ctx, envelope)
    }
}

/// Run a short-lived component whose only job is to send `envelopes` at start.
fn send_from(broker: &InMemoryBroker, name: &str, envelopes: Vec<Envelope>) -> RuntimeMetrics {
    let handlers = Handlers::new().on_start(move |ctx| {
        for envelope in &envelopes {
            ctx.send(envelope)?;
        }
        ctx.stop();
        Ok(())
    });
    let identity = ComponentIdentity::new(name, "memory://local").expect("identity");
    let mut runtime =
        ComponentRuntime::new(identity, broker.clone(), handlers).with_poll_interval(POLL);
    runtime.start().expect("sender runs");
    runtime.metrics()
}

#[test]
fn message_reaches_named_component() {
    let broker = InMemoryBroker::new();
    let received: Arc<Mutex<Vec<JsonValue>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = received.clone();
    let worker = spawn_component(
        &broker,
        "worker-1",
        Handlers::new().on_message(move |ctx, envelope| {
            seen.lock().push(envelope.into_body());
            ctx.stop();
            Ok(())
        }),
    );

    let sent = send_from(
        &broker,
        "sender",
        vec![Envelope::message(json!({"x": 1})).with_destination(inbox_routing_key("worker-1"))],
    );
    let (state, metrics) = worker.join();

    assert_eq!(sent.sent, 1);
    assert_eq!(state, Lifecycle::Stopped);
    assert_eq!(metrics.received, 1);
    assert_eq!(*received.lock(), vec![json!({"x": 1})]);
}

#[test]
fn query_is_not_seen_by_command_handler() {
    let broker = InMemoryBroker::new();
    let calls: Arc<Mutex<Vec<(&'static str, JsonValue)>>> = Arc::new(Mutex::new(Vec::new()));
    let (queries, commands) = (calls.clone(), calls.clone());
    let worker = spawn_component(
        &broker,
        "worker-1",
        Handlers::new()
            .on_query(move |_, envelope| {
                queries.lock().push(("query", envelope.into_body()));
                Ok(())
            })
            .on_command(move |_, envelope| {
                commands.lock().push(("command", envelope.into_body()));
                Ok(())
            }),
    );

    let inbox = inbox_routing_key("worker-1");
    send_from(
        &broker,
        "controller",
        vec![
            Envelope::query(json!({"status": "?"})).with_destination(inbox.clone()),
            Envelope::quit().with_destination(inbox),
        ],
    );
    worker.join();

    assert_eq!(*calls.lock(), vec![("query", json!({"status": "?"}))]);
}

#[test]
fn quit_from_peer_stops_component_and_drains_inbox() {
    let broker = InMemoryBroker::new();
    let worker = spawn_component(&broker, "worker-1", NoopHandler);

    send_from(
        &broker,
        "controller",
        vec![Envelope::quit().with_destination(inbox_routing_key("worker-1"))],
    );
    let (state, metrics) = worker.join();

    assert_eq!(state, Lifecycle::Stopped);
    assert_eq!(metrics.dispatched, 1);
    assert_eq!(broker.queue_depth("components.worker-1.inbox"), Some(0));
    assert_eq!(broker.unacked_count("components.worker-1.inbox"), Some(0));
}

#[test]
fn one_send_fans_out_to_every_destination() {
    let broker = InMemoryBroker::new();
    let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let workers: Vec<Running> = ["left", "right"]
        .into_iter()
        .map(|name| {
            let seen = received.clone();
            spawn_component(
                &broker,
                name,
                Handlers::new().on_message(move |ctx, _| {
                    seen.lock().push(ctx.name().to_owned());
                    ctx.stop();
                    Ok(())
                }),
            )
        })
        .collect();

    let sent = send_from(
        &broker,
        "broadcaster",
        vec![Envelope::message(json!("hello"))
            .with_destinations([inbox_routing_key("left"), inbox_routing_key("right")])],
    );
    for worker in workers {
        worker.join();
    }

    assert_eq!(sent.sent, 2);
    let mut names = received.lock().clone();
    names.sort();
    assert_eq!(names, vec!["left".to_owned(), "right".to_owned()]);
}

#[test]
fn messages_to_unknown_components_are_not_delivered_elsewhere() {
    let broker = InMemoryBroker::new();
    let received = Arc::new(Mutex::new(0usize));
    let seen = received.clone();
    let worker = spawn_component(
        &broker,
        "worker-1",
        Handlers::new().on_message(move |_, _| {
            *seen.lock() += 1;
            Ok(())
        }),
    );

    send_from(
        &broker,
        "sender",
        vec![
            Envelope::message(1).with_destination(inbox_routing_key("nobody")),
            Envelope::quit().with_destination(inbox_routing_key("worker-1")),
        ],
    );
    worker.join();

    assert_eq!(*received.lock(), 0);
}
