//! ---
//! spine_section: "01-core-functionality"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Component runtime and lifecycle management."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
//! Routing of decoded envelopes to user handler slots.
//!
//! Each [`Kind`] maps to exactly one slot. The quit sentinel on the command
//! slot is intercepted here and never reaches user code.

use std::fmt;

use spine_msg::{Envelope, Kind};
use tracing::{debug, info};

use crate::component::Context;
use crate::error::{Result, RuntimeError};

/// Outcome of a user handler. Errors are logged by the loop, never fatal.
pub type HandlerResult = anyhow::Result<()>;

/// Handler slot an envelope is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Fire-and-forget data, kind 1.
    Message,
    /// Instruction to act, kind 2. Quit is handled before this slot.
    Command,
    /// Request for information, kind 3.
    Query,
}

impl Slot {
    /// The slot serving `kind`. Total over [`Kind`].
    pub fn for_kind(kind: Kind) -> Self {
        match kind {
            Kind::Message => Slot::Message,
            Kind::Command => Slot::Command,
            Kind::Query => Slot::Query,
        }
    }

    /// Lowercase name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Message => "message",
            Slot::Command => "command",
            Slot::Query => "query",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User behaviour plugged into a component.
///
/// Every method has a no-op default, so implementors only override the slots
/// they care about. Handlers run on the component thread, one at a time.
pub trait Handler {
    /// Runs once after the inbox is declared and consumed, before the first poll.
    /// An error here aborts the start.
    fn on_start(&mut self, _ctx: &mut Context<'_>) -> HandlerResult {
        Ok(())
    }

    /// Receives [`Kind::Message`] envelopes. Reply with [`Context::send`].
    fn on_message(&mut self, _ctx: &mut Context<'_>, _envelope: Envelope) -> HandlerResult {
        Ok(())
    }

    /// Receives every command except the quit sentinel.
    fn on_command(&mut self, _ctx: &mut Context<'_>, _envelope: Envelope) -> HandlerResult {
        Ok(())
    }

    /// Receives [`Kind::Query`] envelopes. There is no implicit reply path;
    /// answer by sending to the asker's inbox.
    fn on_query(&mut self, _ctx: &mut Context<'_>, _envelope: Envelope) -> HandlerResult {
        Ok(())
    }
}

impl<T: Handler + ?Sized> Handler for Box<T> {
    fn on_start(&mut self, ctx: &mut Context<'_>) -> HandlerResult {
        (**self).on_start(ctx)
    }

    fn on_message(&mut self, ctx: &mut Context<'_>, envelope: Envelope) -> HandlerResult {
        (**self).on_message(ctx, envelope)
    }

    fn on_command(&mut self, ctx: &mut Context<'_>, envelope: Envelope) -> HandlerResult {
        (**self).on_command(ctx, envelope)
    }

    fn on_query(&mut self, ctx: &mut Context<'_>, envelope: Envelope) -> HandlerResult {
        (**self).on_query(ctx, envelope)
    }
}

/// Handler that ignores everything. The component still honours quit.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl Handler for NoopHandler {}

type StartCallback = Box<dyn FnMut(&mut Context<'_>) -> HandlerResult + Send>;
type SlotCallback = Box<dyn FnMut(&mut Context<'_>, Envelope) -> HandlerResult + Send>;

/// Closure-based [`Handler`], for components that do not need their own type.
///
/// ```ignore
/// let handlers = Handlers::new().on_message(|ctx, envelope| {
///     tracing::info!(component = ctx.name(), body = %envelope.body(), "got message");
///     Ok(())
/// });
/// ```
#[derive(Default)]
pub struct Handlers {
    start: Option<StartCallback>,
    message: Option<SlotCallback>,
    command: Option<SlotCallback>,
    query: Option<SlotCallback>,
}

impl Handlers {
    /// No callbacks; every slot is a logged no-op.
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback run once before the first poll.
    pub fn on_start<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut Context<'_>) -> HandlerResult + Send + 'static,
    {
        self.start = Some(Box::new(callback));
        self
    }

    /// Callback for messages.
    pub fn on_message<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut Context<'_>, Envelope) -> HandlerResult + Send + 'static,
    {
        self.message = Some(Box::new(callback));
        self
    }

    /// Callback for commands other than quit.
    pub fn on_command<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut Context<'_>, Envelope) -> HandlerResult + Send + 'static,
    {
        self.command = Some(Box::new(callback));
        self
    }

    /// Callback for queries.
    pub fn on_query<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut Context<'_>, Envelope) -> HandlerResult + Send + 'static,
    {
        self.query = Some(Box::new(callback));
        self
    }

    fn call_slot(&mut self, slot: Slot, ctx: &mut Context<'_>, envelope: Envelope) -> HandlerResult {
        let callback = match slot {
            Slot::Message => self.message.as_mut(),
            Slot::Command => self.command.as_mut(),
            Slot::Query => self.query.as_mut(),
        };
        match callback {
            Some(callback) => callback(ctx, envelope),
            None => {
                debug!(component = ctx.name(), %slot, "no handler registered for slot");
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("start", &self.start.is_some())
            .field("message", &self.message.is_some())
            .field("command", &self.command.is_some())
            .field("query", &self.query.is_some())
            .finish()
    }
}

impl Handler for Handlers {
    fn on_start(&mut self, ctx: &mut Context<'_>) -> HandlerResult {
        match self.start.as_mut() {
            Some(callback) => callback(ctx),
            None => Ok(()),
        }
    }

    fn on_message(&mut self, ctx: &mut Context<'_>, envelope: Envelope) -> HandlerResult {
        self.call_slot(Slot::Message, ctx, envelope)
    }

    fn on_command(&mut self, ctx: &mut Context<'_>, envelope: Envelope) -> HandlerResult {
        self.call_slot(Slot::Command, ctx, envelope)
    }

    fn on_query(&mut self, ctx: &mut Context<'_>, envelope: Envelope) -> HandlerResult {
        self.call_slot(Slot::Query, ctx, envelope)
    }
}

/// Route one envelope to its slot.
///
/// A quit command is acknowledged, the stop flag is raised and the user
/// command handler is skipped. Handler failures come back as
/// [`RuntimeError::Handler`]; transport failures while acknowledging quit
/// come back as [`RuntimeError::Transport`].
pub(crate) fn dispatch<H: Handler + ?Sized>(
    handler: &mut H,
    ctx: &mut Context<'_>,
    mut envelope: Envelope,
) -> Result<()> {
    let slot = Slot::for_kind(envelope.kind());

    if slot == Slot::Command && envelope.is_quit() {
        ctx.ack(&mut envelope)?;
        info!(component = ctx.name(), "quit command received; stopping");
        ctx.stop();
        return Ok(());
    }

    let outcome = match slot {
        Slot::Message => handler.on_message(ctx, envelope),
        Slot::Command => handler.on_command(ctx, envelope),
        Slot::Query => handler.on_query(ctx, envelope),
    };
    outcome.map_err(|source| RuntimeError::Handler { slot, source })
}
