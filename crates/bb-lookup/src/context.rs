//! Background context seam.
//!
//! The background context is an isolated unit of execution reachable only
//! through messages. A [`ContextSpawner`] creates one and hands it the
//! [`ResponseSink`] it must use for every answer.

use std::sync::Weak;

use crate::error::LookupError;
use crate::message::{ContextMessage, Response};

/// A live background context.
///
/// Both methods are called while the coordinator holds its state lock, so
/// implementations must not block on or call back into the coordinator.
/// Queue the message and return.
pub trait BackgroundContext: Send {
    /// Post a message into the context.
    fn post(&mut self, message: ContextMessage);

    /// Stop the context. Messages not yet processed are discarded.
    fn terminate(&mut self);
}

/// Creates background contexts.
pub trait ContextSpawner: Send + Sync {
    /// Start a new context that answers through `sink`.
    fn spawn(&self, sink: ResponseSink) -> Result<Box<dyn BackgroundContext>, LookupError>;
}

/// Receiver side of inbound responses.
pub trait InboundHandler: Send + Sync {
    fn on_inbound_message(&self, response: Response);
}

/// Handle a background context uses to deliver responses.
///
/// Holds the coordinator weakly: responses delivered after the coordinator
/// is gone are dropped.
#[derive(Clone)]
pub struct ResponseSink {
    handler: Weak<dyn InboundHandler>,
}

impl ResponseSink {
    pub fn new(handler: Weak<dyn InboundHandler>) -> Self {
        Self { handler }
    }

    /// Hand a response back to the coordinator.
    pub fn deliver(&self, response: Response) {
        match self.handler.upgrade() {
            Some(handler) => handler.on_inbound_message(response),
            None => log::debug!("dropping response {} for a released coordinator", response.id),
        }
    }
}

impl std::fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSink")
            .field("live", &(self.handler.strong_count() > 0))
            .finish()
    }
}
