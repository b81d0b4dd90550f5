//! Messaging trait and dynamic dispatch companion.

use crate::error::Result;
use crate::{InboundMessage, OutboundMessage};
use futures::Stream;
use std::pin::Pin;

/// Message stream type.
pub type InboundStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

/// Static trait for messaging adapters.
/// Use this for type-safe implementations.
pub trait Messaging: Send + Sync + 'static {
    /// Unique name for this adapter.
    fn name(&self) -> &str;

    /// Start the adapter and return inbound message stream.
    fn start(&self) -> impl std::future::Future<Output = Result<InboundStream>> + Send;

    /// Send a message to a conversation.
    fn send(
        &self,
        conversation_id: &str,
        message: OutboundMessage,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Graceful shutdown.
    fn shutdown(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Dynamic trait for runtime polymorphism.
/// Use this when you need `Arc<dyn MessagingDyn>` for storing different adapters.
pub trait MessagingDyn: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn start<'a>(
        &'a self,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<InboundStream>> + Send + 'a>>;

    fn send<'a>(
        &'a self,
        conversation_id: &'a str,
        message: OutboundMessage,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    fn shutdown<'a>(&'a self) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;
}

/// Blanket implementation: any type implementing Messaging automatically implements MessagingDyn.
impl<T: Messaging> MessagingDyn for T {
    fn name(&self) -> &str {
        Messaging::name(self)
    }

    fn start<'a>(
        &'a self,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<InboundStream>> + Send + 'a>> {
        Box::pin(Messaging::start(self))
    }

    fn send<'a>(
        &'a self,
        conversation_id: &'a str,
        message: OutboundMessage,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(Messaging::send(self, conversation_id, message))
    }

    fn shutdown<'a>(&'a self) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(Messaging::shutdown(self))
    }
}
