//! Session gateway: the single authenticated connection to the platform.
//!
//! The engine only sees the [`SessionGateway`] trait. The production
//! implementation is [`SubprocessGateway`], which drives an external gateway
//! program over JSON Lines (see `ferry-gateway-protocol`).

mod error;
pub mod subprocess;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

pub use error::{FailureClass, GatewayError};
pub use ferry_gateway_protocol::{ChannelId, MessageId, RawMessage};
pub use subprocess::{LaunchSpec, SubprocessGateway};

/// Primitives the forwarding engine needs from the platform.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    /// Whether the session is logged in and usable.
    async fn is_authenticated(&self) -> Result<bool, GatewayError>;

    /// Fetch one page of messages with `id > after_id`, ascending by id.
    ///
    /// An empty page means the channel has nothing newer.
    async fn fetch_messages(
        &self,
        channel: ChannelId,
        after_id: MessageId,
        limit: u32,
    ) -> Result<Vec<RawMessage>, GatewayError>;

    /// Forward `messages` from `from` to `to` as one unit.
    async fn forward(
        &self,
        from: ChannelId,
        to: ChannelId,
        messages: &[RawMessage],
    ) -> Result<(), GatewayError>;

    /// Release the connection. Called once at process shutdown.
    async fn shutdown(&self) {}
}
