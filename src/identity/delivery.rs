//! Out-of-band delivery of verification codes.
//!
//! Registration issues a confirmation challenge that must reach the
//! registrant outside the RPC channel. The seam is a trait so deployments
//! plug in email/SMS providers; the default logs the code for operators,
//! and tests capture it over a channel.

use crate::error::StrataDbResult;
use async_trait::async_trait;
use log::info;
use tokio::sync::mpsc;

#[async_trait]
pub trait CodeDelivery: Send + Sync {
    async fn deliver(&self, handle: &str, email: &str, code: &str) -> StrataDbResult<()>;
}

/// Default delivery: write the code to the operator log.
pub struct LogDelivery;

#[async_trait]
impl CodeDelivery for LogDelivery {
    async fn deliver(&self, handle: &str, email: &str, code: &str) -> StrataDbResult<()> {
        info!("verification code for {} <{}>: {}", handle, email, code);
        Ok(())
    }
}

/// Test delivery: forward (handle, code) pairs over a channel.
pub struct ChannelDelivery {
    sender: mpsc::UnboundedSender<(String, String)>,
}

impl ChannelDelivery {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, String)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl CodeDelivery for ChannelDelivery {
    async fn deliver(&self, handle: &str, _email: &str, code: &str) -> StrataDbResult<()> {
        // Receiver may be gone in shutdown paths; that is not a failure.
        let _ = self.sender.send((handle.to_string(), code.to_string()));
        Ok(())
    }
}
