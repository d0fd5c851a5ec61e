//! `/news` handlers.

use async_trait::async_trait;
use serde_json::json;

use super::NEWS_EVENT;
use crate::domain::Message;
use crate::error::RelayError;
use crate::service::{ConnectHandler, EventContext};

/// Sends one item to the new reader and one to every reader.
#[derive(Debug)]
pub struct Greeting;

#[async_trait]
impl ConnectHandler for Greeting {
    async fn on_connect(&self, ctx: &EventContext<'_>) -> Result<(), RelayError> {
        ctx.reply(Message::new(
            NEWS_EVENT,
            json!({ "news": "Item to current socket" }),
        ))
        .await;
        ctx.relay()
            .broadcast(
                ctx.namespace(),
                Message::new(NEWS_EVENT, json!({ "news": "Item to everyone" })),
                None,
            )
            .await;
        Ok(())
    }
}
