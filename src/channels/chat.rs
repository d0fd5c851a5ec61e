//! `/chat` handlers.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::CHAT_EVENT;
use crate::domain::Message;
use crate::error::RelayError;
use crate::service::{ConnectHandler, EventContext, EventHandler};

fn chat_message(text: Value) -> Message {
    Message::new(CHAT_EVENT, json!({ "msg": text }))
}

fn text_of(message: &Message) -> Value {
    message.data().get("msg").cloned().unwrap_or(Value::Null)
}

/// Greets a new member privately, then announces to the whole room.
#[derive(Debug)]
pub struct Greeting;

#[async_trait]
impl ConnectHandler for Greeting {
    async fn on_connect(&self, ctx: &EventContext<'_>) -> Result<(), RelayError> {
        ctx.reply(chat_message(json!("Only this socket will receive")))
            .await;
        ctx.relay()
            .broadcast(
                ctx.namespace(),
                chat_message(json!("Everyone in /chat will receive")),
                None,
            )
            .await;
        Ok(())
    }
}

/// `echo {msg}` → `a message {msg}` to the sender only.
#[derive(Debug)]
pub struct Echo;

#[async_trait]
impl EventHandler for Echo {
    async fn handle(&self, ctx: &EventContext<'_>, message: Message) -> Result<(), RelayError> {
        ctx.reply(chat_message(text_of(&message))).await;
        Ok(())
    }
}

/// `new message {msg}` → `a message {msg}` to the room.
#[derive(Debug)]
pub struct NewMessage;

#[async_trait]
impl EventHandler for NewMessage {
    async fn handle(&self, ctx: &EventContext<'_>, message: Message) -> Result<(), RelayError> {
        ctx.broadcast(chat_message(text_of(&message))).await;
        Ok(())
    }
}
