use anyhow::{Context, Result};
use futures_lite::stream::StreamExt;
use lapin::{options::*, types::FieldTable, Connection, ConnectionProperties};

use crate::config::Config;
use crate::message::Message;
use crate::translator::Translator;

pub async fn start_pulse_handler(config: &Config, translator: &Translator) -> Result<()> {
    let conn = Connection::connect(&config.amqp_addr, ConnectionProperties::default())
        .await
        .with_context(|| format!("couldn't connect to {}", config.amqp_addr))?;

    tracing::info!(queue = %config.amqp_queue, "CONNECTED");

    let channel = conn.create_channel().await?;
    channel
        .queue_declare(
            &config.amqp_queue,
            QueueDeclareOptions::default(),
            FieldTable::default(),
        )
        .await?;
    for routing_key in &config.amqp_routing_keys {
        channel
            .queue_bind(
                &config.amqp_queue,
                &config.amqp_exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
    }

    let mut consumer = channel
        .basic_consume(
            &config.amqp_queue,
            "resultsdb-updater",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    while let Some(msg) = next_delivery(consumer.next().await)? {
        let fallback_id = msg.properties.message_id().as_ref().map(|id| id.as_str().to_string());
        match decode_message(&msg.data, fallback_id) {
            Ok(message) => translator.post_to_resultsdb(&message).await,
            Err(e) => tracing::error!(
                routing_key = msg.routing_key.as_str(),
                "Error while decoding message: {:#}",
                e
            ),
        }
        msg.ack(BasicAckOptions::default()).await?;
    }

    Ok(())
}

/// Unwraps the next item of the consumer stream. A stream error ends the
/// handler so the caller reconnects.
fn next_delivery<T>(next: Option<lapin::Result<T>>) -> Result<Option<T>> {
    next.transpose().context("message consumer failed")
}

/// Decodes a delivery body, taking the AMQP `message_id` property when the
/// envelope carries no id of its own.
pub fn decode_message(data: &[u8], fallback_id: Option<String>) -> Result<Message> {
    let payload = std::str::from_utf8(data).context("payload is not UTF-8")?;
    let mut message: Message =
        serde_json::from_str(payload).context("payload is not a CI message")?;
    if message.headers.message_id.is_none() {
        message.headers.message_id = fallback_id;
    }
    Ok(message)
}
