//! Webhook Send - Signs a message payload and posts it to a running server.
//!
//! Sending the same `message_id` twice exercises the duplicate path; a
//! different `--secret` exercises the signature rejection path.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use reqwest::Client;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

use ingest::{sign_body, SIGNATURE_HEADER};

/// Sign a message webhook and post it to an ingest server
#[derive(Parser, Debug)]
#[command(name = "webhook-send")]
#[command(about = "Sign a message payload and POST it to the ingestion endpoint")]
struct Args {
    /// Ingestion endpoint URL
    #[arg(long, env = "WEBHOOK_URL", default_value = "http://127.0.0.1:8000/webhook")]
    url: Url,

    /// Signing secret
    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    secret: String,

    /// Sender phone number (E.164)
    #[arg(long, env = "WEBHOOK_FROM", default_value = "+919876543210")]
    from: String,

    /// Recipient phone number (E.164)
    #[arg(long, env = "WEBHOOK_TO", default_value = "+14155550100")]
    to: String,

    /// Message id; random when omitted
    message_id: Option<String>,

    /// Message text
    text: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    let message_id = args
        .message_id
        .unwrap_or_else(|| format!("msg_{:016x}", rand::random::<u64>()));

    let payload = json!({
        "message_id": message_id,
        "from": args.from,
        "to": args.to,
        "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "text": args.text,
    });

    // Sign exactly the bytes that are sent
    let body = serde_json::to_vec(&payload).context("Failed to serialize payload")?;
    let signature = sign_body(&args.secret, &body).context("Failed to sign payload")?;

    let client = Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .post(args.url.clone())
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(body)
        .send()
        .await
        .with_context(|| format!("Failed to POST to {}", args.url))?;

    let status = response.status();
    let text = response.text().await.context("Failed to read response body")?;

    info!(
        url = %args.url,
        message_id = %message_id,
        status = status.as_u16(),
        response = %text,
        "webhook_sent"
    );

    Ok(())
}
