//! Webhook ingestion pipeline.
//!
//! ## Processing Flow
//!
//! ```text
//! raw body + X-Signature → verify_signature() → parse_payload() → insert_if_absent()
//! ```
//!
//! Authentication and validation failures never reach the store. Duplicate
//! deliveries are acknowledged like new ones; the store decides which is
//! which in a single atomic insert.

pub mod payload;
pub mod signature;

use thiserror::Error;
use tracing::{error, info};

use crate::store::{InsertOutcome, MessageStore, StoreError};

pub use payload::{is_e164, parse_payload, FieldError, WebhookPayload, MAX_TEXT_CHARS};
pub use signature::{sign_body, verify_signature, SIGNATURE_HEADER};

/// Why an ingestion attempt was not acknowledged.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Signature missing or wrong. Deliberately carries no detail.
    #[error("invalid signature")]
    Unauthorized,

    /// The body failed parsing or field validation.
    #[error("invalid payload: {} field(s) failed", .0.len())]
    Invalid(Vec<FieldError>),

    /// The message could not be written.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

/// Run one webhook delivery through verification, validation and storage.
///
/// `body` must be the exact bytes received; the signature covers them, and
/// they are parsed only after it checks out.
pub async fn ingest(
    store: &MessageStore,
    secret: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<InsertOutcome, IngestError> {
    if !verify_signature(secret, body, signature) {
        return Err(IngestError::Unauthorized);
    }

    let message = parse_payload(body).map_err(|errors| {
        info!(
            result = "validation_error",
            fields = ?errors.iter().map(|e| e.field.as_str()).collect::<Vec<_>>(),
            "webhook_payload_invalid"
        );
        IngestError::Invalid(errors)
    })?;

    let outcome = store.insert_if_absent(&message).await.map_err(|e| {
        error!(
            message_id = %message.message_id,
            error = %e,
            result = "persistence_error",
            "message_persist_failed"
        );
        IngestError::Persistence(e)
    })?;

    match outcome {
        InsertOutcome::Created => info!(
            message_id = %message.message_id,
            dup = false,
            result = "created",
            "message_created"
        ),
        InsertOutcome::Duplicate => info!(
            message_id = %message.message_id,
            dup = true,
            result = "duplicate",
            "message_duplicate"
        ),
    }

    Ok(outcome)
}
