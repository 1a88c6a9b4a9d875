//! Webhook payload parsing and validation.
//!
//! Every field is deserialized as optional so that a missing field is
//! reported by name together with any other failing fields, instead of
//! stopping at the first serde error.

use serde::{Deserialize, Serialize};

use crate::store::NewMessage;

/// Maximum length of `text`, in characters.
pub const MAX_TEXT_CHARS: usize = 4096;

/// Inbound webhook JSON body.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    pub message_id: Option<String>,
    #[serde(rename = "from")]
    pub from_msisdn: Option<String>,
    #[serde(rename = "to")]
    pub to_msisdn: Option<String>,
    pub ts: Option<String>,
    pub text: Option<String>,
}

/// One failing field and why it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Parse and validate a raw webhook body.
///
/// Returns every failing field at once. A body that is not a JSON object
/// with string fields fails on the pseudo-field `body`.
pub fn parse_payload(body: &[u8]) -> Result<NewMessage, Vec<FieldError>> {
    let payload: WebhookPayload = serde_json::from_slice(body)
        .map_err(|e| vec![FieldError::new("body", format!("invalid JSON payload: {}", e))])?;

    payload.validate()
}

impl WebhookPayload {
    /// Check every field and build the record to store.
    pub fn validate(self) -> Result<NewMessage, Vec<FieldError>> {
        let mut errors = Vec::new();

        match self.message_id.as_deref() {
            None => errors.push(FieldError::new("message_id", "field required")),
            Some("") => errors.push(FieldError::new("message_id", "must not be empty")),
            Some(_) => {}
        }

        for (field, value) in [("from", &self.from_msisdn), ("to", &self.to_msisdn)] {
            match value.as_deref() {
                None => errors.push(FieldError::new(field, "field required")),
                Some(v) if !is_e164(v) => errors.push(FieldError::new(
                    field,
                    "must be E.164 format (+ then digits)",
                )),
                Some(_) => {}
            }
        }

        if self.ts.is_none() {
            errors.push(FieldError::new("ts", "field required"));
        }

        if let Some(text) = &self.text {
            let length = text.chars().count();
            if length > MAX_TEXT_CHARS {
                errors.push(FieldError::new(
                    "text",
                    format!("must be at most {} characters, got {}", MAX_TEXT_CHARS, length),
                ));
            }
        }

        match (self.message_id, self.from_msisdn, self.to_msisdn, self.ts) {
            (Some(message_id), Some(from_msisdn), Some(to_msisdn), Some(ts)) if errors.is_empty() => {
                Ok(NewMessage {
                    message_id,
                    from_msisdn,
                    to_msisdn,
                    ts,
                    text: self.text,
                })
            }
            _ => Err(errors),
        }
    }
}

/// `+` followed by one or more ASCII digits.
pub fn is_e164(value: &str) -> bool {
    match value.strip_prefix('+') {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}
