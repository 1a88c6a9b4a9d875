//! Ingest - Signed webhook receiver with exactly-once message storage.
//!
//! This library provides the modules shared by the two binaries:
//! - `ingest-server`: HTTP service receiving and querying messages
//! - `webhook-send`: Command-line sender that signs and posts a test message
//!
//! ## Architecture
//!
//! ```text
//! Webhook → signature check → payload validation → MessageStore (insert-if-absent)
//!                                                        ↑
//!                                   /messages, /stats ───┘
//! ```

pub mod config;
pub mod ingest;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use ingest::{ingest, sign_body, verify_signature, IngestError, SIGNATURE_HEADER};
pub use store::{InsertOutcome, Message, MessageStore, NewMessage, StoreError};
pub use web::{router, AppState};
