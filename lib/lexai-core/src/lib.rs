//! Domain model, admission pipeline, and storage ports for the LexAI
//! contract-intelligence backend (§2–§5 of the design).
//!
//! This crate has no network I/O of its own beyond the store adapters in
//! [`store`]; the LLM provider client, the email dispatcher, and the
//! AMQP-backed job queue adapter live in `lexai-integrations`.

pub mod admission;
pub mod config;
pub mod diff;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod lock;
pub mod ports;
pub mod quota;
pub mod store;

pub use admission::{AdmissionOutcome, AdmissionRequest, AdmissionService, AdmissionState};
pub use error::{LexError, LexResult};
