//! # Lumi Common Library
//!
//! Shared code for the Lumi services and any client that re-derives their
//! decisions:
//! - Access stage resolution (`access`)
//! - Score normalization and the potential boost policy (`score`)
//! - Configuration loading and root folder resolution
//! - Ingest event types and the EventBus
//! - SSE helpers

pub mod access;
pub mod config;
pub mod error;
pub mod events;
pub mod score;
pub mod sse;

pub use error::{Error, Result};
