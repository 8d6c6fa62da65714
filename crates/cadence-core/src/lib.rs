//! # cadence-core
//!
//! Core abstractions for the Cadence participant scheduling engine.
//!
//! This crate provides the foundational types used across all Cadence components:
//!
//! - **Identifiers**: Strongly-typed participant health codes and study IDs
//! - **Client Info**: `User-Agent` parsing with a bounded, injectable cache
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialisation, spans, and redaction
//!
//! ## Example
//!
//! ```rust
//! use cadence_core::prelude::*;
//!
//! let participant = HealthCode::new("hc-0001").unwrap();
//! let study = StudyId::new("asthma").unwrap();
//!
//! let cache = ClientInfoCache::new(100);
//! let client = cache.get("Asthma/26 (iPhone; iOS 17.1) BridgeSDK/4");
//! assert!(client.is_targeted_app_version(Some(20), None));
//! # let _ = (participant, study);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod client_info;
pub mod error;
pub mod id;
pub mod observability;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client_info::{ClientInfo, ClientInfoCache};
    pub use crate::error::{Error, Result};
    pub use crate::id::{HealthCode, StudyId};
}

// Re-export key types at crate root for ergonomics
pub use client_info::{ClientInfo, ClientInfoCache};
pub use error::{Error, Result};
pub use id::{HealthCode, StudyId};
pub use observability::{LogFormat, Redacted, init_logging, schedule_span};
