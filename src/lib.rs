//! ESMA MiCA interim register watcher.
//!
//! Fetches the interim CASP and non-compliant-entity registers, normalizes
//! them into a canonical schema, diffs each snapshot against the previously
//! persisted one, and publishes versioned CSV/JSON artifacts plus a delta
//! manifest and cumulative run metadata.

pub mod config;
pub mod datasets;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod meta;
pub mod normalize;
pub mod pipeline;
pub mod publish;
pub mod source;
pub mod state;
pub mod table;
