// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel Frequency Response (CFR) capture correlation engine.
//!
//! Joins the DBR payload-location event and the TX/RX completion event for a
//! PPDU into one versioned capture record and forwards it to a sink.

pub mod core;

pub use crate::core::correlator::{CfrCorrelator, IngestOutcome, SessionState};
pub use crate::core::error::{CfrError, CfrResult};
