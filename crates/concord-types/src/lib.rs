// ─────────────────────────────────────────────────────────────────────
// Concord Kernel — Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Type definitions, configuration, and error hierarchy for the
//! Concord Kernel: the transition trust gate and proof ledger.

pub mod config;
pub mod error;
pub mod residual;

pub use config::ConcordConfig;
pub use error::{ConcordError, ConcordResult};
pub use residual::{clamp_score, ResidualResult, Verdict};
