// ─────────────────────────────────────────────────────────────────────
// Concord Kernel — Core Engine
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Residual scoring, per-actor integrity, and the hash-chained proof
//! ledger behind the transition gate.
//!
//! # Invariants
//!
//! 1. **Rejected transitions never reach the ledger**: a `REJECT` verdict
//!    still charges both actors' integrity, but the chain is only
//!    extended for `VALID`, `CAUTION` and `SUSPICIOUS` verdicts.
//!
//! 2. **Forbidden pairs are absolute**: a logic residual of 1.0 rejects
//!    regardless of how small the embedding distance is.
//!
//! 3. **Integrity stays in `[floor, 1]`**: every update is clamped, and
//!    invalid divergence input is clamped to `[0, 1]` with a warning.
//!
//! 4. **The chain is append-only**: each node's `prev_hash` is the
//!    previous node's hash (genesis sentinel for index 0), and each hash
//!    is SHA-256 over a fixed binary encoding, so any edit is detectable
//!    by `verify_chain`.
//!
//! 5. **Errors mutate nothing**: unknown states and malformed requests
//!    fail before any integrity record or ledger node is touched.

pub mod gate;
pub mod integrity;
pub mod ledger;
pub mod residual;
pub mod state_space;

pub use gate::{
    ActorStanding, Delta, DetectReport, TransitionGate, TransitionOutcome, TransitionRequest,
};
pub use integrity::{
    DomainIntegrity, IntegrityChange, IntegrityKey, IntegrityRecord, IntegritySummary,
    IntegrityTracker,
};
pub use ledger::{
    verify_chain, ChainVerification, ProofChain, ProofDraft, ProofLedger, ProofNode,
    GENESIS_SENTINEL, MAX_FIELD_BYTES,
};
pub use residual::{euclidean_distance, Context, ResidualEngine, ResidualReport};
pub use state_space::{RawStateTable, StateSpace, StateTable};
