// ─────────────────────────────────────────────────────────────────────
// Concord Kernel — Proof Ledger (Hash-Chained Transition Log)
// ─────────────────────────────────────────────────────────────────────
//! Append-only, hash-linked record of accepted transitions.
//!
//! Each node's `hash` is SHA-256 over a pinned binary encoding of its
//! own fields plus the previous node's hash, so any edit to a stored node
//! breaks every link after it.
//!
//! # Canonical encoding
//!
//! Concatenated in this order, integers big-endian:
//!
//! | Field                          | Encoding                          |
//! |--------------------------------|-----------------------------------|
//! | tag                            | ASCII `concord.proof.v1` + `0x00` |
//! | `idx`                          | u64                               |
//! | `from`, `to`                   | u32 byte length + UTF-8           |
//! | `delta`                        | f64 IEEE-754 bits                 |
//! | `prev_hash`                    | u32 byte length + ASCII           |
//! | `delta_logic`, `delta_temporal`, `divergence` | f64 IEEE-754 bits  |
//!
//! `-0.0` is written as `+0.0` and every NaN as the canonical quiet NaN.
//! The digest is rendered as lowercase hex. String fields longer than
//! [`MAX_FIELD_BYTES`] cannot be length-prefixed and are refused.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use concord_types::{ConcordError, ConcordResult};

use crate::residual::ResidualReport;

/// `prev_hash` of the first node in every chain.
pub const GENESIS_SENTINEL: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

const ENCODING_TAG: &[u8] = b"concord.proof.v1\0";

/// Largest string field the u32 length prefix can describe.
pub const MAX_FIELD_BYTES: usize = u32::MAX as usize;

/// A transition offered to the ledger. Missing residuals hash as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofDraft {
    pub from: String,
    pub to: String,
    pub delta: f64,
    #[serde(default)]
    pub delta_logic: Option<f64>,
    #[serde(default)]
    pub delta_temporal: Option<f64>,
    #[serde(default)]
    pub divergence: Option<f64>,
}

impl ProofDraft {
    pub fn new(from: impl Into<String>, to: impl Into<String>, delta: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            delta,
            delta_logic: None,
            delta_temporal: None,
            divergence: None,
        }
    }

    pub fn from_report(report: &ResidualReport) -> Self {
        Self {
            from: report.from.clone(),
            to: report.to.clone(),
            delta: report.raw_distance,
            delta_logic: Some(report.residual.logic_residual),
            delta_temporal: Some(report.residual.temporal_residual),
            divergence: Some(report.residual.divergence),
        }
    }

    /// Fails if a state name is too long for the canonical encoding.
    pub fn validate(&self) -> ConcordResult<()> {
        field_len("from", self.from.len())?;
        field_len("to", self.to.len())?;
        Ok(())
    }
}

/// One immutable link of the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofNode {
    pub idx: u64,
    pub from: String,
    pub to: String,
    pub delta: f64,
    pub prev_hash: String,
    pub delta_logic: f64,
    pub delta_temporal: f64,
    pub divergence: f64,
    pub hash: String,
}

impl ProofNode {
    /// Canonical bytes of every field except `hash`.
    pub fn canonical_bytes(&self) -> ConcordResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(
            ENCODING_TAG.len() + 8 + 12 + self.from.len() + self.to.len() + self.prev_hash.len() + 32,
        );
        buf.extend_from_slice(ENCODING_TAG);
        buf.extend_from_slice(&self.idx.to_be_bytes());
        put_str(&mut buf, "from", &self.from)?;
        put_str(&mut buf, "to", &self.to)?;
        put_f64(&mut buf, self.delta);
        put_str(&mut buf, "prev_hash", &self.prev_hash)?;
        put_f64(&mut buf, self.delta_logic);
        put_f64(&mut buf, self.delta_temporal);
        put_f64(&mut buf, self.divergence);
        Ok(buf)
    }

    /// Digest of the stored fields. Equals `hash` for an untouched node.
    pub fn recompute_hash(&self) -> ConcordResult<String> {
        Ok(hex::encode(Sha256::digest(self.canonical_bytes()?)))
    }

    fn seal(idx: u64, prev_hash: String, draft: ProofDraft) -> ConcordResult<Self> {
        draft.validate()?;
        let mut node = Self {
            idx,
            from: draft.from,
            to: draft.to,
            delta: draft.delta,
            prev_hash,
            delta_logic: draft.delta_logic.unwrap_or(0.0),
            delta_temporal: draft.delta_temporal.unwrap_or(0.0),
            divergence: draft.divergence.unwrap_or(0.0),
            hash: String::new(),
        };
        node.hash = node.recompute_hash()?;
        Ok(node)
    }
}

fn field_len(field: &str, len: usize) -> ConcordResult<u32> {
    u32::try_from(len).map_err(|_| {
        ConcordError::Validation(format!(
            "{field} is {len} bytes, encoding limit is {MAX_FIELD_BYTES}"
        ))
    })
}

fn put_str(buf: &mut Vec<u8>, field: &str, s: &str) -> ConcordResult<()> {
    buf.extend_from_slice(&field_len(field, s.len())?.to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_f64(buf: &mut Vec<u8>, v: f64) {
    let v = if v == 0.0 {
        0.0
    } else if v.is_nan() {
        f64::NAN
    } else {
        v
    };
    buf.extend_from_slice(&v.to_bits().to_be_bytes());
}

/// Outcome of walking a chain and re-deriving every link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    pub total_nodes: usize,
    pub verified_nodes: usize,
    pub first_invalid_index: Option<usize>,
    pub reason: Option<String>,
}

/// Check index sequence, genesis link, predecessor links and digests.
pub fn verify_chain(nodes: &[ProofNode]) -> ChainVerification {
    let mut result = ChainVerification {
        valid: true,
        total_nodes: nodes.len(),
        verified_nodes: 0,
        first_invalid_index: None,
        reason: None,
    };

    for (i, node) in nodes.iter().enumerate() {
        let failure = if node.idx != i as u64 {
            Some(format!("node {i} carries idx {}", node.idx))
        } else if i == 0 && node.prev_hash != GENESIS_SENTINEL {
            Some("first node does not link to the genesis sentinel".to_string())
        } else if i > 0 && node.prev_hash != nodes[i - 1].hash {
            Some(format!("node {i} has broken prev_hash link"))
        } else {
            match node.recompute_hash() {
                Err(e) => Some(format!("node {i} cannot be encoded: {e}")),
                Ok(hash) if hash != node.hash => {
                    Some(format!("node {i} hash does not match its fields"))
                }
                Ok(_) => None,
            }
        };

        if let Some(reason) = failure {
            result.valid = false;
            result.first_invalid_index = Some(i);
            result.reason = Some(reason);
            return result;
        }
        result.verified_nodes = i + 1;
    }
    result
}

/// Value-semantics chain: `append` consumes the chain and hands back
/// the extended one, so a stale version cannot be appended to by mistake.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProofChain {
    nodes: Vec<ProofNode>,
}

impl ProofChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extended chain, or an error (and the original dropped) if the
    /// draft cannot be encoded.
    pub fn append(mut self, draft: ProofDraft) -> ConcordResult<Self> {
        self.push(draft)?;
        Ok(self)
    }

    fn push(&mut self, draft: ProofDraft) -> ConcordResult<&ProofNode> {
        let idx = self.nodes.len() as u64;
        let prev_hash = self.head_hash().to_string();
        self.nodes.push(ProofNode::seal(idx, prev_hash, draft)?);
        Ok(&self.nodes[self.nodes.len() - 1])
    }

    /// Hash the next node must link to.
    pub fn head_hash(&self) -> &str {
        self.nodes
            .last()
            .map(|n| n.hash.as_str())
            .unwrap_or(GENESIS_SENTINEL)
    }

    pub fn nodes(&self) -> &[ProofNode] {
        &self.nodes
    }

    pub fn last(&self) -> Option<&ProofNode> {
        self.nodes.last()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn verify(&self) -> ChainVerification {
        verify_chain(&self.nodes)
    }

    pub fn into_nodes(self) -> Vec<ProofNode> {
        self.nodes
    }
}

/// Synchronized owner of the current chain.
///
/// Reading the tail, hashing and pushing happen under one lock, so two
/// concurrent appends can never claim the same `idx` or `prev_hash`.
#[derive(Default)]
pub struct ProofLedger {
    chain: Mutex<ProofChain>,
}

impl ProofLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transition. Returns the sealed node together with the
    /// chain length right after the push, both taken under the same lock.
    pub fn append(&self, draft: ProofDraft) -> ConcordResult<(ProofNode, usize)> {
        let (node, length) = {
            let mut chain = self.chain.lock();
            let node = chain.push(draft)?.clone();
            (node, chain.len())
        };
        log::debug!(
            "proof node {} appended: {} -> {} ({})",
            node.idx,
            node.from,
            node.to,
            node.hash
        );
        Ok((node, length))
    }

    /// Owned copy of the chain; iterating it never touches the ledger.
    pub fn read(&self) -> ProofChain {
        self.chain.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.chain.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.lock().is_empty()
    }

    pub fn head_hash(&self) -> String {
        self.chain.lock().head_hash().to_string()
    }

    pub fn verify(&self) -> ChainVerification {
        self.chain.lock().verify()
    }

    /// Clear the chain; the next append starts at idx 0 from genesis.
    pub fn reset(&self) {
        let mut guard = self.chain.lock();
        let dropped = guard.len();
        *guard = ProofChain::new();
        log::info!("proof ledger reset ({dropped} nodes dropped)");
    }

    /// Replace the chain with externally persisted nodes. Rejected, and
    /// the current chain kept, unless the nodes verify end to end.
    pub fn restore(&self, nodes: Vec<ProofNode>) -> ConcordResult<()> {
        let report = verify_chain(&nodes);
        if !report.valid {
            return Err(ConcordError::Ledger(format!(
                "restored chain invalid at index {}: {}",
                report.first_invalid_index.unwrap_or_default(),
                report.reason.unwrap_or_default()
            )));
        }
        let count = nodes.len();
        *self.chain.lock() = ProofChain { nodes };
        log::info!("proof ledger restored with {count} nodes");
        Ok(())
    }
}
