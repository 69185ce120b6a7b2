//! Verified claims

use serde::{Deserialize, Serialize};

/// A claim together with the outcome of evidence verification
///
/// `verdict` is true iff `overlap_score` reached the minimum overlap used at
/// verification time. `evidence_url` points at the best-matching source even
/// when the threshold was not met.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedClaim {
    pub claim: String,
    pub verdict: bool,
    pub evidence_url: Option<String>,
    pub overlap_score: usize,
}

impl VerifiedClaim {
    /// Label used by reports
    pub fn verdict_label(&self) -> &'static str {
        if self.verdict { "✅ True" } else { "⚠️ Unverified" }
    }
}
