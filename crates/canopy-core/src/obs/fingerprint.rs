//! Deterministic plan fingerprinting derived from the plan description.

use sha2::{Digest, Sha256};
use std::fmt;

///
/// PlanFingerprint
///
/// Stable, deterministic fingerprint for compiled plans.
///

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PlanFingerprint([u8; 32]);

impl PlanFingerprint {
    /// Fingerprint a canonical plan description.
    #[must_use]
    pub fn from_description(description: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"planfp:v1");
        write_len(&mut hasher, description.len());
        hasher.update(description.as_bytes());

        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);

        Self(out)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn as_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            use std::fmt::Write as _;
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl fmt::Display for PlanFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_hex())
    }
}

fn write_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_be_bytes());
}
