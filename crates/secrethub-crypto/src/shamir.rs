//! Threshold secret sharing.
//!
//! Splits a secret into `n` shares over GF(256) such that any `t` distinct
//! shares reconstruct it and fewer than `t` reveal nothing. Each share
//! carries a stable one-byte `id` (the field x-coordinate) used to
//! deduplicate shares submitted twice in the same unseal run.
//!
//! Wire format of a share: `[id:1][gf_bytes:secret_len]`, hex-encoded when
//! it crosses an API boundary.

use blahaj::{Share as GfShare, Sharks};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// A `(threshold, total)` share configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShamirConfig {
    /// Minimum distinct shares required to reconstruct (`t`).
    pub threshold: u8,
    /// Total shares produced (`n`).
    pub total: u8,
}

impl ShamirConfig {
    /// Validate `1 ≤ t ≤ n ≤ 255`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidThresholdConfig`] when violated. The
    /// upper bound is the GF(256) field size minus the reserved zero
    /// coordinate.
    pub fn validate(self) -> CryptoResult<()> {
        if self.threshold == 0 || self.total == 0 || self.threshold > self.total {
            return Err(CryptoError::InvalidThresholdConfig {
                threshold: u16::from(self.threshold),
                total: u16::from(self.total),
            });
        }
        Ok(())
    }
}

/// One piece of a split secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsealShare {
    /// Stable share identifier (field x-coordinate, 1-based).
    pub id: u8,
    /// Full share bytes (`[id][gf_bytes...]`).
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UnsealShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Share material reconstructs the secret; never print it.
        write!(f, "UnsealShare(id={}, bytes=REDACTED)", self.id)
    }
}

impl UnsealShare {
    /// Parse a share from its raw bytes, applying structural checks.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidShare`] for inputs that cannot be a
    /// well-formed share: too short, or a zero id (the field coordinate
    /// that would hold the secret itself).
    pub fn from_bytes(bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.len() < 2 {
            return Err(CryptoError::InvalidShare(format!(
                "share too short: {} bytes",
                bytes.len()
            )));
        }
        let id = bytes[0];
        if id == 0 {
            return Err(CryptoError::InvalidShare("share id 0 is reserved".into()));
        }
        Ok(Self { id, bytes })
    }

    /// Parse a hex-encoded share.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidShare`] for non-hex input or input
    /// failing the structural checks of [`UnsealShare::from_bytes`].
    pub fn from_hex(hex_str: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| CryptoError::InvalidShare(format!("not hex: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Hex-encode for display and transport.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// Split `secret` into `config.total` shares with threshold
/// `config.threshold`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidThresholdConfig`] for an invalid
/// `(t, n)` pair.
pub fn split(secret: &[u8], config: ShamirConfig) -> CryptoResult<Vec<UnsealShare>> {
    config.validate()?;

    let sharks = Sharks(config.threshold);
    let dealer = sharks.dealer(secret);

    Ok(dealer
        .take(usize::from(config.total))
        .map(|share| {
            let bytes: Vec<u8> = (&share).into();
            UnsealShare { id: bytes[0], bytes }
        })
        .collect())
}

/// Reconstruct the secret from at least `threshold` distinct shares.
///
/// Duplicate ids are collapsed before counting. The result is wrapped in
/// [`Zeroizing`] so the reconstructed secret is wiped when dropped.
///
/// # Errors
///
/// - [`CryptoError::InvalidShare`] if any share fails parsing;
/// - [`CryptoError::InsufficientShares`] when fewer than `threshold`
///   distinct shares remain after deduplication;
/// - [`CryptoError::ReconstructionFailed`] when the field combine rejects
///   the share set.
pub fn combine(shares: &[UnsealShare], threshold: u8) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let mut distinct: BTreeMap<u8, &UnsealShare> = BTreeMap::new();
    for share in shares {
        distinct.entry(share.id).or_insert(share);
    }

    if distinct.len() < usize::from(threshold) {
        return Err(CryptoError::InsufficientShares {
            have: distinct.len(),
            need: usize::from(threshold),
        });
    }

    let parsed: Vec<GfShare> = distinct
        .values()
        .map(|share| {
            GfShare::try_from(share.bytes.as_slice())
                .map_err(|_| CryptoError::InvalidShare(format!("malformed share {}", share.id)))
        })
        .collect::<CryptoResult<_>>()?;

    let sharks = Sharks(threshold);
    let secret = sharks
        .recover(&parsed)
        .map_err(|_| CryptoError::ReconstructionFailed)?;

    Ok(Zeroizing::new(secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(t: u8, n: u8) -> ShamirConfig {
        ShamirConfig {
            threshold: t,
            total: n,
        }
    }

    #[test]
    fn test_split_produces_n_distinct_shares() {
        let shares = split(b"super secret master key material", config(3, 5)).unwrap();
        assert_eq!(shares.len(), 5);

        let mut ids: Vec<u8> = shares.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_any_t_shares_reconstruct() {
        let secret = b"super secret master key material";
        let shares = split(secret, config(3, 5)).unwrap();

        // Every 3-element window of the 5 shares reconstructs.
        for window in shares.windows(3) {
            let recovered = combine(window, 3).unwrap();
            assert_eq!(recovered.as_slice(), secret);
        }
    }

    #[test]
    fn test_fewer_than_t_fails() {
        let shares = split(b"secret", config(3, 5)).unwrap();
        assert!(matches!(
            combine(&shares[..2], 3),
            Err(CryptoError::InsufficientShares { have: 2, need: 3 })
        ));
    }

    #[test]
    fn test_duplicates_deduplicated() {
        let shares = split(b"secret", config(3, 5)).unwrap();
        let dup = vec![shares[0].clone(), shares[0].clone(), shares[1].clone()];
        assert!(matches!(
            combine(&dup, 3),
            Err(CryptoError::InsufficientShares { have: 2, need: 3 })
        ));
    }

    #[test]
    fn test_threshold_one() {
        let secret = b"no quorum needed";
        let shares = split(secret, config(1, 1)).unwrap();
        assert_eq!(combine(&shares, 1).unwrap().as_slice(), secret);
    }

    #[test]
    fn test_full_quorum() {
        let secret = b"all hands";
        let shares = split(secret, config(5, 5)).unwrap();
        assert_eq!(combine(&shares, 5).unwrap().as_slice(), secret);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(split(b"s", config(0, 5)).is_err());
        assert!(split(b"s", config(3, 0)).is_err());
        assert!(split(b"s", config(6, 5)).is_err());
    }

    #[test]
    fn test_share_structural_checks() {
        assert!(matches!(
            UnsealShare::from_bytes(vec![1]),
            Err(CryptoError::InvalidShare(_))
        ));
        assert!(matches!(
            UnsealShare::from_bytes(vec![0, 1, 2]),
            Err(CryptoError::InvalidShare(_))
        ));
        assert!(UnsealShare::from_bytes(vec![1, 2, 3]).is_ok());
    }

    #[test]
    fn test_hex_roundtrip() {
        let shares = split(b"hex me", config(2, 3)).unwrap();
        let hex_str = shares[0].to_hex();
        let back = UnsealShare::from_hex(&hex_str).unwrap();
        assert_eq!(back, shares[0]);
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(matches!(
            UnsealShare::from_hex("not hex at all"),
            Err(CryptoError::InvalidShare(_))
        ));
    }

    #[test]
    fn test_max_field_shares() {
        let secret = b"edge of the field";
        let shares = split(secret, config(2, 255)).unwrap();
        assert_eq!(shares.len(), 255);
        let recovered = combine(&shares[250..252], 2).unwrap();
        assert_eq!(recovered.as_slice(), secret);
    }
}
