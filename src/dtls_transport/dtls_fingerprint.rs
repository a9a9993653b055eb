use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::peer_connection::certificate::sha256_fingerprint;

pub(crate) const FINGERPRINT_ALGORITHM_SHA256: &str = "sha-256";

/// RTCDtlsFingerprint is one `a=fingerprint` line (RFC 8122): a hash
/// function name and the colon-separated hex digest of a certificate.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCDtlsFingerprint {
    /// only `sha-256` can be verified
    pub algorithm: String,
    pub value: String,
}

impl RTCDtlsFingerprint {
    /// matches reports whether this fingerprint was computed over `der`.
    pub fn matches(&self, der: &[u8]) -> Result<bool> {
        if !self
            .algorithm
            .eq_ignore_ascii_case(FINGERPRINT_ALGORITHM_SHA256)
        {
            return Err(Error::ErrUnsupportedFingerprintAlgorithm);
        }
        Ok(sha256_fingerprint(der) == self.value.to_lowercase())
    }
}

/// validate_fingerprint checks the remote certificate against the
/// fingerprints the remote peer announced in its description.
pub(crate) fn validate_fingerprint(fingerprints: &[RTCDtlsFingerprint], remote_cert: &[u8]) -> Result<()> {
    for fp in fingerprints {
        if fp.matches(remote_cert)? {
            return Ok(());
        }
    }

    Err(Error::ErrNoMatchingCertificateFingerprint)
}
