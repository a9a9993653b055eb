use serde::{Deserialize, Serialize};

use super::dtls_fingerprint::RTCDtlsFingerprint;
use super::dtls_role::DTLSRole;

/// DTLSParameters is one side's DTLS identity as seen through SDP: the
/// `a=setup` role and the `a=fingerprint` values.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DTLSParameters {
    pub role: DTLSRole,
    pub fingerprints: Vec<RTCDtlsFingerprint>,
}
