use async_trait::async_trait;

use super::dtls_parameters::DTLSParameters;
use super::dtls_role::DTLSRole;
use crate::error::Result;
use crate::peer_connection::certificate::RTCCertificate;

/// DtlsHandshaker performs the DTLS handshake over a connected ICE
/// transport. It presents `local_certificate` and returns the DER
/// certificate the remote peer presented; the transport verifies it
/// against the fingerprints in `remote`.
#[async_trait]
pub trait DtlsHandshaker: Send + Sync {
    async fn handshake(
        &self,
        role: DTLSRole,
        local_certificate: &RTCCertificate,
        remote: &DTLSParameters,
    ) -> Result<Vec<u8>>;
}
