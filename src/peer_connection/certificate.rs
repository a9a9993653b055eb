use std::time::{SystemTime, UNIX_EPOCH};

use rcgen::{CertificateParams, KeyPair};
use sha2::{Digest, Sha256};

use crate::dtls_transport::dtls_fingerprint::RTCDtlsFingerprint;
use crate::error::{Error, Result};
use crate::peer_connection::math_rand_alpha;

/// RTCCertificate is the DTLS identity of a session. Peers learn it through
/// the `a=fingerprint` lines it produces. Two certificates are equal when
/// their DER encodings are.
#[derive(Clone, Debug)]
pub struct RTCCertificate {
    /// DER encoding of the certificate.
    pub(crate) certificate: Vec<u8>,
    /// PEM encoding of the certificate followed by its PKCS#8 private key.
    pub(crate) pem: String,
    pub(crate) expires: SystemTime,
    pub(crate) stats_id: String,
}

impl PartialEq for RTCCertificate {
    fn eq(&self, other: &Self) -> bool {
        self.certificate == other.certificate
    }
}

impl RTCCertificate {
    /// Generates a new self-signed ECDSA P-256 certificate.
    pub fn generate() -> Result<Self> {
        let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?;
        RTCCertificate::from_key_pair(key_pair)
    }

    /// from_params self-signs `params` with `key_pair`. Parameters whose
    /// validity already ended are rejected.
    pub fn from_params(params: CertificateParams, key_pair: KeyPair) -> Result<Self> {
        let not_after = params.not_after;
        let x509_cert = params.self_signed(&key_pair)?;

        let expires: SystemTime = not_after.into();
        if expires <= SystemTime::now() {
            return Err(Error::ErrCertificateExpired);
        }

        Ok(Self {
            certificate: x509_cert.der().to_vec(),
            pem: format!("{}{}", x509_cert.pem(), key_pair.serialize_pem()),
            expires,
            stats_id: gen_stats_id(),
        })
    }

    /// from_key_pair self-signs a certificate with a random common name.
    /// Ed25519, ECDSA P-256 and RSA keys are accepted.
    pub fn from_key_pair(key_pair: KeyPair) -> Result<Self> {
        if !(key_pair.is_compatible(&rcgen::PKCS_ED25519)
            || key_pair.is_compatible(&rcgen::PKCS_ECDSA_P256_SHA256)
            || key_pair.is_compatible(&rcgen::PKCS_RSA_SHA256))
        {
            return Err(Error::new("Unsupported key_pair".to_owned()));
        }

        RTCCertificate::from_params(CertificateParams::new(vec![math_rand_alpha(16)])?, key_pair)
    }

    /// from_existing wraps a certificate kept by the application, so the same
    /// fingerprint can be reused across connections.
    pub fn from_existing(certificate: Vec<u8>, pem: String, expires: SystemTime) -> Self {
        Self {
            certificate,
            pem,
            expires,
            stats_id: gen_stats_id(),
        }
    }

    /// Serializes the certificate (including the private key) in PEM.
    pub fn serialize_pem(&self) -> &str {
        &self.pem
    }

    /// der returns the DER encoding of the certificate, as presented in the
    /// DTLS handshake.
    pub fn der(&self) -> &[u8] {
        &self.certificate
    }

    pub fn expires(&self) -> SystemTime {
        self.expires
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.expires <= SystemTime::now()
    }

    /// get_fingerprints has a single sha-256 entry.
    pub fn get_fingerprints(&self) -> Vec<RTCDtlsFingerprint> {
        vec![RTCDtlsFingerprint {
            algorithm: "sha-256".to_owned(),
            value: sha256_fingerprint(&self.certificate),
        }]
    }
}

/// sha256_fingerprint renders the SHA-256 digest of `der` the way RFC 4572
/// writes fingerprints: lowercase hex pairs joined by colons.
pub(crate) fn sha256_fingerprint(der: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(der);
    let hashed = h.finalize();
    let values: Vec<String> = hashed.iter().map(|x| format! {"{x:02x}"}).collect();
    values.join(":")
}

fn gen_stats_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    format!("certificate-{nanos}")
}
