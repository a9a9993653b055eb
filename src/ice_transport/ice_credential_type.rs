use std::fmt;

use serde::{Deserialize, Serialize};

/// RTCIceCredentialType is how an ICE server's `credential` is to be read.
/// Servers configured without one use a password.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCIceCredentialType {
    Unspecified,
    /// long-term credential (RFC 8489 section 9.2)
    #[default]
    #[serde(rename = "password")]
    Password,
    /// OAuth access token (RFC 7635)
    #[serde(rename = "oauth")]
    Oauth,
}

impl From<&str> for RTCIceCredentialType {
    fn from(raw: &str) -> Self {
        match raw {
            "password" => RTCIceCredentialType::Password,
            "oauth" => RTCIceCredentialType::Oauth,
            _ => RTCIceCredentialType::Unspecified,
        }
    }
}

impl fmt::Display for RTCIceCredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RTCIceCredentialType::Password => "password",
            RTCIceCredentialType::Oauth => "oauth",
            RTCIceCredentialType::Unspecified => crate::UNSPECIFIED_STR,
        })
    }
}
