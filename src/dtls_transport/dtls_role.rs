use sdp::description::session::{SessionDescription, ATTR_KEY_CONNECTION_SETUP};
use sdp::util::ConnectionRole;
use serde::{Deserialize, Serialize};

w3c_enum! {
    /// DTLSRole is the side of the DTLS handshake a transport plays.
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub enum DTLSRole {
        /// Auto takes the role from the ICE role: controlling is server,
        /// controlled is client.
        #[serde(rename = "auto")]
        Auto = 1 => "auto",
        #[serde(rename = "client")]
        Client = 2 => "client",
        #[serde(rename = "server")]
        Server = 3 => "server",
    }
}

/// Answers take `setup:active` so the handshake can start as soon as the
/// answer is applied (RFC 5763 section 5).
pub(crate) const DEFAULT_DTLS_ROLE_ANSWER: DTLSRole = DTLSRole::Client;

/// Offers always carry `setup:actpass`.
pub(crate) const DEFAULT_DTLS_ROLE_OFFER: DTLSRole = DTLSRole::Auto;

/// The role a remote description asks for, read from the first `a=setup`
/// found in its media sections. `active` makes the remote the client, so
/// this returns the role the remote plays; no attribute means `Auto`.
impl From<&SessionDescription> for DTLSRole {
    fn from(desc: &SessionDescription) -> Self {
        let setup = desc
            .media_descriptions
            .iter()
            .find_map(|m| m.attribute(ATTR_KEY_CONNECTION_SETUP));

        match setup.flatten() {
            Some("active") => DTLSRole::Client,
            Some("passive") => DTLSRole::Server,
            _ => DTLSRole::Auto,
        }
    }
}

impl DTLSRole {
    pub(crate) fn to_connection_role(self) -> ConnectionRole {
        match self {
            DTLSRole::Client => ConnectionRole::Active,
            DTLSRole::Server => ConnectionRole::Passive,
            DTLSRole::Auto => ConnectionRole::Actpass,
            DTLSRole::Unspecified => ConnectionRole::Unspecified,
        }
    }

    /// inverse is the role the other end of the handshake plays.
    pub(crate) fn inverse(self) -> DTLSRole {
        match self {
            DTLSRole::Client => DTLSRole::Server,
            DTLSRole::Server => DTLSRole::Client,
            other => other,
        }
    }
}
