use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ice_transport::ice_credential_type::RTCIceCredentialType;

/// SchemeType is the URI scheme of an ICE server.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub enum SchemeType {
    #[default]
    Unknown,
    Stun,
    Stuns,
    Turn,
    Turns,
}

const SCHEMES: [(&str, SchemeType); 4] = [
    ("stun", SchemeType::Stun),
    ("stuns", SchemeType::Stuns),
    ("turn", SchemeType::Turn),
    ("turns", SchemeType::Turns),
];

impl SchemeType {
    fn default_port(self) -> u16 {
        match self {
            SchemeType::Stuns | SchemeType::Turns => 5349,
            _ => 3478,
        }
    }

    fn default_proto(self) -> ProtoType {
        match self {
            SchemeType::Stuns | SchemeType::Turns => ProtoType::Tcp,
            _ => ProtoType::Udp,
        }
    }
}

impl From<&str> for SchemeType {
    fn from(raw: &str) -> Self {
        SCHEMES
            .iter()
            .find(|(name, _)| *name == raw)
            .map_or(SchemeType::Unknown, |(_, scheme)| *scheme)
    }
}

impl fmt::Display for SchemeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = SCHEMES
            .iter()
            .find(|(_, scheme)| scheme == self)
            .map_or("unknown", |(name, _)| *name);
        f.write_str(name)
    }
}

/// ProtoType is the `transport` a TURN server is reached over.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub enum ProtoType {
    #[default]
    Udp,
    Tcp,
    Unknown,
}

impl From<&str> for ProtoType {
    fn from(raw: &str) -> Self {
        match raw {
            "udp" => ProtoType::Udp,
            "tcp" => ProtoType::Tcp,
            _ => ProtoType::Unknown,
        }
    }
}

impl fmt::Display for ProtoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProtoType::Udp => "udp",
            ProtoType::Tcp => "tcp",
            ProtoType::Unknown => "unknown",
        })
    }
}

/// IceServerUrl is one parsed `stun:`, `stuns:`, `turn:` or `turns:` URI
/// (RFC 7064, RFC 7065) with the credentials of its server attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IceServerUrl {
    pub scheme: SchemeType,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub proto: ProtoType,
}

impl fmt::Display for IceServerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.is_relay() {
            write!(
                f,
                "{}:{}:{}?transport={}",
                self.scheme, host, self.port, self.proto
            )
        } else {
            write!(f, "{}:{}:{}", self.scheme, host, self.port)
        }
    }
}

impl IceServerUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        // the url crate only finds a host behind "//"
        if raw.contains("//") {
            return Err(Error::ErrICEServerHost);
        }
        let Some(colon) = raw.find(':') else {
            return Err(Error::ErrICEServerSchemeType);
        };
        let mut s = raw.to_owned();
        s.replace_range(colon..=colon, "://");

        let parsed = url::Url::parse(&s)?;

        let scheme = SchemeType::from(parsed.scheme());
        if scheme == SchemeType::Unknown {
            return Err(Error::ErrICEServerSchemeType);
        }

        let host = match parsed.host_str() {
            Some(host) if !host.trim().is_empty() => host
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_owned(),
            _ => return Err(Error::ErrICEServerHost),
        };

        let port = match parsed.port() {
            Some(0) => return Err(Error::ErrICEServerPort),
            Some(port) => port,
            None => scheme.default_port(),
        };

        let mut query = parsed.query_pairs();
        let proto = match (query.next(), query.next()) {
            (None, _) => scheme.default_proto(),
            (Some(_), _) if !url_is_relay(scheme) => return Err(Error::ErrICEServerQuery),
            (Some((key, value)), None) if key == "transport" => {
                match ProtoType::from(&*value) {
                    ProtoType::Unknown => return Err(Error::ErrICEServerProtoType),
                    proto => proto,
                }
            }
            _ => return Err(Error::ErrICEServerQuery),
        };

        Ok(IceServerUrl {
            scheme,
            host,
            port,
            username: String::new(),
            password: String::new(),
            proto,
        })
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == SchemeType::Stuns || self.scheme == SchemeType::Turns
    }

    /// is_relay reports whether the server allocates relay candidates.
    pub fn is_relay(&self) -> bool {
        url_is_relay(self.scheme)
    }
}

fn url_is_relay(scheme: SchemeType) -> bool {
    matches!(scheme, SchemeType::Turn | SchemeType::Turns)
}

/// RTCIceServer is one entry of the configuration's `ice_servers`: a set of
/// URLs sharing the same credentials.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RTCIceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
    pub credential_type: RTCIceCredentialType,
}

impl RTCIceServer {
    pub(crate) fn validate(&self) -> Result<()> {
        self.urls()?;
        Ok(())
    }

    pub(crate) fn urls(&self) -> Result<Vec<IceServerUrl>> {
        let mut urls = vec![];

        for url_str in &self.urls {
            let mut url = IceServerUrl::parse(url_str)?;
            if url.is_relay() {
                // relay servers always need a username and a credential
                if self.username.is_empty() || self.credential.is_empty() {
                    return Err(Error::ErrNoTurnCredentials);
                }
                url.username.clone_from(&self.username);

                match self.credential_type {
                    RTCIceCredentialType::Password => url.password.clone_from(&self.credential),
                    RTCIceCredentialType::Oauth => {}
                    RTCIceCredentialType::Unspecified => return Err(Error::ErrTurnCredentials),
                };
            }

            urls.push(url);
        }

        Ok(urls)
    }
}
