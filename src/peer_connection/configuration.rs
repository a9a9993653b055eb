use serde::{Deserialize, Serialize};

use crate::ice_transport::ice_server::RTCIceServer;
use crate::peer_connection::certificate::RTCCertificate;
use crate::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use crate::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use crate::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;

/// RTCConfiguration is what an application hands to
/// [`API::new_peer_connection`](crate::api::API::new_peer_connection).
///
/// Certificates, bundle policy, rtcp-mux policy and peer identity are fixed
/// once the connection exists. ICE servers and the transport policy may be
/// replaced with `set_configuration` and take effect on the next ICE restart.
///
/// [`RTCPeerConnection`]: crate::peer_connection::RTCPeerConnection
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RTCConfiguration {
    /// STUN and TURN servers, validated when the connection is created.
    pub ice_servers: Vec<RTCIceServer>,

    /// `relay` keeps only relayed candidates, locally and remotely.
    pub ice_transport_policy: RTCIceTransportPolicy,

    pub bundle_policy: RTCBundlePolicy,

    pub rtcp_mux_policy: RTCRtcpMuxPolicy,

    /// Target peer identity. It is only compared on reconfiguration since
    /// identity providers are not supported.
    pub peer_identity: String,

    /// DTLS identities. Empty means one ECDSA P-256 certificate is generated
    /// per connection. Expired certificates are rejected.
    #[serde(skip)]
    pub certificates: Vec<RTCCertificate>,

    /// Above zero, gathering starts as soon as the connection is created
    /// instead of at the first `set_local_description`.
    pub ice_candidate_pool_size: u8,
}

impl RTCConfiguration {
    /// get_ice_servers copies the servers, stripping any query from
    /// "stun(s):" URLs before they reach the strict URL parser.
    pub(crate) fn get_ice_servers(&self) -> Vec<RTCIceServer> {
        let mut ice_servers = self.ice_servers.clone();

        for ice_server in &mut ice_servers {
            for raw_url in &mut ice_server.urls {
                if raw_url.starts_with("stun") {
                    if let Some((base, _)) = raw_url.split_once('?') {
                        *raw_url = base.to_owned();
                    }
                }
            }
        }

        ice_servers
    }
}
