//! Aggregate states of a session, derived from the states of its
//! transports. Every function here is pure: the same multiset of transport
//! states always yields the same aggregate, whatever the history.

use crate::dtls_transport::dtls_transport_state::RTCDtlsTransportState;
use crate::ice_transport::ice_connection_state::RTCIceConnectionState;
use crate::ice_transport::ice_gatherer_state::RTCIceGathererState;
use crate::ice_transport::ice_gathering_state::RTCIceGatheringState;
use crate::ice_transport::ice_transport_state::RTCIceTransportState;
use crate::peer_connection::peer_connection_state::RTCPeerConnectionState;

impl From<RTCIceTransportState> for RTCPeerConnectionState {
    fn from(s: RTCIceTransportState) -> Self {
        match s {
            RTCIceTransportState::Checking => RTCPeerConnectionState::Connecting,
            RTCIceTransportState::Connected | RTCIceTransportState::Completed => {
                RTCPeerConnectionState::Connected
            }
            RTCIceTransportState::Disconnected => RTCPeerConnectionState::Disconnected,
            RTCIceTransportState::Failed => RTCPeerConnectionState::Failed,
            RTCIceTransportState::Closed => RTCPeerConnectionState::Closed,
            RTCIceTransportState::New | RTCIceTransportState::Unspecified => {
                RTCPeerConnectionState::New
            }
        }
    }
}

impl From<RTCDtlsTransportState> for RTCPeerConnectionState {
    fn from(s: RTCDtlsTransportState) -> Self {
        match s {
            RTCDtlsTransportState::Connecting => RTCPeerConnectionState::Connecting,
            RTCDtlsTransportState::Connected => RTCPeerConnectionState::Connected,
            RTCDtlsTransportState::Failed => RTCPeerConnectionState::Failed,
            RTCDtlsTransportState::Closed => RTCPeerConnectionState::Closed,
            RTCDtlsTransportState::New | RTCDtlsTransportState::Unspecified => {
                RTCPeerConnectionState::New
            }
        }
    }
}

/// connection_state reduces the ICE and DTLS transport states of a session
/// to its `connectionState`.
pub fn connection_state(
    is_closed: bool,
    ice_states: &[RTCIceTransportState],
    dtls_states: &[RTCDtlsTransportState],
) -> RTCPeerConnectionState {
    if is_closed {
        return RTCPeerConnectionState::Closed;
    }

    let states: Vec<RTCPeerConnectionState> = ice_states
        .iter()
        .map(|s| RTCPeerConnectionState::from(*s))
        .chain(dtls_states.iter().map(|s| RTCPeerConnectionState::from(*s)))
        .collect();
    let any = |want: RTCPeerConnectionState| states.iter().any(|s| *s == want);

    if any(RTCPeerConnectionState::Failed) {
        RTCPeerConnectionState::Failed
    } else if any(RTCPeerConnectionState::Connecting) {
        RTCPeerConnectionState::Connecting
    } else if any(RTCPeerConnectionState::Disconnected) {
        RTCPeerConnectionState::Disconnected
    } else if any(RTCPeerConnectionState::Connected)
        && states.iter().all(|s| {
            *s == RTCPeerConnectionState::Connected || *s == RTCPeerConnectionState::Closed
        })
    {
        RTCPeerConnectionState::Connected
    } else {
        RTCPeerConnectionState::New
    }
}

/// ice_connection_state reduces the ICE transport states of a session to
/// its `iceConnectionState`, following the W3C precedence.
pub fn ice_connection_state(
    is_closed: bool,
    ice_states: &[RTCIceTransportState],
) -> RTCIceConnectionState {
    if is_closed {
        return RTCIceConnectionState::Closed;
    }

    let any = |want: &[RTCIceTransportState]| ice_states.iter().any(|s| want.contains(s));
    let all = |want: &[RTCIceTransportState]| ice_states.iter().all(|s| want.contains(s));

    if any(&[RTCIceTransportState::Failed]) {
        RTCIceConnectionState::Failed
    } else if any(&[RTCIceTransportState::Disconnected]) {
        RTCIceConnectionState::Disconnected
    } else if all(&[
        RTCIceTransportState::New,
        RTCIceTransportState::Closed,
        RTCIceTransportState::Unspecified,
    ]) {
        RTCIceConnectionState::New
    } else if any(&[
        RTCIceTransportState::New,
        RTCIceTransportState::Checking,
        RTCIceTransportState::Unspecified,
    ]) {
        RTCIceConnectionState::Checking
    } else if all(&[RTCIceTransportState::Completed, RTCIceTransportState::Closed]) {
        RTCIceConnectionState::Completed
    } else {
        RTCIceConnectionState::Connected
    }
}

/// ice_gathering_state reduces the gatherer states of a session to its
/// `iceGatheringState`. Closed gatherers are not counted.
pub fn ice_gathering_state(gatherer_states: &[RTCIceGathererState]) -> RTCIceGatheringState {
    let live: Vec<&RTCIceGathererState> = gatherer_states
        .iter()
        .filter(|s| **s != RTCIceGathererState::Closed)
        .collect();

    if live.iter().any(|s| **s == RTCIceGathererState::Gathering) {
        RTCIceGatheringState::Gathering
    } else if !live.is_empty() && live.iter().all(|s| **s == RTCIceGathererState::Complete) {
        RTCIceGatheringState::Complete
    } else {
        RTCIceGatheringState::New
    }
}
