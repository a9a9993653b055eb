use std::fmt;

use crate::error::{Error, Result};
use crate::peer_connection::sdp::sdp_type::RTCSdpType;

/// StateChangeOp names which side a description is being applied to.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum StateChangeOp {
    #[default]
    SetLocal,
    SetRemote,
}

impl fmt::Display for StateChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StateChangeOp::SetLocal => "SetLocal",
            StateChangeOp::SetRemote => "SetRemote",
        })
    }
}

w3c_enum! {
    /// RTCSignalingState is where the session stands in the offer/answer
    /// exchange. See <https://w3c.github.io/webrtc-pc/#dom-rtcsignalingstate>.
    #[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
    pub enum RTCSignalingState {
        /// no exchange in progress; also the initial state.
        Stable = 1 => "stable",
        HaveLocalOffer = 2 => "have-local-offer",
        HaveRemoteOffer = 3 => "have-remote-offer",
        /// a remote offer was answered locally with a pranswer.
        HaveLocalPranswer = 4 => "have-local-pranswer",
        /// a local offer was answered remotely with a pranswer.
        HaveRemotePranswer = 5 => "have-remote-pranswer",
        Closed = 6 => "closed",
    }
}

/// next_signaling_state returns the state reached by applying a description
/// of `sdp_type` on side `op` while in `cur`, or the reason it is rejected.
/// The result depends only on the three inputs.
pub fn next_signaling_state(
    cur: RTCSignalingState,
    op: StateChangeOp,
    sdp_type: RTCSdpType,
) -> Result<RTCSignalingState> {
    if cur == RTCSignalingState::Closed {
        return Err(Error::ErrConnectionClosed);
    }
    if sdp_type == RTCSdpType::Unspecified {
        return Err(Error::ErrPeerConnSDPTypeInvalidValue);
    }

    // Rollback returns any pending exchange to stable, from either side
    if sdp_type == RTCSdpType::Rollback {
        return match cur {
            RTCSignalingState::Stable => Err(Error::ErrSignalingStateCannotRollback),
            RTCSignalingState::Unspecified => Err(Error::ErrIncorrectSignalingState),
            _ => Ok(RTCSignalingState::Stable),
        };
    }

    // 4.3.1 valid state transitions
    let next = match (cur, op, sdp_type) {
        // stable->SetLocal(offer)->have-local-offer
        // have-local-offer->SetLocal(offer)->have-local-offer
        (
            RTCSignalingState::Stable | RTCSignalingState::HaveLocalOffer,
            StateChangeOp::SetLocal,
            RTCSdpType::Offer,
        ) => Some(RTCSignalingState::HaveLocalOffer),
        // have-remote-offer->SetLocal(answer)->stable
        // have-local-pranswer->SetLocal(answer)->stable
        (
            RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveLocalPranswer,
            StateChangeOp::SetLocal,
            RTCSdpType::Answer,
        ) => Some(RTCSignalingState::Stable),
        // have-remote-offer->SetLocal(pranswer)->have-local-pranswer
        // have-local-pranswer->SetLocal(pranswer)->have-local-pranswer
        (
            RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveLocalPranswer,
            StateChangeOp::SetLocal,
            RTCSdpType::Pranswer,
        ) => Some(RTCSignalingState::HaveLocalPranswer),
        // stable->SetRemote(offer)->have-remote-offer
        // have-remote-offer->SetRemote(offer)->have-remote-offer
        (
            RTCSignalingState::Stable | RTCSignalingState::HaveRemoteOffer,
            StateChangeOp::SetRemote,
            RTCSdpType::Offer,
        ) => Some(RTCSignalingState::HaveRemoteOffer),
        // have-local-offer->SetRemote(answer)->stable
        // have-remote-pranswer->SetRemote(answer)->stable
        (
            RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveRemotePranswer,
            StateChangeOp::SetRemote,
            RTCSdpType::Answer,
        ) => Some(RTCSignalingState::Stable),
        // have-local-offer->SetRemote(pranswer)->have-remote-pranswer
        // have-remote-pranswer->SetRemote(pranswer)->have-remote-pranswer
        (
            RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveRemotePranswer,
            StateChangeOp::SetRemote,
            RTCSdpType::Pranswer,
        ) => Some(RTCSignalingState::HaveRemotePranswer),
        _ => None,
    };

    next.ok_or(Error::ErrSignalingStateProposedTransitionInvalid {
        from: cur,
        applying: sdp_type,
        is_local: op == StateChangeOp::SetLocal,
    })
}
