use crate::error::{Error, Result};
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::peer_connection::signaling_state::{
    next_signaling_state, RTCSignalingState, StateChangeOp,
};

/// SignalingCoordinator owns the four description slots of a session and its
/// signaling state. It is driven under the session's negotiation lock, so it
/// holds no locks of its own.
#[derive(Debug, Clone)]
pub(crate) struct SignalingCoordinator {
    state: RTCSignalingState,

    current_local_description: Option<RTCSessionDescription>,
    pending_local_description: Option<RTCSessionDescription>,
    current_remote_description: Option<RTCSessionDescription>,
    pending_remote_description: Option<RTCSessionDescription>,

    last_offer: String,
    last_answer: String,
}

impl Default for SignalingCoordinator {
    fn default() -> Self {
        SignalingCoordinator {
            state: RTCSignalingState::Stable,
            current_local_description: None,
            pending_local_description: None,
            current_remote_description: None,
            pending_remote_description: None,
            last_offer: String::new(),
            last_answer: String::new(),
        }
    }
}

impl SignalingCoordinator {
    pub(crate) fn state(&self) -> RTCSignalingState {
        self.state
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state == RTCSignalingState::Closed
    }

    /// local_description is the pending local description if there is one,
    /// the current one otherwise.
    pub(crate) fn local_description(&self) -> Option<&RTCSessionDescription> {
        self.pending_local_description
            .as_ref()
            .or(self.current_local_description.as_ref())
    }

    /// remote_description is the pending remote description if there is one,
    /// the current one otherwise.
    pub(crate) fn remote_description(&self) -> Option<&RTCSessionDescription> {
        self.pending_remote_description
            .as_ref()
            .or(self.current_remote_description.as_ref())
    }

    pub(crate) fn current_local_description(&self) -> Option<&RTCSessionDescription> {
        self.current_local_description.as_ref()
    }

    pub(crate) fn pending_local_description(&self) -> Option<&RTCSessionDescription> {
        self.pending_local_description.as_ref()
    }

    pub(crate) fn current_remote_description(&self) -> Option<&RTCSessionDescription> {
        self.current_remote_description.as_ref()
    }

    pub(crate) fn pending_remote_description(&self) -> Option<&RTCSessionDescription> {
        self.pending_remote_description.as_ref()
    }

    pub(crate) fn record_offer(&mut self, sdp: &str) {
        self.last_offer = sdp.to_owned();
    }

    pub(crate) fn record_answer(&mut self, sdp: &str) {
        self.last_answer = sdp.to_owned();
    }

    /// resolve_local fills in an empty local description from the last
    /// offer or answer created, and rejects one that was edited since.
    pub(crate) fn resolve_local(&self, desc: &RTCSessionDescription) -> Result<RTCSessionDescription> {
        let (last, mismatch) = match desc.sdp_type {
            RTCSdpType::Rollback => return Ok(desc.clone()),
            RTCSdpType::Offer => (&self.last_offer, Error::ErrSDPDoesNotMatchOffer),
            RTCSdpType::Answer | RTCSdpType::Pranswer => {
                (&self.last_answer, Error::ErrSDPDoesNotMatchAnswer)
            }
            RTCSdpType::Unspecified => return Err(Error::ErrPeerConnSDPTypeInvalidValue),
        };

        if desc.sdp.is_empty() {
            if last.is_empty() {
                return Err(mismatch);
            }
            return Ok(RTCSessionDescription {
                sdp_type: desc.sdp_type,
                sdp: last.clone(),
                parsed: None,
            });
        }

        if desc.sdp != *last {
            return Err(mismatch);
        }
        Ok(desc.clone())
    }

    /// check tells whether `desc` may be applied on side `op` without
    /// touching any slot.
    pub(crate) fn check(
        &self,
        op: StateChangeOp,
        desc: &RTCSessionDescription,
    ) -> Result<RTCSignalingState> {
        next_signaling_state(self.state, op, desc.sdp_type)
    }

    /// apply moves the signaling state and the description slots. Nothing is
    /// mutated when the transition is rejected.
    pub(crate) fn apply(
        &mut self,
        op: StateChangeOp,
        desc: RTCSessionDescription,
    ) -> Result<RTCSignalingState> {
        let next = self.check(op, &desc)?;

        match (op, desc.sdp_type) {
            (_, RTCSdpType::Rollback) => {
                self.pending_local_description = None;
                self.pending_remote_description = None;
            }
            (StateChangeOp::SetLocal, RTCSdpType::Answer) => {
                self.current_local_description = Some(desc);
                self.current_remote_description = self.pending_remote_description.take();
                self.pending_local_description = None;
            }
            (StateChangeOp::SetLocal, _) => {
                self.pending_local_description = Some(desc);
            }
            (StateChangeOp::SetRemote, RTCSdpType::Answer) => {
                self.current_remote_description = Some(desc);
                self.current_local_description = self.pending_local_description.take();
                self.pending_remote_description = None;
            }
            (StateChangeOp::SetRemote, _) => {
                self.pending_remote_description = Some(desc);
            }
        }

        if self.state != next {
            log::info!("signaling state changed: {} -> {}", self.state, next);
        }
        self.state = next;
        Ok(next)
    }

    /// close moves to closed for good. It reports whether the state changed.
    pub(crate) fn close(&mut self) -> bool {
        if self.state == RTCSignalingState::Closed {
            return false;
        }
        log::info!("signaling state changed: {} -> closed", self.state);
        self.state = RTCSignalingState::Closed;
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use RTCSignalingState as S;

    fn desc(sdp_type: RTCSdpType, sdp: &str) -> RTCSessionDescription {
        RTCSessionDescription {
            sdp_type,
            sdp: sdp.to_owned(),
            parsed: None,
        }
    }

    fn coordinator_in(state: RTCSignalingState) -> Result<SignalingCoordinator> {
        let mut c = SignalingCoordinator::default();
        match state {
            S::Stable => {}
            S::HaveLocalOffer => {
                c.apply(StateChangeOp::SetLocal, desc(RTCSdpType::Offer, "local offer"))?;
            }
            S::HaveRemoteOffer => {
                c.apply(StateChangeOp::SetRemote, desc(RTCSdpType::Offer, "remote offer"))?;
            }
            S::HaveLocalPranswer => {
                c.apply(StateChangeOp::SetRemote, desc(RTCSdpType::Offer, "remote offer"))?;
                c.apply(StateChangeOp::SetLocal, desc(RTCSdpType::Pranswer, "local pranswer"))?;
            }
            S::HaveRemotePranswer => {
                c.apply(StateChangeOp::SetLocal, desc(RTCSdpType::Offer, "local offer"))?;
                c.apply(StateChangeOp::SetRemote, desc(RTCSdpType::Pranswer, "remote pranswer"))?;
            }
            S::Closed => {
                c.close();
            }
            S::Unspecified => unreachable!(),
        }
        assert_eq!(c.state(), state);
        Ok(c)
    }

    fn assert_description_invariant(c: &SignalingCoordinator) {
        let expected_local = c
            .pending_local_description()
            .or(c.current_local_description());
        let expected_remote = c
            .pending_remote_description()
            .or(c.current_remote_description());
        assert_eq!(c.local_description(), expected_local);
        assert_eq!(c.remote_description(), expected_remote);
    }

    #[test]
    fn test_every_transition() -> Result<()> {
        let states = [
            S::Stable,
            S::HaveLocalOffer,
            S::HaveRemoteOffer,
            S::HaveLocalPranswer,
            S::HaveRemotePranswer,
            S::Closed,
        ];
        let types = [
            RTCSdpType::Offer,
            RTCSdpType::Pranswer,
            RTCSdpType::Answer,
            RTCSdpType::Rollback,
        ];

        for cur in states {
            for op in [StateChangeOp::SetLocal, StateChangeOp::SetRemote] {
                for sdp_type in types {
                    let mut c = coordinator_in(cur)?;
                    let before = c.clone();
                    let expected = next_signaling_state(cur, op, sdp_type);

                    let got = c.apply(op, desc(sdp_type, "sdp"));
                    assert_eq!(got, expected, "{cur} {op} {sdp_type}");

                    match got {
                        Ok(next) => assert_eq!(c.state(), next),
                        Err(err) => {
                            assert_eq!(err.kind(), crate::error::RTCErrorKind::InvalidState);
                            assert_eq!(c.state(), before.state(), "rejected {cur} {op} {sdp_type}");
                            assert_eq!(c.local_description(), before.local_description());
                            assert_eq!(c.remote_description(), before.remote_description());
                        }
                    }
                    assert_description_invariant(&c);
                }
            }
        }

        Ok(())
    }

    #[test]
    fn test_offer_answer_exchange() -> Result<()> {
        let mut c = SignalingCoordinator::default();
        assert_eq!(c.state(), S::Stable);
        assert!(c.local_description().is_none());

        let offer = desc(RTCSdpType::Offer, "offer");
        c.apply(StateChangeOp::SetLocal, offer.clone())?;
        assert_eq!(c.state(), S::HaveLocalOffer);
        assert_eq!(c.pending_local_description(), Some(&offer));
        assert_eq!(c.local_description(), Some(&offer));

        let answer = desc(RTCSdpType::Answer, "answer");
        c.apply(StateChangeOp::SetRemote, answer.clone())?;
        assert_eq!(c.state(), S::Stable);
        assert_eq!(c.current_local_description(), Some(&offer));
        assert_eq!(c.current_remote_description(), Some(&answer));
        assert!(c.pending_local_description().is_none());
        assert!(c.pending_remote_description().is_none());

        Ok(())
    }

    #[test]
    fn test_pranswer_then_answer() -> Result<()> {
        let mut c = SignalingCoordinator::default();
        let offer = desc(RTCSdpType::Offer, "offer");
        c.apply(StateChangeOp::SetRemote, offer.clone())?;
        c.apply(StateChangeOp::SetLocal, desc(RTCSdpType::Pranswer, "pranswer"))?;
        assert_eq!(c.state(), S::HaveLocalPranswer);
        assert!(c.current_local_description().is_none());

        let answer = desc(RTCSdpType::Answer, "answer");
        c.apply(StateChangeOp::SetLocal, answer.clone())?;
        assert_eq!(c.state(), S::Stable);
        assert_eq!(c.current_local_description(), Some(&answer));
        assert_eq!(c.current_remote_description(), Some(&offer));
        assert!(c.pending_local_description().is_none());

        Ok(())
    }

    #[test]
    fn test_rollback_clears_pending() -> Result<()> {
        let mut c = coordinator_in(S::HaveRemoteOffer)?;
        c.apply(StateChangeOp::SetLocal, RTCSessionDescription::rollback())?;

        assert_eq!(c.state(), S::Stable);
        assert!(c.pending_remote_description().is_none());
        assert!(c.remote_description().is_none());

        let mut c = coordinator_in(S::Stable)?;
        assert_eq!(
            c.apply(StateChangeOp::SetRemote, RTCSessionDescription::rollback()),
            Err(Error::ErrSignalingStateCannotRollback)
        );

        Ok(())
    }

    #[test]
    fn test_resolve_local() -> Result<()> {
        let mut c = SignalingCoordinator::default();

        assert_eq!(
            c.resolve_local(&desc(RTCSdpType::Offer, "")),
            Err(Error::ErrSDPDoesNotMatchOffer),
            "no offer was created yet"
        );

        c.record_offer("created offer");
        c.record_answer("created answer");

        let implicit = c.resolve_local(&desc(RTCSdpType::Offer, ""))?;
        assert_eq!(implicit.sdp, "created offer");
        let implicit = c.resolve_local(&desc(RTCSdpType::Pranswer, ""))?;
        assert_eq!(implicit.sdp, "created answer");

        assert_eq!(
            c.resolve_local(&desc(RTCSdpType::Offer, "edited offer")),
            Err(Error::ErrSDPDoesNotMatchOffer)
        );
        assert_eq!(
            c.resolve_local(&desc(RTCSdpType::Answer, "edited answer"))
                .map_err(|e| e.kind()),
            Err(crate::error::RTCErrorKind::InvalidModification)
        );
        assert!(c.resolve_local(&RTCSessionDescription::rollback()).is_ok());

        Ok(())
    }

    #[test]
    fn test_close_is_final() -> Result<()> {
        let mut c = coordinator_in(S::HaveLocalOffer)?;
        assert!(c.close());
        assert!(!c.close(), "closing twice changes nothing");
        assert!(c.is_closed());

        assert_eq!(
            c.apply(StateChangeOp::SetRemote, desc(RTCSdpType::Answer, "answer")),
            Err(Error::ErrConnectionClosed)
        );
        assert_eq!(c.state(), S::Closed);

        Ok(())
    }
}
