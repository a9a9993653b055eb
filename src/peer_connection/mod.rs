#[cfg(test)]
mod peer_connection_test;

pub mod certificate;
pub mod configuration;
pub mod offer_answer_options;
pub(crate) mod operation;
mod peer_connection_internal;
pub mod peer_connection_state;
pub mod policy;
pub mod sdp;
pub(crate) mod signaling_coordinator;
pub mod signaling_state;
pub mod state_reducer;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use ::sdp::description::media::MediaDescription;
use ::sdp::description::session::*;
use ::sdp::util::ConnectionRole;
use ::sdp::SessionDescription;
use arc_swap::ArcSwap;
use peer_connection_internal::*;
use tokio::sync::{mpsc, Mutex};

use crate::api::media_engine::MediaEngine;
use crate::api::setting_engine::SettingEngine;
use crate::api::API;
use crate::data_channel::data_channel_init::RTCDataChannelInit;
use crate::data_channel::RTCDataChannel;
use crate::dtls_transport::dtls_fingerprint::RTCDtlsFingerprint;
use crate::dtls_transport::dtls_parameters::DTLSParameters;
use crate::dtls_transport::dtls_role::{DTLSRole, DEFAULT_DTLS_ROLE_ANSWER, DEFAULT_DTLS_ROLE_OFFER};
use crate::dtls_transport::dtls_transport_state::RTCDtlsTransportState;
use crate::dtls_transport::RTCDtlsTransport;
use crate::error::{flatten_errs, Error, Result};
use crate::event_handler::{EventHandlerFn, EventHandlers, HandlerId};
use crate::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use crate::ice_transport::ice_connection_state::RTCIceConnectionState;
use crate::ice_transport::ice_gatherer::{GatherConfig, RTCIceGatherer};
use crate::ice_transport::ice_gatherer_state::RTCIceGathererState;
use crate::ice_transport::ice_gathering_state::RTCIceGatheringState;
use crate::ice_transport::ice_parameters::{generate_random_string, RTCIceParameters, RUNES_ALPHA};
use crate::ice_transport::ice_role::RTCIceRole;
use crate::ice_transport::ice_server::IceServerUrl;
use crate::ice_transport::ice_transport_state::RTCIceTransportState;
use crate::ice_transport::RTCIceTransport;
use crate::media_stream::media_stream_track::MediaStreamTrack;
use crate::peer_connection::certificate::RTCCertificate;
use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::offer_answer_options::{RTCAnswerOptions, RTCOfferOptions};
use crate::peer_connection::operation::{Operation, Operations};
use crate::peer_connection::peer_connection_state::{
    NegotiationNeededState, RTCPeerConnectionState,
};
use crate::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use crate::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::peer_connection::sdp::*;
use crate::peer_connection::signaling_coordinator::SignalingCoordinator;
use crate::peer_connection::signaling_state::{RTCSignalingState, StateChangeOp};
use crate::rtp_transceiver::rtp_codec::{RTCRtpCodecParameters, RTPCodecType};
use crate::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use crate::rtp_transceiver::rtp_sender::RTCRtpSender;
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{
    find_by_mid, satisfy_type_and_direction, RTCRtpTransceiver, RTCRtpTransceiverInit,
    NegotiationTrigger,
};

pub(crate) const MEDIA_SECTION_APPLICATION: &str = "application";

/// Offer generation is retried while transceivers keep changing underneath
/// it, up to this many times.
const MAX_OFFER_ATTEMPTS: usize = 128;

/// math_rand_alpha returns `n` random ASCII letters.
pub fn math_rand_alpha(n: usize) -> String {
    generate_random_string(n, RUNES_ALPHA)
}

pub type OnSignalingStateChangeHdlrFn = EventHandlerFn<RTCSignalingState>;
pub type OnICEConnectionStateChangeHdlrFn = EventHandlerFn<RTCIceConnectionState>;
pub type OnPeerConnectionStateChangeHdlrFn = EventHandlerFn<RTCPeerConnectionState>;
pub type OnICEGatheringStateChangeHdlrFn = EventHandlerFn<RTCIceGatheringState>;
/// Called with each local candidate, then once with None when gathering
/// completes.
pub type OnICECandidateHdlrFn = EventHandlerFn<Option<RTCIceCandidate>>;
pub type OnNegotiationNeededHdlrFn = EventHandlerFn<()>;
pub type OnTrackHdlrFn = EventHandlerFn<RTCTrackEvent>;

/// RTCTrackEvent announces a track the remote side started sending.
#[derive(Clone)]
pub struct RTCTrackEvent {
    pub track: Arc<MediaStreamTrack>,
    pub receiver: Arc<RTCRtpReceiver>,
    pub transceiver: Arc<RTCRtpTransceiver>,
    /// ids of the remote streams the track belongs to
    pub stream_ids: Vec<String>,
}

/// PeerConnection represents a WebRTC connection that establishes a
/// peer-to-peer communications with another PeerConnection instance in a
/// browser, or to another endpoint implementing the required protocols.
///
/// It negotiates sessions with the JSEP offer/answer model and drives the
/// ICE and DTLS transports the negotiated media runs on. Media and SCTP
/// payloads never pass through it.
pub struct RTCPeerConnection {
    stats_id: String,

    configuration: Mutex<RTCConfiguration>,

    pub(crate) internal: Arc<PeerConnectionInternal>,
}

impl RTCPeerConnection {
    /// creates a PeerConnection with the engines of `api`.
    pub(crate) async fn new(api: &API, mut configuration: RTCConfiguration) -> Result<Self> {
        let validated_servers = RTCPeerConnection::init_configuration(&mut configuration)?;

        let internal = PeerConnectionInternal::new(api, &configuration, validated_servers).await?;

        // <https://w3c.github.io/webrtc-pc/#dom-rtcconfiguration-icecandidatepoolsize>
        if configuration.ice_candidate_pool_size > 0 {
            internal.gather().await?;
        }

        Ok(RTCPeerConnection {
            stats_id: format!(
                "PeerConnection-{}",
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_or(0, |d| d.as_nanos())
            ),
            configuration: Mutex::new(configuration),
            internal,
        })
    }

    /// init_configuration parses every ICE server URL and fills in a fresh
    /// certificate when none was supplied.
    fn init_configuration(configuration: &mut RTCConfiguration) -> Result<Vec<IceServerUrl>> {
        let mut validated_servers = vec![];
        for server in configuration.get_ice_servers() {
            validated_servers.extend(server.urls()?);
        }

        if !configuration.certificates.is_empty() {
            if configuration.certificates.iter().any(|c| c.is_expired()) {
                return Err(Error::ErrCertificateExpired);
            }
        } else {
            configuration.certificates = vec![RTCCertificate::generate()?];
        }

        Ok(validated_servers)
    }

    /// on_signaling_state_change registers `f` for every signaling state change,
    /// including the final `closed`.
    pub fn on_signaling_state_change(&self, f: OnSignalingStateChangeHdlrFn) -> HandlerId {
        self.internal.on_signaling_state_change_handlers.register(f)
    }

    /// on_negotiation_needed registers `f` for the coalesced "please renegotiate"
    /// event. It only fires while signaling is stable.
    pub fn on_negotiation_needed(&self, f: OnNegotiationNeededHdlrFn) -> HandlerId {
        self.internal.on_negotiation_needed_handlers.register(f)
    }

    /// on_ice_candidate registers `f` for each local candidate. `None` marks the
    /// end of gathering for the current ICE generation.
    pub fn on_ice_candidate(&self, f: OnICECandidateHdlrFn) -> HandlerId {
        self.internal.on_ice_candidate_handlers.register(f)
    }

    pub fn on_ice_gathering_state_change(&self, f: OnICEGatheringStateChangeHdlrFn) -> HandlerId {
        self.internal.on_ice_gathering_state_change_handlers.register(f)
    }

    /// on_track fires when a remote section starts sending to one of our
    /// receivers, and again if it stops and later resumes.
    pub fn on_track(&self, f: OnTrackHdlrFn) -> HandlerId {
        self.internal.on_track_handlers.register(f)
    }

    pub fn on_ice_connection_state_change(&self, f: OnICEConnectionStateChangeHdlrFn) -> HandlerId {
        self.internal
            .on_ice_connection_state_change_handlers
            .register(f)
    }

    /// on_peer_connection_state_change registers `f` for changes of the
    /// aggregate of every ICE and DTLS transport.
    pub fn on_peer_connection_state_change(
        &self,
        f: OnPeerConnectionStateChangeHdlrFn,
    ) -> HandlerId {
        self.internal
            .on_peer_connection_state_change_handlers
            .register(f)
    }

    /// remove_handler unregisters a handler registered with any of the on_*
    /// methods. It reports whether the handler was found.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let internal = &self.internal;
        internal.on_signaling_state_change_handlers.unregister(id)
            || internal.on_negotiation_needed_handlers.unregister(id)
            || internal.on_ice_candidate_handlers.unregister(id)
            || internal.on_ice_gathering_state_change_handlers.unregister(id)
            || internal.on_track_handlers.unregister(id)
            || internal.on_ice_connection_state_change_handlers.unregister(id)
            || internal.on_peer_connection_state_change_handlers.unregister(id)
    }

    /// set_configuration replaces the mutable part of the configuration: the
    /// ICE servers, the ICE transport policy and, until a local description is
    /// set, the candidate pool size. New servers are used from the next ICE restart.
    pub async fn set_configuration(&self, configuration: RTCConfiguration) -> Result<()> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let has_local_description = self.internal.coordinator.lock().await.local_description().is_some();
        let mut current = self.configuration.lock().await;

        // empty or unspecified fields mean "keep what is there"

        if !configuration.peer_identity.is_empty()
            && configuration.peer_identity != current.peer_identity
        {
            return Err(Error::ErrModifyingPeerIdentity);
        }

        if !configuration.certificates.is_empty()
            && configuration.certificates != current.certificates
        {
            return Err(Error::ErrModifyingCertificates);
        }

        if configuration.bundle_policy != RTCBundlePolicy::Unspecified
            && configuration.bundle_policy != current.bundle_policy
        {
            return Err(Error::ErrModifyingBundlePolicy);
        }

        if configuration.rtcp_mux_policy != RTCRtcpMuxPolicy::Unspecified
            && configuration.rtcp_mux_policy != current.rtcp_mux_policy
        {
            return Err(Error::ErrModifyingRTCPMuxPolicy);
        }

        if configuration.ice_candidate_pool_size != current.ice_candidate_pool_size
            && has_local_description
        {
            return Err(Error::ErrModifyingICECandidatePoolSize);
        }

        let mut validated_servers = vec![];
        for server in configuration.get_ice_servers() {
            validated_servers.extend(server.urls()?);
        }

        current.ice_candidate_pool_size = configuration.ice_candidate_pool_size;
        current.ice_transport_policy = configuration.ice_transport_policy;
        current.ice_servers = configuration.ice_servers;

        self.internal.gather_config.store(Arc::new(GatherConfig {
            validated_servers: validated_servers.clone(),
            gather_policy: current.ice_transport_policy,
        }));
        for t in self.internal.transports().await {
            t.gatherer()
                .set_config(validated_servers.clone(), current.ice_transport_policy);
        }

        Ok(())
    }

    /// get_configuration returns a copy; edits only apply through
    /// `set_configuration`.
    pub async fn get_configuration(&self) -> RTCConfiguration {
        self.configuration.lock().await.clone()
    }

    pub fn get_stats_id(&self) -> &str {
        self.stats_id.as_str()
    }

    /// create_offer builds an offer from the current transceivers and data
    /// channel. It does not change signaling state.
    pub async fn create_offer(
        &self,
        options: Option<RTCOfferOptions>,
    ) -> Result<RTCSessionDescription> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let requested = self.internal.ice_restart_requested.swap(false, Ordering::SeqCst);
        if options.is_some_and(|o| o.ice_restart) || requested {
            for t in self.internal.transports().await {
                t.ice.restart().await?;
            }
        }

        let remote_description = {
            let coordinator = self.internal.coordinator.lock().await;
            coordinator.remote_description().cloned()
        };
        if let Some(parsed) = remote_description.as_ref().and_then(|d| d.parsed.as_ref()) {
            self.internal.note_remote_mids(parsed);
        }

        // This may be necessary to recompute if, for example, createOffer was called when only an
        // audio RTCRtpTransceiver was added to connection, but while performing the in-parallel
        // steps to create an offer, a video RTCRtpTransceiver was added, requiring additional
        // inspection of video system resources.
        let mut count = 0;
        let mut offer;

        loop {
            // We cache current transceivers to ensure they aren't
            // mutated during offer generation. We later check if they have
            // been mutated and recompute the offer if necessary.
            let current_transceivers = self.internal.rtp_transceivers.lock().await.clone();
            self.internal.assign_mids(&current_transceivers).await?;

            let mut d = if remote_description.is_none() {
                self.internal
                    .generate_unmatched_sdp(current_transceivers)
                    .await?
            } else {
                self.internal
                    .generate_matched_sdp(
                        current_transceivers,
                        true, /*includeUnmatched */
                        DEFAULT_DTLS_ROLE_OFFER.to_connection_role(),
                    )
                    .await?
            };

            {
                let mut sdp_origin = self.internal.sdp_origin.lock().await;
                update_sdp_origin(&mut sdp_origin, &mut d);
            }
            let sdp = d.marshal();

            offer = RTCSessionDescription {
                sdp_type: RTCSdpType::Offer,
                sdp,
                parsed: Some(d),
            };

            // Verify local media hasn't changed during offer
            // generation. Recompute if necessary
            if !self.internal.has_local_description_changed(&offer).await {
                break;
            }
            count += 1;
            if count >= MAX_OFFER_ATTEMPTS {
                return Err(Error::ErrExcessiveRetries);
            }
        }

        let mut coordinator = self.internal.coordinator.lock().await;
        if coordinator.is_closed() {
            return Err(Error::ErrConnectionClosed);
        }
        coordinator.record_offer(&offer.sdp);

        Ok(offer)
    }

    /// create_answer answers the pending remote offer. It fails unless the
    /// signaling state is `have-remote-offer` or `have-local-pranswer`.
    pub async fn create_answer(
        &self,
        _options: Option<RTCAnswerOptions>,
    ) -> Result<RTCSessionDescription> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let (remote_description, state) = {
            let coordinator = self.internal.coordinator.lock().await;
            (coordinator.remote_description().cloned(), coordinator.state())
        };
        let Some(remote_description) = remote_description else {
            return Err(Error::ErrNoRemoteDescription);
        };
        if state != RTCSignalingState::HaveRemoteOffer
            && state != RTCSignalingState::HaveLocalPranswer
        {
            return Err(Error::ErrIncorrectSignalingState);
        }

        let mut connection_role = match self.internal.setting_engine.answering_dtls_role {
            DTLSRole::Auto | DTLSRole::Unspecified => {
                DEFAULT_DTLS_ROLE_ANSWER.to_connection_role()
            }
            role => role.to_connection_role(),
        };
        // a lite remote cannot act as the DTLS server
        if let Some(parsed) = &remote_description.parsed {
            if is_lite_set(parsed) && !self.internal.setting_engine.candidates.ice_lite {
                connection_role = DTLSRole::Server.to_connection_role();
            }
        }

        let current_transceivers = self.internal.rtp_transceivers.lock().await.clone();
        let mut d = self
            .internal
            .generate_matched_sdp(current_transceivers, false /*includeUnmatched */, connection_role)
            .await?;

        {
            let mut sdp_origin = self.internal.sdp_origin.lock().await;
            update_sdp_origin(&mut sdp_origin, &mut d);
        }
        let sdp = d.marshal();

        let answer = RTCSessionDescription {
            sdp_type: RTCSdpType::Answer,
            sdp,
            parsed: Some(d),
        };

        let mut coordinator = self.internal.coordinator.lock().await;
        if coordinator.is_closed() {
            return Err(Error::ErrConnectionClosed);
        }
        coordinator.record_answer(&answer.sdp);

        Ok(answer)
    }

    /// set_local_description applies `desc` locally. An empty `sdp` is filled in
    /// with the last offer or answer created for that type. Applying the first
    /// local description starts candidate gathering.
    pub async fn set_local_description(&self, desc: RTCSessionDescription) -> Result<()> {
        let _negotiation = self.internal.negotiation_mu.lock().await;
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let (desc, new_state, previous) = {
            let mut coordinator = self.internal.coordinator.lock().await;
            let mut desc = coordinator.resolve_local(&desc)?;
            coordinator.check(StateChangeOp::SetLocal, &desc)?;
            if desc.sdp_type != RTCSdpType::Rollback && desc.parsed.is_none() {
                desc.parsed = Some(desc.unmarshal()?);
            }
            let previous = coordinator.clone();
            let new_state = coordinator.apply(StateChangeOp::SetLocal, desc.clone())?;
            (desc, new_state, previous)
        };

        if let Err(err) = self.finish_local_description(&desc).await {
            self.restore_coordinator(previous).await;
            return Err(err);
        }

        self.internal.do_signaling_state_change(new_state).await;
        if new_state == RTCSignalingState::Stable {
            self.internal
                .is_negotiation_needed
                .store(false, Ordering::SeqCst);
            self.internal.trigger_negotiation_needed().await;
        }

        Ok(())
    }

    /// finish_local_description settles transceiver directions and starts
    /// gathering for a local description the coordinator has taken.
    async fn finish_local_description(&self, desc: &RTCSessionDescription) -> Result<()> {
        if let Some(parsed) = &desc.parsed {
            // the answer settles what each transceiver ended up doing
            if desc.sdp_type == RTCSdpType::Answer {
                let transceivers = self.internal.rtp_transceivers.lock().await.clone();
                for media in &parsed.media_descriptions {
                    let Some(mid) = get_mid_value(media) else {
                        continue;
                    };
                    if let Some(t) = transceivers
                        .iter()
                        .find(|t| t.mid().as_deref() == Some(mid.as_str()))
                    {
                        let direction = if media.media_name.port.value == 0 {
                            RTCRtpTransceiverDirection::Inactive
                        } else {
                            get_peer_direction(media)
                        };
                        t.set_current_direction(direction);
                    }
                }
            }

            self.internal.bind_media_sections(parsed).await;
            self.internal.gather().await?;
        }
        Ok(())
    }

    /// restore_coordinator puts back the description slots from before a
    /// description that failed to apply. A close in the meantime wins.
    async fn restore_coordinator(&self, previous: SignalingCoordinator) {
        let mut coordinator = self.internal.coordinator.lock().await;
        if coordinator.is_closed() {
            return;
        }
        log::warn!(
            "description not applied, signaling state back to {}",
            previous.state()
        );
        *coordinator = previous;
    }

    /// local_description is the pending local description when there is one,
    /// otherwise the current one, with the candidates gathered so far.
    pub async fn local_description(&self) -> Option<RTCSessionDescription> {
        let desc = self.internal.coordinator.lock().await.local_description().cloned();
        self.with_local_candidates(desc).await
    }

    /// set_remote_description applies a description from the remote peer,
    /// associating its media sections with transceivers and starting transports
    /// once both sides are known.
    pub async fn set_remote_description(&self, mut desc: RTCSessionDescription) -> Result<()> {
        let _negotiation = self.internal.negotiation_mu.lock().await;
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        {
            let coordinator = self.internal.coordinator.lock().await;
            coordinator.check(StateChangeOp::SetRemote, &desc)?;
        }

        if desc.sdp_type == RTCSdpType::Rollback {
            let new_state = {
                let mut coordinator = self.internal.coordinator.lock().await;
                coordinator.apply(StateChangeOp::SetRemote, desc)?
            };
            self.internal.do_signaling_state_change(new_state).await;
            return Ok(());
        }

        let parsed = desc.unmarshal()?;
        // a description the transports cannot start from is refused before
        // it replaces anything
        extract_fingerprint(&parsed)?;
        if self.internal.bundle_policy.is_bundled() {
            bundled_ice_details(&parsed)?;
        } else {
            for (i, media) in parsed.media_descriptions.iter().enumerate() {
                if media.media_name.port.value != 0 {
                    extract_media_ice_details(&parsed, i)?;
                }
            }
        }
        let remote_codecs = remote_codecs_by_mid(&parsed)?;
        desc.parsed = Some(parsed.clone());

        let sdp_type = desc.sdp_type;
        let (new_state, previous) = {
            let mut coordinator = self.internal.coordinator.lock().await;
            let previous = coordinator.clone();
            (coordinator.apply(StateChangeOp::SetRemote, desc)?, previous)
        };

        if let Err(err) = self
            .finish_remote_description(&parsed, sdp_type, &remote_codecs)
            .await
        {
            self.restore_coordinator(previous).await;
            return Err(err);
        }
        self.internal.announce_remote_tracks(&parsed).await;

        self.internal.do_signaling_state_change(new_state).await;
        if new_state == RTCSignalingState::Stable {
            self.internal
                .is_negotiation_needed
                .store(false, Ordering::SeqCst);
            self.internal.trigger_negotiation_needed().await;
        }

        Ok(())
    }

    /// finish_remote_description pairs transceivers with the sections of a
    /// remote description the coordinator has taken, then starts transports.
    async fn finish_remote_description(
        &self,
        parsed: &SessionDescription,
        sdp_type: RTCSdpType,
        remote_codecs: &HashMap<String, Vec<RTCRtpCodecParameters>>,
    ) -> Result<()> {
        self.internal.note_remote_mids(parsed);
        if sdp_type == RTCSdpType::Offer {
            self.accept_remote_media(parsed, remote_codecs).await?;
        } else if sdp_type == RTCSdpType::Answer {
            let transceivers = self.internal.rtp_transceivers.lock().await.clone();
            for media in &parsed.media_descriptions {
                let Some(mid) = get_mid_value(media) else {
                    continue;
                };
                if let Some(t) = transceivers
                    .iter()
                    .find(|t| t.mid().as_deref() == Some(mid.as_str()))
                {
                    let direction = if media.media_name.port.value == 0 {
                        RTCRtpTransceiverDirection::Inactive
                    } else {
                        get_peer_direction(media).reverse()
                    };
                    t.set_current_direction(direction);
                }
            }
        }

        let we_offer = sdp_type != RTCSdpType::Offer;
        self.internal.start_transports(parsed, we_offer).await
    }

    /// accept_remote_media pairs every media section of a remote offer with
    /// a transceiver, creating receive side ones for sections nothing local
    /// matches.
    async fn accept_remote_media(
        &self,
        parsed: &SessionDescription,
        remote_codecs: &HashMap<String, Vec<RTCRtpCodecParameters>>,
    ) -> Result<()> {
        let mut local_transceivers = self.internal.rtp_transceivers.lock().await.clone();

        for media in &parsed.media_descriptions {
            let Some(mid) = get_mid_value(media) else {
                continue;
            };
            if media.media_name.media == MEDIA_SECTION_APPLICATION {
                continue;
            }

            let kind = RTPCodecType::from(media.media_name.media.as_str());
            let direction = get_peer_direction(media);
            if kind == RTPCodecType::Unspecified
                || direction == RTCRtpTransceiverDirection::Unspecified
            {
                continue;
            }

            let t = match find_by_mid(mid, &mut local_transceivers) {
                Some(t) => Some(t),
                None => satisfy_type_and_direction(kind, direction, &mut local_transceivers),
            };
            let t = match t {
                Some(t) => {
                    if t.mid().is_none() {
                        t.set_mid(mid.clone())?;
                    }
                    t
                }
                None => {
                    let local_direction = if direction == RTCRtpTransceiverDirection::Recvonly {
                        RTCRtpTransceiverDirection::Sendonly
                    } else {
                        RTCRtpTransceiverDirection::Recvonly
                    };
                    let t = self.internal.new_transceiver(
                        kind,
                        None,
                        local_direction,
                        vec![],
                        get_msid_track_id(media),
                    );
                    t.set_mid(mid.clone())?;
                    self.internal.add_rtp_transceiver(Arc::clone(&t)).await;
                    t
                }
            };

            let Some(codecs) = remote_codecs.get(mid) else {
                continue;
            };
            let matched = self.internal.media_engine.match_remote_codecs(kind, codecs);
            if !matched.is_empty() {
                t.set_codec_preferences(matched).await?;
            }
        }

        Ok(())
    }

    pub async fn remote_description(&self) -> Option<RTCSessionDescription> {
        self.internal
            .coordinator
            .lock()
            .await
            .remote_description()
            .cloned()
    }

    /// add_ice_candidate accepts an ICE candidate string and adds it
    /// to the existing set of candidates. An empty candidate signals the end
    /// of candidates for its media section, or for every section when it
    /// names none.
    pub async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()> {
        let _negotiation = self.internal.negotiation_mu.lock().await;
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let remote_description = self.remote_description().await;
        let Some(parsed) = remote_description.and_then(|d| d.parsed) else {
            return Err(Error::ErrNoRemoteDescription);
        };

        let (mid, mline_index) = match (&candidate.sdp_mid, candidate.sdp_mline_index) {
            (Some(mid), _) => {
                let index = parsed
                    .media_descriptions
                    .iter()
                    .position(|m| get_mid_value(m) == Some(mid))
                    .ok_or(Error::ErrICECandidateMidUnknown)?;
                (mid.clone(), index)
            }
            (None, Some(index)) => {
                let mid = parsed
                    .media_descriptions
                    .get(usize::from(index))
                    .and_then(get_mid_value)
                    .ok_or(Error::ErrICECandidateMidUnknown)?;
                (mid.clone(), usize::from(index))
            }
            (None, None) if candidate.candidate.is_empty() => {
                for t in self.internal.transports().await {
                    t.ice.add_remote_candidate(None).await?;
                }
                return Ok(());
            }
            (None, None) => return Err(Error::ErrICECandidateMissingMidAndIndex),
        };

        let transport = self
            .internal
            .find_transport(&mid)
            .await
            .ok_or(Error::ErrICECandidateMidUnknown)?;

        if let Some(ufrag) = &candidate.username_fragment {
            let remote_ufrag = transport
                .ice
                .get_remote_parameters()
                .await
                .map(|p| p.username_fragment);
            if remote_ufrag.as_ref() != Some(ufrag) {
                return Err(Error::ErrICECandidateUfragMismatch);
            }
        }

        if candidate.candidate.is_empty() {
            return transport.ice.add_remote_candidate(None).await;
        }

        let mut c = RTCIceCandidate::unmarshal(&candidate.candidate)?;
        c.sdp_mid = Some(mid);
        c.sdp_mline_index = u16::try_from(mline_index).ok();
        c.username_fragment = candidate.username_fragment;
        transport.ice.add_remote_candidate(Some(c)).await
    }

    pub fn ice_connection_state(&self) -> RTCIceConnectionState {
        self.internal
            .ice_connection_state
            .load(Ordering::SeqCst)
            .into()
    }

    /// get_senders lists the senders of transceivers that are not stopped.
    pub async fn get_senders(&self) -> Vec<Arc<RTCRtpSender>> {
        let transceivers = self.internal.rtp_transceivers.lock().await.clone();
        let mut senders = vec![];
        for t in transceivers {
            if !t.stopped() {
                senders.push(t.sender().await);
            }
        }
        senders
    }

    pub async fn get_receivers(&self) -> Vec<Arc<RTCRtpReceiver>> {
        let transceivers = self.internal.rtp_transceivers.lock().await;
        transceivers
            .iter()
            .filter(|t| !t.stopped())
            .map(|t| Arc::clone(t.receiver()))
            .collect()
    }

    /// get_transceivers lists every transceiver in creation order, stopped ones
    /// included.
    pub async fn get_transceivers(&self) -> Vec<Arc<RTCRtpTransceiver>> {
        self.internal.rtp_transceivers.lock().await.clone()
    }

    /// add_track adds a Track to the PeerConnection, announced as part of
    /// the streams in `stream_ids`.
    pub async fn add_track(
        &self,
        track: Arc<MediaStreamTrack>,
        stream_ids: Vec<String>,
    ) -> Result<Arc<RTCRtpSender>> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let transceivers = self.internal.rtp_transceivers.lock().await.clone();
        let mut reusable = None;
        for t in &transceivers {
            let sender = t.sender().await;
            if let Some(current) = sender.track().await {
                if current.id() == track.id() {
                    return Err(Error::ErrExistingTrack);
                }
            } else if reusable.is_none()
                && !t.stopped()
                && t.kind() == track.kind()
                && !t.current_direction().has_send()
            {
                reusable = Some(Arc::clone(t));
            }
        }

        if let Some(t) = reusable {
            t.set_sending_track(Some(track)).await?;
            self.internal.trigger_negotiation_needed().await;
            return Ok(t.sender().await);
        }

        let t = self.internal.new_transceiver(
            track.kind(),
            Some(track),
            RTCRtpTransceiverDirection::Sendrecv,
            stream_ids,
            None,
        );
        self.internal.add_rtp_transceiver(Arc::clone(&t)).await;

        Ok(t.sender().await)
    }

    /// remove_track stops `sender` from sending. Its transceiver stays and its
    /// direction loses send.
    pub async fn remove_track(&self, sender: &Arc<RTCRtpSender>) -> Result<()> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let transceivers = self.internal.rtp_transceivers.lock().await.clone();
        let mut transceiver = None;
        for t in transceivers {
            if t.sender().await.id() == sender.id() {
                transceiver = Some(t);
                break;
            }
        }
        let Some(t) = transceiver else {
            return Err(Error::ErrSenderNotCreatedByConnection);
        };

        if sender.track().await.is_none() {
            return Ok(());
        }
        t.set_sending_track(None).await?;
        self.internal.trigger_negotiation_needed().await;
        Ok(())
    }

    /// add_transceiver_from_kind adds a transceiver without a track.
    /// Only `sendrecv`, `sendonly` and `recvonly` are accepted.
    pub async fn add_transceiver_from_kind(
        &self,
        kind: RTPCodecType,
        init: Option<RTCRtpTransceiverInit>,
    ) -> Result<Arc<RTCRtpTransceiver>> {
        self.internal.add_transceiver_from_kind(kind, init).await
    }

    /// create_data_channel registers a channel. The first one on a session makes
    /// the next offer carry an `application` section.
    pub async fn create_data_channel(
        &self,
        label: &str,
        options: Option<RTCDataChannelInit>,
    ) -> Result<Arc<RTCDataChannel>> {
        // https://w3c.github.io/webrtc-pc/#peer-to-peer-data-api (Step #2)
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let d = Arc::new(RTCDataChannel::new(label, options)?);

        {
            let mut data_channels = self.internal.data_channels.lock().await;
            if let Some(id) = d.id() {
                if crate::data_channel::id_in_use(&data_channels, id) {
                    return Err(Error::ErrDataChannelIdInUse);
                }
            }
            data_channels.push(Arc::clone(&d));
        }
        log::debug!("data channel {label} created");

        self.internal.trigger_negotiation_needed().await;

        Ok(d)
    }

    /// restart_ice makes the next offer restart ICE on every transport.
    /// <https://w3c.github.io/webrtc-pc/#dom-rtcpeerconnection-restartice>
    pub async fn restart_ice(&self) -> Result<()> {
        if self.internal.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }
        self.internal
            .ice_restart_requested
            .store(true, Ordering::SeqCst);
        self.internal.trigger_negotiation_needed().await;
        Ok(())
    }

    /// close tears the session down. Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        {
            let mut coordinator = self.internal.coordinator.lock().await;
            if !coordinator.close() {
                return Ok(());
            }
        }

        self.internal.is_closed.store(true, Ordering::SeqCst);
        self.internal
            .do_signaling_state_change(RTCSignalingState::Closed)
            .await;

        // keep going past failures, report them together
        let mut close_errs = vec![];

        if let Err(err) = self.internal.ops.close().await {
            close_errs.push(Error::new(format!("ops: {err}")));
        }

        let transceivers = self.internal.rtp_transceivers.lock().await.clone();
        for t in transceivers {
            if let Err(err) = t.stop().await {
                close_errs.push(Error::new(format!("rtp_transceivers: {err}")));
            }
        }

        let data_channels = self.internal.data_channels.lock().await.clone();
        for d in data_channels {
            if let Err(err) = d.close().await {
                close_errs.push(Error::new(format!("data_channels: {err}")));
            }
        }

        for t in self.internal.transports().await {
            for err in t.stop().await {
                close_errs.push(Error::new(format!("transport: {err}")));
            }
        }

        self.internal.update_connection_states().await;

        log::info!("peer connection {} closed", self.stats_id);
        flatten_errs(close_errs)
    }

    /// with_local_candidates adds the candidates gathered since `desc` was
    /// created.
    async fn with_local_candidates(
        &self,
        desc: Option<RTCSessionDescription>,
    ) -> Option<RTCSessionDescription> {
        let desc = desc?;
        let ice = self.internal.section_ice_of(&desc).await;
        Some(populate_local_candidates(&desc, &ice))
    }

    /// current_local_description is the local half of the last exchange that
    /// reached `stable`, plus candidates gathered since.
    pub async fn current_local_description(&self) -> Option<RTCSessionDescription> {
        let desc = self
            .internal
            .coordinator
            .lock()
            .await
            .current_local_description()
            .cloned();
        self.with_local_candidates(desc).await
    }

    /// pending_local_description is the local description of an exchange still
    /// in flight, plus candidates gathered since.
    pub async fn pending_local_description(&self) -> Option<RTCSessionDescription> {
        let desc = self
            .internal
            .coordinator
            .lock()
            .await
            .pending_local_description()
            .cloned();
        self.with_local_candidates(desc).await
    }

    pub async fn current_remote_description(&self) -> Option<RTCSessionDescription> {
        self.internal
            .coordinator
            .lock()
            .await
            .current_remote_description()
            .cloned()
    }

    pub async fn pending_remote_description(&self) -> Option<RTCSessionDescription> {
        self.internal
            .coordinator
            .lock()
            .await
            .pending_remote_description()
            .cloned()
    }

    pub fn signaling_state(&self) -> RTCSignalingState {
        self.internal.signaling_state.load(Ordering::SeqCst).into()
    }

    /// ice_gathering_state folds every transport's gatherer state.
    pub fn ice_gathering_state(&self) -> RTCIceGatheringState {
        self.internal
            .ice_gathering_state
            .load(Ordering::SeqCst)
            .into()
    }

    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.internal
            .peer_connection_state
            .load(Ordering::SeqCst)
            .into()
    }

    /// gathering_complete_promise returns a channel that is closed once ICE
    /// gathering completes. It lets a caller wait for every candidate and
    /// signal a complete description instead of trickling.
    pub async fn gathering_complete_promise(&self) -> mpsc::Receiver<()> {
        let (done_tx, done_rx) = mpsc::channel(1);
        let done_tx = Arc::new(std::sync::Mutex::new(Some(done_tx)));

        let tx = Arc::clone(&done_tx);
        self.on_ice_gathering_state_change(Box::new(move |state| {
            if state == RTCIceGatheringState::Complete {
                if let Ok(mut tx) = tx.lock() {
                    tx.take();
                }
            }
            Box::pin(async {})
        }));

        if self.ice_gathering_state() == RTCIceGatheringState::Complete {
            if let Ok(mut tx) = done_tx.lock() {
                tx.take();
            }
        }

        done_rx
    }

    /// ice_transports returns the ICE transports of the session, one per
    /// media section when not bundled.
    pub async fn ice_transports(&self) -> Vec<Arc<RTCIceTransport>> {
        self.internal
            .transports()
            .await
            .iter()
            .map(|t| Arc::clone(&t.ice))
            .collect()
    }

    /// dtls_transports returns the DTLS transports of the session, in the
    /// order of ice_transports.
    pub async fn dtls_transports(&self) -> Vec<Arc<RTCDtlsTransport>> {
        self.internal
            .transports()
            .await
            .iter()
            .map(|t| Arc::clone(&t.dtls))
            .collect()
    }
}
