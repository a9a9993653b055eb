use super::*;

/// MediaTransport is the ICE and DTLS transport pair a group of media
/// sections runs on.
pub(crate) struct MediaTransport {
    /// None for the transport every bundled section shares.
    pub(crate) mid: Option<String>,
    pub(crate) ice: Arc<RTCIceTransport>,
    pub(crate) dtls: Arc<RTCDtlsTransport>,
}

impl MediaTransport {
    pub(crate) fn gatherer(&self) -> &Arc<RTCIceGatherer> {
        &self.ice.gatherer
    }

    async fn section_ice(&self) -> SectionIce {
        let gatherer = self.gatherer();
        SectionIce {
            params: gatherer.get_local_parameters().await,
            candidates: gatherer.get_local_candidates().await,
            gathering_state: state_reducer::ice_gathering_state(&[gatherer.state()]),
        }
    }

    /// start begins checking and the DTLS handshake against the remote
    /// side, or refreshes the remote ICE state of a transport already
    /// running.
    async fn start(
        &self,
        remote: &RemoteIceDetails,
        remote_is_lite: bool,
        ice_role: RTCIceRole,
        dtls_parameters: &DTLSParameters,
        we_offer: bool,
    ) -> Result<()> {
        let remote_params = RTCIceParameters {
            username_fragment: remote.ufrag.clone(),
            password: remote.pwd.clone(),
            ice_lite: remote_is_lite,
        };

        if self.ice.state() == RTCIceTransportState::New {
            self.ice.start(remote_params, ice_role).await?;
        } else if self
            .ice
            .have_remote_credentials_change(&remote.ufrag, &remote.pwd)
            .await
        {
            // a remote offer with new credentials restarts ICE implicitly
            if !we_offer {
                self.ice.restart().await?;
            }
            self.ice.set_remote_credentials(remote_params).await?;
        }

        self.ice.set_remote_candidates(&remote.candidates).await?;

        if self.dtls.state() == RTCDtlsTransportState::New {
            self.dtls.start(dtls_parameters.clone()).await?;
        }
        Ok(())
    }

    pub(crate) async fn stop(&self) -> Vec<Error> {
        let mut errs = vec![];
        if let Err(err) = self.dtls.stop().await {
            errs.push(err);
        }
        if let Err(err) = self.ice.stop().await {
            errs.push(err);
        }
        errs
    }
}

pub(crate) struct PeerConnectionInternal {
    /// Held for the whole of set_local_description, set_remote_description
    /// and add_ice_candidate so they apply one at a time, in order.
    pub(super) negotiation_mu: Mutex<()>,
    pub(super) coordinator: Mutex<SignalingCoordinator>,
    pub(super) signaling_state: AtomicU8,

    /// highest numeric mid seen on either side; new mids count up from it
    pub(super) greater_mid: AtomicIsize,
    pub(super) data_mid: Mutex<Option<String>>,
    pub(super) sdp_origin: Mutex<Origin>,

    pub(super) is_closed: AtomicBool,
    /// set by restart_ice, consumed by the next offer
    pub(super) ice_restart_requested: AtomicBool,

    /// serial queue the negotiation-needed checks run on
    pub(crate) ops: Arc<Operations>,
    pub(super) negotiation_needed_state: AtomicU8,
    pub(super) is_negotiation_needed: AtomicBool,

    pub(super) peer_connection_state: AtomicU8,
    pub(super) ice_connection_state: AtomicU8,
    pub(super) ice_gathering_state: AtomicU8,

    pub(super) bundle_policy: RTCBundlePolicy,
    pub(super) rtcp_mux_policy: RTCRtcpMuxPolicy,
    pub(super) certificates: Vec<RTCCertificate>,
    pub(super) gather_config: ArcSwap<GatherConfig>,
    pub(super) transports: Mutex<Vec<Arc<MediaTransport>>>,

    pub(super) rtp_transceivers: Mutex<Vec<Arc<RTCRtpTransceiver>>>,
    pub(super) data_channels: Mutex<Vec<Arc<RTCDataChannel>>>,
    /// mids whose remote track has been announced with on_track
    pub(super) announced_tracks: Mutex<Vec<String>>,

    pub(super) setting_engine: Arc<SettingEngine>,
    pub(crate) media_engine: Arc<MediaEngine>,

    pub(super) on_signaling_state_change_handlers: EventHandlers<RTCSignalingState>,
    pub(super) on_ice_connection_state_change_handlers: EventHandlers<RTCIceConnectionState>,
    pub(super) on_peer_connection_state_change_handlers: EventHandlers<RTCPeerConnectionState>,
    pub(super) on_ice_gathering_state_change_handlers: EventHandlers<RTCIceGatheringState>,
    pub(super) on_ice_candidate_handlers: EventHandlers<Option<RTCIceCandidate>>,
    pub(super) on_negotiation_needed_handlers: EventHandlers<()>,
    pub(super) on_track_handlers: EventHandlers<RTCTrackEvent>,
}

impl PeerConnectionInternal {
    pub(super) async fn new(
        api: &API,
        configuration: &RTCConfiguration,
        validated_servers: Vec<IceServerUrl>,
    ) -> Result<Arc<Self>> {
        let ids = Arc::new(AtomicU64::new(1));
        let pc = Arc::new(PeerConnectionInternal {
            negotiation_mu: Mutex::new(()),
            coordinator: Mutex::new(SignalingCoordinator::default()),
            signaling_state: AtomicU8::new(RTCSignalingState::Stable as u8),

            greater_mid: AtomicIsize::new(-1),
            data_mid: Mutex::new(None),
            sdp_origin: Mutex::new(Default::default()),

            is_closed: AtomicBool::new(false),
            ice_restart_requested: AtomicBool::new(false),

            ops: Arc::new(Operations::new()),
            negotiation_needed_state: AtomicU8::new(NegotiationNeededState::Empty as u8),
            is_negotiation_needed: AtomicBool::new(false),

            peer_connection_state: AtomicU8::new(RTCPeerConnectionState::New as u8),
            ice_connection_state: AtomicU8::new(RTCIceConnectionState::New as u8),
            ice_gathering_state: AtomicU8::new(RTCIceGatheringState::New as u8),

            bundle_policy: configuration.bundle_policy,
            rtcp_mux_policy: configuration.rtcp_mux_policy,
            certificates: configuration.certificates.clone(),
            gather_config: ArcSwap::from_pointee(GatherConfig {
                validated_servers,
                gather_policy: configuration.ice_transport_policy,
            }),
            transports: Mutex::new(vec![]),

            rtp_transceivers: Mutex::new(vec![]),
            data_channels: Mutex::new(vec![]),
            announced_tracks: Mutex::new(vec![]),

            setting_engine: Arc::clone(&api.setting_engine),
            media_engine: Arc::clone(&api.media_engine),

            on_signaling_state_change_handlers: EventHandlers::sharing_ids(&ids),
            on_ice_connection_state_change_handlers: EventHandlers::sharing_ids(&ids),
            on_peer_connection_state_change_handlers: EventHandlers::sharing_ids(&ids),
            on_ice_gathering_state_change_handlers: EventHandlers::sharing_ids(&ids),
            on_ice_candidate_handlers: EventHandlers::sharing_ids(&ids),
            on_negotiation_needed_handlers: EventHandlers::sharing_ids(&ids),
            on_track_handlers: EventHandlers::sharing_ids(&ids),
        });

        // unbundled sessions create their transports as mids appear
        if pc.bundle_policy.is_bundled() {
            let transport = pc.new_transport(None);
            pc.transports.lock().await.push(transport);
        }

        Ok(pc)
    }

    /// new_transport creates an ICE/DTLS pair and wires its state changes
    /// into the aggregate states of the session.
    fn new_transport(self: &Arc<Self>, mid: Option<String>) -> Arc<MediaTransport> {
        let config = self.gather_config.load();
        let gatherer = Arc::new(RTCIceGatherer::new(
            config.validated_servers.clone(),
            config.gather_policy,
            self.rtcp_mux_policy.components(),
            Arc::clone(&self.setting_engine),
        ));
        let ice = RTCIceTransport::new(Arc::clone(&gatherer));
        let dtls = RTCDtlsTransport::new(
            Arc::clone(&ice),
            self.certificates.clone(),
            Arc::clone(&self.setting_engine),
        );

        let weak = Arc::downgrade(self);
        gatherer.on_local_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let weak = weak.clone();
            Box::pin(async move {
                // the end of candidates is announced once every gatherer is done
                if let (Some(pc), Some(c)) = (weak.upgrade(), c) {
                    if !pc.is_closed.load(Ordering::SeqCst) {
                        pc.on_ice_candidate_handlers.emit(Some(c)).await;
                    }
                }
            })
        }));

        let weak = Arc::downgrade(self);
        gatherer.on_state_change(Box::new(move |_| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(pc) = weak.upgrade() {
                    pc.update_ice_gathering_state().await;
                }
            })
        }));

        let weak = Arc::downgrade(self);
        ice.on_connection_state_change(Box::new(move |_| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(pc) = weak.upgrade() {
                    pc.update_connection_states().await;
                }
            })
        }));

        let weak = Arc::downgrade(self);
        dtls.on_state_change(Box::new(move |_| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(pc) = weak.upgrade() {
                    pc.update_connection_states().await;
                }
            })
        }));

        log::debug!(
            "created transport for {}",
            mid.as_deref().unwrap_or("bundled media sections")
        );
        Arc::new(MediaTransport { mid, ice, dtls })
    }

    /// transports returns a snapshot, so no transport call runs under the
    /// lock.
    pub(super) async fn transports(&self) -> Vec<Arc<MediaTransport>> {
        self.transports.lock().await.clone()
    }

    /// transport_for_mid returns the transport media section `mid` runs on,
    /// creating it for unbundled sessions.
    pub(super) async fn transport_for_mid(self: &Arc<Self>, mid: &str) -> Arc<MediaTransport> {
        let mut transports = self.transports.lock().await;
        if self.bundle_policy.is_bundled() {
            if let Some(t) = transports.first() {
                return Arc::clone(t);
            }
        }
        if let Some(t) = transports.iter().find(|t| t.mid.as_deref() == Some(mid)) {
            return Arc::clone(t);
        }

        let t = self.new_transport(Some(mid.to_owned()));
        transports.push(Arc::clone(&t));
        t
    }

    /// find_transport is transport_for_mid without the creation.
    pub(super) async fn find_transport(&self, mid: &str) -> Option<Arc<MediaTransport>> {
        let transports = self.transports.lock().await;
        if self.bundle_policy.is_bundled() {
            return transports.first().cloned();
        }
        transports
            .iter()
            .find(|t| t.mid.as_deref() == Some(mid))
            .cloned()
    }

    pub(super) async fn update_ice_gathering_state(&self) {
        if self.is_closed.load(Ordering::SeqCst) {
            return;
        }
        let states: Vec<RTCIceGathererState> = self
            .transports()
            .await
            .iter()
            .map(|t| t.gatherer().state())
            .collect();
        let state = state_reducer::ice_gathering_state(&states);

        let previous: RTCIceGatheringState = self
            .ice_gathering_state
            .swap(state as u8, Ordering::SeqCst)
            .into();
        if previous == state {
            return;
        }

        log::info!("ICE gathering state changed: {state}");
        self.on_ice_gathering_state_change_handlers.emit(state).await;
        if state == RTCIceGatheringState::Complete {
            self.on_ice_candidate_handlers.emit(None).await;
        }
    }

    /// update_connection_states recomputes iceConnectionState and
    /// connectionState from the transports and reports what changed.
    pub(super) async fn update_connection_states(&self) {
        let transports = self.transports().await;
        let ice_states: Vec<RTCIceTransportState> =
            transports.iter().map(|t| t.ice.state()).collect();
        let dtls_states: Vec<RTCDtlsTransportState> =
            transports.iter().map(|t| t.dtls.state()).collect();
        let is_closed = self.is_closed.load(Ordering::SeqCst);

        let ice_connection_state = state_reducer::ice_connection_state(is_closed, &ice_states);
        let previous: RTCIceConnectionState = self
            .ice_connection_state
            .swap(ice_connection_state as u8, Ordering::SeqCst)
            .into();
        if previous != ice_connection_state {
            log::info!("ICE connection state changed: {ice_connection_state}");
            self.on_ice_connection_state_change_handlers
                .emit(ice_connection_state)
                .await;
        }

        let connection_state =
            state_reducer::connection_state(is_closed, &ice_states, &dtls_states);
        let previous: RTCPeerConnectionState = self
            .peer_connection_state
            .swap(connection_state as u8, Ordering::SeqCst)
            .into();
        if previous != connection_state {
            log::info!("peer connection state changed: {connection_state}");
            self.on_peer_connection_state_change_handlers
                .emit(connection_state)
                .await;
        }
    }

    pub(super) async fn do_signaling_state_change(&self, new_state: RTCSignalingState) {
        self.signaling_state
            .store(new_state as u8, Ordering::SeqCst);
        self.on_signaling_state_change_handlers.emit(new_state).await;
    }

    /// next_mid hands out the mid of a new media section.
    fn next_mid(&self) -> String {
        if let Some(gen) = &self.setting_engine.mid_generator {
            let mid = gen(self.greater_mid.load(Ordering::SeqCst));
            // numeric mids from the generator still move the counter
            if let Ok(numeric_mid) = mid.parse::<isize>() {
                self.greater_mid.fetch_max(numeric_mid, Ordering::SeqCst);
            }
            mid
        } else {
            let greater_mid = self.greater_mid.fetch_add(1, Ordering::SeqCst);
            format!("{}", greater_mid + 1)
        }
    }

    /// note_remote_mids moves the mid counter past the numeric mids of a
    /// remote description.
    pub(super) fn note_remote_mids(&self, parsed: &SessionDescription) {
        for media in &parsed.media_descriptions {
            if let Some(Ok(numeric_mid)) = get_mid_value(media).map(|mid| mid.parse::<isize>()) {
                self.greater_mid.fetch_max(numeric_mid, Ordering::SeqCst);
            }
        }
    }

    /// assign_mids gives every transceiver without one a mid, and the data
    /// section its mid once a channel exists.
    pub(super) async fn assign_mids(&self, transceivers: &[Arc<RTCRtpTransceiver>]) -> Result<()> {
        for t in transceivers {
            if t.mid().is_none() && !t.stopped() {
                t.set_mid(self.next_mid())?;
            }
        }
        if !self.data_channels.lock().await.is_empty() {
            self.data_mid().await;
        }
        Ok(())
    }

    pub(super) async fn data_mid(&self) -> String {
        let mut data_mid = self.data_mid.lock().await;
        if let Some(mid) = &*data_mid {
            return mid.clone();
        }
        let mid = self.next_mid();
        *data_mid = Some(mid.clone());
        mid
    }

    fn dtls_fingerprints(&self) -> Result<Vec<RTCDtlsFingerprint>> {
        self.certificates
            .first()
            .map(|cert| cert.get_fingerprints())
            .ok_or(Error::ErrNonCertificate)
    }

    /// generate_unmatched_sdp lays out an offer from local state alone, one
    /// section per live transceiver plus the data section.
    pub(super) async fn generate_unmatched_sdp(
        self: &Arc<Self>,
        local_transceivers: Vec<Arc<RTCRtpTransceiver>>,
    ) -> Result<SessionDescription> {
        let d = SessionDescription::new_jsep_session_description(false);

        let mut media_sections = vec![];
        for t in &local_transceivers {
            if t.stopped() {
                continue;
            }
            let Some(mid) = t.mid() else { continue };
            let ice = self.transport_for_mid(&mid).await.section_ice().await;
            media_sections.push(MediaSection {
                id: mid,
                transceiver: Some(Arc::clone(t)),
                ice,
                ..Default::default()
            });
        }

        if !self.data_channels.lock().await.is_empty() {
            let mid = self.data_mid().await;
            let ice = self.transport_for_mid(&mid).await.section_ice().await;
            media_sections.push(MediaSection {
                id: mid,
                data: true,
                ice,
                ..Default::default()
            });
        }

        let params = PopulateSdpParams {
            is_icelite: self.setting_engine.candidates.ice_lite,
            bundled: self.bundle_policy.is_bundled(),
            connection_role: DEFAULT_DTLS_ROLE_OFFER.to_connection_role(),
            match_bundle_group: None,
        };
        populate_sdp(d, &self.dtls_fingerprints()?, &media_sections, params).await
    }

    /// generate_matched_sdp keeps the section order of the remote description.
    /// Offers then append sections for transceivers the remote has not seen.
    pub(super) async fn generate_matched_sdp(
        self: &Arc<Self>,
        mut local_transceivers: Vec<Arc<RTCRtpTransceiver>>,
        include_unmatched: bool,
        connection_role: ConnectionRole,
    ) -> Result<SessionDescription> {
        let d = SessionDescription::new_jsep_session_description(false);

        let remote_description = {
            let coordinator = self.coordinator.lock().await;
            coordinator.remote_description().cloned()
        };
        let parsed = remote_description.and_then(|desc| desc.parsed);

        let mut media_sections = vec![];
        let mut already_have_application_media_section = false;

        if let Some(parsed) = &parsed {
            for media in &parsed.media_descriptions {
                let Some(mid_value) = get_mid_value(media) else {
                    continue;
                };
                if mid_value.is_empty() {
                    return Err(Error::ErrPeerConnTranscieverMidNil);
                }

                if media.media_name.media == MEDIA_SECTION_APPLICATION {
                    let ice = self.transport_for_mid(mid_value).await.section_ice().await;
                    media_sections.push(MediaSection {
                        id: mid_value.to_owned(),
                        data: true,
                        ice,
                        ..Default::default()
                    });
                    already_have_application_media_section = true;
                    continue;
                }

                let kind = RTPCodecType::from(media.media_name.media.as_str());
                let direction = get_peer_direction(media);
                if kind == RTPCodecType::Unspecified
                    || direction == RTCRtpTransceiverDirection::Unspecified
                {
                    continue;
                }

                let t = find_by_mid(mid_value, &mut local_transceivers)
                    .ok_or(Error::ErrPeerConnTranscieverMidNil)?;
                let ice = self.transport_for_mid(mid_value).await.section_ice().await;
                media_sections.push(MediaSection {
                    id: mid_value.to_owned(),
                    transceiver: Some(t),
                    offered_direction: (!include_unmatched).then_some(direction),
                    ice,
                    ..Default::default()
                });
            }
        }

        // only offers may add sections
        let match_bundle_group = if include_unmatched {
            for t in &local_transceivers {
                if t.stopped() {
                    continue;
                }
                let Some(mid) = t.mid() else { continue };
                let ice = self.transport_for_mid(&mid).await.section_ice().await;
                media_sections.push(MediaSection {
                    id: mid,
                    transceiver: Some(Arc::clone(t)),
                    ice,
                    ..Default::default()
                });
            }

            if !self.data_channels.lock().await.is_empty() && !already_have_application_media_section
            {
                let mid = self.data_mid().await;
                let ice = self.transport_for_mid(&mid).await.section_ice().await;
                media_sections.push(MediaSection {
                    id: mid,
                    data: true,
                    ice,
                    ..Default::default()
                });
            }
            None
        } else {
            parsed
                .as_ref()
                .and_then(|d| d.attribute(ATTR_KEY_GROUP))
                .map(ToOwned::to_owned)
        };

        // an answer only bundles what the offer grouped
        let bundled =
            self.bundle_policy.is_bundled() && (include_unmatched || match_bundle_group.is_some());

        let params = PopulateSdpParams {
            is_icelite: self.setting_engine.candidates.ice_lite,
            bundled,
            connection_role,
            match_bundle_group,
        };
        populate_sdp(d, &self.dtls_fingerprints()?, &media_sections, params).await
    }

    /// has_local_description_changed reports a transceiver that `desc` has no
    /// section for, or whose direction moved while the offer was being built.
    pub(super) async fn has_local_description_changed(&self, desc: &RTCSessionDescription) -> bool {
        let rtp_transceivers = self.rtp_transceivers.lock().await;
        for t in &*rtp_transceivers {
            if t.stopped() {
                continue;
            }
            let m = match t.mid().and_then(|mid| get_by_mid(mid.as_str(), desc)) {
                Some(m) => m,
                None => return true,
            };

            // sections rejected for lack of codecs keep their inactive port
            if m.media_name.port.value == 0 {
                continue;
            }
            if get_peer_direction(m) != t.direction() {
                return true;
            }
        }
        false
    }

    /// section_ice_of lists, for each media section of `desc`, the local
    /// ICE state its candidates come from. Bundled sessions carry them in
    /// the first section only.
    pub(super) async fn section_ice_of(&self, desc: &RTCSessionDescription) -> Vec<Option<SectionIce>> {
        let Some(parsed) = &desc.parsed else {
            return vec![];
        };

        let mut out = vec![];
        for (i, media) in parsed.media_descriptions.iter().enumerate() {
            if self.bundle_policy.is_bundled() && i > 0 {
                out.push(None);
                continue;
            }
            let transport = match get_mid_value(media) {
                Some(mid) => self.find_transport(mid).await,
                None => None,
            };
            match transport {
                Some(t) => out.push(Some(t.section_ice().await)),
                None => out.push(None),
            }
        }
        out
    }

    /// bind_media_sections tells each gatherer which m-line its candidates
    /// are signaled under.
    pub(super) async fn bind_media_sections(self: &Arc<Self>, parsed: &SessionDescription) {
        for (i, media) in parsed.media_descriptions.iter().enumerate() {
            if media.media_name.port.value == 0 {
                continue;
            }
            let Some(mid) = get_mid_value(media) else {
                continue;
            };
            let transport = self.transport_for_mid(mid).await;
            transport
                .gatherer()
                .set_media_section(Some(mid.clone()), u16::try_from(i).ok())
                .await;
            if self.bundle_policy.is_bundled() {
                break;
            }
        }
    }

    /// gather starts gathering on every transport that has not yet.
    pub(super) async fn gather(&self) -> Result<()> {
        for t in self.transports().await {
            if t.gatherer().state() == RTCIceGathererState::New {
                t.gatherer().gather().await?;
            }
        }
        Ok(())
    }

    /// start_transports starts, or refreshes, the transport of every media
    /// section of an applied remote description.
    pub(super) async fn start_transports(
        self: &Arc<Self>,
        parsed: &SessionDescription,
        we_offer: bool,
    ) -> Result<()> {
        let remote_is_lite = is_lite_set(parsed);
        let our_lite = self.setting_engine.candidates.ice_lite;

        // a lite agent facing a full one is controlled, otherwise the offerer
        // controls (RFC 8445 section 6.1.1)
        let ice_role = if (we_offer && remote_is_lite == our_lite) || (remote_is_lite && !our_lite)
        {
            RTCIceRole::Controlling
        } else {
            RTCIceRole::Controlled
        };

        let (fingerprint, fingerprint_hash) = extract_fingerprint(parsed)?;
        let dtls_parameters = DTLSParameters {
            role: DTLSRole::from(parsed),
            fingerprints: vec![RTCDtlsFingerprint {
                algorithm: fingerprint_hash,
                value: fingerprint,
            }],
        };

        if self.bundle_policy.is_bundled() {
            let remote = bundled_ice_details(parsed)?;
            let Some(transport) = self.transports().await.first().cloned() else {
                return Ok(());
            };
            transport
                .start(&remote, remote_is_lite, ice_role, &dtls_parameters, we_offer)
                .await?;
            if has_end_of_candidates(parsed, None) {
                transport.ice.add_remote_candidate(None).await?;
            }
            return Ok(());
        }

        for (i, media) in parsed.media_descriptions.iter().enumerate() {
            if media.media_name.port.value == 0 {
                continue;
            }
            let Some(mid) = get_mid_value(media) else {
                continue;
            };
            let remote = extract_media_ice_details(parsed, i)?;
            let transport = self.transport_for_mid(mid).await;
            transport
                .start(&remote, remote_is_lite, ice_role, &dtls_parameters, we_offer)
                .await?;
            if has_end_of_candidates(parsed, Some(i)) {
                transport.ice.add_remote_candidate(None).await?;
            }
        }
        Ok(())
    }

    /// announce_remote_tracks fires on_track for every transceiver the remote
    /// side newly sends to.
    pub(super) async fn announce_remote_tracks(&self, parsed: &SessionDescription) {
        let transceivers = self.rtp_transceivers.lock().await.clone();
        let mut events = vec![];
        {
            let mut announced = self.announced_tracks.lock().await;
            for media in &parsed.media_descriptions {
                let Some(mid) = get_mid_value(media) else {
                    continue;
                };
                let Some(t) = transceivers
                    .iter()
                    .find(|t| t.mid().as_deref() == Some(mid.as_str()))
                else {
                    continue;
                };

                let remote_sends =
                    media.media_name.port.value != 0 && get_peer_direction(media).has_send();
                let was_announced = announced.contains(mid);
                if remote_sends && !was_announced && !t.stopped() {
                    announced.push(mid.clone());
                    let stream_ids = media
                        .attribute(ATTR_KEY_MSID)
                        .flatten()
                        .and_then(|msid| msid.split_whitespace().next())
                        .filter(|stream_id| *stream_id != "-")
                        .map(|stream_id| vec![stream_id.to_owned()])
                        .unwrap_or_default();
                    events.push(RTCTrackEvent {
                        track: Arc::clone(t.receiver().track()),
                        receiver: Arc::clone(t.receiver()),
                        transceiver: Arc::clone(t),
                        stream_ids,
                    });
                } else if !remote_sends && was_announced {
                    announced.retain(|m| m != mid);
                }
            }
        }

        for event in events {
            log::debug!(
                "remote track {} on mid {}",
                event.track.id(),
                event.transceiver.mid().unwrap_or_default()
            );
            self.on_track_handlers.emit(event).await;
        }
    }

    pub(super) async fn add_transceiver_from_kind(
        self: &Arc<Self>,
        kind: RTPCodecType,
        init: Option<RTCRtpTransceiverInit>,
    ) -> Result<Arc<RTCRtpTransceiver>> {
        if self.is_closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        let init = init.unwrap_or(RTCRtpTransceiverInit {
            direction: RTCRtpTransceiverDirection::Sendrecv,
            stream_ids: vec![],
        });

        let track = match init.direction {
            RTCRtpTransceiverDirection::Sendonly | RTCRtpTransceiverDirection::Sendrecv => {
                if self.media_engine.get_codecs_by_kind(kind).is_empty() {
                    return Err(Error::ErrNoCodecsAvailable);
                }
                Some(MediaStreamTrack::new(
                    math_rand_alpha(16),
                    math_rand_alpha(16),
                    kind,
                ))
            }
            RTCRtpTransceiverDirection::Recvonly => None,
            _ => return Err(Error::ErrPeerConnAddTransceiverFromKindSupport),
        };

        let t = self.new_transceiver(kind, track, init.direction, init.stream_ids, None);
        self.add_rtp_transceiver(Arc::clone(&t)).await;
        Ok(t)
    }

    pub(super) fn new_transceiver(
        self: &Arc<Self>,
        kind: RTPCodecType,
        track: Option<Arc<MediaStreamTrack>>,
        direction: RTCRtpTransceiverDirection,
        stream_ids: Vec<String>,
        remote_track_id: Option<String>,
    ) -> Arc<RTCRtpTransceiver> {
        RTCRtpTransceiver::new(
            RTCRtpReceiver::new(kind, remote_track_id),
            RTCRtpSender::new(kind, track, stream_ids),
            direction,
            kind,
            Arc::clone(&self.media_engine),
            self.make_negotiation_needed_trigger(),
        )
    }

    pub(super) async fn add_rtp_transceiver(self: &Arc<Self>, t: Arc<RTCRtpTransceiver>) {
        {
            let mut rtp_transceivers = self.rtp_transceivers.lock().await;
            rtp_transceivers.push(t);
        }
        self.trigger_negotiation_needed().await;
    }

    pub(crate) fn make_negotiation_needed_trigger(self: &Arc<Self>) -> NegotiationTrigger {
        let weak = Arc::downgrade(self);
        Some(Box::new(move || {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(pc) = weak.upgrade() {
                    pc.trigger_negotiation_needed().await;
                }
            })
        }))
    }

    fn do_negotiation_needed_inner(&self) -> bool {
        let state: NegotiationNeededState =
            self.negotiation_needed_state.load(Ordering::SeqCst).into();
        match state {
            NegotiationNeededState::Run => {
                self.negotiation_needed_state
                    .store(NegotiationNeededState::Queue as u8, Ordering::SeqCst);
                false
            }
            NegotiationNeededState::Queue => false,
            NegotiationNeededState::Empty => {
                self.negotiation_needed_state
                    .store(NegotiationNeededState::Run as u8, Ordering::SeqCst);
                true
            }
        }
    }

    /// trigger_negotiation_needed enqueues the negotiation-needed check
    /// unless one is already pending.
    pub(crate) async fn trigger_negotiation_needed(self: &Arc<Self>) {
        if !self.do_negotiation_needed_inner() {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let result = self
            .ops
            .enqueue(Operation::new(
                move || {
                    let weak = weak.clone();
                    Box::pin(async move {
                        match weak.upgrade() {
                            Some(pc) => pc.negotiation_needed_op().await,
                            None => false,
                        }
                    })
                },
                "negotiation_needed",
            ))
            .await;
        if let Err(err) = result {
            log::warn!("failed to enqueue negotiation-needed check: {err}");
        }
    }

    fn after_negotiation_needed_op(&self) -> bool {
        let old_negotiation_needed_state = self
            .negotiation_needed_state
            .swap(NegotiationNeededState::Empty as u8, Ordering::SeqCst);

        if old_negotiation_needed_state == NegotiationNeededState::Queue as u8 {
            self.do_negotiation_needed_inner()
        } else {
            false
        }
    }

    /// negotiation_needed_op runs on the operations queue. Returning true puts
    /// it back at the end of the queue.
    async fn negotiation_needed_op(&self) -> bool {
        if self.is_closed.load(Ordering::SeqCst) {
            return false;
        }
        // wait behind whatever else is queued
        if !self.ops.is_empty().await {
            return true;
        }

        let stable =
            self.signaling_state.load(Ordering::SeqCst) == RTCSignalingState::Stable as u8;
        if stable {
            if !self.check_negotiation_needed().await {
                self.is_negotiation_needed.store(false, Ordering::SeqCst);
            } else if !self.is_negotiation_needed.swap(true, Ordering::SeqCst) {
                // fire only on the false -> true edge
                log::debug!("negotiation needed");
                self.on_negotiation_needed_handlers.emit(()).await;
            }
        }

        self.after_negotiation_needed_op()
    }

    pub(super) async fn check_negotiation_needed(&self) -> bool {
        if self.ice_restart_requested.load(Ordering::SeqCst) {
            return true;
        }

        let (local_desc, remote_desc) = {
            let coordinator = self.coordinator.lock().await;
            (
                coordinator.current_local_description().cloned(),
                coordinator.current_remote_description().cloned(),
            )
        };

        let has_data_channels = !self.data_channels.lock().await.is_empty();
        if has_data_channels && local_desc.as_ref().and_then(have_data_channel).is_none() {
            return true;
        }

        let transceivers = self.rtp_transceivers.lock().await.clone();
        for t in &transceivers {
            let mid = t.mid();
            let m = match (&local_desc, &mid) {
                (Some(local_desc), Some(mid)) => get_by_mid(mid, local_desc),
                _ => None,
            };
            let rm = match (&remote_desc, &mid) {
                (Some(remote_desc), Some(mid)) => get_by_mid(mid, remote_desc),
                _ => None,
            };

            if t.stopped() {
                // stopped, but its section has not been rejected yet
                let live = |m: Option<&MediaDescription>| m.is_some_and(|m| m.media_name.port.value != 0);
                if live(m) || live(rm) {
                    return true;
                }
                continue;
            }

            // never negotiated
            let (Some(m), Some(local_desc)) = (m, &local_desc) else {
                return true;
            };
            if m.media_name.port.value == 0 {
                continue;
            }

            if t.direction().has_send() {
                let desc_msid = m.attribute(ATTR_KEY_MSID).flatten();
                if desc_msid != t.sender().await.msid().await.as_deref() {
                    return true;
                }
            }

            match local_desc.sdp_type {
                RTCSdpType::Offer => {
                    match rm {
                        Some(rm) => {
                            if get_peer_direction(m) != t.direction()
                                && get_peer_direction(rm) != t.direction().reverse()
                            {
                                return true;
                            }
                        }
                        None if remote_desc.is_some() => return true,
                        None => {}
                    }
                }
                RTCSdpType::Answer => {
                    if let Some(rm) = rm {
                        let expected = answer_direction(get_peer_direction(rm), t.direction());
                        if get_peer_direction(m) != expected {
                            return true;
                        }
                    }
                }
                _ => {}
            }
        }

        false
    }
}

pub(super) fn is_lite_set(desc: &SessionDescription) -> bool {
    desc.attributes
        .iter()
        .any(|a| a.key.trim() == ATTR_KEY_ICELITE)
}

/// bundled_ice_details reads the remote ICE state a bundled transport runs
/// against. A remote side that did not bundle is reached through its first
/// live media section.
pub(super) fn bundled_ice_details(desc: &SessionDescription) -> Result<RemoteIceDetails> {
    if is_bundle_tagged(desc) {
        return extract_ice_details(desc);
    }
    match desc
        .media_descriptions
        .iter()
        .position(|m| m.media_name.port.value != 0)
    {
        Some(i) => extract_media_ice_details(desc, i),
        None => extract_ice_details(desc),
    }
}

/// is_bundle_tagged tells whether `desc` groups its sections with BUNDLE.
fn is_bundle_tagged(desc: &SessionDescription) -> bool {
    desc.attribute(ATTR_KEY_GROUP)
        .is_some_and(|group| group.starts_with("BUNDLE"))
}

/// has_end_of_candidates tells whether media section `mline_index`, or any
/// section when None, signals the end of the remote candidates.
fn has_end_of_candidates(desc: &SessionDescription, mline_index: Option<usize>) -> bool {
    let has = |m: &MediaDescription| m.attribute(ATTR_KEY_END_OF_CANDIDATES).is_some();
    match mline_index {
        Some(i) => desc.media_descriptions.get(i).is_some_and(has),
        None => desc.media_descriptions.iter().any(has),
    }
}
