use std::sync::atomic::AtomicUsize;
use std::time::{Duration as StdDuration, SystemTime};

use tokio::time::Duration;

use super::*;
use crate::api::APIBuilder;
use crate::error::RTCErrorKind;
use crate::ice_transport::ice_server::RTCIceServer;

fn new_api() -> Result<API> {
    let mut m = MediaEngine::default();
    m.register_default_codecs()?;
    Ok(APIBuilder::new().with_media_engine(m).build())
}

async fn new_pair(api: &API) -> Result<(RTCPeerConnection, RTCPeerConnection)> {
    let pca = api.new_peer_connection(RTCConfiguration::default()).await?;
    let pcb = api.new_peer_connection(RTCConfiguration::default()).await?;

    Ok((pca, pcb))
}

/// signal_pair runs a full offer/answer exchange, waiting for gathering so
/// each description carries its candidates.
async fn signal_pair(pc_offer: &RTCPeerConnection, pc_answer: &RTCPeerConnection) -> Result<()> {
    let offer = pc_offer.create_offer(None).await?;

    let mut offer_gathering_complete = pc_offer.gathering_complete_promise().await;
    pc_offer.set_local_description(offer).await?;
    let _ = offer_gathering_complete.recv().await;

    pc_answer
        .set_remote_description(
            pc_offer
                .local_description()
                .await
                .ok_or(Error::new("no local description".to_owned()))?,
        )
        .await?;

    let answer = pc_answer.create_answer(None).await?;

    let mut answer_gathering_complete = pc_answer.gathering_complete_promise().await;
    pc_answer.set_local_description(answer).await?;
    let _ = answer_gathering_complete.recv().await;

    pc_offer
        .set_remote_description(
            pc_answer
                .local_description()
                .await
                .ok_or(Error::new("no local description".to_owned()))?,
        )
        .await
}

async fn close_pair_now(pc1: &RTCPeerConnection, pc2: &RTCPeerConnection) {
    let mut fail = false;
    if let Err(err) = pc1.close().await {
        log::error!("Failed to close PeerConnection: {err}");
        fail = true;
    }
    if let Err(err) = pc2.close().await {
        log::error!("Failed to close PeerConnection: {err}");
        fail = true;
    }

    assert!(!fail);
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    (count, move || Arc::clone(&c))
}

async fn wait_until(what: &str, f: impl Fn() -> bool) {
    for _ in 0..200 {
        if f() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn media_attribute(desc: &RTCSessionDescription, index: usize, key: &str) -> Option<String> {
    let parsed = desc.unmarshal().ok()?;
    let m = parsed.media_descriptions.get(index)?;
    m.attribute(key).flatten().map(ToOwned::to_owned)
}

#[tokio::test]
async fn test_new_peer_connection() -> Result<()> {
    let api = new_api()?;
    let pc = api.new_peer_connection(RTCConfiguration::default()).await?;

    assert_eq!(pc.signaling_state(), RTCSignalingState::Stable);
    assert_eq!(pc.connection_state(), RTCPeerConnectionState::New);
    assert_eq!(pc.ice_connection_state(), RTCIceConnectionState::New);
    assert_eq!(pc.ice_gathering_state(), RTCIceGatheringState::New);
    assert!(pc.get_stats_id().starts_with("PeerConnection-"));
    assert!(pc.local_description().await.is_none());
    assert!(pc.remote_description().await.is_none());

    let configuration = pc.get_configuration().await;
    assert_eq!(configuration.certificates.len(), 1, "a certificate is generated");
    assert_eq!(pc.ice_transports().await.len(), 1);
    assert_eq!(pc.dtls_transports().await.len(), 1);

    pc.close().await
}

#[tokio::test]
async fn test_new_peer_connection_configuration_errors() -> Result<()> {
    let api = new_api()?;
    let expired = RTCCertificate::from_existing(
        vec![],
        String::new(),
        SystemTime::now() - StdDuration::from_secs(60),
    );

    let tests = vec![
        (
            "expired certificate",
            RTCConfiguration {
                certificates: vec![expired],
                ..Default::default()
            },
            Error::ErrCertificateExpired,
        ),
        (
            "turn without credentials",
            RTCConfiguration {
                ice_servers: vec![RTCIceServer {
                    urls: vec!["turn:turn.example.org".to_owned()],
                    ..Default::default()
                }],
                ..Default::default()
            },
            Error::ErrNoTurnCredentials,
        ),
    ];

    for (name, configuration, expected) in tests {
        match api.new_peer_connection(configuration).await {
            Ok(_) => panic!("{name}: expected {expected}"),
            Err(err) => assert_eq!(err, expected, "{name}"),
        }
    }

    Ok(())
}

#[tokio::test]
async fn test_set_configuration() -> Result<()> {
    let api = new_api()?;
    let certificate = RTCCertificate::generate()?;
    let pc = api
        .new_peer_connection(RTCConfiguration {
            peer_identity: "unittest".to_owned(),
            certificates: vec![certificate.clone()],
            ice_candidate_pool_size: 5,
            ..Default::default()
        })
        .await?;

    let tests = vec![
        (
            "peer identity",
            RTCConfiguration {
                peer_identity: "other".to_owned(),
                ..Default::default()
            },
            Some(Error::ErrModifyingPeerIdentity),
        ),
        (
            "certificates",
            RTCConfiguration {
                certificates: vec![RTCCertificate::generate()?],
                ..Default::default()
            },
            Some(Error::ErrModifyingCertificates),
        ),
        (
            "bundle policy",
            RTCConfiguration {
                bundle_policy: RTCBundlePolicy::MaxCompat,
                ..Default::default()
            },
            Some(Error::ErrModifyingBundlePolicy),
        ),
        (
            "rtcp mux policy",
            RTCConfiguration {
                rtcp_mux_policy: RTCRtcpMuxPolicy::Negotiate,
                ..Default::default()
            },
            Some(Error::ErrModifyingRTCPMuxPolicy),
        ),
        (
            "invalid server",
            RTCConfiguration {
                ice_candidate_pool_size: 5,
                ice_servers: vec![RTCIceServer {
                    urls: vec!["turn:turn.example.org".to_owned()],
                    ..Default::default()
                }],
                ..Default::default()
            },
            Some(Error::ErrNoTurnCredentials),
        ),
        (
            "same fixed fields, new servers",
            RTCConfiguration {
                peer_identity: "unittest".to_owned(),
                certificates: vec![certificate.clone()],
                ice_candidate_pool_size: 5,
                ice_servers: vec![RTCIceServer {
                    urls: vec!["stun:stun.example.org:3478?transport=udp".to_owned()],
                    ..Default::default()
                }],
                ..Default::default()
            },
            None,
        ),
    ];

    for (name, configuration, expected) in tests {
        let got = pc.set_configuration(configuration).await.err();
        assert_eq!(got, expected, "{name}");
    }

    assert_eq!(pc.get_configuration().await.ice_servers.len(), 1);
    assert_eq!(
        Error::ErrModifyingBundlePolicy.kind(),
        RTCErrorKind::InvalidModification
    );

    // the pool size is fixed once a local description exists
    pc.add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    let offer = pc.create_offer(None).await?;
    pc.set_local_description(offer).await?;
    let result = pc
        .set_configuration(RTCConfiguration {
            ice_candidate_pool_size: 1,
            ..Default::default()
        })
        .await;
    assert_eq!(result, Err(Error::ErrModifyingICECandidatePoolSize));

    pc.close().await?;
    assert_eq!(
        pc.set_configuration(RTCConfiguration::default()).await,
        Err(Error::ErrConnectionClosed)
    );

    Ok(())
}

#[tokio::test]
async fn test_offer_answer_exchange() -> Result<()> {
    let api = new_api()?;
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    pc_offer.create_data_channel("chat", None).await?;

    signal_pair(&pc_offer, &pc_answer).await?;

    for pc in [&pc_offer, &pc_answer] {
        assert_eq!(pc.signaling_state(), RTCSignalingState::Stable);
        assert!(pc.current_local_description().await.is_some());
        assert!(pc.current_remote_description().await.is_some());
        assert!(pc.pending_local_description().await.is_none());
        assert!(pc.pending_remote_description().await.is_none());
    }

    let offer = pc_offer
        .current_local_description()
        .await
        .ok_or(Error::new("no offer".to_owned()))?;
    let parsed = offer.unmarshal()?;
    assert_eq!(parsed.media_descriptions.len(), 2);
    assert_eq!(parsed.media_descriptions[1].media_name.media, "application");
    assert_eq!(
        parsed.attribute(ATTR_KEY_GROUP).map(String::as_str),
        Some("BUNDLE 0 1")
    );

    let offer_transceivers = pc_offer.get_transceivers().await;
    assert_eq!(offer_transceivers[0].mid().as_deref(), Some("0"));
    assert_eq!(
        offer_transceivers[0].current_direction(),
        RTCRtpTransceiverDirection::Sendonly,
        "the answerer only receives"
    );

    let answer_transceivers = pc_answer.get_transceivers().await;
    assert_eq!(answer_transceivers.len(), 1);
    assert_eq!(answer_transceivers[0].mid().as_deref(), Some("0"));
    assert_eq!(
        answer_transceivers[0].direction(),
        RTCRtpTransceiverDirection::Recvonly
    );
    assert_eq!(
        answer_transceivers[0].current_direction(),
        RTCRtpTransceiverDirection::Recvonly
    );

    let answer = pc_answer
        .current_local_description()
        .await
        .ok_or(Error::new("no answer".to_owned()))?;
    assert_eq!(
        media_attribute(&answer, 0, ATTR_KEY_CONNECTION_SETUP).as_deref(),
        Some("active")
    );
    assert_eq!(
        media_attribute(&offer, 0, ATTR_KEY_CONNECTION_SETUP).as_deref(),
        Some("actpass")
    );

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

#[tokio::test]
async fn test_set_local_description_checks() -> Result<()> {
    let api = new_api()?;
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    assert_eq!(
        pc_offer.create_answer(None).await,
        Err(Error::ErrNoRemoteDescription)
    );
    assert_eq!(
        pc_offer
            .set_local_description(RTCSessionDescription {
                sdp_type: RTCSdpType::Offer,
                ..Default::default()
            })
            .await,
        Err(Error::ErrSDPDoesNotMatchOffer),
        "no offer was created yet"
    );

    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Video, None)
        .await?;
    let offer = pc_offer.create_offer(None).await?;

    let mut tampered = offer.clone();
    tampered.sdp.push_str("a=ice-lite\r\n");
    let err = pc_offer
        .set_local_description(tampered)
        .await
        .err()
        .ok_or(Error::new("tampered offer accepted".to_owned()))?;
    assert_eq!(err, Error::ErrSDPDoesNotMatchOffer);
    assert_eq!(err.kind(), RTCErrorKind::InvalidModification);

    // an empty description stands for the last offer created
    pc_offer
        .set_local_description(RTCSessionDescription {
            sdp_type: RTCSdpType::Offer,
            ..Default::default()
        })
        .await?;
    assert_eq!(pc_offer.signaling_state(), RTCSignalingState::HaveLocalOffer);
    assert_eq!(
        pc_offer
            .pending_local_description()
            .await
            .map(|d| d.sdp_type),
        Some(RTCSdpType::Offer)
    );

    // only the answer this session created may be applied locally
    pc_answer
        .set_remote_description(offer)
        .await?;
    let answer = pc_answer.create_answer(None).await?;
    let err = pc_offer
        .set_local_description(answer)
        .await
        .err()
        .ok_or(Error::new("answer accepted".to_owned()))?;
    assert_eq!(err.kind(), RTCErrorKind::InvalidModification);

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

#[tokio::test]
async fn test_rollback() -> Result<()> {
    let api = new_api()?;
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    let offer = pc_offer.create_offer(None).await?;

    let (states, states_clone) = {
        let states = Arc::new(std::sync::Mutex::new(vec![]));
        (Arc::clone(&states), states)
    };
    pc_answer.on_signaling_state_change(Box::new(move |state| {
        if let Ok(mut states) = states_clone.lock() {
            states.push(state);
        }
        Box::pin(async {})
    }));

    pc_answer.set_remote_description(offer).await?;
    assert_eq!(pc_answer.signaling_state(), RTCSignalingState::HaveRemoteOffer);
    assert!(pc_answer.pending_remote_description().await.is_some());

    pc_answer
        .set_local_description(RTCSessionDescription::rollback())
        .await?;
    assert_eq!(pc_answer.signaling_state(), RTCSignalingState::Stable);
    assert!(pc_answer.pending_remote_description().await.is_none());
    assert!(pc_answer.remote_description().await.is_none());

    assert_eq!(
        pc_answer
            .set_remote_description(RTCSessionDescription::rollback())
            .await
            .map_err(|err| err.kind()),
        Err(RTCErrorKind::InvalidState),
        "nothing to roll back in stable"
    );

    let seen = states.lock().map(|s| s.clone()).unwrap_or_default();
    assert_eq!(
        seen,
        vec![RTCSignalingState::HaveRemoteOffer, RTCSignalingState::Stable]
    );

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

#[tokio::test]
async fn test_set_remote_description_validation() -> Result<()> {
    let api = new_api()?;
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    let offer = pc_offer.create_offer(None).await?;

    let without_fingerprint: String = offer
        .sdp
        .lines()
        .filter(|l| !l.starts_with("a=fingerprint"))
        .map(|l| format!("{l}\r\n"))
        .collect();
    let without_ufrag: String = offer
        .sdp
        .lines()
        .filter(|l| !l.starts_with("a=ice-ufrag"))
        .map(|l| format!("{l}\r\n"))
        .collect();
    let without_rtpmap: String = offer
        .sdp
        .lines()
        .filter(|l| !l.starts_with("a=rtpmap"))
        .map(|l| format!("{l}\r\n"))
        .collect();

    let tests = vec![
        (
            "no fingerprint",
            without_fingerprint,
            Error::ErrSessionDescriptionNoFingerprint,
        ),
        (
            "no ufrag",
            without_ufrag,
            Error::ErrSessionDescriptionMissingIceUfrag,
        ),
        (
            "no rtpmap",
            without_rtpmap,
            Error::Sdp(::sdp::Error::PayloadTypeNotFound),
        ),
    ];

    for (name, sdp, expected) in tests {
        let result = pc_answer
            .set_remote_description(RTCSessionDescription::offer(sdp)?)
            .await;
        assert_eq!(result, Err(expected), "{name}");
        assert_eq!(
            pc_answer.signaling_state(),
            RTCSignalingState::Stable,
            "{name}: a refused description changes nothing"
        );
        assert!(pc_answer.remote_description().await.is_none(), "{name}");
        assert!(pc_answer.pending_remote_description().await.is_none(), "{name}");
        assert!(pc_answer.get_transceivers().await.is_empty(), "{name}");
        assert_eq!(
            pc_answer.create_answer(None).await,
            Err(Error::ErrNoRemoteDescription),
            "{name}"
        );
    }

    pc_answer.set_remote_description(offer).await?;
    assert_eq!(pc_answer.signaling_state(), RTCSignalingState::HaveRemoteOffer);
    assert_eq!(pc_answer.get_transceivers().await.len(), 1);

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

#[tokio::test]
async fn test_negotiation_needed() -> Result<()> {
    let api = new_api()?;
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    let (count, count_handle) = counter();
    pc_offer.on_negotiation_needed(Box::new(move |_| {
        let count = count_handle();
        Box::pin(async move {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }));

    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Video, None)
        .await?;
    wait_until("negotiation needed", || count.load(Ordering::SeqCst) > 0).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1, "the flag is raised once");

    signal_pair(&pc_offer, &pc_answer).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        count.load(Ordering::SeqCst),
        1,
        "a completed negotiation clears the flag"
    );

    let transceivers = pc_offer.get_transceivers().await;
    transceivers[1]
        .set_direction(RTCRtpTransceiverDirection::Recvonly)
        .await?;
    wait_until("renegotiation", || count.load(Ordering::SeqCst) == 2).await;

    signal_pair(&pc_offer, &pc_answer).await?;
    pc_offer.restart_ice().await?;
    wait_until("restart negotiation", || count.load(Ordering::SeqCst) == 3).await;

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

#[tokio::test]
async fn test_on_track() -> Result<()> {
    let api = new_api()?;
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    let track = MediaStreamTrack::new(
        "audio-track".to_owned(),
        "microphone".to_owned(),
        RTPCodecType::Audio,
    );
    let sender = pc_offer
        .add_track(Arc::clone(&track), vec!["stream".to_owned()])
        .await?;
    assert_eq!(
        pc_offer
            .add_track(Arc::clone(&track), vec![])
            .await
            .err(),
        Some(Error::ErrExistingTrack)
    );

    let (track_tx, mut track_rx) = mpsc::channel(4);
    pc_answer.on_track(Box::new(move |event: RTCTrackEvent| {
        let track_tx = track_tx.clone();
        Box::pin(async move {
            let _ = track_tx
                .send((event.track.id().to_owned(), event.stream_ids))
                .await;
        })
    }));

    signal_pair(&pc_offer, &pc_answer).await?;

    let (track_id, stream_ids) = tokio::time::timeout(Duration::from_secs(5), track_rx.recv())
        .await
        .map_err(|_| Error::new("no track".to_owned()))?
        .ok_or(Error::new("track channel closed".to_owned()))?;
    assert_eq!(track_id, "audio-track");
    assert_eq!(stream_ids, vec!["stream".to_owned()]);

    // renegotiating the same media does not announce it again
    signal_pair(&pc_offer, &pc_answer).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(track_rx.try_recv().is_err());

    pc_offer.remove_track(&sender).await?;
    assert!(sender.track().await.is_none());
    let foreign = RTCRtpSender::new(RTPCodecType::Audio, None, vec![]);
    assert_eq!(
        pc_offer.remove_track(&foreign).await,
        Err(Error::ErrSenderNotCreatedByConnection)
    );

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

#[tokio::test]
async fn test_add_transceiver_from_kind() -> Result<()> {
    let pc = APIBuilder::new()
        .build()
        .new_peer_connection(RTCConfiguration::default())
        .await?;

    let tests = vec![
        (RTCRtpTransceiverDirection::Recvonly, None),
        (
            RTCRtpTransceiverDirection::Sendrecv,
            Some(Error::ErrNoCodecsAvailable),
        ),
        (
            RTCRtpTransceiverDirection::Inactive,
            Some(Error::ErrPeerConnAddTransceiverFromKindSupport),
        ),
    ];

    for (direction, expected) in tests {
        let got = pc
            .add_transceiver_from_kind(
                RTPCodecType::Video,
                Some(RTCRtpTransceiverInit {
                    direction,
                    stream_ids: vec![],
                }),
            )
            .await
            .err();
        assert_eq!(got, expected, "{direction}");
    }

    assert_eq!(pc.get_transceivers().await.len(), 1);
    assert_eq!(pc.get_receivers().await.len(), 1);

    pc.close().await
}

#[tokio::test]
async fn test_create_data_channel() -> Result<()> {
    let api = new_api()?;
    let pc = api.new_peer_connection(RTCConfiguration::default()).await?;

    let negotiated = || {
        Some(RTCDataChannelInit {
            negotiated: true,
            id: Some(1),
            ..Default::default()
        })
    };
    pc.create_data_channel("a", negotiated()).await?;
    assert_eq!(
        pc.create_data_channel("b", negotiated()).await.err(),
        Some(Error::ErrDataChannelIdInUse)
    );

    let offer = pc.create_offer(None).await?;
    let parsed = offer.unmarshal()?;
    assert_eq!(parsed.media_descriptions.len(), 1);
    assert_eq!(parsed.media_descriptions[0].media_name.media, "application");

    pc.close().await?;
    assert_eq!(
        pc.create_data_channel("c", None).await.err(),
        Some(Error::ErrConnectionClosed)
    );

    Ok(())
}

#[tokio::test]
async fn test_add_ice_candidate() -> Result<()> {
    let api = new_api()?;
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    let host = "candidate:1 1 udp 2130706431 10.0.0.1 5000 typ host".to_owned();
    assert_eq!(
        pc_answer
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: host.clone(),
                sdp_mid: Some("0".to_owned()),
                ..Default::default()
            })
            .await,
        Err(Error::ErrNoRemoteDescription)
    );

    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    signal_pair(&pc_offer, &pc_answer).await?;

    let remote_ufrag = pc_answer.ice_transports().await[0]
        .get_remote_parameters()
        .await
        .map(|p| p.username_fragment);

    let tests = vec![
        (
            "by mid",
            RTCIceCandidateInit {
                candidate: host.clone(),
                sdp_mid: Some("0".to_owned()),
                ..Default::default()
            },
            None,
        ),
        (
            "by index with ufrag",
            RTCIceCandidateInit {
                candidate: "candidate:2 1 udp 2130706431 10.0.0.2 5000 typ host".to_owned(),
                sdp_mline_index: Some(0),
                username_fragment: remote_ufrag.clone(),
                ..Default::default()
            },
            None,
        ),
        (
            "neither mid nor index",
            RTCIceCandidateInit {
                candidate: host.clone(),
                ..Default::default()
            },
            Some(Error::ErrICECandidateMissingMidAndIndex),
        ),
        (
            "unknown mid",
            RTCIceCandidateInit {
                candidate: host.clone(),
                sdp_mid: Some("7".to_owned()),
                ..Default::default()
            },
            Some(Error::ErrICECandidateMidUnknown),
        ),
        (
            "unknown index",
            RTCIceCandidateInit {
                candidate: host.clone(),
                sdp_mline_index: Some(3),
                ..Default::default()
            },
            Some(Error::ErrICECandidateMidUnknown),
        ),
        (
            "stale ufrag",
            RTCIceCandidateInit {
                candidate: host.clone(),
                sdp_mid: Some("0".to_owned()),
                username_fragment: Some("stale".to_owned()),
                ..Default::default()
            },
            Some(Error::ErrICECandidateUfragMismatch),
        ),
        (
            "end of candidates",
            RTCIceCandidateInit::default(),
            None,
        ),
    ];

    for (name, candidate, expected) in tests {
        let got = pc_answer.add_ice_candidate(candidate).await.err();
        assert_eq!(got, expected, "{name}");
    }

    close_pair_now(&pc_offer, &pc_answer).await;
    assert_eq!(
        pc_answer
            .add_ice_candidate(RTCIceCandidateInit::default())
            .await,
        Err(Error::ErrConnectionClosed)
    );
    Ok(())
}

#[tokio::test]
async fn test_add_ice_candidate_during_ice_restart() -> Result<()> {
    let api = new_api()?;
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    signal_pair(&pc_offer, &pc_answer).await?;

    let transport = Arc::clone(&pc_answer.ice_transports().await[0]);
    let old_ufrag = transport
        .get_remote_parameters()
        .await
        .map(|p| p.username_fragment);

    let restarted = pc_offer
        .create_offer(Some(RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        }))
        .await?;
    let new_ufrag = media_attribute(&restarted, 0, "ice-ufrag");
    pc_offer.set_local_description(restarted).await?;
    let restarted = pc_offer
        .local_description()
        .await
        .ok_or(Error::new("no local description".to_owned()))?;

    let stale = RTCIceCandidateInit {
        candidate: "candidate:9 1 udp 2130706431 192.0.2.9 5000 typ host".to_owned(),
        sdp_mid: Some("0".to_owned()),
        username_fragment: old_ufrag,
        ..Default::default()
    };
    let (applied, added) = tokio::join!(
        pc_answer.set_remote_description(restarted),
        pc_answer.add_ice_candidate(stale)
    );
    applied?;
    if let Err(err) = added {
        assert_eq!(err, Error::ErrICECandidateUfragMismatch);
    }

    assert_eq!(
        transport
            .get_remote_parameters()
            .await
            .map(|p| p.username_fragment),
        new_ufrag
    );
    assert!(
        transport
            .get_remote_candidates()
            .await
            .iter()
            .all(|c| c.address != "192.0.2.9"),
        "a candidate of the old credentials never joins the new ones"
    );

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

#[tokio::test]
async fn test_close() -> Result<()> {
    let api = new_api()?;
    let pc = api.new_peer_connection(RTCConfiguration::default()).await?;

    let (closed, closed_handle) = counter();
    pc.on_peer_connection_state_change(Box::new(move |state| {
        let closed = closed_handle();
        Box::pin(async move {
            if state == RTCPeerConnectionState::Closed {
                closed.fetch_add(1, Ordering::SeqCst);
            }
        })
    }));
    let (signaling_tx, mut signaling_rx) = mpsc::unbounded_channel();
    pc.on_signaling_state_change(Box::new(move |state| {
        let signaling_tx = signaling_tx.clone();
        Box::pin(async move {
            let _ = signaling_tx.send(state);
        })
    }));

    let t = pc
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    let d = pc.create_data_channel("chat", None).await?;

    pc.close().await?;
    pc.close().await?;

    assert_eq!(pc.signaling_state(), RTCSignalingState::Closed);
    assert_eq!(pc.connection_state(), RTCPeerConnectionState::Closed);
    assert_eq!(pc.ice_connection_state(), RTCIceConnectionState::Closed);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert_eq!(signaling_rx.try_recv(), Ok(RTCSignalingState::Closed));
    assert!(signaling_rx.try_recv().is_err(), "closing twice notifies once");
    assert!(t.stopped());
    assert_eq!(
        d.ready_state(),
        crate::data_channel::data_channel_state::RTCDataChannelState::Closed
    );

    assert_eq!(pc.create_offer(None).await, Err(Error::ErrConnectionClosed));
    assert_eq!(
        pc.add_transceiver_from_kind(RTPCodecType::Audio, None)
            .await
            .err(),
        Some(Error::ErrConnectionClosed)
    );
    assert_eq!(
        pc.set_remote_description(RTCSessionDescription::rollback())
            .await,
        Err(Error::ErrConnectionClosed)
    );

    Ok(())
}

#[tokio::test]
async fn test_max_compat_transports() -> Result<()> {
    let api = new_api()?;
    let configuration = RTCConfiguration {
        bundle_policy: RTCBundlePolicy::MaxCompat,
        ..Default::default()
    };
    let pc_offer = api.new_peer_connection(configuration.clone()).await?;
    let pc_answer = api.new_peer_connection(configuration).await?;
    assert!(pc_offer.ice_transports().await.is_empty());

    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Video, None)
        .await?;

    signal_pair(&pc_offer, &pc_answer).await?;

    let offer = pc_offer
        .current_local_description()
        .await
        .ok_or(Error::new("no offer".to_owned()))?;
    assert!(offer.unmarshal()?.attribute(ATTR_KEY_GROUP).is_none());
    assert_ne!(
        media_attribute(&offer, 0, "ice-ufrag"),
        media_attribute(&offer, 1, "ice-ufrag"),
        "each section has its own ICE agent"
    );

    assert_eq!(pc_offer.ice_transports().await.len(), 2);
    assert_eq!(pc_answer.ice_transports().await.len(), 2);
    assert_eq!(pc_answer.dtls_transports().await.len(), 2);

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

#[tokio::test]
async fn test_ice_restart() -> Result<()> {
    let api = new_api()?;
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    pc_offer
        .add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;
    signal_pair(&pc_offer, &pc_answer).await?;

    let first = pc_offer
        .current_local_description()
        .await
        .ok_or(Error::new("no offer".to_owned()))?;

    let unchanged = pc_offer.create_offer(None).await?;
    assert_eq!(
        media_attribute(&first, 0, "ice-ufrag"),
        media_attribute(&unchanged, 0, "ice-ufrag")
    );

    let restarted = pc_offer
        .create_offer(Some(RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        }))
        .await?;
    assert_ne!(
        media_attribute(&first, 0, "ice-ufrag"),
        media_attribute(&restarted, 0, "ice-ufrag")
    );

    signal_pair(&pc_offer, &pc_answer).await?;
    let answer_ufrag = pc_offer.ice_transports().await[0]
        .get_remote_parameters()
        .await
        .map(|p| p.username_fragment);
    let current_answer = pc_offer
        .current_remote_description()
        .await
        .ok_or(Error::new("no answer".to_owned()))?;
    assert_eq!(answer_ufrag, media_attribute(&current_answer, 0, "ice-ufrag"));

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

#[tokio::test]
async fn test_remove_handler() -> Result<()> {
    let api = new_api()?;
    let pc = api.new_peer_connection(RTCConfiguration::default()).await?;

    let id = pc.on_track(Box::new(|_| Box::pin(async {})));
    let other = pc.on_ice_candidate(Box::new(|_| Box::pin(async {})));
    assert_ne!(id, other, "ids are unique across events");
    assert!(pc.remove_handler(id));
    assert!(!pc.remove_handler(id));
    assert!(pc.remove_handler(other));

    pc.close().await
}
