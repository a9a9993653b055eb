//! Two peer connections negotiating end to end over in-memory collaborators.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use webrtc_negotiation::api::media_engine::MediaEngine;
use webrtc_negotiation::api::setting_engine::SettingEngine;
use webrtc_negotiation::api::{APIBuilder, API};
use webrtc_negotiation::dtls_transport::dtls_handshaker::DtlsHandshaker;
use webrtc_negotiation::dtls_transport::dtls_parameters::DTLSParameters;
use webrtc_negotiation::dtls_transport::dtls_role::DTLSRole;
use webrtc_negotiation::ice_transport::candidate_source::StaticCandidateSourceFactory;
use webrtc_negotiation::ice_transport::connectivity_checker::ConnectivityChecker;
use webrtc_negotiation::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc_negotiation::ice_transport::ice_candidate_pair::RTCIceCandidatePair;
use webrtc_negotiation::ice_transport::ice_candidate_type::RTCIceCandidateType;
use webrtc_negotiation::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc_negotiation::ice_transport::ice_parameters::RTCIceParameters;
use webrtc_negotiation::peer_connection::certificate::RTCCertificate;
use webrtc_negotiation::peer_connection::configuration::RTCConfiguration;
use webrtc_negotiation::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc_negotiation::peer_connection::signaling_state::RTCSignalingState;
use webrtc_negotiation::peer_connection::RTCPeerConnection;
use webrtc_negotiation::rtp_transceiver::rtp_codec::RTPCodecType;

struct AlwaysReachable;

#[async_trait]
impl ConnectivityChecker for AlwaysReachable {
    async fn check(
        &self,
        _pair: &RTCIceCandidatePair,
        _local: &RTCIceParameters,
        _remote: &RTCIceParameters,
    ) -> bool {
        true
    }
}

/// Hands back the certificate of the other peer as if it came off the wire.
struct LoopbackHandshaker {
    remote: RTCCertificate,
}

#[async_trait]
impl DtlsHandshaker for LoopbackHandshaker {
    async fn handshake(
        &self,
        _role: DTLSRole,
        _local_certificate: &RTCCertificate,
        _remote: &DTLSParameters,
    ) -> webrtc_negotiation::error::Result<Vec<u8>> {
        Ok(self.remote.der().to_vec())
    }
}

fn host(address: &str, port: u16) -> RTCIceCandidate {
    RTCIceCandidate {
        typ: RTCIceCandidateType::Host,
        address: address.to_owned(),
        port,
        ..Default::default()
    }
}

fn new_api(address: &str, port: u16, remote: &RTCCertificate) -> Result<API> {
    let mut m = MediaEngine::default();
    m.register_default_codecs()?;

    let mut s = SettingEngine::default();
    s.set_candidate_source_factory(Arc::new(StaticCandidateSourceFactory::new(vec![host(
        address, port,
    )])));
    s.set_connectivity_checker(Arc::new(AlwaysReachable));
    s.set_dtls_handshaker(Arc::new(LoopbackHandshaker {
        remote: remote.clone(),
    }));

    Ok(APIBuilder::new()
        .with_media_engine(m)
        .with_setting_engine(s)
        .build())
}

async fn new_pair() -> Result<(RTCPeerConnection, RTCPeerConnection)> {
    let cert_a = RTCCertificate::generate()?;
    let cert_b = RTCCertificate::generate()?;

    let api_a = new_api("10.0.0.1", 5000, &cert_b)?;
    let api_b = new_api("10.0.0.2", 6000, &cert_a)?;

    let pca = api_a
        .new_peer_connection(RTCConfiguration {
            certificates: vec![cert_a],
            ..Default::default()
        })
        .await?;
    let pcb = api_b
        .new_peer_connection(RTCConfiguration {
            certificates: vec![cert_b],
            ..Default::default()
        })
        .await?;

    Ok((pca, pcb))
}

async fn wait_for_state(pc: &RTCPeerConnection, want: RTCPeerConnectionState) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(8);
    pc.on_peer_connection_state_change(Box::new(move |s| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(s).await;
        })
    }));
    if pc.connection_state() == want {
        return Ok(());
    }

    timeout(Duration::from_secs(10), async {
        while let Some(s) = rx.recv().await {
            if s == want {
                return Ok(());
            }
        }
        Err(anyhow!("state channel closed before {want}"))
    })
    .await?
}

/// Exchanges complete descriptions, the way a non-trickle application does.
async fn signal_vanilla(offerer: &RTCPeerConnection, answerer: &RTCPeerConnection) -> Result<()> {
    let offer = offerer.create_offer(None).await?;
    let mut gathered = offerer.gathering_complete_promise().await;
    offerer.set_local_description(offer).await?;
    let _ = gathered.recv().await;

    let offer = offerer
        .local_description()
        .await
        .ok_or_else(|| anyhow!("offerer has no local description"))?;
    answerer.set_remote_description(offer).await?;

    let answer = answerer.create_answer(None).await?;
    let mut gathered = answerer.gathering_complete_promise().await;
    answerer.set_local_description(answer).await?;
    let _ = gathered.recv().await;

    let answer = answerer
        .local_description()
        .await
        .ok_or_else(|| anyhow!("answerer has no local description"))?;
    offerer.set_remote_description(answer).await?;

    Ok(())
}

fn forward_candidates(pc: &RTCPeerConnection) -> mpsc::UnboundedReceiver<RTCIceCandidateInit> {
    let (tx, rx) = mpsc::unbounded_channel();
    pc.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
        if let Some(c) = c {
            let _ = tx.send(c.to_json());
        }
        Box::pin(async {})
    }));
    rx
}

async fn drain_candidates(
    rx: &mut mpsc::UnboundedReceiver<RTCIceCandidateInit>,
    pc: &RTCPeerConnection,
) -> Result<usize> {
    let mut added = 0;
    while let Ok(c) = rx.try_recv() {
        pc.add_ice_candidate(c).await?;
        added += 1;
    }
    Ok(added)
}

#[tokio::test]
async fn test_peers_connect_with_complete_descriptions() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let (pca, pcb) = new_pair().await?;
    pca.add_transceiver_from_kind(RTPCodecType::Audio, None).await?;
    pca.create_data_channel("chat", None).await?;

    signal_vanilla(&pca, &pcb).await?;

    assert_eq!(pca.signaling_state(), RTCSignalingState::Stable);
    assert_eq!(pcb.signaling_state(), RTCSignalingState::Stable);

    wait_for_state(&pca, RTCPeerConnectionState::Connected).await?;
    wait_for_state(&pcb, RTCPeerConnectionState::Connected).await?;
    // end-of-candidates in both descriptions lets ICE go on to completed
    assert!(
        matches!(
            pca.ice_connection_state(),
            RTCIceConnectionState::Connected | RTCIceConnectionState::Completed
        ),
        "ice connection state {}",
        pca.ice_connection_state()
    );
    assert_eq!(pcb.get_transceivers().await.len(), 1);

    pca.close().await?;
    pcb.close().await?;
    assert_eq!(pca.connection_state(), RTCPeerConnectionState::Closed);

    Ok(())
}

#[tokio::test]
async fn test_peers_connect_with_trickled_candidates() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let (pca, pcb) = new_pair().await?;
    let mut from_a = forward_candidates(&pca);
    let mut from_b = forward_candidates(&pcb);
    pca.create_data_channel("chat", None).await?;

    let offer = pca.create_offer(None).await?;
    pca.set_local_description(offer.clone()).await?;
    pcb.set_remote_description(offer).await?;

    let answer = pcb.create_answer(None).await?;
    pcb.set_local_description(answer.clone()).await?;
    pca.set_remote_description(answer).await?;

    let mut added = 0;
    timeout(Duration::from_secs(10), async {
        while added < 2 {
            added += drain_candidates(&mut from_a, &pcb).await?;
            added += drain_candidates(&mut from_b, &pca).await?;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok::<_, anyhow::Error>(())
    })
    .await??;

    wait_for_state(&pca, RTCPeerConnectionState::Connected).await?;
    wait_for_state(&pcb, RTCPeerConnectionState::Connected).await?;

    pca.close().await?;
    pcb.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_ice_restart_reconnects() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let (pca, pcb) = new_pair().await?;
    pca.create_data_channel("chat", None).await?;
    signal_vanilla(&pca, &pcb).await?;
    wait_for_state(&pca, RTCPeerConnectionState::Connected).await?;

    let before = pca
        .local_description()
        .await
        .ok_or_else(|| anyhow!("no local description"))?
        .sdp;

    pca.restart_ice().await?;
    signal_vanilla(&pca, &pcb).await?;

    let after = pca
        .local_description()
        .await
        .ok_or_else(|| anyhow!("no local description"))?
        .sdp;
    let ufrag = |sdp: &str| {
        sdp.lines()
            .find_map(|l| l.strip_prefix("a=ice-ufrag:"))
            .map(str::to_owned)
    };
    assert_ne!(ufrag(&before), ufrag(&after));

    wait_for_state(&pca, RTCPeerConnectionState::Connected).await?;
    wait_for_state(&pcb, RTCPeerConnectionState::Connected).await?;

    pca.close().await?;
    pcb.close().await?;

    Ok(())
}
