use super::*;
use crate::api::APIBuilder;
use crate::peer_connection::configuration::RTCConfiguration;

#[tokio::test]
async fn test_opus_case() -> Result<()> {
    let mut m = MediaEngine::default();
    m.register_default_codecs()?;
    let api = APIBuilder::new().with_media_engine(m).build();

    let pc = api.new_peer_connection(RTCConfiguration::default()).await?;
    pc.add_transceiver_from_kind(RTPCodecType::Audio, None)
        .await?;

    let offer = pc.create_offer(None).await?;
    assert!(offer.sdp.contains("a=rtpmap:111 opus/48000/2\r\n"));
    assert!(offer
        .sdp
        .contains("a=fmtp:111 minptime=10;useinbandfec=1\r\n"));

    pc.close().await?;

    Ok(())
}

#[tokio::test]
async fn test_video_case() -> Result<()> {
    let mut m = MediaEngine::default();
    m.register_default_codecs()?;
    let api = APIBuilder::new().with_media_engine(m).build();

    let pc = api.new_peer_connection(RTCConfiguration::default()).await?;
    pc.add_transceiver_from_kind(RTPCodecType::Video, None)
        .await?;

    let offer = pc.create_offer(None).await?;
    for expected in [
        "a=rtpmap:96 VP8/90000\r\n",
        "a=rtpmap:98 VP9/90000\r\n",
        "a=rtpmap:102 H264/90000\r\n",
        "a=rtcp-fb:96 nack pli\r\n",
    ] {
        assert!(offer.sdp.contains(expected), "missing {expected:?}");
    }
    assert!(!offer.sdp.contains("opus"));

    pc.close().await?;

    Ok(())
}

#[test]
fn test_register_codec() -> Result<()> {
    let mut m = MediaEngine::default();
    let opus = RTCRtpCodecParameters {
        capability: RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
        payload_type: 111,
        ..Default::default()
    };

    m.register_codec(opus.clone(), RTPCodecType::Audio)?;
    m.register_codec(opus.clone(), RTPCodecType::Audio)?;
    assert_eq!(m.get_codecs_by_kind(RTPCodecType::Audio).len(), 1);
    assert!(m.get_codecs_by_kind(RTPCodecType::Video).is_empty());
    assert!(m.get_codecs_by_kind(RTPCodecType::Audio)[0]
        .stats_id
        .starts_with("RTPCodec-"));

    assert_eq!(
        m.register_codec(opus, RTPCodecType::Unspecified),
        Err(Error::ErrUnknownType)
    );

    Ok(())
}

#[test]
fn test_match_remote_codecs() -> Result<()> {
    let mut m = MediaEngine::default();
    m.register_default_codecs()?;

    let remote = |mime_type: &str, fmtp: &str, payload_type: u8| RTCRtpCodecParameters {
        capability: RTCRtpCodecCapability {
            mime_type: mime_type.to_owned(),
            clock_rate: 90000,
            sdp_fmtp_line: fmtp.to_owned(),
            ..Default::default()
        },
        payload_type,
        ..Default::default()
    };

    // remote payload types are kept, unknown codecs dropped
    let matched = m.match_remote_codecs(
        RTPCodecType::Video,
        &[
            remote("video/vp8", "", 120),
            remote("video/H265", "", 121),
            remote(MIME_TYPE_VP9, "profile-id=0", 122),
        ],
    );
    let payload_types: Vec<u8> = matched.iter().map(|c| c.payload_type).collect();
    assert_eq!(payload_types, vec![120, 122]);
    assert!(!matched[0].capability.rtcp_feedback.is_empty());

    // fmtp mismatch only matches when nothing matches exactly
    let matched = m.match_remote_codecs(
        RTPCodecType::Video,
        &[remote(MIME_TYPE_H264, "profile-level-id=640032", 100)],
    );
    assert_eq!(matched.len(), 1);
    let matched = m.match_remote_codecs(
        RTPCodecType::Video,
        &[
            remote(MIME_TYPE_H264, "profile-level-id=640032", 100),
            remote(MIME_TYPE_VP8, "", 96),
        ],
    );
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].payload_type, 96);

    assert!(m
        .match_remote_codecs(RTPCodecType::Audio, &[remote("audio/AMR", "", 97)])
        .is_empty());

    Ok(())
}
