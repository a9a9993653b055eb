
pub mod sdp_type;
pub mod session_description;

use std::collections::HashMap;
use std::sync::Arc;

use sdp::description::common::{Address, ConnectionInformation};
use sdp::description::media::{MediaDescription, MediaName, RangedPort};
use sdp::description::session::*;
use sdp::util::ConnectionRole;

use crate::dtls_transport::dtls_fingerprint::RTCDtlsFingerprint;
use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate::RTCIceCandidate;
use crate::ice_transport::ice_gathering_state::RTCIceGatheringState;
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::peer_connection::MEDIA_SECTION_APPLICATION;
use crate::rtp_transceiver::rtp_codec::{
    RTCPFeedback, RTCRtpCodecCapability, RTCRtpCodecParameters,
};
use crate::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{PayloadType, RTCRtpTransceiver};

use session_description::RTCSessionDescription;

const ATTR_KEY_ICE_UFRAG: &str = "ice-ufrag";
const ATTR_KEY_ICE_PWD: &str = "ice-pwd";
const ATTR_KEY_FINGERPRINT: &str = "fingerprint";

/// The local ICE state a media section is written with.
#[derive(Default, Debug, Clone)]
pub(crate) struct SectionIce {
    pub(crate) params: RTCIceParameters,
    pub(crate) candidates: Vec<RTCIceCandidate>,
    pub(crate) gathering_state: RTCIceGatheringState,
}

/// add_candidates_to_media_descriptions appends the candidates `m` does not
/// carry yet, plus end-of-candidates once gathering is complete.
pub(crate) fn add_candidates_to_media_descriptions(
    candidates: &[RTCIceCandidate],
    mut m: MediaDescription,
    ice_gathering_state: RTCIceGatheringState,
) -> MediaDescription {
    for c in candidates {
        let marshaled = c.marshal();
        let known = m
            .attributes
            .iter()
            .any(|a| a.key == ATTR_KEY_CANDIDATE && a.value.as_deref() == Some(marshaled.as_str()));
        if !known {
            m = m.with_value_attribute(ATTR_KEY_CANDIDATE.to_owned(), marshaled);
        }
    }

    if ice_gathering_state != RTCIceGatheringState::Complete
        || m.attributes.iter().any(|a| a.key == ATTR_KEY_END_OF_CANDIDATES)
    {
        return m;
    }

    m.with_property_attribute(ATTR_KEY_END_OF_CANDIDATES.to_owned())
}

fn rejected_media_description(media: String) -> MediaDescription {
    MediaDescription {
        media_name: MediaName {
            media,
            port: RangedPort {
                value: 0,
                range: None,
            },
            protos: vec![
                "UDP".to_owned(),
                "TLS".to_owned(),
                "RTP".to_owned(),
                "SAVPF".to_owned(),
            ],
            formats: vec!["0".to_owned()],
        },
        media_title: None,
        // c= is required for every media section, rejected ones included
        connection_information: Some(ConnectionInformation {
            network_type: "IN".to_owned(),
            address_type: "IP4".to_owned(),
            address: Some(Address {
                address: "0.0.0.0".to_owned(),
                ttl: None,
                range: None,
            }),
        }),
        bandwidth: vec![],
        encryption_key: None,
        attributes: vec![],
    }
}

pub(crate) struct AddDataMediaSectionParams {
    should_add_candidates: bool,
    mid_value: String,
    dtls_role: ConnectionRole,
}

pub(crate) fn add_data_media_section(
    d: SessionDescription,
    ice: &SectionIce,
    params: AddDataMediaSectionParams,
) -> SessionDescription {
    let mut media = MediaDescription {
        media_name: MediaName {
            media: MEDIA_SECTION_APPLICATION.to_owned(),
            port: RangedPort {
                value: 9,
                range: None,
            },
            protos: vec!["UDP".to_owned(), "DTLS".to_owned(), "SCTP".to_owned()],
            formats: vec!["webrtc-datachannel".to_owned()],
        },
        media_title: None,
        connection_information: Some(ConnectionInformation {
            network_type: "IN".to_owned(),
            address_type: "IP4".to_owned(),
            address: Some(Address {
                address: "0.0.0.0".to_owned(),
                ttl: None,
                range: None,
            }),
        }),
        bandwidth: vec![],
        encryption_key: None,
        attributes: vec![],
    }
    .with_value_attribute(
        ATTR_KEY_CONNECTION_SETUP.to_owned(),
        params.dtls_role.to_string(),
    )
    .with_value_attribute(ATTR_KEY_MID.to_owned(), params.mid_value)
    .with_property_attribute(RTCRtpTransceiverDirection::Sendrecv.to_string())
    .with_property_attribute("sctp-port:5000".to_owned())
    .with_ice_credentials(
        ice.params.username_fragment.clone(),
        ice.params.password.clone(),
    );

    if params.should_add_candidates {
        media = add_candidates_to_media_descriptions(&ice.candidates, media, ice.gathering_state);
    }

    d.with_media(media)
}

pub(crate) struct AddTransceiverSdpParams {
    should_add_candidates: bool,
    mid_value: String,
    dtls_role: ConnectionRole,
    offered_direction: Option<RTCRtpTransceiverDirection>,
}

/// add_transceiver_sdp writes the media section of one transceiver. It
/// reports false when the section had to be rejected.
pub(crate) async fn add_transceiver_sdp(
    d: SessionDescription,
    ice: &SectionIce,
    t: &Arc<RTCRtpTransceiver>,
    params: AddTransceiverSdpParams,
) -> Result<(SessionDescription, bool)> {
    let codecs = t.get_codecs().await;
    if t.stopped() || codecs.is_empty() {
        if !t.stopped() && t.sender().await.track().await.is_some() {
            return Err(Error::ErrNoCodecsAvailable);
        }
        let media = rejected_media_description(t.kind().to_string())
            .with_value_attribute(ATTR_KEY_MID.to_owned(), params.mid_value)
            .with_property_attribute(RTCRtpTransceiverDirection::Inactive.to_string());
        return Ok((d.with_media(media), false));
    }

    let mut media = MediaDescription::new_jsep_media_description(t.kind().to_string(), vec![])
        .with_value_attribute(
            ATTR_KEY_CONNECTION_SETUP.to_owned(),
            params.dtls_role.to_string(),
        )
        .with_value_attribute(ATTR_KEY_MID.to_owned(), params.mid_value)
        .with_ice_credentials(
            ice.params.username_fragment.clone(),
            ice.params.password.clone(),
        )
        .with_property_attribute(ATTR_KEY_RTCPMUX.to_owned())
        .with_property_attribute(ATTR_KEY_RTCPRSIZE.to_owned());

    for codec in &codecs {
        media = media.with_codec(
            codec.payload_type,
            codec.capability.encoding_name().to_owned(),
            codec.capability.clock_rate,
            codec.capability.channels,
            codec.capability.sdp_fmtp_line.clone(),
        );

        for feedback in &codec.capability.rtcp_feedback {
            media = media.with_value_attribute(
                "rtcp-fb".to_owned(),
                format!(
                    "{} {} {}",
                    codec.payload_type, feedback.typ, feedback.parameter
                )
                .trim_end()
                .to_owned(),
            );
        }
    }

    let direction = match params.offered_direction {
        Some(offered_direction) => answer_direction(offered_direction, t.direction()),
        // offers reflect the transceiver direction as is, re-offers included
        None => t.direction(),
    };

    // announced whenever the transceiver wants to send, whatever was negotiated
    if t.direction().has_send() {
        if let Some(msid) = t.sender().await.msid().await {
            media = media.with_value_attribute(ATTR_KEY_MSID.to_owned(), msid);
        }
    }
    media = media.with_property_attribute(direction.to_string());

    if params.should_add_candidates {
        media = add_candidates_to_media_descriptions(&ice.candidates, media, ice.gathering_state);
    }

    Ok((d.with_media(media), true))
}

/// answer_direction is the direction a transceiver wanting `local` answers
/// an m-line offered as `offered` with.
pub(crate) fn answer_direction(
    offered: RTCRtpTransceiverDirection,
    local: RTCRtpTransceiverDirection,
) -> RTCRtpTransceiverDirection {
    use RTCRtpTransceiverDirection::*;
    match offered {
        // sendonly is answered with recvonly or inactive, and the
        // other way around
        Sendonly | Recvonly => offered.reverse().intersect(local),
        Sendrecv | Unspecified => local,
        Inactive => Inactive,
    }
}

fn bundle_match(bundle: Option<&String>, id: &str) -> bool {
    match bundle {
        None => true,
        Some(b) => b.split_whitespace().any(|s| s == id),
    }
}

/// MediaSection is one m= line to be written: a transceiver or the data
/// channel section, with the ICE state of the transport it runs on.
#[derive(Default)]
pub(crate) struct MediaSection {
    pub(crate) id: String,
    pub(crate) transceiver: Option<Arc<RTCRtpTransceiver>>,
    pub(crate) data: bool,
    pub(crate) offered_direction: Option<RTCRtpTransceiverDirection>,
    pub(crate) ice: SectionIce,
}

pub(crate) struct PopulateSdpParams {
    pub(crate) is_icelite: bool,
    pub(crate) bundled: bool,
    pub(crate) connection_role: ConnectionRole,
    pub(crate) match_bundle_group: Option<String>,
}

/// populate_sdp serializes the media sections of a session into an SDP.
/// Bundled sessions carry their candidates in the first section only.
pub(crate) async fn populate_sdp(
    mut d: SessionDescription,
    dtls_fingerprints: &[RTCDtlsFingerprint],
    media_sections: &[MediaSection],
    params: PopulateSdpParams,
) -> Result<SessionDescription> {
    let mut bundle_value = "BUNDLE".to_owned();
    let mut bundle_count = 0;

    for (i, m) in media_sections.iter().enumerate() {
        if m.data == m.transceiver.is_some() {
            return Err(Error::new(format!(
                "media section {} must hold either data or one transceiver",
                m.id
            )));
        }

        let should_add_candidates = !params.bundled || i == 0;

        let accepted = if let Some(t) = &m.transceiver {
            let (d1, accepted) = add_transceiver_sdp(
                d,
                &m.ice,
                t,
                AddTransceiverSdpParams {
                    should_add_candidates,
                    mid_value: m.id.clone(),
                    dtls_role: params.connection_role,
                    offered_direction: m.offered_direction,
                },
            )
            .await?;
            d = d1;
            accepted
        } else {
            d = add_data_media_section(
                d,
                &m.ice,
                AddDataMediaSectionParams {
                    should_add_candidates,
                    mid_value: m.id.clone(),
                    dtls_role: params.connection_role,
                },
            );
            true
        };

        if accepted && params.bundled {
            if bundle_match(params.match_bundle_group.as_ref(), &m.id) {
                bundle_value.push(' ');
                bundle_value.push_str(&m.id);
                bundle_count += 1;
            } else if let Some(desc) = d.media_descriptions.last_mut() {
                desc.media_name.port = RangedPort {
                    value: 0,
                    range: None,
                }
            }
        }
    }

    for fingerprint in dtls_fingerprints {
        d = d.with_fingerprint(
            fingerprint.algorithm.clone(),
            fingerprint.value.to_uppercase(),
        );
    }

    if params.is_icelite {
        d = d.with_value_attribute(ATTR_KEY_ICELITE.to_owned(), ATTR_KEY_ICELITE.to_owned());
    }

    if bundle_count > 0 {
        d = d.with_value_attribute(ATTR_KEY_GROUP.to_owned(), bundle_value);
    }

    Ok(d)
}

/// populate_local_candidates rewrites `sd` with the candidates gathered
/// since it was created. `ice[i]` holds what media section `i` should carry;
/// sections without an entry are left alone.
pub(crate) fn populate_local_candidates(
    sd: &RTCSessionDescription,
    ice: &[Option<SectionIce>],
) -> RTCSessionDescription {
    let mut parsed = match sd.parsed_or_unmarshal() {
        Ok(parsed) => parsed,
        Err(_) => return sd.clone(),
    };

    let mut changed = false;
    for (m, ice) in parsed.media_descriptions.iter_mut().zip(ice.iter()) {
        let Some(ice) = ice else { continue };
        if m.media_name.port.value == 0 {
            continue;
        }
        let before = m.attributes.len();
        *m = add_candidates_to_media_descriptions(
            &ice.candidates,
            std::mem::take(m),
            ice.gathering_state,
        );
        changed |= m.attributes.len() != before;
    }

    if !changed {
        return sd.clone();
    }

    RTCSessionDescription {
        sdp_type: sd.sdp_type,
        sdp: parsed.marshal(),
        parsed: Some(parsed),
    }
}

pub(crate) fn get_mid_value(media: &MediaDescription) -> Option<&String> {
    media
        .attributes
        .iter()
        .find(|a| a.key == ATTR_KEY_MID)
        .and_then(|a| a.value.as_ref())
}

/// get_peer_direction is the first direction attribute of `media`, or
/// `Unspecified` when it has none.
pub(crate) fn get_peer_direction(media: &MediaDescription) -> RTCRtpTransceiverDirection {
    media
        .attributes
        .iter()
        .map(|a| RTCRtpTransceiverDirection::from(a.key.as_str()))
        .find(|d| *d != RTCRtpTransceiverDirection::Unspecified)
        .unwrap_or_default()
}

/// get_msid returns the track id announced by `a=msid`, if any.
pub(crate) fn get_msid_track_id(media: &MediaDescription) -> Option<String> {
    let msid = media.attribute(ATTR_KEY_MSID).flatten()?;
    let mut parts = msid.split_whitespace();
    let _stream_id = parts.next()?;
    parts.next().map(ToOwned::to_owned)
}

/// extract_fingerprint returns the (value, algorithm) of the one fingerprint
/// the description announces.
pub(crate) fn extract_fingerprint(desc: &SessionDescription) -> Result<(String, String)> {
    let session_level = desc.attribute(ATTR_KEY_FINGERPRINT).map(String::as_str);
    let media_level = desc
        .media_descriptions
        .iter()
        .filter_map(|m| m.attribute(ATTR_KEY_FINGERPRINT).flatten());
    let mut fingerprints = session_level.into_iter().chain(media_level);

    let Some(first) = fingerprints.next() else {
        return Err(Error::ErrSessionDescriptionNoFingerprint);
    };
    if fingerprints.any(|f| f != first) {
        return Err(Error::ErrSessionDescriptionConflictingFingerprints);
    }

    match first.split(' ').collect::<Vec<_>>()[..] {
        [algorithm, value] => Ok((value.to_owned(), algorithm.to_owned())),
        _ => Err(Error::ErrSessionDescriptionInvalidFingerprint),
    }
}

/// The remote ICE credentials and candidates of a description, or of one
/// of its media sections.
#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct RemoteIceDetails {
    pub(crate) ufrag: String,
    pub(crate) pwd: String,
    pub(crate) candidates: Vec<RTCIceCandidate>,
}

fn media_candidates(
    m: &MediaDescription,
    mline_index: usize,
    out: &mut Vec<RTCIceCandidate>,
) -> Result<()> {
    for a in &m.attributes {
        if !a.is_ice_candidate() {
            continue;
        }
        if let Some(value) = &a.value {
            let mut c = RTCIceCandidate::unmarshal(value)?;
            c.sdp_mid = get_mid_value(m).cloned();
            c.sdp_mline_index = u16::try_from(mline_index).ok();
            out.push(c);
        }
    }
    Ok(())
}

/// extract_ice_details reads the credentials shared by every media section
/// of a bundled description. Sections disagreeing on them are an error.
pub(crate) fn extract_ice_details(desc: &SessionDescription) -> Result<RemoteIceDetails> {
    let mut candidates = vec![];

    // The first inactive section's credentials are used when every
    // section is inactive.
    let mut backup_ufrag = None;
    let mut backup_pwd = None;

    let mut remote_ufrag = desc.attribute(ATTR_KEY_ICE_UFRAG).map(|s| s.as_str());
    let mut remote_pwd = desc.attribute(ATTR_KEY_ICE_PWD).map(|s| s.as_str());

    for (i, m) in desc.media_descriptions.iter().enumerate() {
        let ufrag = m.attribute(ATTR_KEY_ICE_UFRAG).flatten();
        let pwd = m.attribute(ATTR_KEY_ICE_PWD).flatten();

        if m.attribute(ATTR_KEY_INACTIVE).is_some() {
            if backup_ufrag.is_none() {
                backup_ufrag = ufrag;
            }
            if backup_pwd.is_none() {
                backup_pwd = pwd;
            }
            continue;
        }

        if remote_ufrag.is_none() {
            remote_ufrag = ufrag;
        }
        if remote_pwd.is_none() {
            remote_pwd = pwd;
        }

        if ufrag.is_some() && ufrag != remote_ufrag {
            return Err(Error::ErrSessionDescriptionConflictingIceUfrag);
        }
        if pwd.is_some() && pwd != remote_pwd {
            return Err(Error::ErrSessionDescriptionConflictingIcePwd);
        }

        media_candidates(m, i, &mut candidates)?;
    }

    let ufrag = remote_ufrag
        .or(backup_ufrag)
        .ok_or(Error::ErrSessionDescriptionMissingIceUfrag)?;
    let pwd = remote_pwd
        .or(backup_pwd)
        .ok_or(Error::ErrSessionDescriptionMissingIcePwd)?;

    Ok(RemoteIceDetails {
        ufrag: ufrag.to_owned(),
        pwd: pwd.to_owned(),
        candidates,
    })
}

/// extract_media_ice_details reads the credentials of media section
/// `mline_index`, falling back to the session level ones.
pub(crate) fn extract_media_ice_details(
    desc: &SessionDescription,
    mline_index: usize,
) -> Result<RemoteIceDetails> {
    let m = desc
        .media_descriptions
        .get(mline_index)
        .ok_or(Error::ErrICECandidateMidUnknown)?;

    let ufrag = m
        .attribute(ATTR_KEY_ICE_UFRAG)
        .flatten()
        .or(desc.attribute(ATTR_KEY_ICE_UFRAG).map(|s| s.as_str()))
        .ok_or(Error::ErrSessionDescriptionMissingIceUfrag)?;
    let pwd = m
        .attribute(ATTR_KEY_ICE_PWD)
        .flatten()
        .or(desc.attribute(ATTR_KEY_ICE_PWD).map(|s| s.as_str()))
        .ok_or(Error::ErrSessionDescriptionMissingIcePwd)?;

    let mut candidates = vec![];
    media_candidates(m, mline_index, &mut candidates)?;

    Ok(RemoteIceDetails {
        ufrag: ufrag.to_owned(),
        pwd: pwd.to_owned(),
        candidates,
    })
}

pub(crate) fn have_application_media_section(desc: &SessionDescription) -> bool {
    desc.media_descriptions
        .iter()
        .any(|m| m.media_name.media == MEDIA_SECTION_APPLICATION)
}

pub(crate) fn get_by_mid<'a>(
    search_mid: &str,
    desc: &'a RTCSessionDescription,
) -> Option<&'a MediaDescription> {
    desc.parsed
        .as_ref()?
        .media_descriptions
        .iter()
        .find(|m| m.attribute(ATTR_KEY_MID).flatten() == Some(search_mid))
}

/// have_data_channel finds the `m=application` section of `desc`.
pub(crate) fn have_data_channel(desc: &RTCSessionDescription) -> Option<&MediaDescription> {
    desc.parsed
        .as_ref()?
        .media_descriptions
        .iter()
        .find(|m| m.media_name.media == MEDIA_SECTION_APPLICATION)
}

pub(crate) fn codecs_from_media_description(
    m: &MediaDescription,
) -> Result<Vec<RTCRtpCodecParameters>> {
    let s = SessionDescription {
        media_descriptions: vec![m.clone()],
        ..Default::default()
    };

    let mut out = vec![];
    for payload_str in &m.media_name.formats {
        let payload_type: PayloadType = payload_str.parse::<u8>()?;
        let codec = match s.get_codec_for_payload_type(payload_type) {
            Ok(codec) => codec,
            Err(err) => {
                if payload_type == 0 {
                    continue;
                }
                return Err(err.into());
            }
        };

        let channels = codec.encoding_parameters.parse::<u16>().unwrap_or(0);

        let rtcp_feedback = codec
            .rtcp_feedback
            .iter()
            .map(|raw| match raw.split_once(' ') {
                Some((typ, parameter)) => RTCPFeedback {
                    typ: typ.to_owned(),
                    parameter: parameter.to_owned(),
                },
                None => RTCPFeedback {
                    typ: raw.clone(),
                    parameter: String::new(),
                },
            })
            .collect();

        out.push(RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: m.media_name.media.clone() + "/" + codec.name.as_str(),
                clock_rate: codec.clock_rate,
                channels,
                sdp_fmtp_line: codec.fmtp.clone(),
                rtcp_feedback,
            },
            payload_type,
            stats_id: String::new(),
        })
    }

    Ok(out)
}

/// remote_codecs_by_mid parses the codecs of every audio and video section
/// of `parsed` that carries a mid.
pub(crate) fn remote_codecs_by_mid(
    parsed: &SessionDescription,
) -> Result<HashMap<String, Vec<RTCRtpCodecParameters>>> {
    parsed
        .media_descriptions
        .iter()
        .filter(|m| m.media_name.media != MEDIA_SECTION_APPLICATION)
        .filter_map(|m| get_mid_value(m).map(|mid| (mid, m)))
        .map(|(mid, m)| Ok((mid.clone(), codecs_from_media_description(m)?)))
        .collect()
}

/// update_sdp_origin saves the origin of the first local description; later
/// descriptions reuse its session id with an incremented version (RFC 8829
/// section 5.2.2).
pub(crate) fn update_sdp_origin(origin: &mut Origin, d: &mut SessionDescription) {
    if origin.session_version == 0 {
        origin.session_version = d.origin.session_version;
        origin.session_id = d.origin.session_id;
    } else {
        d.origin.session_id = origin.session_id;
        origin.session_version += 1;
        d.origin.session_version = origin.session_version;
    }
}
