use std::fmt;
use std::net::AddrParseError;
use std::num::ParseIntError;

use thiserror::Error;
use tokio::sync::mpsc::error::SendError as MpscSendError;

use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::signaling_state::RTCSignalingState;

pub type Result<T> = std::result::Result<T, Error>;

/// Error is every failure the crate reports. [`Error::kind`] gives the
/// DOMException name a browser would raise for it.
#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("unknown")]
    ErrUnknownType,

    #[error("connection closed")]
    ErrConnectionClosed,

    #[error("x509Cert expired")]
    ErrCertificateExpired,

    #[error("turn server credentials required")]
    ErrNoTurnCredentials,

    #[error("invalid turn server credentials")]
    ErrTurnCredentials,

    #[error("track already exists")]
    ErrExistingTrack,

    #[error("peerIdentity cannot be modified")]
    ErrModifyingPeerIdentity,

    #[error("certificates cannot be modified")]
    ErrModifyingCertificates,

    #[error("bundle policy cannot be modified")]
    ErrModifyingBundlePolicy,

    #[error("rtcp mux policy cannot be modified")]
    ErrModifyingRTCPMuxPolicy,

    #[error("ice candidate pool size cannot be modified")]
    ErrModifyingICECandidatePoolSize,

    #[error("data channel label exceeds size limit")]
    ErrStringSizeLimit,

    #[error("maximum number ID for datachannel specified")]
    ErrMaxDataChannelID,

    #[error("negotiated set without channel id")]
    ErrNegotiatedWithoutID,

    #[error("both max_packet_life_time and max_retransmits was set")]
    ErrRetransmitsOrPacketLifeTime,

    #[error("protocol is larger then 65535 bytes")]
    ErrProtocolTooLarge,

    /// ErrDataChannelIdInUse indicates that the negotiated id is already taken.
    #[error("data channel id already in use")]
    ErrDataChannelIdInUse,

    #[error("RtpSender not created by this PeerConnection")]
    ErrSenderNotCreatedByConnection,

    /// ErrNoCodecsAvailable indicates that no codec is registered for the
    /// kind of media being negotiated.
    #[error("no codecs are available")]
    ErrNoCodecsAvailable,

    #[error("codec not found")]
    ErrCodecNotFound,

    #[error("new track must be of the same kind as previous")]
    ErrRTPSenderNewTrackHasIncorrectKind,

    #[error("transceiver has been stopped")]
    ErrRTPTransceiverStopped,

    #[error("transceiver mid cannot be changed once set")]
    ErrRTPTransceiverCannotChangeMid,

    #[error("unsupported codec type by this transceiver")]
    ErrRTPTransceiverCodecUnsupported,

    /// ErrPeerConnAddTransceiverFromKindSupport indicates a transceiver was
    /// requested with a direction it cannot start in.
    #[error("add_transceiver_from_kind only accepts one of sendrecv, sendonly or recvonly")]
    ErrPeerConnAddTransceiverFromKindSupport,

    #[error("no remote description")]
    ErrNoRemoteDescription,
    #[error("remote description has not been set")]
    ErrPeerConnRemoteDescriptionNil,
    #[error("local description has not been set")]
    ErrPeerConnLocalDescriptionNil,
    #[error("invalid state of signaling state")]
    ErrIncorrectSignalingState,
    #[error("can't rollback from stable state")]
    ErrSignalingStateCannotRollback,
    #[error(
        "invalid proposed signaling state transition: {} applying {} {}",
        from,
        if *is_local { "local" } else { "remote" },
        applying
    )]
    ErrSignalingStateProposedTransitionInvalid {
        from: RTCSignalingState,
        applying: RTCSdpType,
        is_local: bool,
    },
    #[error("invalid value for RTCSdpType")]
    ErrPeerConnSDPTypeInvalidValue,
    #[error("sdp does not match the last created offer")]
    ErrSDPDoesNotMatchOffer,
    #[error("sdp does not match the last created answer")]
    ErrSDPDoesNotMatchAnswer,
    #[error("excessive retries in CreateOffer")]
    ErrExcessiveRetries,

    #[error("SessionDescription contains no fingerprint")]
    ErrSessionDescriptionNoFingerprint,
    #[error("SessionDescription contains an invalid fingerprint")]
    ErrSessionDescriptionInvalidFingerprint,
    #[error("SessionDescription contains multiple fingerprints")]
    ErrSessionDescriptionConflictingFingerprints,
    #[error("SessionDescription is missing the ice-ufrag attribute")]
    ErrSessionDescriptionMissingIceUfrag,
    #[error("SessionDescription is missing the ice-pwd attribute")]
    ErrSessionDescriptionMissingIcePwd,
    #[error("SessionDescription contains multiple ice-ufrag attributes")]
    ErrSessionDescriptionConflictingIceUfrag,
    #[error("SessionDescription contains multiple ice-pwd attributes")]
    ErrSessionDescriptionConflictingIcePwd,
    #[error("media section has no mid")]
    ErrPeerConnTranscieverMidNil,
    #[error("remote answer has more media sections than the offer")]
    ErrPeerConnAnswerMediaSectionsMismatch,

    #[error("unknown ice server url scheme")]
    ErrICEServerSchemeType,
    #[error("ice server url is missing a host")]
    ErrICEServerHost,
    #[error("ice server url has an invalid port")]
    ErrICEServerPort,
    #[error("unknown ice server url transport")]
    ErrICEServerProtoType,
    #[error("invalid ice server url query")]
    ErrICEServerQuery,

    #[error("unknown candidate type")]
    ErrICECandidateTypeUnknown,
    #[error("unknown ICE Protocol")]
    ErrICEProtocolUnknown,
    #[error("attribute not long enough to be ICE candidate")]
    ErrAttributeTooShortICECandidate,
    #[error("could not parse component")]
    ErrParseComponent,
    #[error("could not parse priority")]
    ErrParsePriority,
    #[error("could not parse port")]
    ErrParsePort,
    #[error("could not parse related addresses")]
    ErrParseRelatedAddr,
    #[error("candidate has neither sdpMid nor sdpMLineIndex")]
    ErrICECandidateMissingMidAndIndex,
    #[error("no media section matches the candidate")]
    ErrICECandidateMidUnknown,
    #[error("candidate username fragment does not match")]
    ErrICECandidateUfragMismatch,

    #[error("ICE connection not started")]
    ErrICEConnectionNotStarted,
    #[error("ICE transport failed")]
    ErrICETransportFailed,
    #[error("the ICE transport can only be started from the new state")]
    ErrICETransportNotInNew,
    #[error("ICE transport is closed")]
    ErrICETransportClosed,
    #[error("ICE gatherer is closed")]
    ErrICEGathererClosed,
    #[error("ICEAgent does not exist")]
    ErrICEAgentNotExist,
    #[error("remote ice parameters are not set")]
    ErrICERemoteParametersNil,

    #[error("the certificate list is empty")]
    ErrNonCertificate,
    #[error("attempted to start DTLSTransport that is not in new state")]
    ErrInvalidDTLSStart,
    #[error("DTLS transport can not connect before ICE is connected")]
    ErrDTLSICENotConnected,
    #[error("no matching certificate fingerprint")]
    ErrNoMatchingCertificateFingerprint,
    #[error("unsupported fingerprint algorithm")]
    ErrUnsupportedFingerprintAlgorithm,
    #[error("DTLS transport failed")]
    ErrDTLSTransportFailed,
    #[error("DTLS handshake failed: {0}")]
    ErrDTLSHandshake(String),
    #[error("SetAnsweringDTLSRole must DTLSRoleClient or DTLSRoleServer")]
    ErrSettingEngineSetAnsweringDTLSRole,

    #[error("{0}")]
    Sdp(#[from] sdp::Error),
    #[error("{0}")]
    RcGen(#[from] rcgen::Error),
    #[error("mpsc send: {0}")]
    MpscSend(String),
    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("parse url: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("parse addr: {0}")]
    ParseAddr(#[from] AddrParseError),

    #[allow(non_camel_case_types)]
    #[error("{0}")]
    new(String),
}

// the payload type is dropped along with the message
impl<T> From<MpscSendError<T>> for Error {
    fn from(e: MpscSendError<T>) -> Self {
        Error::MpscSend(e.to_string())
    }
}

/// RTCErrorKind is the DOMException name a failure is reported as.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCErrorKind {
    InvalidState,
    InvalidModification,
    InvalidAccess,
    Operation,
    NetworkFailure,
    NotSupported,
    Syntax,
    Type,
    Unknown,
}

impl fmt::Display for RTCErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCErrorKind::InvalidState => "InvalidStateError",
            RTCErrorKind::InvalidModification => "InvalidModificationError",
            RTCErrorKind::InvalidAccess => "InvalidAccessError",
            RTCErrorKind::Operation => "OperationError",
            RTCErrorKind::NetworkFailure => "NetworkError",
            RTCErrorKind::NotSupported => "NotSupportedError",
            RTCErrorKind::Syntax => "SyntaxError",
            RTCErrorKind::Type => "TypeError",
            RTCErrorKind::Unknown => "UnknownError",
        };
        write!(f, "{s}")
    }
}

impl Error {
    /// kind classifies the error the way a W3C RTCPeerConnection would
    /// reject the corresponding promise.
    pub fn kind(&self) -> RTCErrorKind {
        match self {
            Error::ErrConnectionClosed
            | Error::ErrNoRemoteDescription
            | Error::ErrPeerConnRemoteDescriptionNil
            | Error::ErrPeerConnLocalDescriptionNil
            | Error::ErrIncorrectSignalingState
            | Error::ErrSignalingStateCannotRollback
            | Error::ErrSignalingStateProposedTransitionInvalid { .. }
            | Error::ErrRTPTransceiverStopped
            | Error::ErrICEConnectionNotStarted
            | Error::ErrICETransportNotInNew
            | Error::ErrICETransportClosed
            | Error::ErrICEGathererClosed
            | Error::ErrICEAgentNotExist
            | Error::ErrICERemoteParametersNil
            | Error::ErrInvalidDTLSStart
            | Error::ErrDTLSICENotConnected => RTCErrorKind::InvalidState,

            Error::ErrModifyingPeerIdentity
            | Error::ErrModifyingCertificates
            | Error::ErrModifyingBundlePolicy
            | Error::ErrModifyingRTCPMuxPolicy
            | Error::ErrModifyingICECandidatePoolSize
            | Error::ErrSDPDoesNotMatchOffer
            | Error::ErrSDPDoesNotMatchAnswer
            | Error::ErrRTPTransceiverCannotChangeMid => RTCErrorKind::InvalidModification,

            Error::ErrCertificateExpired
            | Error::ErrNonCertificate
            | Error::ErrNoTurnCredentials
            | Error::ErrTurnCredentials
            | Error::ErrExistingTrack
            | Error::ErrSenderNotCreatedByConnection => RTCErrorKind::InvalidAccess,

            Error::ErrMaxDataChannelID
            | Error::ErrDataChannelIdInUse
            | Error::ErrExcessiveRetries
            | Error::ErrSessionDescriptionNoFingerprint
            | Error::ErrSessionDescriptionInvalidFingerprint
            | Error::ErrSessionDescriptionConflictingFingerprints
            | Error::ErrSessionDescriptionMissingIceUfrag
            | Error::ErrSessionDescriptionMissingIcePwd
            | Error::ErrSessionDescriptionConflictingIceUfrag
            | Error::ErrSessionDescriptionConflictingIcePwd
            | Error::ErrPeerConnTranscieverMidNil
            | Error::ErrPeerConnAnswerMediaSectionsMismatch
            | Error::ErrICECandidateTypeUnknown
            | Error::ErrICEProtocolUnknown
            | Error::ErrAttributeTooShortICECandidate
            | Error::ErrParseComponent
            | Error::ErrParsePriority
            | Error::ErrParsePort
            | Error::ErrParseRelatedAddr
            | Error::ErrICECandidateMidUnknown
            | Error::ErrICECandidateUfragMismatch
            | Error::Sdp(_)
            | Error::ParseInt(_)
            | Error::ParseAddr(_) => RTCErrorKind::Operation,

            Error::ErrICETransportFailed
            | Error::ErrNoMatchingCertificateFingerprint
            | Error::ErrDTLSTransportFailed
            | Error::ErrDTLSHandshake(_) => RTCErrorKind::NetworkFailure,

            Error::ErrNoCodecsAvailable
            | Error::ErrCodecNotFound
            | Error::ErrRTPTransceiverCodecUnsupported
            | Error::ErrICEServerSchemeType
            | Error::ErrICEServerProtoType
            | Error::ErrUnsupportedFingerprintAlgorithm => RTCErrorKind::NotSupported,

            Error::ErrSettingEngineSetAnsweringDTLSRole => RTCErrorKind::InvalidAccess,

            Error::ErrICEServerHost
            | Error::ErrICEServerPort
            | Error::ErrICEServerQuery
            | Error::ParseUrl(_) => RTCErrorKind::Syntax,

            Error::ErrStringSizeLimit
            | Error::ErrNegotiatedWithoutID
            | Error::ErrRetransmitsOrPacketLifeTime
            | Error::ErrProtocolTooLarge
            | Error::ErrPeerConnSDPTypeInvalidValue
            | Error::ErrICECandidateMissingMidAndIndex
            | Error::ErrPeerConnAddTransceiverFromKindSupport
            | Error::ErrRTPSenderNewTrackHasIncorrectKind => RTCErrorKind::Type,

            Error::ErrUnknownType
            | Error::RcGen(_)
            | Error::MpscSend(_)
            | Error::new(_) => RTCErrorKind::Unknown,
        }
    }
}

/// flatten_errs joins teardown failures into one error, one per line.
pub fn flatten_errs(errs: Vec<impl Into<Error>>) -> Result<()> {
    if errs.is_empty() {
        Ok(())
    } else {
        let errs_strs: Vec<String> = errs.into_iter().map(|e| e.into().to_string()).collect();
        Err(Error::new(errs_strs.join("\n")))
    }
}
