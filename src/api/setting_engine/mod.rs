#[cfg(test)]
mod setting_engine_test;

use std::sync::Arc;

use tokio::time::Duration;

use crate::dtls_transport::dtls_handshaker::DtlsHandshaker;
use crate::dtls_transport::dtls_role::DTLSRole;
use crate::error::{Error, Result};
use crate::ice_transport::candidate_source::CandidateSourceFactory;
use crate::ice_transport::connectivity_checker::ConnectivityChecker;

pub(crate) const DEFAULT_ICE_DISCONNECTED_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_ICE_FAILED_TIMEOUT: Duration = Duration::from_secs(25);
pub(crate) const DEFAULT_ICE_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Default, Clone)]
pub struct Timeout {
    pub ice_disconnected_timeout: Option<Duration>,
    pub ice_failed_timeout: Option<Duration>,
    pub ice_keepalive_interval: Option<Duration>,
}

#[derive(Default, Clone)]
pub struct Candidates {
    pub ice_lite: bool,
    pub username_fragment: String,
    pub password: String,
}

/// Collaborators are the pieces of the network stack this crate drives but
/// does not implement.
#[derive(Default, Clone)]
pub struct Collaborators {
    pub candidate_source_factory: Option<Arc<dyn CandidateSourceFactory>>,
    pub connectivity_checker: Option<Arc<dyn ConnectivityChecker>>,
    pub dtls_handshaker: Option<Arc<dyn DtlsHandshaker>>,
}

/// SettingEngine holds the knobs that have no place in `RTCConfiguration`:
/// timers, fixed credentials, DTLS role overrides and the pluggable
/// network collaborators.
#[derive(Default, Clone)]
pub struct SettingEngine {
    pub(crate) timeout: Timeout,
    pub(crate) candidates: Candidates,
    pub(crate) collaborators: Collaborators,
    pub(crate) answering_dtls_role: DTLSRole,
    pub(crate) disable_certificate_fingerprint_verification: bool,
    pub(crate) mid_generator: Option<Arc<dyn Fn(isize) -> String + Send + Sync>>,
}

impl SettingEngine {
    /// set_ice_timeouts overrides the ICE timers; `None` keeps the default.
    ///
    /// | timer | default | meaning |
    /// |---|---|---|
    /// | disconnected | 5s | time without consent before `disconnected` |
    /// | failed | 25s | time without a usable pair before `failed` |
    /// | keepalive | 2s | consent refresh period on the selected pair |
    pub fn set_ice_timeouts(
        &mut self,
        disconnected_timeout: Option<Duration>,
        failed_timeout: Option<Duration>,
        keep_alive_interval: Option<Duration>,
    ) {
        self.timeout.ice_disconnected_timeout = disconnected_timeout;
        self.timeout.ice_failed_timeout = failed_timeout;
        self.timeout.ice_keepalive_interval = keep_alive_interval;
    }

    pub(crate) fn ice_disconnected_timeout(&self) -> Duration {
        self.timeout
            .ice_disconnected_timeout
            .unwrap_or(DEFAULT_ICE_DISCONNECTED_TIMEOUT)
    }

    pub(crate) fn ice_failed_timeout(&self) -> Duration {
        self.timeout
            .ice_failed_timeout
            .unwrap_or(DEFAULT_ICE_FAILED_TIMEOUT)
    }

    pub(crate) fn ice_keepalive_interval(&self) -> Duration {
        self.timeout
            .ice_keepalive_interval
            .unwrap_or(DEFAULT_ICE_KEEPALIVE_INTERVAL)
    }

    /// set_lite turns the agent into an ICE lite agent: host candidates only,
    /// `a=ice-lite` in descriptions, and never the controlling side.
    pub fn set_lite(&mut self, lite: bool) {
        self.candidates.ice_lite = lite;
    }

    /// set_answering_dtls_role fixes the `a=setup` value written into answers.
    /// Only `Client` (active) and `Server` (passive) are accepted; by default
    /// the answerer is active.
    pub fn set_answering_dtls_role(&mut self, role: DTLSRole) -> Result<()> {
        if role != DTLSRole::Client && role != DTLSRole::Server {
            return Err(Error::ErrSettingEngineSetAnsweringDTLSRole);
        }

        self.answering_dtls_role = role;
        Ok(())
    }

    /// set_ice_credentials pins the local ufrag and pwd instead of generating
    /// them. They are kept across ICE restarts too.
    pub fn set_ice_credentials(&mut self, username_fragment: String, password: String) {
        self.candidates.username_fragment = username_fragment;
        self.candidates.password = password;
    }

    /// disable_certificate_fingerprint_verification accepts any remote
    /// certificate once the handshake completes.
    pub fn disable_certificate_fingerprint_verification(&mut self, is_disabled: bool) {
        self.disable_certificate_fingerprint_verification = is_disabled;
    }

    /// set_candidate_source_factory plugs in the producer of local candidates.
    /// Without one, gathering completes immediately with no candidates.
    pub fn set_candidate_source_factory(&mut self, factory: Arc<dyn CandidateSourceFactory>) {
        self.collaborators.candidate_source_factory = Some(factory);
    }

    /// set_connectivity_checker plugs in the STUN binding exchange.
    /// Without one, ICE transports stay checking until the failed timeout.
    pub fn set_connectivity_checker(&mut self, checker: Arc<dyn ConnectivityChecker>) {
        self.collaborators.connectivity_checker = Some(checker);
    }

    /// set_dtls_handshaker plugs in the DTLS handshake.
    /// Without one, DTLS transports stay connecting.
    pub fn set_dtls_handshaker(&mut self, handshaker: Arc<dyn DtlsHandshaker>) {
        self.collaborators.dtls_handshaker = Some(handshaker);
    }

    /// set_mid_generator allows the user to override the mid of new
    /// transceivers. The argument is the largest numeric mid already in use.
    pub fn set_mid_generator(&mut self, f: impl Fn(isize) -> String + Send + Sync + 'static) {
        self.mid_generator = Some(Arc::new(f));
    }
}
