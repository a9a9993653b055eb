use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use dtls_role::*;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::api::setting_engine::SettingEngine;
use crate::dtls_transport::dtls_fingerprint::validate_fingerprint;
use crate::dtls_transport::dtls_handshaker::DtlsHandshaker;
use crate::dtls_transport::dtls_parameters::DTLSParameters;
use crate::dtls_transport::dtls_transport_state::RTCDtlsTransportState;
use crate::error::{Error, Result};
use crate::event_handler::{EventHandlerFn, EventHandlers, HandlerId};
use crate::ice_transport::ice_role::RTCIceRole;
use crate::ice_transport::ice_transport_state::RTCIceTransportState;
use crate::ice_transport::RTCIceTransport;
use crate::peer_connection::certificate::RTCCertificate;


pub mod dtls_fingerprint;
pub mod dtls_handshaker;
pub mod dtls_parameters;
pub mod dtls_role;
pub mod dtls_transport_state;

pub type OnDTLSTransportStateChangeHdlrFn = EventHandlerFn<RTCDtlsTransportState>;

#[derive(Default)]
struct DTLSTransportInternal {
    remote_parameters: DTLSParameters,
    remote_certificate: Vec<u8>,
    handshake: Option<JoinHandle<()>>,
}

/// RTCDtlsTransport runs the DTLS handshake over one ICE transport and
/// checks the peer's certificate against the fingerprints from its
/// description. The handshake itself is delegated to a
/// [`DtlsHandshaker`](dtls_handshaker::DtlsHandshaker).
pub struct RTCDtlsTransport {
    pub(crate) ice_transport: Arc<RTCIceTransport>,
    pub(crate) certificates: Vec<RTCCertificate>,
    pub(crate) setting_engine: Arc<SettingEngine>,

    state_tx: watch::Sender<RTCDtlsTransportState>,
    internal: Mutex<DTLSTransportInternal>,
    on_state_change_handlers: EventHandlers<RTCDtlsTransportState>,
}

impl RTCDtlsTransport {
    pub(crate) fn new(
        ice_transport: Arc<RTCIceTransport>,
        certificates: Vec<RTCCertificate>,
        setting_engine: Arc<SettingEngine>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(RTCDtlsTransportState::New);
        Arc::new(RTCDtlsTransport {
            ice_transport,
            certificates,
            setting_engine,
            state_tx,
            internal: Mutex::new(DTLSTransportInternal::default()),
            on_state_change_handlers: EventHandlers::sharing_ids(&Arc::new(AtomicU64::new(1))),
        })
    }

    pub fn ice_transport(&self) -> &Arc<RTCIceTransport> {
        &self.ice_transport
    }

    pub fn on_state_change(&self, f: OnDTLSTransportStateChangeHdlrFn) -> HandlerId {
        self.on_state_change_handlers.register(f)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.on_state_change_handlers.unregister(id)
    }

    pub fn state(&self) -> RTCDtlsTransportState {
        *self.state_tx.borrow()
    }

    /// subscribe returns a receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<RTCDtlsTransportState> {
        self.state_tx.subscribe()
    }

    /// get_local_parameters lists the fingerprints of every local
    /// certificate. The role is left `Auto`; it is settled by negotiation.
    pub fn get_local_parameters(&self) -> Result<DTLSParameters> {
        Ok(DTLSParameters {
            role: DTLSRole::Auto,
            fingerprints: self
                .certificates
                .iter()
                .flat_map(RTCCertificate::get_fingerprints)
                .collect(),
        })
    }

    /// get_remote_certificate is the peer's DER certificate, empty until a
    /// handshake completes.
    pub async fn get_remote_certificate(&self) -> Vec<u8> {
        let internal = self.internal.lock().await;
        internal.remote_certificate.clone()
    }

    /// role picks our side of the handshake: the inverse of an explicit remote
    /// `a=setup`, else the configured answering role, else server when we
    /// control ICE.
    pub(crate) async fn role(&self) -> DTLSRole {
        let remote = self.internal.lock().await.remote_parameters.role;
        if matches!(remote, DTLSRole::Client | DTLSRole::Server) {
            return remote.inverse();
        }

        match self.setting_engine.answering_dtls_role {
            role @ (DTLSRole::Client | DTLSRole::Server) => role,
            _ if self.ice_transport.role().await == RTCIceRole::Controlling => DTLSRole::Server,
            _ => DEFAULT_DTLS_ROLE_ANSWER,
        }
    }

    /// start DTLS transport negotiation with the parameters of the remote DTLS transport.
    ///
    /// The transport moves to connecting right away. The handshake runs in
    /// the background once the ICE transport is connected; without a
    /// [`DtlsHandshaker`] configured the transport stays connecting.
    pub async fn start(self: &Arc<Self>, remote_parameters: DTLSParameters) -> Result<()> {
        match self.state() {
            RTCDtlsTransportState::New => {}
            _ => return Err(Error::ErrInvalidDTLSStart),
        }
        let Some(certificate) = self.certificates.first().cloned() else {
            return Err(Error::ErrNonCertificate);
        };

        {
            let mut internal = self.internal.lock().await;
            internal.remote_parameters = remote_parameters;
        }
        self.state_change(RTCDtlsTransportState::Connecting).await;

        let Some(handshaker) = self
            .setting_engine
            .collaborators
            .dtls_handshaker
            .clone()
        else {
            log::debug!("no DTLS handshaker configured, transport stays connecting");
            return Ok(());
        };

        // stop closes before it takes the handle, so either it sees this
        // task or the task is never spawned
        let mut internal = self.internal.lock().await;
        if self.state() == RTCDtlsTransportState::Closed {
            return Ok(());
        }
        let t = Arc::clone(self);
        internal.handshake = Some(tokio::spawn(async move {
            if let Err(err) = t.run_handshake(handshaker, certificate).await {
                log::warn!("DTLS transport failed: {err}");
                t.state_change(RTCDtlsTransportState::Failed).await;
            }
        }));
        Ok(())
    }

    async fn run_handshake(
        &self,
        handshaker: Arc<dyn DtlsHandshaker>,
        certificate: RTCCertificate,
    ) -> Result<()> {
        self.wait_for_ice().await?;

        let role = self.role().await;
        let remote_parameters = {
            let internal = self.internal.lock().await;
            internal.remote_parameters.clone()
        };
        log::debug!("starting DTLS handshake as {role}");

        let remote_cert = handshaker
            .handshake(role, &certificate, &remote_parameters)
            .await
            .map_err(|err| Error::ErrDTLSHandshake(err.to_string()))?;

        if !self
            .setting_engine
            .disable_certificate_fingerprint_verification
        {
            validate_fingerprint(&remote_parameters.fingerprints, &remote_cert)?;
        }

        {
            let mut internal = self.internal.lock().await;
            internal.remote_certificate = remote_cert;
        }

        // ICE may have failed while the handshake ran
        if !self.ice_transport.state().is_connected() {
            return Err(Error::ErrDTLSICENotConnected);
        }
        self.state_change(RTCDtlsTransportState::Connected).await;
        Ok(())
    }

    /// wait_for_ice blocks until the ICE transport is connected or completed.
    async fn wait_for_ice(&self) -> Result<()> {
        let mut rx = self.ice_transport.subscribe();
        let state = *rx
            .wait_for(|s| {
                s.is_connected()
                    || *s == RTCIceTransportState::Failed
                    || *s == RTCIceTransportState::Closed
            })
            .await
            .map_err(|_| Error::ErrICETransportClosed)?;

        match state {
            RTCIceTransportState::Failed => Err(Error::ErrICETransportFailed),
            RTCIceTransportState::Closed => Err(Error::ErrICETransportClosed),
            _ => Ok(()),
        }
    }

    /// stop aborts a running handshake and moves to `closed`.
    pub async fn stop(&self) -> Result<()> {
        self.state_change(RTCDtlsTransportState::Closed).await;

        let mut internal = self.internal.lock().await;
        if let Some(task) = internal.handshake.take() {
            task.abort();
        }
        Ok(())
    }

    /// state_change moves to `state` unless the transport already ended:
    /// closed is final and failed only gives way to closed.
    async fn state_change(&self, state: RTCDtlsTransportState) {
        let changed = self.state_tx.send_if_modified(|current| {
            let allowed = match *current {
                RTCDtlsTransportState::Closed => false,
                RTCDtlsTransportState::Failed => state == RTCDtlsTransportState::Closed,
                cur => cur != state,
            };
            if allowed {
                *current = state;
            }
            allowed
        });

        if changed {
            log::info!("DTLS transport state changed: {state}");
            self.on_state_change_handlers.emit(state).await;
        }
    }
}
