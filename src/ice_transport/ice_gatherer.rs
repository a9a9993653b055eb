use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::api::setting_engine::SettingEngine;
use crate::error::{flatten_errs, Error, Result};
use crate::event_handler::{EventHandlerFn, EventHandlers, HandlerId};
use crate::ice_transport::candidate_source::CandidateSource;
use crate::ice_transport::ice_candidate::*;
use crate::ice_transport::ice_candidate_type::RTCIceCandidateType;
use crate::ice_transport::ice_gatherer_state::RTCIceGathererState;
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::ice_transport::ice_server::IceServerUrl;
use crate::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;

/// What the gatherer asks candidate sources for. Swapped as a whole when the
/// configuration changes; the next restart picks it up.
#[derive(Default, Debug, Clone)]
pub(crate) struct GatherConfig {
    pub(crate) validated_servers: Vec<IceServerUrl>,
    pub(crate) gather_policy: RTCIceTransportPolicy,
}

pub type OnLocalCandidateHdlrFn = EventHandlerFn<Option<RTCIceCandidate>>;
pub type OnICEGathererStateChangeHdlrFn = EventHandlerFn<RTCIceGathererState>;

#[derive(Default)]
struct GathererInternal {
    params: RTCIceParameters,
    /// Bumped by restart; candidates of an older generation are dropped.
    generation: u64,
    candidates: Vec<RTCIceCandidate>,
    sources: Vec<Arc<dyn CandidateSource>>,
    added_sources: Vec<Arc<dyn CandidateSource>>,
    tasks: Vec<JoinHandle<()>>,
    pending: usize,
    sdp_mid: Option<String>,
    sdp_mline_index: Option<u16>,
}

/// ICEGatherer gathers local host, server reflexive and relay
/// candidates, as well as enabling the retrieval of local Interactive
/// Connectivity Establishment (ICE) parameters which can be
/// exchanged in signaling.
pub struct RTCIceGatherer {
    config: ArcSwap<GatherConfig>,
    pub(crate) setting_engine: Arc<SettingEngine>,
    pub(crate) components: Vec<u16>,

    state: Arc<AtomicU8>, //ICEGathererState
    internal: Mutex<GathererInternal>,

    on_local_candidate_handlers: EventHandlers<Option<RTCIceCandidate>>,
    on_state_change_handlers: EventHandlers<RTCIceGathererState>,
}

impl RTCIceGatherer {
    pub(crate) fn new(
        validated_servers: Vec<IceServerUrl>,
        gather_policy: RTCIceTransportPolicy,
        components: Vec<u16>,
        setting_engine: Arc<SettingEngine>,
    ) -> Self {
        let params = Self::credentials(&setting_engine);
        let ids = Arc::new(AtomicU64::new(1));
        RTCIceGatherer {
            config: ArcSwap::from_pointee(GatherConfig {
                validated_servers,
                gather_policy,
            }),
            setting_engine,
            components,
            state: Arc::new(AtomicU8::new(RTCIceGathererState::New as u8)),
            internal: Mutex::new(GathererInternal {
                params,
                ..Default::default()
            }),
            on_local_candidate_handlers: EventHandlers::sharing_ids(&ids),
            on_state_change_handlers: EventHandlers::sharing_ids(&ids),
        }
    }

    fn credentials(setting_engine: &SettingEngine) -> RTCIceParameters {
        let candidates = &setting_engine.candidates;
        let mut params = if candidates.username_fragment.is_empty()
            || candidates.password.is_empty()
        {
            RTCIceParameters::generate()
        } else {
            RTCIceParameters {
                username_fragment: candidates.username_fragment.clone(),
                password: candidates.password.clone(),
                ice_lite: false,
            }
        };
        params.ice_lite = candidates.ice_lite;
        params
    }

    /// gather ICE candidates. Calling it again once gathering started is a
    /// no-op.
    pub async fn gather(self: &Arc<Self>) -> Result<()> {
        let (sources, generation) = {
            let mut internal = self.internal.lock().await;
            match self.state() {
                RTCIceGathererState::Closed => return Err(Error::ErrICEGathererClosed),
                RTCIceGathererState::New => {}
                _ => return Ok(()),
            }

            let mut sources = self.collect_sources();
            sources.extend(internal.added_sources.iter().cloned());

            internal.sources.clone_from(&sources);
            internal.pending = sources.len();
            self.state
                .store(RTCIceGathererState::Gathering as u8, Ordering::SeqCst);
            (sources, internal.generation)
        };

        log::debug!("ICE gathering started with {} sources", sources.len());
        self.on_state_change_handlers
            .emit(RTCIceGathererState::Gathering)
            .await;

        if sources.is_empty() {
            self.finish(generation).await;
            return Ok(());
        }

        let mut tasks = vec![];
        for source in sources {
            tasks.push(self.spawn_source(source, generation));
        }
        let mut internal = self.internal.lock().await;
        internal.tasks.extend(tasks);

        Ok(())
    }

    fn collect_sources(&self) -> Vec<Arc<dyn CandidateSource>> {
        let Some(factory) = &self.setting_engine.collaborators.candidate_source_factory else {
            return vec![];
        };

        let config = self.config.load();
        let mut sources = vec![];
        if config.gather_policy != RTCIceTransportPolicy::Relay {
            sources.extend(factory.host_sources());
        }
        if self.setting_engine.candidates.ice_lite {
            return sources;
        }
        for url in &config.validated_servers {
            if config.gather_policy == RTCIceTransportPolicy::Relay && !url.is_relay() {
                continue;
            }
            if let Some(source) = factory.server_source(url) {
                sources.push(source);
            }
        }
        sources
    }

    fn spawn_source(
        self: &Arc<Self>,
        source: Arc<dyn CandidateSource>,
        generation: u64,
    ) -> JoinHandle<()> {
        let gatherer = Arc::clone(self);
        tokio::spawn(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let components = gatherer.components.clone();
            let producer = Arc::clone(&source);

            let produce = async move {
                for component in components {
                    if let Err(err) = producer.gather(component, tx.clone()).await {
                        log::warn!(
                            "candidate source {} failed for component {}: {}",
                            producer.name(),
                            component,
                            err
                        );
                    }
                }
            };
            let forward = async {
                while let Some(c) = rx.recv().await {
                    gatherer.add_candidate(c, generation).await;
                }
            };
            tokio::join!(produce, forward);

            log::trace!("candidate source {} done", source.name());
            gatherer.source_done(generation).await;
        })
    }

    async fn add_candidate(&self, mut c: RTCIceCandidate, generation: u64) {
        if !self.gather_policy().permits(c.typ) {
            log::trace!("dropping {} candidate under relay policy", c.typ);
            return;
        }
        if self.setting_engine.candidates.ice_lite && c.typ != RTCIceCandidateType::Host {
            return;
        }

        let c = {
            let mut internal = self.internal.lock().await;
            if internal.generation != generation || self.state() == RTCIceGathererState::Closed {
                return;
            }
            c.finalize();
            c.sdp_mid.clone_from(&internal.sdp_mid);
            c.sdp_mline_index = internal.sdp_mline_index;
            c.username_fragment = Some(internal.params.username_fragment.clone());

            if internal
                .candidates
                .iter()
                .any(|existing| existing.same_transport_address(&c))
            {
                return;
            }
            internal.candidates.push(c.clone());
            c
        };

        log::debug!("gathered local candidate {c}");
        self.on_local_candidate_handlers.emit(Some(c)).await;
    }

    async fn source_done(&self, generation: u64) {
        {
            let mut internal = self.internal.lock().await;
            if internal.generation != generation {
                return;
            }
            internal.pending = internal.pending.saturating_sub(1);
            if internal.pending > 0 {
                return;
            }
        }
        self.finish(generation).await;
    }

    async fn finish(&self, generation: u64) {
        {
            let internal = self.internal.lock().await;
            if internal.generation != generation
                || internal.pending > 0
                || self.state() != RTCIceGathererState::Gathering
            {
                return;
            }
            self.state
                .store(RTCIceGathererState::Complete as u8, Ordering::SeqCst);
        }

        log::debug!("ICE gathering complete");
        self.on_state_change_handlers
            .emit(RTCIceGathererState::Complete)
            .await;
        self.on_local_candidate_handlers.emit(None).await;
    }

    /// add_source adds a candidate source after construction, such as a newly
    /// appeared interface or TURN server. A complete gatherer goes back to
    /// gathering until the new source is done.
    pub async fn add_source(self: &Arc<Self>, source: Arc<dyn CandidateSource>) -> Result<()> {
        let (generation, regressed) = {
            let mut internal = self.internal.lock().await;
            internal.added_sources.push(Arc::clone(&source));

            match self.state() {
                RTCIceGathererState::Closed => return Err(Error::ErrICEGathererClosed),
                RTCIceGathererState::New => return Ok(()),
                RTCIceGathererState::Complete => {
                    self.state
                        .store(RTCIceGathererState::Gathering as u8, Ordering::SeqCst);
                }
                _ => {}
            }
            let regressed = internal.pending == 0;
            internal.pending += 1;
            internal.sources.push(Arc::clone(&source));
            (internal.generation, regressed)
        };

        if regressed {
            log::debug!("ICE gathering resumed for source {}", source.name());
            self.on_state_change_handlers
                .emit(RTCIceGathererState::Gathering)
                .await;
        }

        let task = self.spawn_source(source, generation);
        let mut internal = self.internal.lock().await;
        internal.tasks.push(task);

        Ok(())
    }

    /// restart discards the candidates of the previous generation and picks
    /// new credentials; gather() must be called again.
    pub(crate) async fn restart(&self) -> Result<()> {
        let errs = {
            let mut internal = self.internal.lock().await;
            if self.state() == RTCIceGathererState::Closed {
                return Err(Error::ErrICEGathererClosed);
            }

            for task in internal.tasks.drain(..) {
                task.abort();
            }
            let sources: Vec<_> = internal.sources.drain(..).collect();
            let mut errs = vec![];
            for source in sources {
                if let Err(err) = source.release().await {
                    errs.push(err);
                }
            }

            internal.generation += 1;
            internal.params = Self::credentials(&self.setting_engine);
            internal.candidates.clear();
            internal.pending = 0;
            self.state
                .store(RTCIceGathererState::New as u8, Ordering::SeqCst);
            errs
        };

        for err in &errs {
            log::warn!("releasing candidate source on ICE restart: {err}");
        }
        self.on_state_change_handlers
            .emit(RTCIceGathererState::New)
            .await;

        Ok(())
    }

    /// Close prunes all local candidates, and releases the candidate sources.
    pub async fn close(&self) -> Result<()> {
        let errs = {
            let mut internal = self.internal.lock().await;
            if self.state() == RTCIceGathererState::Closed {
                return Ok(());
            }
            self.state
                .store(RTCIceGathererState::Closed as u8, Ordering::SeqCst);

            for task in internal.tasks.drain(..) {
                task.abort();
            }
            let mut sources: Vec<_> = internal.sources.drain(..).collect();
            for source in internal.added_sources.drain(..) {
                if !sources.iter().any(|s| Arc::ptr_eq(s, &source)) {
                    sources.push(source);
                }
            }
            internal.candidates.clear();

            let mut errs = vec![];
            for source in sources {
                if let Err(err) = source.release().await {
                    errs.push(err);
                }
            }
            errs
        };

        self.on_state_change_handlers
            .emit(RTCIceGathererState::Closed)
            .await;

        flatten_errs(errs)
    }

    /// get_local_parameters returns the ICE parameters of the ICEGatherer.
    pub async fn get_local_parameters(&self) -> RTCIceParameters {
        let internal = self.internal.lock().await;
        internal.params.clone()
    }

    /// get_local_candidates returns the sequence of valid local candidates associated with the ICEGatherer.
    pub async fn get_local_candidates(&self) -> Vec<RTCIceCandidate> {
        let internal = self.internal.lock().await;
        internal.candidates.clone()
    }

    /// set_media_section names the m-line candidates are signaled under.
    pub(crate) async fn set_media_section(
        &self,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
    ) {
        let mut internal = self.internal.lock().await;
        for c in internal.candidates.iter_mut() {
            c.sdp_mid.clone_from(&sdp_mid);
            c.sdp_mline_index = sdp_mline_index;
        }
        internal.sdp_mid = sdp_mid;
        internal.sdp_mline_index = sdp_mline_index;
    }

    /// on_local_candidate sets an event handler which fires when a new local ICE candidate is available
    /// Take note that the handler is gonna be called with a nil pointer when gathering is finished.
    pub fn on_local_candidate(&self, f: OnLocalCandidateHdlrFn) -> HandlerId {
        self.on_local_candidate_handlers.register(f)
    }

    /// on_state_change sets an event handler which fires any time the ICEGatherer changes
    pub fn on_state_change(&self, f: OnICEGathererStateChangeHdlrFn) -> HandlerId {
        self.on_state_change_handlers.register(f)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.on_local_candidate_handlers.unregister(id)
            || self.on_state_change_handlers.unregister(id)
    }

    pub(crate) fn gather_policy(&self) -> RTCIceTransportPolicy {
        self.config.load().gather_policy
    }

    /// set_config replaces the servers and policy used from the next
    /// gathering round on.
    pub(crate) fn set_config(
        &self,
        validated_servers: Vec<IceServerUrl>,
        gather_policy: RTCIceTransportPolicy,
    ) {
        self.config.store(Arc::new(GatherConfig {
            validated_servers,
            gather_policy,
        }));
    }

    /// State indicates the current state of the ICE gatherer.
    pub fn state(&self) -> RTCIceGathererState {
        self.state.load(Ordering::SeqCst).into()
    }
}
