use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};

use ice_candidate::RTCIceCandidate;
use ice_candidate_pair::{RTCIceCandidatePair, RTCIceCandidatePairState};
use ice_gatherer::RTCIceGatherer;
use ice_role::RTCIceRole;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{flatten_errs, Error, Result};
use crate::event_handler::{EventHandlerFn, EventHandlers, HandlerId};
use crate::ice_transport::connectivity_checker::ConnectivityChecker;
use crate::ice_transport::ice_gatherer_state::RTCIceGathererState;
use crate::ice_transport::ice_parameters::RTCIceParameters;
use crate::ice_transport::ice_transport_state::RTCIceTransportState;


pub mod candidate_source;
pub mod connectivity_checker;
pub mod ice_candidate;
pub mod ice_candidate_pair;
pub mod ice_candidate_type;
pub mod ice_connection_state;
pub mod ice_credential_type;
pub mod ice_gatherer;
pub mod ice_gatherer_state;
pub mod ice_gathering_state;
pub mod ice_parameters;
pub mod ice_protocol;
pub mod ice_role;
pub mod ice_server;
pub mod ice_transport_state;

pub type OnConnectionStateChangeHdlrFn = EventHandlerFn<RTCIceTransportState>;
pub type OnSelectedCandidatePairChangeHdlrFn = EventHandlerFn<RTCIceCandidatePair>;

#[derive(Default)]
struct ICETransportInternal {
    role: RTCIceRole,
    remote_params: Option<RTCIceParameters>,
    remote_candidates: Vec<RTCIceCandidate>,
    remote_end_of_candidates: bool,
    pairs: Vec<RTCIceCandidatePair>,
    next_discovery_order: u64,
    selected: HashMap<u16, RTCIceCandidatePair>,
    /// Bumped whenever checking restarts; stale checks and timers are ignored.
    epoch: u64,
    was_completed: bool,
    last_consent: Option<Instant>,
    tasks: Vec<JoinHandle<()>>,
    consent_timer: Option<JoinHandle<()>>,
}

impl ICETransportInternal {
    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(timer) = self.consent_timer.take() {
            timer.abort();
        }
    }

    fn add_pair(&mut self, local: &RTCIceCandidate, remote: &RTCIceCandidate) -> bool {
        if !RTCIceCandidatePair::can_pair(local, remote) {
            return false;
        }
        let pair = RTCIceCandidatePair::new(local.clone(), remote.clone(), self.next_discovery_order);
        if self.pairs.iter().any(|p| p.id() == pair.id()) {
            return false;
        }
        log::trace!("new candidate pair {pair}");
        self.next_discovery_order += 1;
        self.pairs.push(pair);
        true
    }

    fn has_pending_checks(&self) -> bool {
        self.pairs.iter().any(|p| {
            p.state == RTCIceCandidatePairState::Waiting
                || p.state == RTCIceCandidatePairState::InProgress
        })
    }

    /// update_selection picks the best succeeded pair of every component
    /// and returns the pairs whose selection changed.
    fn update_selection(&mut self, components: &[u16]) -> Vec<RTCIceCandidatePair> {
        let mut changed = vec![];
        for component in components {
            let best = self
                .pairs
                .iter()
                .filter(|p| {
                    p.component() == *component && p.state == RTCIceCandidatePairState::Succeeded
                })
                .min_by(|a, b| a.cmp_preference(b, self.role))
                .cloned();

            match best {
                Some(best) => {
                    let same = self
                        .selected
                        .get(component)
                        .map(|p| p.id() == best.id())
                        .unwrap_or(false);
                    if !same {
                        self.selected.insert(*component, best.clone());
                        changed.push(best);
                    }
                }
                None => {
                    self.selected.remove(component);
                }
            }
        }
        changed
    }

    fn all_selected(&self, components: &[u16]) -> bool {
        components.iter().all(|c| self.selected.contains_key(c))
    }
}

/// RTCIceTransport is the ICE agent of one transport: it pairs local and
/// remote candidates, runs checks through the
/// [`ConnectivityChecker`](connectivity_checker::ConnectivityChecker) and
/// tracks consent on the selected pair.
pub struct RTCIceTransport {
    pub(crate) gatherer: Arc<RTCIceGatherer>,
    checker: Option<Arc<dyn ConnectivityChecker>>,
    state_tx: watch::Sender<RTCIceTransportState>,
    internal: Mutex<ICETransportInternal>,
    check_notify: Notify,

    on_connection_state_change_handlers: EventHandlers<RTCIceTransportState>,
    on_selected_candidate_pair_change_handlers: EventHandlers<RTCIceCandidatePair>,
}

impl RTCIceTransport {
    /// creates a new ICE transport fed by `gatherer`.
    pub(crate) fn new(gatherer: Arc<RTCIceGatherer>) -> Arc<Self> {
        let checker = gatherer
            .setting_engine
            .collaborators
            .connectivity_checker
            .clone();
        let (state_tx, _) = watch::channel(RTCIceTransportState::New);
        let ids = Arc::new(AtomicU64::new(1));

        let t = Arc::new(RTCIceTransport {
            gatherer,
            checker,
            state_tx,
            internal: Mutex::new(ICETransportInternal::default()),
            check_notify: Notify::new(),
            on_connection_state_change_handlers: EventHandlers::sharing_ids(&ids),
            on_selected_candidate_pair_change_handlers: EventHandlers::sharing_ids(&ids),
        });

        let weak: Weak<RTCIceTransport> = Arc::downgrade(&t);
        t.gatherer.on_local_candidate(Box::new(move |c| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(t) = weak.upgrade() {
                    t.add_local_candidate(c).await;
                }
            })
        }));

        t
    }

    /// start begins checking against the remote credentials `params` in
    /// `role`. Remote candidates may arrive before or after.
    pub async fn start(self: &Arc<Self>, params: RTCIceParameters, role: RTCIceRole) -> Result<()> {
        match self.state() {
            RTCIceTransportState::New => {}
            RTCIceTransportState::Closed => return Err(Error::ErrICETransportClosed),
            _ => return Err(Error::ErrICETransportNotInNew),
        }

        let role = if self.gatherer.setting_engine.candidates.ice_lite {
            RTCIceRole::Controlled
        } else {
            role
        };

        let locals = self.gatherer.get_local_candidates().await;
        let changed = {
            let mut internal = self.internal.lock().await;
            internal.role = role;
            internal.remote_params = Some(params);
            let changed = self.transition(RTCIceTransportState::Checking, false);
            self.begin_checks(&mut internal, &locals);
            changed
        };

        log::debug!("ICE transport started as {role}");
        if changed {
            self.emit_state(RTCIceTransportState::Checking).await;
        }
        Ok(())
    }

    /// begin_checks re-pairs and spawns the check loop and the failed
    /// deadline for a fresh epoch.
    fn begin_checks(self: &Arc<Self>, internal: &mut ICETransportInternal, locals: &[RTCIceCandidate]) {
        internal.abort_tasks();
        internal.epoch += 1;
        internal.was_completed = false;
        internal.last_consent = None;

        let remotes = internal.remote_candidates.clone();
        for local in locals {
            for remote in &remotes {
                internal.add_pair(local, remote);
            }
        }

        let epoch = internal.epoch;
        if let Some(checker) = &self.checker {
            let t = Arc::clone(self);
            let checker = Arc::clone(checker);
            internal.tasks.push(tokio::spawn(async move {
                t.check_loop(checker, epoch).await;
            }));
        }

        let t = Arc::downgrade(self);
        let failed_timeout = self.gatherer.setting_engine.ice_failed_timeout();
        internal.tasks.push(tokio::spawn(async move {
            tokio::time::sleep(failed_timeout).await;
            if let Some(t) = t.upgrade() {
                t.check_deadline(epoch).await;
            }
        }));

        self.check_notify.notify_one();
    }

    async fn check_loop(self: Arc<Self>, checker: Arc<dyn ConnectivityChecker>, epoch: u64) {
        let keepalive = self.gatherer.setting_engine.ice_keepalive_interval();

        loop {
            let state = self.state();
            if state == RTCIceTransportState::Closed || state == RTCIceTransportState::Failed {
                return;
            }

            let local = self.gatherer.get_local_parameters().await;
            let next = {
                let mut internal = self.internal.lock().await;
                if internal.epoch != epoch {
                    return;
                }
                let remote = internal.remote_params.clone().unwrap_or_default();
                let role = internal.role;
                let best = internal
                    .pairs
                    .iter_mut()
                    .filter(|p| p.state == RTCIceCandidatePairState::Waiting)
                    .min_by(|a, b| a.cmp_preference(b, role));
                best.map(|p| {
                    p.state = RTCIceCandidatePairState::InProgress;
                    (p.clone(), remote)
                })
            };

            match next {
                Some((pair, remote)) => {
                    let ok = checker.check(&pair, &local, &remote).await;
                    log::trace!("check of {pair}: {}", if ok { "succeeded" } else { "failed" });
                    self.pair_checked(pair.id(), ok, epoch).await;
                }
                None if keepalive.is_zero() => self.check_notify.notified().await,
                None => {
                    tokio::select! {
                        _ = self.check_notify.notified() => {}
                        _ = tokio::time::sleep(keepalive) => {
                            self.refresh_consent(&checker, &local, epoch).await;
                        }
                    }
                }
            }
        }
    }

    async fn pair_checked(&self, pair_id: &str, ok: bool, epoch: u64) {
        let (next_state, changed) = {
            let mut internal = self.internal.lock().await;
            if internal.epoch != epoch {
                return;
            }
            let Some(pair) = internal.pairs.iter_mut().find(|p| p.id() == pair_id) else {
                return;
            };
            pair.state = if ok {
                RTCIceCandidatePairState::Succeeded
            } else {
                RTCIceCandidatePairState::Failed
            };

            let changed = internal.update_selection(&self.gatherer.components);
            (self.evaluate(&mut internal), changed)
        };

        for pair in changed {
            log::debug!("selected candidate pair {pair}");
            self.on_selected_candidate_pair_change_handlers
                .emit(pair)
                .await;
        }
        if let Some(state) = next_state {
            self.set_state(state, false).await;
        }
    }

    /// evaluate decides connected or completed once every component has a
    /// selected pair.
    fn evaluate(&self, internal: &mut ICETransportInternal) -> Option<RTCIceTransportState> {
        let current = self.state();
        match current {
            RTCIceTransportState::Checking
            | RTCIceTransportState::Connected
            | RTCIceTransportState::Disconnected => {}
            _ => return None,
        }
        if !internal.all_selected(&self.gatherer.components) {
            return None;
        }

        if internal.last_consent.is_none() || current == RTCIceTransportState::Disconnected {
            internal.last_consent = Some(Instant::now());
        }
        if let Some(timer) = internal.consent_timer.take() {
            timer.abort();
        }

        let done = internal.remote_end_of_candidates
            && self.gatherer.state() == RTCIceGathererState::Complete
            && !internal.has_pending_checks();
        if done {
            internal.was_completed = true;
            Some(RTCIceTransportState::Completed)
        } else {
            Some(RTCIceTransportState::Connected)
        }
    }

    async fn check_deadline(&self, epoch: u64) {
        {
            let internal = self.internal.lock().await;
            if internal.epoch != epoch || internal.all_selected(&self.gatherer.components) {
                return;
            }
        }
        let state = self.state();
        if state == RTCIceTransportState::Checking || state == RTCIceTransportState::New {
            log::warn!("no candidate pair validated before the ICE failed timeout");
            self.set_state(RTCIceTransportState::Failed, false).await;
        }
    }

    async fn refresh_consent(
        self: &Arc<Self>,
        checker: &Arc<dyn ConnectivityChecker>,
        local: &RTCIceParameters,
        epoch: u64,
    ) {
        if !matches!(
            self.state(),
            RTCIceTransportState::Connected
                | RTCIceTransportState::Completed
                | RTCIceTransportState::Disconnected
        ) {
            return;
        }

        let (selected, remote, last_consent) = {
            let internal = self.internal.lock().await;
            if internal.epoch != epoch {
                return;
            }
            (
                internal.selected.values().cloned().collect::<Vec<_>>(),
                internal.remote_params.clone().unwrap_or_default(),
                internal.last_consent,
            )
        };

        let mut fresh = !selected.is_empty();
        for pair in &selected {
            if !checker.check(pair, local, &remote).await {
                fresh = false;
                break;
            }
        }

        if fresh {
            self.report_consent(true).await;
        } else {
            let disconnected_timeout = self.gatherer.setting_engine.ice_disconnected_timeout();
            let expired = last_consent
                .map(|at| at.elapsed() >= disconnected_timeout)
                .unwrap_or(true);
            if expired {
                self.report_consent(false).await;
            }
        }
    }

    /// report_consent feeds the outcome of a consent freshness check of the
    /// selected pairs. Lost consent moves a connected transport to
    /// disconnected; unless consent returns before the failed timeout, the
    /// transport fails.
    pub async fn report_consent(self: &Arc<Self>, fresh: bool) {
        let next_state = {
            let mut internal = self.internal.lock().await;
            let current = self.state();
            if fresh {
                internal.last_consent = Some(Instant::now());
                if current != RTCIceTransportState::Disconnected {
                    return;
                }
                if let Some(timer) = internal.consent_timer.take() {
                    timer.abort();
                }
                if internal.was_completed {
                    RTCIceTransportState::Completed
                } else {
                    RTCIceTransportState::Connected
                }
            } else {
                if !current.is_connected() {
                    return;
                }
                let epoch = internal.epoch;
                let t = Arc::downgrade(self);
                let failed_timeout = self.gatherer.setting_engine.ice_failed_timeout();
                internal.consent_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(failed_timeout).await;
                    if let Some(t) = t.upgrade() {
                        t.consent_deadline(epoch).await;
                    }
                }));
                RTCIceTransportState::Disconnected
            }
        };

        self.set_state(next_state, false).await;
    }

    async fn consent_deadline(&self, epoch: u64) {
        {
            let internal = self.internal.lock().await;
            if internal.epoch != epoch {
                return;
            }
        }
        if self.state() == RTCIceTransportState::Disconnected {
            log::warn!("consent was not recovered before the ICE failed timeout");
            self.set_state(RTCIceTransportState::Failed, false).await;
        }
    }

    async fn add_local_candidate(&self, candidate: Option<RTCIceCandidate>) {
        let next_state = {
            let mut internal = self.internal.lock().await;
            match &candidate {
                Some(local) => {
                    let remotes = internal.remote_candidates.clone();
                    for remote in &remotes {
                        internal.add_pair(local, remote);
                    }
                    None
                }
                // local end of candidates may complete the transport
                None => self.evaluate(&mut internal),
            }
        };

        if let Some(state) = next_state {
            self.set_state(state, false).await;
        }
        self.check_notify.notify_one();
    }

    /// adds a candidate associated with the remote ICETransport. None marks
    /// the end of remote candidates.
    pub async fn add_remote_candidate(&self, remote_candidate: Option<RTCIceCandidate>) -> Result<()> {
        if self.state() == RTCIceTransportState::Closed {
            return Err(Error::ErrICETransportClosed);
        }

        let locals = self.gatherer.get_local_candidates().await;
        let next_state = {
            let mut internal = self.internal.lock().await;
            match remote_candidate {
                Some(mut remote) => {
                    remote.finalize();
                    if internal
                        .remote_candidates
                        .iter()
                        .any(|c| c.same_transport_address(&remote))
                    {
                        return Ok(());
                    }
                    log::debug!("adding remote candidate {remote}");
                    internal.remote_candidates.push(remote.clone());
                    for local in &locals {
                        internal.add_pair(local, &remote);
                    }
                    None
                }
                None => {
                    internal.remote_end_of_candidates = true;
                    self.evaluate(&mut internal)
                }
            }
        };

        if let Some(state) = next_state {
            self.set_state(state, false).await;
        }
        self.check_notify.notify_one();
        Ok(())
    }

    pub async fn set_remote_candidates(&self, remote_candidates: &[RTCIceCandidate]) -> Result<()> {
        for rc in remote_candidates {
            self.add_remote_candidate(Some(rc.clone())).await?;
        }
        Ok(())
    }

    /// restart drops the local side of the current checks; the gatherer picks
    /// new credentials and must gather again. Checking resumes once the remote
    /// side answers with its credentials.
    pub(crate) async fn restart(&self) -> Result<()> {
        if self.state() == RTCIceTransportState::Closed {
            return Err(Error::ErrICETransportClosed);
        }
        self.gatherer.restart().await?;

        let mut internal = self.internal.lock().await;
        internal
            .pairs
            .retain(|p| p.state == RTCIceCandidatePairState::Succeeded);
        Ok(())
    }

    pub(crate) async fn have_remote_credentials_change(&self, new_ufrag: &str, new_pwd: &str) -> bool {
        let internal = self.internal.lock().await;
        match &internal.remote_params {
            Some(params) => params.username_fragment != new_ufrag || params.password != new_pwd,
            None => false,
        }
    }

    /// set_remote_credentials restarts checking with new remote credentials:
    /// the remote candidates and pairs of the previous session are dropped and
    /// the transport goes back to checking, leaving a failed state behind.
    pub(crate) async fn set_remote_credentials(self: &Arc<Self>, params: RTCIceParameters) -> Result<()> {
        if self.state() == RTCIceTransportState::Closed {
            return Err(Error::ErrICETransportClosed);
        }

        let locals = self.gatherer.get_local_candidates().await;
        let changed = {
            let mut internal = self.internal.lock().await;
            internal.remote_params = Some(params);
            internal.remote_candidates.clear();
            internal.remote_end_of_candidates = false;
            internal.pairs.clear();
            internal.selected.clear();
            let changed = self.transition(RTCIceTransportState::Checking, true);
            self.begin_checks(&mut internal, &locals);
            changed
        };

        log::info!("ICE restart: checking with new remote credentials");
        if changed {
            self.emit_state(RTCIceTransportState::Checking).await;
        }
        Ok(())
    }

    /// stop closes the transport and its gatherer for good.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut internal = self.internal.lock().await;
            internal.abort_tasks();
            internal.epoch += 1;
        }
        self.set_state(RTCIceTransportState::Closed, false).await;
        self.check_notify.notify_one();

        let mut errs: Vec<Error> = vec![];
        if let Err(err) = self.gatherer.close().await {
            errs.push(err);
        }

        flatten_errs(errs)
    }

    pub fn on_connection_state_change(&self, f: OnConnectionStateChangeHdlrFn) -> HandlerId {
        self.on_connection_state_change_handlers.register(f)
    }

    /// on_selected_candidate_pair_change fires whenever the selected pair of
    /// a component changes.
    pub fn on_selected_candidate_pair_change(
        &self,
        f: OnSelectedCandidatePairChangeHdlrFn,
    ) -> HandlerId {
        self.on_selected_candidate_pair_change_handlers.register(f)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.on_connection_state_change_handlers.unregister(id)
            || self
                .on_selected_candidate_pair_change_handlers
                .unregister(id)
    }

    /// get_selected_candidate_pair returns the selected pair of the RTP
    /// component, if any.
    pub async fn get_selected_candidate_pair(&self) -> Option<RTCIceCandidatePair> {
        let internal = self.internal.lock().await;
        internal
            .selected
            .get(&ice_candidate::COMPONENT_RTP)
            .cloned()
    }

    pub async fn get_candidate_pairs(&self) -> Vec<RTCIceCandidatePair> {
        let internal = self.internal.lock().await;
        internal.pairs.clone()
    }

    pub async fn get_remote_candidates(&self) -> Vec<RTCIceCandidate> {
        let internal = self.internal.lock().await;
        internal.remote_candidates.clone()
    }

    pub async fn get_remote_parameters(&self) -> Option<RTCIceParameters> {
        let internal = self.internal.lock().await;
        internal.remote_params.clone()
    }

    pub async fn role(&self) -> RTCIceRole {
        let internal = self.internal.lock().await;
        internal.role
    }

    pub fn state(&self) -> RTCIceTransportState {
        *self.state_tx.borrow()
    }

    /// subscribe returns a receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<RTCIceTransportState> {
        self.state_tx.subscribe()
    }

    /// transition moves to `s` and reports whether the state changed. Closed
    /// is final and failed is left only by an ICE restart.
    fn transition(&self, s: RTCIceTransportState, restarting: bool) -> bool {
        self.state_tx.send_if_modified(|current| {
            let allowed = match *current {
                RTCIceTransportState::Closed => false,
                RTCIceTransportState::Failed => restarting || s == RTCIceTransportState::Closed,
                cur => cur != s,
            };
            if allowed {
                *current = s;
            }
            allowed
        })
    }

    async fn emit_state(&self, s: RTCIceTransportState) {
        log::info!("ICE transport state changed: {s}");
        self.on_connection_state_change_handlers.emit(s).await;
    }

    async fn set_state(&self, s: RTCIceTransportState, restarting: bool) {
        if self.transition(s, restarting) {
            self.emit_state(s).await;
        }
    }
}
