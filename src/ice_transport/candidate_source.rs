use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::ice_transport::ice_candidate::RTCIceCandidate;
use crate::ice_transport::ice_server::IceServerUrl;

/// CandidateSource produces local candidates: a network interface, a STUN
/// binding or a TURN allocation. Discovery itself happens outside this crate.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> String;

    /// gather sends every candidate of `component` into `sink` and returns
    /// once the source has nothing more to offer.
    async fn gather(
        &self,
        component: u16,
        sink: mpsc::UnboundedSender<RTCIceCandidate>,
    ) -> Result<()>;

    /// release frees whatever the source holds (sockets, allocations). An
    /// ICE restart gathers from a released source again.
    async fn release(&self) -> Result<()>;
}

/// CandidateSourceFactory hands out the sources a gatherer uses: one per
/// local interface plus one per configured ICE server URL.
pub trait CandidateSourceFactory: Send + Sync {
    fn host_sources(&self) -> Vec<Arc<dyn CandidateSource>>;

    /// server_source returns None when the URL is not served.
    fn server_source(&self, url: &IceServerUrl) -> Option<Arc<dyn CandidateSource>>;
}

/// StaticCandidateSource replays a fixed candidate list.
pub struct StaticCandidateSource {
    name: String,
    candidates: Vec<RTCIceCandidate>,
    released: AtomicBool,
}

impl StaticCandidateSource {
    pub fn new(name: &str, candidates: Vec<RTCIceCandidate>) -> Self {
        StaticCandidateSource {
            name: name.to_owned(),
            candidates,
            released: AtomicBool::new(false),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateSource for StaticCandidateSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn gather(
        &self,
        component: u16,
        sink: mpsc::UnboundedSender<RTCIceCandidate>,
    ) -> Result<()> {
        for c in &self.candidates {
            let mut c = c.clone();
            c.component = component;
            // one id per component
            c.stats_id.clear();
            sink.send(c)?;
        }
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// StaticCandidateSourceFactory serves fixed candidates: host candidates
/// and, keyed by the URL string, those of each ICE server.
#[derive(Default, Clone)]
pub struct StaticCandidateSourceFactory {
    host: Vec<RTCIceCandidate>,
    servers: HashMap<String, Vec<RTCIceCandidate>>,
}

impl StaticCandidateSourceFactory {
    pub fn new(host: Vec<RTCIceCandidate>) -> Self {
        StaticCandidateSourceFactory {
            host,
            servers: HashMap::new(),
        }
    }

    /// with_server registers the candidates produced by `url`, written in
    /// its normalized form (`turn:example.org:3478?transport=udp`).
    pub fn with_server(mut self, url: &str, candidates: Vec<RTCIceCandidate>) -> Self {
        self.servers.insert(url.to_owned(), candidates);
        self
    }
}

impl CandidateSourceFactory for StaticCandidateSourceFactory {
    fn host_sources(&self) -> Vec<Arc<dyn CandidateSource>> {
        if self.host.is_empty() {
            return vec![];
        }
        vec![Arc::new(StaticCandidateSource::new("host", self.host.clone()))]
    }

    fn server_source(&self, url: &IceServerUrl) -> Option<Arc<dyn CandidateSource>> {
        let key = url.to_string();
        self.servers.get(&key).map(|candidates| {
            Arc::new(StaticCandidateSource::new(&key, candidates.clone()))
                as Arc<dyn CandidateSource>
        })
    }
}
