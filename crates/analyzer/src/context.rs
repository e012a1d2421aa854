//! Process-wide engine context.
//!
//! All mutable global state (graph, rule tables, model handles, stats)
//! hangs off one explicit `EngineContext` built from parsed config at
//! startup and passed by reference; there is no ambient singleton.

use std::sync::Arc;

use ipnet::IpNet;
use tokio::sync::RwLock;
use tracing::{info, warn};

use shadow_bus::Broker;
use shadow_core::{AlertRing, Config, KnowledgeBase, PolicyRule, ShadowError};
use shadow_defense::{Interrogator, ResponseManager};
use shadow_detect::{DetectorRegistry, PolicyStore};
use shadow_graph::GraphStore;
use shadow_intel::IntelEngine;

use crate::states::EndpointStates;
use crate::stats::AnalyzerStats;

pub struct EngineContext {
    pub config: Config,
    pub knowledge: Arc<KnowledgeBase>,
    pub bus: Arc<Broker>,
    pub graph: Arc<RwLock<GraphStore>>,
    pub policies: Arc<PolicyStore>,
    pub detectors: Arc<DetectorRegistry>,
    pub intel: Arc<IntelEngine>,
    pub alerts: Arc<AlertRing>,
    pub responses: Arc<ResponseManager>,
    pub interrogator: Arc<Interrogator>,
    pub states: Arc<EndpointStates>,
    pub stats: Arc<AnalyzerStats>,
    pub local_nets: Arc<Vec<IpNet>>,
}

impl EngineContext {
    /// Wire up every shared component from config.
    pub fn build(config: Config, initial_rules: Vec<PolicyRule>) -> Result<Arc<Self>, ShadowError> {
        let bus = Arc::new(Broker::new());
        let knowledge = Arc::new(KnowledgeBase::builtin());
        let local_nets = Arc::new(config.analyzer.local_prefixes.clone());

        let mut graph = if config.storage.inmemory {
            info!("graph store: in-memory (no persistence)");
            GraphStore::in_memory()
        } else {
            let path = config.storage.graph_path();
            GraphStore::open(&path)
                .map_err(|e| ShadowError::Other(format!("graph store open: {e}")))?
        };
        if config.storage.reset {
            info!("resetting graph store");
            graph
                .reset()
                .map_err(|e| ShadowError::Other(format!("graph reset: {e}")))?;
        }
        let graph = Arc::new(RwLock::new(graph));

        let intel = Arc::new(IntelEngine::new(
            config.intel.session_half_life_secs,
            config.intel.session_ttl_secs,
        ));
        if let Some(path) = &config.intel.model_path {
            match intel.load_model(path) {
                Ok(()) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "model load failed, running on rules alone"),
            }
        }

        let alerts = Arc::new(AlertRing::new(config.analyzer.alert_ring_capacity));
        let responses = Arc::new(ResponseManager::new(
            bus.clone(),
            config.defense.safe_ips.clone(),
            config.defense.block_ttl_secs,
        ));
        let interrogator = Arc::new(Interrogator::new(
            &config.defense,
            config.analyzer.local_prefixes.clone(),
            responses.clone(),
            graph.clone(),
            alerts.clone(),
            bus.clone(),
        ));

        Ok(Arc::new(Self {
            config,
            knowledge,
            bus,
            graph,
            policies: Arc::new(PolicyStore::new(initial_rules)),
            detectors: Arc::new(DetectorRegistry::builtin()),
            intel,
            alerts,
            responses,
            interrogator,
            states: Arc::new(EndpointStates::new()),
            stats: Arc::new(AnalyzerStats::default()),
            local_nets,
        }))
    }
}
