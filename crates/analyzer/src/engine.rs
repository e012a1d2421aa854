//! The analyzer pipeline itself.

use std::hash::{Hash, Hasher};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shadow_bus::{
    BusEvent, GraphChange, ResponseEvent, SubscriptionToken, TOPIC_ALERTS, TOPIC_GRAPH_CHANGES,
    TOPIC_RESPONSES, TOPIC_TRAFFIC,
};
use shadow_core::net;
use shadow_core::{Alert, FlowEvent, MlClass, NodeType, Severity};
use shadow_defense::ProbeTarget;
use shadow_detect::DetectionContext;
use shadow_graph::{Edge, EdgeUpsert, Node, NodeUpsert, StoreError};
use shadow_intel::Verdict;

use crate::context::EngineContext;
use crate::killchain;

/// Confidence below which a non-normal classification alone does not
/// raise an alert.
const ML_ALERT_CONFIDENCE: f64 = 0.7;

/// Store retry backoff schedule.
const RETRY_BACKOFF: [Duration; 3] = [
    Duration::from_millis(50),
    Duration::from_millis(200),
    Duration::from_secs(1),
];

const WORKER_QUEUE_DEPTH: usize = 1_024;

pub struct AnalyzerEngine;

pub struct AnalyzerHandle {
    traffic_token: SubscriptionToken,
    response_token: SubscriptionToken,
    dispatcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    ctx: Arc<EngineContext>,
}

impl AnalyzerEngine {
    /// Start the partitioned worker pipeline and the response-feedback
    /// subscriber.
    pub fn spawn(ctx: Arc<EngineContext>, shutdown: watch::Receiver<bool>) -> AnalyzerHandle {
        let workers_n = ctx.config.analyzer.workers.max(1);
        let (traffic_token, mut traffic_rx) = ctx
            .bus
            .subscribe_channel(TOPIC_TRAFFIC, ctx.config.analyzer.queue_capacity);

        let mut worker_txs = Vec::with_capacity(workers_n);
        let mut workers = Vec::with_capacity(workers_n);
        for n in 0..workers_n {
            let (tx, mut rx) = mpsc::channel::<FlowEvent>(WORKER_QUEUE_DEPTH);
            worker_txs.push(tx);
            let ctx = ctx.clone();
            workers.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    process_event(&ctx, &event).await;
                }
                debug!(worker = n, "analyzer worker drained");
            }));
        }

        // Dispatcher: route each flow to its partition worker so events
        // on the same 5-tuple are processed in publication order.
        let mut dispatcher_shutdown = shutdown.clone();
        let dispatcher = tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe = traffic_rx.recv() => {
                        let Some(event) = maybe else { break };
                        if let BusEvent::Flow(flow) = event.as_ref() {
                            let idx = partition(flow, worker_txs.len());
                            if worker_txs[idx].send(flow.clone()).await.is_err() {
                                break;
                            }
                        }
                    }
                    _ = dispatcher_shutdown.changed() => {
                        if *dispatcher_shutdown.borrow() {
                            info!("analyzer stopping intake");
                            break;
                        }
                    }
                }
            }
            // Dropping the senders lets workers drain and exit.
        });

        // Response feedback drives the endpoint state machine without a
        // direct reference cycle to the response manager.
        let (response_token, mut response_rx) = ctx.bus.subscribe_channel(TOPIC_RESPONSES, 256);
        let states_ctx = ctx.clone();
        tokio::spawn(async move {
            while let Some(event) = response_rx.recv().await {
                if let BusEvent::Response(resp) = event.as_ref() {
                    match resp {
                        ResponseEvent::Blocked { ip, .. } => {
                            states_ctx.states.quarantine(&ip.to_string());
                        }
                        ResponseEvent::Expired { ip } | ResponseEvent::Unblocked { ip } => {
                            states_ctx.states.release(&ip.to_string(), Utc::now());
                        }
                    }
                }
            }
        });

        AnalyzerHandle {
            traffic_token,
            response_token,
            dispatcher,
            workers,
            ctx,
        }
    }
}

impl AnalyzerHandle {
    /// Drain the pipeline: intake has already stopped via the shutdown
    /// signal; wait up to `grace` for the workers to empty their queues.
    pub async fn drain(self, grace: Duration) {
        self.ctx.bus.unsubscribe(self.traffic_token);
        self.ctx.bus.unsubscribe(self.response_token);
        let _ = self.dispatcher.await;

        for worker in self.workers {
            match tokio::time::timeout(grace, worker).await {
                Ok(_) => {}
                Err(_) => {
                    self.ctx
                        .stats
                        .events_dropped_analysis
                        .fetch_add(1, Ordering::Relaxed);
                    warn!("analyzer worker did not drain within grace, discarding queue");
                }
            }
        }
        info!("analyzer drained");
    }
}

/// Partition index by hash of the flow 5-tuple.
fn partition(event: &FlowEvent, workers: usize) -> usize {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    event.source_ip.hash(&mut hasher);
    event.destination_ip.hash(&mut hasher);
    event.destination_port.hash(&mut hasher);
    event.protocol.hash(&mut hasher);
    (hasher.finish() as usize) % workers
}

fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::High => 25.0,
        Severity::Medium => 10.0,
        Severity::Low => 4.0,
    }
}

fn ml_bucket(risk: f64) -> Severity {
    if risk < 30.0 {
        Severity::Low
    } else if risk < 70.0 {
        Severity::Medium
    } else {
        Severity::High
    }
}

fn department_for(persona: Option<&str>) -> Option<String> {
    match persona? {
        "Dev" => Some("Engineering".to_string()),
        "Designer" => Some("Design".to_string()),
        "Manager" => Some("Management".to_string()),
        "DataSci" => Some("Data".to_string()),
        "Intern" => Some("Operations".to_string()),
        _ => None,
    }
}

/// Run the full pipeline for one flow event.
pub async fn process_event(ctx: &Arc<EngineContext>, event: &FlowEvent) {
    // 1. Classify endpoints.
    let src_internal = net::is_internal(event.source_ip, &ctx.local_nets);
    let dst_internal = net::is_internal(event.destination_ip, &ctx.local_nets);
    let dst_is_ai = ctx.knowledge.is_ai_destination(event.host(), event.sni());

    let src_type = if src_internal {
        NodeType::Internal
    } else {
        NodeType::External
    };
    let dst_type = if dst_is_ai {
        NodeType::Shadow
    } else if dst_internal {
        NodeType::Internal
    } else {
        NodeType::External
    };

    let src_id = event.source_ip.to_string();
    let dst_id = event.destination_label();

    // 2. Upsert graph. A dead store never stops detection.
    let department = department_for(event.persona());
    let src_up = NodeUpsert::observed(src_type, event.timestamp)
        .with_department(department.clone());
    let src_node = upsert_node_retry(ctx, &src_id, &src_up).await;

    let dst_up = NodeUpsert::observed(dst_type, event.timestamp).with_label(dst_id.clone());
    let dst_node = upsert_node_retry(ctx, &dst_id, &dst_up).await;

    if src_node.is_some() && dst_node.is_some() {
        let edge_up = EdgeUpsert {
            protocol: event.protocol,
            dst_port: event.destination_port,
            byte_delta: event.bytes_sent,
            seen: event.timestamp,
        };
        if upsert_edge_retry(ctx, &src_id, &dst_id, &edge_up).await.is_some() {
            ctx.bus.publish(
                TOPIC_GRAPH_CHANGES,
                BusEvent::Graph(GraphChange::Edge {
                    source: src_id.clone(),
                    target: dst_id.clone(),
                }),
            );
        }
    }

    ctx.states.observe(&src_id);

    // 3. Rule detection and intelligence scoring.
    let detection_ctx = DetectionContext {
        knowledge: ctx.knowledge.clone(),
        policies: ctx.policies.snapshot(),
        source_department: src_node
            .as_ref()
            .and_then(|n| n.department.clone())
            .or(department),
        destination_label: dst_id.clone(),
        local_nets: ctx.local_nets.clone(),
    };
    let hits = ctx.detectors.run(event, &detection_ctx);
    let verdict = ctx.intel.score(event, Utc::now());
    if verdict.classification != MlClass::Normal {
        ctx.stats.ml_scored.fetch_add(1, Ordering::Relaxed);
    }

    // 4. Emit alert.
    let ml_alert =
        verdict.classification != MlClass::Normal && verdict.confidence >= ML_ALERT_CONFIDENCE;
    if !hits.is_empty() || ml_alert {
        let severity = hits
            .iter()
            .map(|h| h.severity)
            .max()
            .unwrap_or(Severity::Low)
            .max(ml_bucket(verdict.risk));
        let block_requested = hits.iter().any(|h| h.block_requested);
        let alert = build_alert(event, &hits, &verdict, severity, &src_id, &dst_id);

        ctx.alerts.push(alert.clone());
        ctx.stats.alerts_emitted.fetch_add(1, Ordering::Relaxed);
        ctx.states.flag(&src_id, alert.timestamp);
        ctx.intel
            .record_alert(event.source_ip, severity, Utc::now());

        // Best-effort stream; never retried.
        ctx.bus
            .publish(TOPIC_ALERTS, BusEvent::Alert(Box::new(alert.clone())));

        // 5. Active defense gating.
        if severity == Severity::High && !dst_internal && ctx.config.defense.probe_enabled {
            ctx.interrogator.request_probe(ProbeTarget {
                ip: event.destination_ip,
                port: if event.destination_port == 0 {
                    443
                } else {
                    event.destination_port
                },
                node_id: dst_id.clone(),
                alert_id: alert.id.clone(),
            });
        }

        let critical = severity == Severity::High
            && verdict.risk >= ctx.config.defense.critical_risk;
        if critical || block_requested {
            // Block the destination for external targets, the source
            // otherwise.
            let target_ip = if dst_internal {
                event.source_ip
            } else {
                event.destination_ip
            };
            ctx.responses.block(
                target_ip,
                None,
                alert.description.clone(),
                Some(alert.id.clone()),
            );
        }

        // 6. Update source node risk.
        if let Some(node) = src_node {
            let new_risk = (0.9 * node.risk_score + severity_weight(severity)).min(100.0);
            let mut up = NodeUpsert::observed(node.node_type, event.timestamp);
            up.risk_score = Some(new_risk);
            up.alert_increment = 1;
            upsert_node_retry(ctx, &src_id, &up).await;
        }
    }

    ctx.stats.events_processed.fetch_add(1, Ordering::Relaxed);
}

fn build_alert(
    event: &FlowEvent,
    hits: &[shadow_detect::RuleHit],
    verdict: &Verdict,
    severity: Severity,
    src_id: &str,
    dst_id: &str,
) -> Alert {
    let description = if hits.is_empty() {
        format!(
            "ML classification: {} (confidence {:.2})",
            verdict.classification, verdict.confidence
        )
    } else {
        hits.iter()
            .map(|h| h.description.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    };
    let category = hits
        .first()
        .map(|h| h.category.clone())
        .unwrap_or_else(|| verdict.classification.to_string());
    let matched_rule = hits.first().map(|h| h.matched_rule.clone());
    let ml_classification =
        (verdict.classification != MlClass::Normal).then_some(verdict.classification);
    let killchain_stage = killchain::stage_for(&description, ml_classification);

    Alert {
        id: Alert::new_id(),
        timestamp: event.timestamp,
        severity,
        source: src_id.to_string(),
        target: dst_id.to_string(),
        protocol: event.protocol,
        destination_port: event.destination_port,
        source_port: event.source_port,
        destination_ip: event.destination_ip,
        bytes_sent: event.bytes_sent,
        bytes_received: event.bytes_received,
        description,
        matched_rule,
        category,
        ml_classification,
        ml_confidence: verdict.confidence,
        ml_risk_score: verdict.risk,
        killchain_stage,
    }
}

async fn upsert_node_retry(
    ctx: &Arc<EngineContext>,
    id: &str,
    up: &NodeUpsert,
) -> Option<Node> {
    let mut attempt = 0;
    loop {
        let result = {
            let mut graph = ctx.graph.write().await;
            graph.upsert_node(id, up)
        };
        match result {
            Ok(node) => return Some(node),
            Err(e) if e.is_retryable() && attempt < RETRY_BACKOFF.len() => {
                debug!(id, error = %e, attempt, "node upsert failed, retrying");
                tokio::time::sleep(RETRY_BACKOFF[attempt]).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(id, error = %e, "node upsert gave up");
                ctx.stats.store_failures_total.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
    }
}

async fn upsert_edge_retry(
    ctx: &Arc<EngineContext>,
    src: &str,
    dst: &str,
    up: &EdgeUpsert,
) -> Option<Edge> {
    let mut attempt = 0;
    loop {
        let result: Result<Edge, StoreError> = {
            let mut graph = ctx.graph.write().await;
            graph.upsert_edge(src, dst, up)
        };
        match result {
            Ok(edge) => return Some(edge),
            Err(e) if e.is_retryable() && attempt < RETRY_BACKOFF.len() => {
                debug!(src, dst, error = %e, attempt, "edge upsert failed, retrying");
                tokio::time::sleep(RETRY_BACKOFF[attempt]).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(src, dst, error = %e, "edge upsert gave up");
                ctx.stats.store_failures_total.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadow_core::{Config, PolicyAction, PolicyRule, Protocol};
    use std::collections::HashMap;

    fn test_ctx(rules: Vec<PolicyRule>) -> Arc<EngineContext> {
        let mut config = Config::from_env();
        config.storage.inmemory = true;
        config.defense.probe_enabled = false;
        EngineContext::build(config, rules).unwrap()
    }

    fn https_event(src: &str, dst: &str, sni: Option<&str>) -> FlowEvent {
        let mut metadata = HashMap::new();
        if let Some(sni) = sni {
            metadata.insert("sni".to_string(), sni.to_string());
        }
        FlowEvent {
            timestamp: Utc::now(),
            source_ip: src.parse().unwrap(),
            destination_ip: dst.parse().unwrap(),
            source_port: 51000,
            destination_port: 443,
            protocol: Protocol::Https,
            bytes_sent: 2_048,
            bytes_received: 4_096,
            ja3_hash: None,
            metadata,
        }
    }

    #[tokio::test]
    async fn ai_domain_flow_creates_shadow_node_and_high_alert() {
        let ctx = test_ctx(Vec::new());
        let event = https_event("10.0.0.5", "104.18.32.7", Some("api.openai.com"));
        process_event(&ctx, &event).await;

        let graph = ctx.graph.read().await;
        let src = graph.get_node("10.0.0.5").unwrap();
        assert_eq!(src.node_type, NodeType::Internal);
        assert_eq!(src.alert_count, 1);
        assert!(src.risk_score > 0.0);

        let dst = graph.get_node("api.openai.com").unwrap();
        assert_eq!(dst.node_type, NodeType::Shadow);
        assert_eq!(dst.label, "api.openai.com");

        let edges = graph.list_edges();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].byte_count >= event.bytes_sent);
        drop(graph);

        let alerts = ctx.alerts.snapshot();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(alerts[0].category, "LLM");
        assert_eq!(
            alerts[0].matched_rule.as_deref(),
            Some("ai_domain:openai.com")
        );
        assert_eq!(alerts[0].target, "api.openai.com");
    }

    #[tokio::test]
    async fn abnormal_port_is_medium_and_external() {
        let ctx = test_ctx(Vec::new());
        let mut event = https_event("192.168.1.20", "203.0.113.5", None);
        event.protocol = Protocol::Tcp;
        event.destination_port = 6667;
        process_event(&ctx, &event).await;

        let alerts = ctx.alerts.snapshot();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Medium);
        assert_eq!(
            alerts[0].matched_rule.as_deref(),
            Some("abnormal_outbound_port")
        );
        let graph = ctx.graph.read().await;
        assert_eq!(
            graph.get_node("203.0.113.5").unwrap().node_type,
            NodeType::External
        );
    }

    // Clean traffic: graph updated, no alert.
    #[tokio::test]
    async fn benign_flow_updates_graph_without_alert() {
        let ctx = test_ctx(Vec::new());
        let event = https_event("10.0.0.5", "140.82.113.3", Some("github.com"));
        process_event(&ctx, &event).await;

        assert!(ctx.alerts.is_empty());
        let graph = ctx.graph.read().await;
        assert!(graph.get_node("10.0.0.5").is_some());
        assert!(graph.get_node("github.com").is_some());
        assert_eq!(graph.edge_count(), 1);
    }

    // Replay: byte counts and flow counts move, risk stays capped.
    #[tokio::test]
    async fn replay_caps_risk_and_aggregates_edge() {
        let ctx = test_ctx(Vec::new());
        let event = https_event("10.0.0.5", "104.18.32.7", Some("api.openai.com"));
        for _ in 0..60 {
            process_event(&ctx, &event).await;
        }

        let graph = ctx.graph.read().await;
        let src = graph.get_node("10.0.0.5").unwrap();
        assert!(src.risk_score <= 100.0);
        assert_eq!(src.alert_count, 60);
        let edge = &graph.list_edges()[0];
        assert_eq!(edge.flow_count, 60);
        assert_eq!(edge.byte_count, 60 * event.bytes_sent);
    }

    #[tokio::test]
    async fn block_rule_triggers_auto_block_of_destination() {
        let rule = PolicyRule {
            id: "block-openai".to_string(),
            name: "Block OpenAI".to_string(),
            action: PolicyAction::Block,
            service: "openai".to_string(),
            department: "All".to_string(),
            severity: Severity::High,
            enabled: true,
            description: String::new(),
        };
        let ctx = test_ctx(vec![rule]);
        let event = https_event("10.0.0.5", "198.51.100.9", Some("api.openai.com"));
        process_event(&ctx, &event).await;
        process_event(&ctx, &event).await;

        let blocked = ctx.responses.list_blocked();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].ip.to_string(), "198.51.100.9");
        let ttl = blocked[0].expires_at - blocked[0].inserted_at;
        assert_eq!(ttl.num_seconds(), 3_600);
        assert!(ctx.responses.is_blocked("198.51.100.9".parse().unwrap()));
    }

    // Disabled rules never contribute a matched_rule.
    #[tokio::test]
    async fn disabled_policy_rule_yields_no_alert() {
        let rule = PolicyRule {
            id: "r1".to_string(),
            name: "Monitor GitHub".to_string(),
            action: PolicyAction::Monitor,
            service: "github".to_string(),
            department: "All".to_string(),
            severity: Severity::Low,
            enabled: false,
            description: String::new(),
        };
        let ctx = test_ctx(vec![rule]);
        let event = https_event("10.0.0.5", "140.82.113.3", Some("github.com"));
        process_event(&ctx, &event).await;
        assert!(ctx.alerts.is_empty());
    }

    #[tokio::test]
    async fn partition_is_stable_per_flow() {
        let a = https_event("10.0.0.5", "104.18.32.7", None);
        let b = https_event("10.0.0.5", "104.18.32.7", Some("x"));
        assert_eq!(partition(&a, 4), partition(&b, 4));
    }

    #[tokio::test]
    async fn engine_consumes_from_bus_and_drains() {
        let ctx = test_ctx(Vec::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = AnalyzerEngine::spawn(ctx.clone(), shutdown_rx);

        for _ in 0..5 {
            ctx.bus.publish(
                TOPIC_TRAFFIC,
                BusEvent::Flow(https_event("10.0.0.5", "104.18.32.7", Some("api.openai.com"))),
            );
        }

        // Give the pipeline a moment, then drain.
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.send(true).unwrap();
        handle.drain(Duration::from_secs(5)).await;

        assert_eq!(ctx.stats.snapshot().events_processed, 5);
        assert_eq!(ctx.alerts.len(), 5);
    }
}
