//! Process wiring: build the engine context, start every background
//! task, then serve HTTP until shutdown.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use shadow_analyzer::{AnalyzerEngine, EngineContext};
use shadow_core::{
    Config, PolicyAction, PolicyRule, Severity, ShadowError,
};
use shadow_source::{FlowSource, LiveSniffer, SyntheticSource};

use crate::router;
use crate::state::AppState;

/// Policy rules present on a fresh install; all runtime-editable.
fn default_policy_rules() -> Vec<PolicyRule> {
    let monitor = |id: &str, name: &str, service: &str| PolicyRule {
        id: id.to_string(),
        name: name.to_string(),
        action: PolicyAction::Monitor,
        service: service.to_string(),
        department: "All".to_string(),
        severity: Severity::Medium,
        enabled: true,
        description: "Default monitoring rule".to_string(),
    };
    vec![
        monitor("default-openai", "Monitor OpenAI usage", "openai"),
        monitor("default-anthropic", "Monitor Anthropic usage", "anthropic"),
        PolicyRule {
            id: "default-block-upload".to_string(),
            name: "Block bulk uploads to AI services".to_string(),
            action: PolicyAction::Block,
            service: "huggingface".to_string(),
            department: "All".to_string(),
            severity: Severity::High,
            enabled: false,
            description: "Enable to auto-block model-hub uploads".to_string(),
        },
    ]
}

pub async fn run(config: Config) -> Result<(), ShadowError> {
    let mode: &'static str = if config.capture.live { "live" } else { "demo" };

    // Open the capture tap before anything else so a privilege problem
    // fails fast with the right exit code.
    let live_source = if config.capture.live {
        Some(LiveSniffer::open(config.capture.clone())?)
    } else {
        None
    };

    let ctx = EngineContext::build(config, default_policy_rules())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    ctx.responses.spawn_sweeper(shutdown_rx.clone());
    let analyzer = AnalyzerEngine::spawn(ctx.clone(), shutdown_rx.clone());

    let source: Box<dyn FlowSource> = match live_source {
        Some(sniffer) => Box::new(sniffer),
        None => Box::new(SyntheticSource::new(ctx.config.generator.clone())),
    };
    info!(source = source.name(), "flow source starting");
    let source_bus = ctx.bus.clone();
    let source_shutdown = shutdown_rx.clone();
    let source_task = tokio::spawn(async move {
        if let Err(e) = source.run(source_bus, source_shutdown).await {
            warn!("flow source stopped with error: {e}");
        }
    });

    let state = AppState::new(ctx.clone(), mode);
    let app = router::build_router(state);

    let bind = format!("{}:{}", ctx.config.server.bind_addr, ctx.config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| ShadowError::Bind(format!("{bind}: {e}")))?;
    info!(addr = %bind, mode, "shadow-hunter listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .map_err(|e| ShadowError::Other(format!("server: {e}")))?;

    // Stop intake, drain the pipeline with the configured grace, then
    // let the store close with the context drop.
    let grace = std::time::Duration::from_secs(ctx.config.analyzer.drain_grace_secs);
    let _ = shutdown_tx.send(true);
    source_task.abort();
    analyzer.drain(grace).await;
    Ok(())
}
