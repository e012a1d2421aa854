//! OpenAPI documentation aggregator.
//!
//! Collects the `#[utoipa::path]`-annotated handlers into one OpenAPI
//! spec, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shadow Hunter API",
        version = "0.1.0",
        description = "Real-time Shadow AI traffic detection: network graph, alerts, derived analytics, and active defense.",
    ),
    tags(
        (name = "Status", description = "Runtime mode, uptime, and pipeline counters"),
        (name = "Discovery", description = "Network graph nodes, edges, risk scores, and traffic stats"),
        (name = "Policy", description = "Alert history and derived analytics views"),
        (name = "Rules", description = "Runtime-editable policy rules"),
        (name = "Defense", description = "Auto-response blocklist"),
    ),
    paths(
        crate::api::status::status,
        crate::api::discovery::nodes,
        crate::api::discovery::edges,
        crate::api::discovery::risk_scores,
        crate::api::discovery::traffic_stats,
        crate::api::policy::alerts,
        crate::api::policy::timeline,
        crate::api::policy::profiles,
        crate::api::policy::sessions,
        crate::api::policy::dlp,
        crate::api::policy::killchain,
        crate::api::policy::compliance,
        crate::api::policy::briefing,
        crate::api::policy::report,
        crate::api::rules::list,
        crate::api::rules::create,
        crate::api::rules::toggle,
        crate::api::rules::delete,
        crate::api::defense::blocked,
        crate::api::defense::unblock,
    ),
)]
pub struct ApiDoc;
