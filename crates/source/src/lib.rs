//! Flow source adapters.
//!
//! Two interchangeable producers publish canonical [`FlowEvent`]s to the
//! traffic topic: a live packet sniffer and a deterministic synthetic
//! generator. Neither knows anything about downstream analysis.

pub mod decode;
pub mod flowtable;
pub mod inspect;
pub mod sniffer;
pub mod synthetic;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use shadow_bus::Broker;
use shadow_core::ShadowError;

pub use sniffer::LiveSniffer;
pub use synthetic::SyntheticSource;

/// A producer of flow events. `run` owns the source until shutdown.
#[async_trait]
pub trait FlowSource: Send {
    fn name(&self) -> &'static str;

    /// Publish flow events to [`shadow_bus::TOPIC_TRAFFIC`] until the
    /// shutdown signal flips to `true`.
    async fn run(
        self: Box<Self>,
        bus: Arc<Broker>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ShadowError>;
}
