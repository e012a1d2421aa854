//! Synthetic traffic generator (demo mode).
//!
//! Composes a realistic stream from a small set of personas, each with
//! its own mix of normal, internal, and Shadow-AI destinations. All
//! randomness comes from one seeded [`StdRng`], so a given seed always
//! produces the same stream of destinations and byte counts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tracing::info;

use shadow_bus::{Broker, BusEvent, TOPIC_TRAFFIC};
use shadow_core::config::GeneratorConfig;
use shadow_core::{FlowEvent, Protocol, ShadowError};

use crate::FlowSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DestKind {
    Normal,
    Internal,
    ShadowAi,
}

struct Destination {
    host: &'static str,
    ip: &'static str,
    port: u16,
    protocol: Protocol,
    kind: DestKind,
    /// Relative pick weight inside the persona's mix.
    weight: u32,
}

struct Persona {
    name: &'static str,
    /// Last octet of the persona's workstation address (10.0.0.x).
    host_octet: u8,
    destinations: &'static [Destination],
}

const DEV: &[Destination] = &[
    Destination { host: "github.com", ip: "140.82.113.3", port: 443, protocol: Protocol::Https, kind: DestKind::Normal, weight: 30 },
    Destination { host: "crates.io", ip: "13.226.34.12", port: 443, protocol: Protocol::Https, kind: DestKind::Normal, weight: 15 },
    Destination { host: "stackoverflow.com", ip: "151.101.1.69", port: 443, protocol: Protocol::Https, kind: DestKind::Normal, weight: 15 },
    Destination { host: "ci.internal", ip: "10.0.2.20", port: 8080, protocol: Protocol::Http, kind: DestKind::Internal, weight: 20 },
    Destination { host: "api.openai.com", ip: "104.18.32.7", port: 443, protocol: Protocol::Https, kind: DestKind::ShadowAi, weight: 12 },
    Destination { host: "api.anthropic.com", ip: "160.79.104.10", port: 443, protocol: Protocol::Https, kind: DestKind::ShadowAi, weight: 8 },
];

const DESIGNER: &[Destination] = &[
    Destination { host: "figma.com", ip: "18.160.46.5", port: 443, protocol: Protocol::Https, kind: DestKind::Normal, weight: 35 },
    Destination { host: "fonts.google.com", ip: "142.250.80.46", port: 443, protocol: Protocol::Https, kind: DestKind::Normal, weight: 20 },
    Destination { host: "assets.internal", ip: "10.0.2.30", port: 80, protocol: Protocol::Http, kind: DestKind::Internal, weight: 15 },
    Destination { host: "www.midjourney.com", ip: "104.26.7.49", port: 443, protocol: Protocol::Https, kind: DestKind::ShadowAi, weight: 18 },
    Destination { host: "api.stability.ai", ip: "104.18.27.8", port: 443, protocol: Protocol::Https, kind: DestKind::ShadowAi, weight: 12 },
];

const MANAGER: &[Destination] = &[
    Destination { host: "mail.google.com", ip: "142.250.80.37", port: 443, protocol: Protocol::Https, kind: DestKind::Normal, weight: 35 },
    Destination { host: "calendar.internal", ip: "10.0.2.40", port: 443, protocol: Protocol::Https, kind: DestKind::Internal, weight: 25 },
    Destination { host: "linkedin.com", ip: "13.107.42.14", port: 443, protocol: Protocol::Https, kind: DestKind::Normal, weight: 20 },
    Destination { host: "chatgpt.com", ip: "104.18.32.47", port: 443, protocol: Protocol::Https, kind: DestKind::ShadowAi, weight: 20 },
];

const DATASCI: &[Destination] = &[
    Destination { host: "pypi.org", ip: "151.101.0.223", port: 443, protocol: Protocol::Https, kind: DestKind::Normal, weight: 20 },
    Destination { host: "warehouse.internal", ip: "10.0.2.50", port: 5432, protocol: Protocol::Tcp, kind: DestKind::Internal, weight: 25 },
    Destination { host: "huggingface.co", ip: "18.155.68.73", port: 443, protocol: Protocol::Https, kind: DestKind::ShadowAi, weight: 25 },
    Destination { host: "api.together.ai", ip: "34.36.5.9", port: 443, protocol: Protocol::Https, kind: DestKind::ShadowAi, weight: 15 },
    Destination { host: "api.groq.com", ip: "34.110.190.8", port: 443, protocol: Protocol::Https, kind: DestKind::ShadowAi, weight: 15 },
];

const INTERN: &[Destination] = &[
    Destination { host: "wikipedia.org", ip: "208.80.154.224", port: 443, protocol: Protocol::Https, kind: DestKind::Normal, weight: 25 },
    Destination { host: "youtube.com", ip: "142.250.80.78", port: 443, protocol: Protocol::Https, kind: DestKind::Normal, weight: 25 },
    Destination { host: "wiki.internal", ip: "10.0.2.60", port: 80, protocol: Protocol::Http, kind: DestKind::Internal, weight: 15 },
    Destination { host: "claude.ai", ip: "160.79.104.14", port: 443, protocol: Protocol::Https, kind: DestKind::ShadowAi, weight: 20 },
    Destination { host: "www.perplexity.ai", ip: "104.18.26.44", port: 443, protocol: Protocol::Https, kind: DestKind::ShadowAi, weight: 15 },
];

const PERSONAS: &[Persona] = &[
    Persona { name: "Dev", host_octet: 5, destinations: DEV },
    Persona { name: "Designer", host_octet: 12, destinations: DESIGNER },
    Persona { name: "Manager", host_octet: 23, destinations: MANAGER },
    Persona { name: "DataSci", host_octet: 34, destinations: DATASCI },
    Persona { name: "Intern", host_octet: 47, destinations: INTERN },
];

/// The canonical python-requests JA3, stamped on a fraction of Shadow-AI
/// flows so the spoof detector has something to find in demo mode.
const SCRIPTED_CLIENT_JA3: &str = "8d9f7747675e24454cd9b7ed35c58707";
const BROWSER_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/125.0 Safari/537.36";

pub struct SyntheticSource {
    config: GeneratorConfig,
}

impl SyntheticSource {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Generate one simulated second of traffic. Pure with respect to the
    /// RNG, which is what makes the stream reproducible under a seed.
    pub fn generate_tick(&self, rng: &mut StdRng) -> Vec<FlowEvent> {
        let count = rng.gen_range(self.config.min_events_per_tick..=self.config.max_events_per_tick);
        (0..count).map(|_| self.generate_event(rng)).collect()
    }

    fn generate_event(&self, rng: &mut StdRng) -> FlowEvent {
        let persona = &PERSONAS[rng.gen_range(0..PERSONAS.len())];
        let dest = pick_weighted(persona.destinations, rng);

        // Roughly one in twelve flows is the DNS lookup for the service.
        if rng.gen_ratio(1, 12) {
            return self.dns_event(persona, dest, rng);
        }

        let (bytes_sent, bytes_received) = match dest.kind {
            DestKind::ShadowAi => (
                rng.gen_range(1_000..20_000),
                rng.gen_range(4_000..100_000),
            ),
            DestKind::Normal => (rng.gen_range(200..5_000), rng.gen_range(1_000..50_000)),
            DestKind::Internal => (rng.gen_range(100..2_000), rng.gen_range(200..8_000)),
        };

        let mut metadata = HashMap::new();
        metadata.insert("persona".to_string(), persona.name.to_string());
        match dest.protocol {
            Protocol::Https => {
                metadata.insert("sni".to_string(), dest.host.to_string());
            }
            Protocol::Http => {
                metadata.insert("host".to_string(), dest.host.to_string());
            }
            _ => {}
        }

        // A slice of Shadow-AI traffic comes from scripted clients hiding
        // behind a browser User-Agent.
        let ja3_hash = if dest.kind == DestKind::ShadowAi
            && dest.protocol == Protocol::Https
            && rng.gen_ratio(1, 5)
        {
            metadata.insert("user_agent".to_string(), BROWSER_UA.to_string());
            Some(SCRIPTED_CLIENT_JA3.to_string())
        } else {
            None
        };

        FlowEvent {
            timestamp: Utc::now(),
            source_ip: format!("10.0.0.{}", persona.host_octet).parse().unwrap(),
            destination_ip: dest.ip.parse().unwrap(),
            source_port: rng.gen_range(32_768..60_999),
            destination_port: dest.port,
            protocol: dest.protocol,
            bytes_sent,
            bytes_received,
            ja3_hash,
            metadata,
        }
    }

    fn dns_event(&self, persona: &Persona, dest: &Destination, rng: &mut StdRng) -> FlowEvent {
        let mut metadata = HashMap::new();
        metadata.insert("persona".to_string(), persona.name.to_string());
        metadata.insert("dns_query".to_string(), dest.host.to_string());
        FlowEvent {
            timestamp: Utc::now(),
            source_ip: format!("10.0.0.{}", persona.host_octet).parse().unwrap(),
            destination_ip: "10.0.0.2".parse().unwrap(),
            source_port: rng.gen_range(32_768..60_999),
            destination_port: 53,
            protocol: Protocol::Dns,
            bytes_sent: rng.gen_range(40..120),
            bytes_received: rng.gen_range(80..400),
            ja3_hash: None,
            metadata,
        }
    }
}

fn pick_weighted<'a>(destinations: &'a [Destination], rng: &mut StdRng) -> &'a Destination {
    let total: u32 = destinations.iter().map(|d| d.weight).sum();
    let mut roll = rng.gen_range(0..total);
    for dest in destinations {
        if roll < dest.weight {
            return dest;
        }
        roll -= dest.weight;
    }
    &destinations[destinations.len() - 1]
}

#[async_trait]
impl FlowSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn run(
        self: Box<Self>,
        bus: Arc<Broker>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ShadowError> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        info!(seed = self.config.seed, "synthetic generator started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for event in self.generate_tick(&mut rng) {
                        bus.publish(TOPIC_TRAFFIC, BusEvent::Flow(event));
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("synthetic generator stopping");
                        return Ok(());
                    }
                }
            }
        }
    }
}
