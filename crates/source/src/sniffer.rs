//! Live packet sniffer.
//!
//! An AF_PACKET tap feeds raw frames from a dedicated OS thread into the
//! async assembly loop, which decodes them and rolls them up through the
//! [`FlowTable`] before publishing flow events. Opening the tap happens
//! in [`LiveSniffer::open`] so a capture-init failure surfaces before
//! the pipeline starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use shadow_bus::{Broker, BusEvent, TOPIC_TRAFFIC};
use shadow_core::config::CaptureConfig;
use shadow_core::ShadowError;

use crate::decode;
use crate::flowtable::FlowTable;
use crate::FlowSource;

const FRAME_CHANNEL_DEPTH: usize = 2_048;

pub struct LiveSniffer {
    config: CaptureConfig,
    #[cfg(target_os = "linux")]
    socket: socket2::Socket,
}

impl LiveSniffer {
    /// Open the capture tap. Requires elevated privileges; failure here
    /// is fatal (exit code 2 at the launcher).
    #[cfg(target_os = "linux")]
    pub fn open(config: CaptureConfig) -> Result<Self, ShadowError> {
        use socket2::{Domain, Protocol, Socket, Type};

        // AF_PACKET/SOCK_RAW with ETH_P_ALL (network byte order) sees
        // every frame on the wire.
        let proto = (libc::ETH_P_ALL as u16).to_be() as i32;
        let socket = Socket::new(Domain::PACKET, Type::RAW, Some(Protocol::from(proto)))
            .map_err(|e| ShadowError::CaptureInit(format!("raw socket: {e}")))?;

        if let Some(name) = config.interface.as_deref() {
            socket
                .bind_device(Some(name.as_bytes()))
                .map_err(|e| ShadowError::CaptureInit(format!("bind to {name}: {e}")))?;
        }
        socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .map_err(|e| ShadowError::CaptureInit(format!("read timeout: {e}")))?;

        Ok(Self { config, socket })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn open(_config: CaptureConfig) -> Result<Self, ShadowError> {
        Err(ShadowError::CaptureInit(
            "live capture is only supported on Linux".to_string(),
        ))
    }
}

#[async_trait]
impl FlowSource for LiveSniffer {
    fn name(&self) -> &'static str {
        "live"
    }

    #[cfg(target_os = "linux")]
    async fn run(
        self: Box<Self>,
        bus: Arc<Broker>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ShadowError> {
        info!(
            interface = self.config.interface.as_deref().unwrap_or("<all>"),
            "live capture started"
        );

        let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(FRAME_CHANNEL_DEPTH);
        let stop = Arc::new(AtomicBool::new(false));

        // Capture on a plain OS thread; the socket read blocks with a
        // short timeout so the stop flag is honored promptly.
        let capture_stop = stop.clone();
        let socket = self.socket;
        let capture = std::thread::spawn(move || capture_loop(socket, frame_tx, capture_stop));

        let mut table = FlowTable::new(Duration::from_millis(self.config.flow_window_ms));
        let mut flush = tokio::time::interval(Duration::from_millis(250));

        loop {
            tokio::select! {
                maybe_frame = frame_rx.recv() => {
                    match maybe_frame {
                        Some(frame) => {
                            if let Some(pkt) = decode::parse_frame(&frame) {
                                table.absorb(&pkt, Instant::now());
                            }
                        }
                        None => {
                            warn!("capture thread ended, draining flow table");
                            break;
                        }
                    }
                }
                _ = flush.tick() => {
                    for event in table.expired(Instant::now()) {
                        bus.publish(TOPIC_TRAFFIC, BusEvent::Flow(event));
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        stop.store(true, Ordering::Relaxed);
        for event in table.drain(Instant::now()) {
            bus.publish(TOPIC_TRAFFIC, BusEvent::Flow(event));
        }
        let _ = capture.join();
        info!("live capture stopped");
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    async fn run(
        self: Box<Self>,
        _bus: Arc<Broker>,
        _shutdown: watch::Receiver<bool>,
    ) -> Result<(), ShadowError> {
        Err(ShadowError::CaptureInit(
            "live capture is only supported on Linux".to_string(),
        ))
    }
}

#[cfg(target_os = "linux")]
fn capture_loop(
    socket: socket2::Socket,
    frame_tx: mpsc::Sender<Vec<u8>>,
    stop: Arc<AtomicBool>,
) {
    use std::mem::MaybeUninit;

    const SNAP_LEN: usize = 65_536;
    let mut buf = vec![MaybeUninit::<u8>::uninit(); SNAP_LEN];
    while !stop.load(Ordering::Relaxed) {
        match socket.recv(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                // recv initialized the first n bytes.
                let frame: Vec<u8> = buf[..n]
                    .iter()
                    .map(|b| unsafe { b.assume_init() })
                    .collect();
                if frame_tx.blocking_send(frame).is_err() {
                    return;
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                warn!("capture read error: {e}");
                return;
            }
        }
    }
}
