//! Test helpers for tesira-client integration tests.
//!
//! This module provides:
//! - A recording line sender standing in for the device connection
//! - Client constructors with fast pacing for paused-time tests
//! - Helpers for draining broadcast channels and inspecting sent lines
//! - A scripted device answering the client's lines in order

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tesira_client::{ClientConfig, ControlPointConfig, LineSender, SessionEvent, TesiraClient, TransportError};
use tokio::sync::broadcast;

pub const BANNER: &str = "Welcome to the Tesira Text Protocol Server...";

/// Line sender that records everything the client sends
#[derive(Debug)]
pub struct RecordingSender {
    sent: Mutex<Vec<String>>,
    connected: AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        })
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Number of sent lines containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.sent.lock().iter().filter(|line| line.contains(needle)).count()
    }
}

impl LineSender for RecordingSender {
    fn send_line(&self, line: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(line.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Configuration with short pacing so cycles finish quickly in paused time
pub fn fast_config() -> ClientConfig {
    ClientConfig::default()
        .with_pacing_delay(Duration::from_millis(10))
        .with_queue_settle_timeout(Duration::from_millis(50))
        .with_watchdog_interval(Duration::from_secs(10))
}

pub fn client_with(
    config: ClientConfig,
    points: &[ControlPointConfig],
) -> (TesiraClient, Arc<RecordingSender>) {
    let sender = RecordingSender::new();
    let client = TesiraClient::with_control_points(config, sender.clone(), points).unwrap();
    (client, sender)
}

/// Collect every event currently buffered in a broadcast receiver
pub fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn count_events(events: &[SessionEvent], wanted: &SessionEvent) -> usize {
    events.iter().filter(|event| *event == wanted).count()
}

/// Let spawned tasks run for `duration` of (paused) time
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Answer every line the client sends until the running cycle finishes
///
/// `respond` maps one sent line to the lines the device replies with, in
/// order. Returns everything the client sent.
pub async fn serve_device(
    client: &TesiraClient,
    sender: &RecordingSender,
    limit: Duration,
    mut respond: impl FnMut(&str) -> Vec<String>,
) -> Vec<String> {
    let step = Duration::from_millis(5);
    let mut waited = Duration::ZERO;
    let mut transcript = Vec::new();
    loop {
        let sent = sender.take();
        if sent.is_empty() && !client.is_cycle_running() {
            return transcript;
        }
        for line in sent {
            for reply in respond(&line) {
                client.handle_line(&reply);
            }
            transcript.push(line);
        }
        assert!(waited < limit, "device session did not settle within {limit:?}");
        tokio::time::sleep(step).await;
        waited += step;
    }
}

/// Sleep in small steps until `condition` holds, failing after `limit`
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) {
    let step = Duration::from_millis(5);
    let mut waited = Duration::ZERO;
    while !condition() {
        assert!(waited < limit, "condition not met within {limit:?}");
        tokio::time::sleep(step).await;
        waited += step;
    }
}
