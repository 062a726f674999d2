use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use tesira_client::{ClientConfig, Feedback, FeedbackValue, SessionEvent, TcpLineTransport, TesiraClient};

pub mod points;

/// Tesira Monitor
///
/// Connects to a Tesira DSP over its text protocol, subscribes every
/// configured control point and prints the values it reports. The session
/// is rebuilt automatically whenever the connection drops.
#[derive(Parser, Debug)]
#[command(name = "tesira-monitor")]
#[command(about = "Keep Tesira subscriptions alive and print what the device reports")]
#[command(version)]
pub struct Args {
    /// Device address (host:port)
    #[arg(short, long, default_value = "192.168.1.50:23")]
    pub address: String,

    /// JSON file with control point definitions
    #[arg(short, long)]
    pub points: PathBuf,

    /// Seconds between watchdog probes
    #[arg(short, long, default_value = "90")]
    pub watchdog_interval: u64,

    /// Disable the subscription watchdog
    #[arg(long)]
    pub no_watchdog: bool,

    /// Line that asks the client to resubscribe everything
    #[arg(long)]
    pub resubscribe_sentinel: Option<String>,

    /// Use serial link pacing
    #[arg(long)]
    pub serial: bool,

    /// Seconds to wait before reconnecting
    #[arg(short, long, default_value = "5")]
    pub reconnect_delay: u64,

    /// Print feedback as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Client configuration derived from the arguments
    pub fn client_config(&self) -> ClientConfig {
        let mut config = if self.serial {
            ClientConfig::serial()
        } else {
            ClientConfig::default()
        };
        config = config
            .with_watchdog(!self.no_watchdog)
            .with_watchdog_interval(Duration::from_secs(self.watchdog_interval));
        if let Some(sentinel) = &self.resubscribe_sentinel {
            config = config.with_resubscribe_sentinel(sentinel.clone());
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.watchdog_interval == 0 && !self.no_watchdog {
            return Err(anyhow::anyhow!("Watchdog interval must be positive"));
        }

        match self.log_level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
                    self.log_level
                ));
            }
        }

        self.client_config().validate()?;
        Ok(())
    }
}

/// Initialize tracing with the requested level unless RUST_LOG overrides it
fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.to_lowercase())),
        )
        .init();
}

fn render_value(value: &FeedbackValue) -> serde_json::Value {
    match value {
        FeedbackValue::Bool(b) => serde_json::Value::from(*b),
        FeedbackValue::Level(level) => serde_json::Value::from(*level),
        FeedbackValue::Decibels(db) => serde_json::Value::from(*db),
        FeedbackValue::Integer(i) => serde_json::Value::from(*i),
        FeedbackValue::Text(text) => serde_json::Value::from(text.as_str()),
    }
}

fn render_feedback(update: &Feedback, json: bool) -> String {
    if json {
        serde_json::json!({
            "controlPoint": update.control_point,
            "attribute": update.attribute,
            "value": render_value(&update.value),
        })
        .to_string()
    } else {
        format!("{:<20} {:<24} {}", update.control_point, update.attribute, render_value(&update.value))
    }
}

/// Run one connection until it drops or the user interrupts
///
/// Returns `true` when the user asked to stop.
async fn run_session(args: &Args, definitions: &[tesira_client::ControlPointConfig]) -> Result<bool> {
    let (transport, events) = TcpLineTransport::connect(args.address.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", args.address))?;
    let client = TesiraClient::with_control_points(args.client_config(), transport.clone(), definitions)
        .context("Failed to create client")?;
    info!("Connected to {} with {} control point(s)", args.address, definitions.len());

    let mut feedback = client.feedback();
    let mut session = client.session_events();
    let json = args.json;

    let printer = tokio::spawn(async move {
        loop {
            tokio::select! {
                update = feedback.recv() => match update {
                    Ok(update) => println!("{}", render_feedback(&update, json)),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => warn!("Dropped {} feedback update(s)", n),
                    Err(_) => break,
                },
                event = session.recv() => match event {
                    Ok(SessionEvent::CycleCompleted) => info!("All subscriptions in place"),
                    Ok(SessionEvent::SubscriptionsSuspectedDead) => warn!("Device stopped answering probes, resubscribing"),
                    Ok(event) => info!("Session event: {:?}", event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => warn!("Dropped {} session event(s)", n),
                    Err(_) => break,
                },
            }
        }
    });

    let stopped = tokio::select! {
        _ = client.run(events) => false,
        _ = watch_disconnect(&client) => false,
        _ = tokio::signal::ctrl_c() => true,
    };

    client.shutdown();
    transport.close();
    printer.abort();

    if !stopped {
        info!("Device identity at disconnect: {:?}", client.device_identity());
    }
    Ok(stopped)
}

/// Resolve once the client reports the connection lost
async fn watch_disconnect(client: &TesiraClient) {
    let mut events = client.session_events();
    loop {
        match events.recv().await {
            Ok(SessionEvent::ConnectionChanged(tesira_client::ConnectionState::Disconnected)) => return,
            Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
            Err(_) => return,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    args.validate()?;
    init_tracing(&args.log_level);

    let definitions = points::load(&args.points)?;
    info!("Loaded {} control point definition(s)", definitions.len());

    let reconnect_delay = Duration::from_secs(args.reconnect_delay);
    loop {
        match run_session(&args, &definitions).await {
            Ok(true) => break,
            Ok(false) => warn!("Connection to {} lost", args.address),
            Err(e) => error!("{:#}", e),
        }

        info!("Reconnecting in {}s", reconnect_delay.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Stopped");
    Ok(())
}
