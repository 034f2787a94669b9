//! fm - HLA federation manager
//!
//! CLI entry point for validating configs, probing the coordination
//! process, and running the built-in demo federation.

use std::fs;
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use colored::Colorize;
use eyre::{Context, Result};
use serde::Serialize;
use tracing::info;

use fedmgr::cli::{Cli, Command, OutputFormat};
use fedmgr::{FederationConfig, FederationSession, PendingEvent, PublisherPort, SubscriberPort};
use rtilink::{AttrValue, DataType, LogicalTime, LoopbackExchange, LoopbackRti, RtiClient, RtigLauncher};

/// Placeholder federation object model for runs without a real FOM on disk
const DEMO_FOM: &str = "(FED\n  (Federation demo)\n  (FEDversion v1.3)\n  (objects\n    (class Vehicle (attribute position))\n    (class Mirror (attribute echo)))\n)\n";

fn setup_logging(level: &str) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fedmgr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to the log file, not stdout/stderr, so command output stays clean
    let log_file = fs::File::create(log_dir.join("fm.log")).context("Failed to create log file")?;
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = FederationConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;

    let level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    setup_logging(&level).context("Failed to setup logging")?;

    info!(
        federation = %config.federation.name,
        federate = %config.federate.name,
        "fm starting"
    );

    // Dispatch command
    match cli.command {
        Some(Command::Run { echo, stop, format }) => cmd_run(config, echo, stop, format),
        Some(Command::Validate { format }) => cmd_validate(&config, format),
        Some(Command::Probe { port }) => cmd_probe(&config, port),
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            Ok(())
        }
    }
}

/// Check the config and print the effective settings
fn cmd_validate(config: &FederationConfig, format: OutputFormat) -> Result<()> {
    config.validate()?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Text => {
            println!("{} Configuration is valid", "✓".green());
            println!();
            println!("Federation: {}", config.federation.name.cyan());
            println!("  FOM file:   {}", config.federation.fom_file.display());
            if config.federation.sync_point.is_empty() {
                println!("  Sync point: {}", "(none)".dimmed());
            } else {
                println!("  Sync point: {}", config.federation.sync_point);
            }
            println!("Federate:   {}", config.federate.name.cyan());
            println!(
                "  Regulating:  {} (lookahead {})",
                config.federate.time_regulating, config.federate.lookahead
            );
            println!("  Constrained: {}", config.federate.time_constrained);
            let advance = if config.federate.event_driven {
                "event-driven"
            } else {
                "time-stepped"
            };
            println!("  Advance:     {}", advance);
            println!(
                "  Window:      {} to {} by {}",
                config.federate.start_time, config.federate.stop_time, config.federate.step
            );
            let mode = if config.rtig.manage { "managed" } else { "external" };
            println!("Rtig:       port {} ({})", config.rtig.port, mode);
        }
    }

    Ok(())
}

/// Check whether something is serving the coordination port
fn cmd_probe(config: &FederationConfig, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.rtig.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    match TcpStream::connect_timeout(&addr, Duration::from_millis(500)) {
        Ok(_) => println!("{} Coordination process is serving on port {}", "✓".green(), port),
        Err(_) => println!("{} No coordination process serving on port {}", "✗".yellow(), port),
    }

    Ok(())
}

/// Outcome of one demo federation run
#[derive(Serialize)]
struct RunSummary {
    federation: String,
    federate: String,
    #[serde(rename = "final-time")]
    final_time: f64,
    steps: u32,
    sent: u32,
    received: u32,
}

/// Run the built-in demo federate, optionally against an in-process echo peer
fn cmd_run(mut config: FederationConfig, echo: bool, stop: Option<f64>, format: OutputFormat) -> Result<()> {
    if let Some(stop) = stop {
        config.federate.stop_time = stop;
    }
    config.validate()?;

    // Materialize a demo FOM when the configured one is absent
    let mut fom_guard = None;
    if !config.federation.fom_file.exists() {
        let path = std::env::temp_dir().join(format!("fm-demo-{}.fed", std::process::id()));
        fs::write(&path, DEMO_FOM).context("Failed to write demo FOM")?;
        config.federation.fom_file = path.clone();
        fom_guard = Some(path);
    }

    let exchange = LoopbackExchange::new();

    // The echo peer must be an execution member before the primary registers
    // the startup sync point, or it would never see the announcement
    let peer = if echo {
        let (tx, rx) = mpsc::channel();
        let peer_config = echo_config(&config);
        let endpoint = exchange.endpoint();
        let handle = thread::spawn(move || run_echo_peer(peer_config, endpoint, tx));
        rx.recv().map_err(|_| eyre::eyre!("Echo peer failed before joining"))?;
        Some(handle)
    } else {
        None
    };

    let summary = run_primary(&config, Box::new(exchange.endpoint()))?;

    let echoed = match peer {
        Some(handle) => {
            let mirrored = handle
                .join()
                .map_err(|_| eyre::eyre!("Echo peer thread panicked"))?
                .context("Echo peer failed")?;
            Some(mirrored)
        }
        None => None,
    };

    if let Some(path) = fom_guard {
        let _ = fs::remove_file(&path);
    }

    print_summary(&summary, echoed, format)
}

/// Publisher port for one scalar attribute
struct ScalarPublisher {
    name: &'static str,
    class: &'static str,
    data_type: DataType,
}

impl PublisherPort for ScalarPublisher {
    fn bound_name(&self) -> &str {
        self.name
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn class_name(&self) -> &str {
        self.class
    }
}

/// Subscriber port that queues matured events for the run loop
struct CollectingSubscriber {
    name: &'static str,
    class: &'static str,
    data_type: DataType,
    received: Arc<Mutex<Vec<PendingEvent>>>,
}

impl SubscriberPort for CollectingSubscriber {
    fn bound_name(&self) -> &str {
        self.name
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn class_name(&self) -> &str {
        self.class
    }

    fn deliver(&mut self, event: PendingEvent) {
        self.received.lock().unwrap().push(event);
    }
}

/// The primary demo federate: publishes a ramp on `position`, listens on
/// `echo`
fn run_primary(config: &FederationConfig, client: Box<dyn RtiClient>) -> Result<RunSummary> {
    let mut session = FederationSession::new(config.clone(), client)?;
    session.add_publisher(&ScalarPublisher {
        name: "position",
        class: "Vehicle",
        data_type: DataType::Double,
    })?;
    let received = Arc::new(Mutex::new(Vec::new()));
    session.add_subscriber(Box::new(CollectingSubscriber {
        name: "echo",
        class: "Mirror",
        data_type: DataType::Double,
        received: Arc::clone(&received),
    }))?;

    if config.rtig.manage {
        let launcher = RtigLauncher::new(&config.rtig.program, config.rtig.port).with_settle(config.rtig.settle());
        session.start_coordination(Box::new(launcher))?;
    }

    // Wrap up even on a failed run so joined peers are not left waiting
    let outcome = drive_primary(&mut session, config);
    let wrap = session.wrapup();
    let (final_time, steps, sent) = outcome?;
    wrap?;

    let received = received.lock().unwrap().len() as u32;
    Ok(RunSummary {
        federation: config.federation.name.clone(),
        federate: config.federate.name.clone(),
        final_time: final_time.as_secs_f64(),
        steps,
        sent,
        received,
    })
}

fn drive_primary(session: &mut FederationSession, config: &FederationConfig) -> Result<(LogicalTime, u32, u32)> {
    session.join()?;
    session.initialize()?;

    let stop = LogicalTime::new(config.federate.stop_time)?;
    let step = config.federate.step;
    let mut t = session.current_time();
    let mut sent = 0u32;
    let mut steps = 0u32;
    while t < stop {
        let value = t.as_secs_f64() * 1.5;
        session.publish("position", AttrValue::Double(value), t)?;
        sent += 1;
        let next = t.offset_by(step).min(stop);
        t = session.request_advance(next)?;
        steps += 1;
    }

    Ok((t, steps, sent))
}

fn echo_config(config: &FederationConfig) -> FederationConfig {
    let mut peer = config.clone();
    peer.federate.name = format!("{}-echo", config.federate.name);
    peer.federation.register_sync_point = false;
    peer.trace.enabled = false;
    peer
}

/// The echo peer: mirrors every `position` update back on `echo`
fn run_echo_peer(config: FederationConfig, client: LoopbackRti, joined: mpsc::Sender<()>) -> Result<u32> {
    let mut session = FederationSession::new(config.clone(), Box::new(client))?;
    session.add_publisher(&ScalarPublisher {
        name: "echo",
        class: "Mirror",
        data_type: DataType::Double,
    })?;
    let received = Arc::new(Mutex::new(Vec::new()));
    session.add_subscriber(Box::new(CollectingSubscriber {
        name: "position",
        class: "Vehicle",
        data_type: DataType::Double,
        received: Arc::clone(&received),
    }))?;

    session.join()?;
    let _ = joined.send(());

    let outcome = drive_echo(&mut session, &config, &received);
    let wrap = session.wrapup();
    let mirrored = outcome?;
    wrap?;
    Ok(mirrored)
}

fn drive_echo(
    session: &mut FederationSession,
    config: &FederationConfig,
    received: &Arc<Mutex<Vec<PendingEvent>>>,
) -> Result<u32> {
    session.initialize()?;

    let stop = LogicalTime::new(config.federate.stop_time)?;
    let step = config.federate.step;
    let mut t = session.current_time();
    let mut mirrored = 0u32;
    while t < stop {
        let next = t.offset_by(step).min(stop);
        t = session.request_advance(next)?;
        let pending: Vec<PendingEvent> = received.lock().unwrap().drain(..).collect();
        for event in pending {
            session.publish("echo", event.value.value().clone(), t)?;
            mirrored += 1;
        }
    }

    Ok(mirrored)
}

fn print_summary(summary: &RunSummary, echoed: Option<u32>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let mut json = serde_json::to_value(summary)?;
            if let Some(echoed) = echoed {
                json["echoed"] = serde_json::json!(echoed);
            }
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("{} Federation run complete", "✓".green());
            println!("  Federation: {}", summary.federation.cyan());
            println!("  Federate:   {}", summary.federate.cyan());
            println!("  Final time: {}", summary.final_time);
            println!("  Steps:      {}", summary.steps);
            println!("  Sent:       {}", summary.sent);
            println!("  Received:   {}", summary.received);
            if let Some(echoed) = echoed {
                println!("  Echoed:     {}", echoed);
            }
        }
    }

    Ok(())
}
