//! medvend — command-line front end.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │  SerialLink / SimulatedDispenser   JsonStore   LogEventSink  │
//! │  (Link)                            (Store)     (EventSink)   │
//! │                                                              │
//! │  ─────────────── Port Trait Boundary ───────────────────     │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────┐      │
//! │  │  DispenserWorker ─▶ FulfillmentOrchestrator         │      │
//! │  │  Protocol · Ledger · Stage machine                  │      │
//! │  └────────────────────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tracing_subscriber::EnvFilter;

use medvend::adapters::delay::StdDelay;
use medvend::adapters::json_store::{JsonStore, StoreDocument};
use medvend::adapters::log_sink::LogEventSink;
use medvend::adapters::serial::SerialLink;
use medvend::adapters::sim::SimulatedDispenser;
use medvend::app::orchestrator::{FulfillmentOrchestrator, FulfillmentReport};
use medvend::app::ports::PatientStore;
use medvend::app::worker::DispenserWorker;
use medvend::config::DispenserConfig;
use medvend::diagnostics::ReconciliationJournal;
use medvend::error::OrchestrationError;
use medvend::ledger::InventoryLedger;
use medvend::link::Link;
use medvend::model::{PatientId, PatientRecord, Prescription, StockEntry};
use medvend::protocol::{DispenserProtocol, ProtocolSettings};

/// Dispense prescriptions through a serial pill dispenser.
#[derive(Parser)]
#[command(name = "medvend", version)]
#[command(about = "Prescription fulfillment for a serial pill dispenser", long_about = None)]
struct Cli {
    /// JSON configuration file (defaults apply when absent)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial port, overrides the config
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate, overrides the config
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Patient/inventory store file, overrides the config
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Run against the built-in simulated dispenser
    #[arg(long, global = true)]
    simulate: bool,

    /// Card the simulated reader presents on the next scan
    #[arg(long, global = true, requires = "simulate")]
    sim_card: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dispense a patient's prescriptions.
    ///
    /// Without a patient id the card reader is scanned first.
    Fulfill {
        /// Patient identifier
        patient: Option<String>,

        /// JSON list of prescriptions to dispense instead of the stored ones
        #[arg(long)]
        prescriptions: Option<PathBuf>,
    },

    /// Read a patient card and print the identifier.
    Scan,

    /// Drive the mechanism back to its home position.
    Home,

    /// List serial ports.
    Ports,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Command::Ports = cli.command {
        for name in SerialLink::available_ports().context("enumerating serial ports")? {
            println!("{name}");
        }
        return Ok(());
    }

    let mut config = DispenserConfig::load(cli.config.as_deref()).context("loading config")?;
    if let Some(port) = &cli.port {
        config.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.baud_rate = baud;
    }
    if let Some(store) = &cli.store {
        config.store_path = store.clone();
    }
    medvend::config::validate(&config).context("validating overrides")?;

    let link: Box<dyn Link + Send> = if cli.simulate {
        let mut sim = SimulatedDispenser::new();
        if let Some(card) = &cli.sim_card {
            sim.present_card(card);
        }
        info!("using simulated dispenser");
        Box::new(sim)
    } else {
        Box::new(
            SerialLink::from_config(&config)
                .with_context(|| format!("opening {}", config.port))?,
        )
    };

    let store: Box<dyn PatientStore + Send> = if cli.simulate && !config.store_path.exists() {
        warn!(
            "{} not found, using demo records",
            config.store_path.display()
        );
        Box::new(JsonStore::in_memory(demo_document()?))
    } else {
        Box::new(
            JsonStore::open(&config.store_path)
                .with_context(|| format!("opening store {}", config.store_path.display()))?,
        )
    };

    let protocol = DispenserProtocol::new(link, StdDelay::new(), ProtocolSettings::from(&config));
    let orchestrator = FulfillmentOrchestrator::new(protocol, InventoryLedger::new(store));
    let worker = DispenserWorker::spawn(orchestrator, LogEventSink::new())
        .context("starting dispenser worker")?;
    let journal = ReconciliationJournal::new(&config.journal_path);

    let result = match cli.command {
        Command::Scan => match worker.scan()?.wait()?.context("scanning")? {
            Some(id) => {
                println!("{id}");
                Ok(())
            }
            None => bail!("no card presented"),
        },
        Command::Home => {
            worker.home()?.wait()?.context("homing")?;
            println!("homed");
            Ok(())
        }
        Command::Fulfill {
            patient,
            prescriptions,
        } => {
            let patient = match patient {
                Some(p) => p,
                None => match worker.scan()?.wait()?.context("scanning")? {
                    Some(id) => id,
                    None => bail!("no card presented"),
                },
            };
            let list = prescriptions.map(|path| load_prescriptions(&path)).transpose()?;
            match worker.submit(&patient, list)?.wait()? {
                Ok(report) => {
                    print_report(&report);
                    Ok(())
                }
                Err(e) => {
                    for outcome in e.outcomes() {
                        println!("  {outcome}");
                    }
                    if let OrchestrationError::Reconciliation { alert, .. } = &e {
                        journal
                            .append(alert)
                            .with_context(|| format!("journaling alert: {alert}"))?;
                    }
                    Err(e).context("fulfillment stopped")
                }
            }
        }
        Command::Ports => Ok(()),
    };

    worker.shutdown();
    result
}

fn load_prescriptions(path: &Path) -> Result<Vec<Prescription>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_report(report: &FulfillmentReport) {
    println!("patient {}", report.patient);
    for outcome in &report.outcomes {
        println!("  {outcome}");
    }
    for medicine in &report.skipped {
        println!("  {medicine}: skipped");
    }
    println!(
        "{} unit(s) dispensed, {}",
        report.units_dispensed(),
        if report.is_fully_delivered() {
            "all delivered"
        } else {
            "NOT all delivered"
        }
    );
}

/// Records for `--simulate` runs without a store file.
fn demo_document() -> Result<StoreDocument> {
    Ok(StoreDocument {
        patients: vec![PatientRecord {
            id: PatientId::parse("PATIENT_01")?,
            name: "Demo Patient".into(),
            balance_cents: 10_000,
            prescriptions: vec![
                Prescription::new("Paracetamol", 20, 1)?,
                Prescription::new("Amoxicillin", 25, 2)?,
            ],
        }],
        stock: vec![
            StockEntry {
                slot: 1,
                medicine: "Paracetamol".into(),
                available_count: 200,
                unit_cost_cents: 10,
            },
            StockEntry {
                slot: 2,
                medicine: "Amoxicillin".into(),
                available_count: 100,
                unit_cost_cents: 35,
            },
        ],
    })
}
