use clap::{Parser, Subcommand};
use installments::application::engine::ReconciliationEngine;
use installments::application::queries::{PageRequest, PlanQueries};
use installments::config::{
    DEFAULT_GATEWAY_URL, DEFAULT_NOTIFY_URL, DEFAULT_PAGE_SIZE, DEFAULT_RETURN_URL,
    GatewaySettings, Settings,
};
use installments::domain::correlation::PlanReference;
use installments::domain::event::EventKind;
use installments::domain::ports::{EventPublisherRef, PaymentGatewayRef, PlanStoreRef};
use installments::domain::principal::Principal;
use installments::infrastructure::event_bus::{EventBus, LogEventHandler};
use installments::infrastructure::in_memory::InMemoryPlanStore;
#[cfg(feature = "storage-rocksdb")]
use installments::infrastructure::rocksdb::RocksDBStore;
use installments::infrastructure::sandbox_gateway::SandboxGateway;
use installments::interfaces::csv::notification_reader::NotificationReader;
use installments::interfaces::csv::plan_writer::{PlanSummary, PlanWriter};
use installments::interfaces::seed::Seed;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "INSTALLMENTS_DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    /// JSON file with orders and plans to load before running the command
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    /// Shared secret used to sign and verify gateway parameters
    #[arg(
        long,
        env = "INSTALLMENTS_GATEWAY_SECRET",
        hide_env_values = true,
        default_value = "sandbox-secret",
        global = true
    )]
    gateway_secret: String,

    #[arg(long, default_value = DEFAULT_GATEWAY_URL, global = true)]
    gateway_url: String,

    #[arg(long, default_value = DEFAULT_RETURN_URL, global = true)]
    return_url: String,

    #[arg(long, default_value = DEFAULT_NOTIFY_URL, global = true)]
    notify_url: String,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay captured gateway notifications and print plan summaries as CSV
    ///
    /// Rows without a `sign` value are signed locally with the configured
    /// secret, so their signature check proves nothing about their origin.
    Replay {
        /// Notifications CSV file
        input: PathBuf,
    },
    /// Start a payment for the next unpaid step of a plan
    Initiate {
        #[arg(long)]
        plan: String,
        #[arg(long)]
        principal: u64,
    },
    /// Show a plan with its repayment schedule
    Show {
        #[arg(long)]
        plan: String,
        #[arg(long)]
        principal: u64,
    },
    /// List the plans owned by a principal
    List {
        #[arg(long)]
        principal: u64,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            db_path: self.db_path.clone(),
            page_size: DEFAULT_PAGE_SIZE,
            gateway: GatewaySettings {
                url: self.gateway_url.clone(),
                secret: self.gateway_secret.clone(),
                return_url: self.return_url.clone(),
                notify_url: self.notify_url.clone(),
                ..GatewaySettings::default()
            },
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<PlanStoreRef> {
    match db_path {
        Some(path) => {
            info!(path = %path.display(), "opening persistent plan store");
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryPlanStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<PlanStoreRef> {
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryPlanStore::new()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{rendered}");
    Ok(())
}

fn plan_reference(value: String) -> Result<PlanReference> {
    PlanReference::new(value).into_diagnostic()
}

async fn replay(
    engine: &ReconciliationEngine,
    gateway: &SandboxGateway,
    store: &PlanStoreRef,
    input: PathBuf,
) -> Result<()> {
    let file = File::open(input).into_diagnostic()?;
    let reader = NotificationReader::new(file);
    for record in reader.notifications() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "unreadable notification row");
                continue;
            }
        };

        let out_trade_no = record.out_trade_no.clone();
        // Unsigned rows are trusted fixtures, not verified gateway traffic.
        let raw = if record.is_signed() {
            record.into_callback()
        } else {
            gateway.signed(&record.into_callback()).into_diagnostic()?
        };

        match engine.handle_notification(&raw).await {
            Ok(ack) => info!(%out_trade_no, ack = ack.body(), "notification handled"),
            Err(e) => warn!(
                %out_trade_no,
                error = %e,
                redelivery_expected = e.is_retryable_by_gateway(),
                "notification not acknowledged"
            ),
        }
    }

    let mut summaries = Vec::new();
    for plan in store.get_all().await.into_diagnostic()? {
        let items = store.get_items(&plan.reference).await.into_diagnostic()?;
        summaries.push(PlanSummary::new(&plan, &items));
    }

    let stdout = io::stdout();
    let mut writer = PlanWriter::new(stdout.lock());
    writer.write_summaries(summaries).into_diagnostic()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let settings = cli.settings();

    let store = open_store(settings.db_path.clone())?;
    if let Some(path) = &cli.seed {
        let seed = Seed::from_reader(File::open(path).into_diagnostic()?).into_diagnostic()?;
        let loaded = seed.import(store.as_ref()).await.into_diagnostic()?;
        info!(loaded, "seed imported");
    }

    let gateway = Arc::new(SandboxGateway::new(settings.gateway.clone()));
    let bus = EventBus::new().subscribe(EventKind::OrderPaid, Arc::new(LogEventHandler));
    let publisher: EventPublisherRef = Arc::new(bus);
    let gateway_ref: PaymentGatewayRef = gateway.clone();
    let engine = ReconciliationEngine::new(
        store.clone(),
        gateway_ref,
        publisher,
        settings.gateway.clone(),
    );
    let queries = PlanQueries::new(store.clone());

    match cli.command {
        Command::Replay { input } => replay(&engine, &gateway, &store, input).await?,
        Command::Initiate { plan, principal } => {
            let directive = engine
                .initiate(&Principal::new(principal), &plan_reference(plan)?)
                .await
                .into_diagnostic()?;
            print_json(&directive)?;
        }
        Command::Show { plan, principal } => {
            let detail = queries
                .show_plan(&Principal::new(principal), &plan_reference(plan)?)
                .await
                .into_diagnostic()?;
            print_json(&detail)?;
        }
        Command::List { principal, page } => {
            let request = PageRequest::new(page, settings.page_size);
            let page = queries
                .list_plans(&Principal::new(principal), request)
                .await
                .into_diagnostic()?;
            print_json(&page)?;
        }
    }

    Ok(())
}
