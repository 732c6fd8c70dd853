//! catalog-sync command line
//!
//! stdout carries the NDJSON event stream (or the JSON result of read-only
//! commands); human-readable logs go to stderr and the log file.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use catalog_sync_lib::application::{
    CatalogPurge, EventEmitter, PriceBumpOptions, PriceOps, ProductSource, SyncService,
};
use catalog_sync_lib::domain::{
    ApplyMarginOn, CatalogApi, MediaMode, ProcessDirection, RawSyncOptions, SyncEvent,
};
use catalog_sync_lib::infrastructure::{
    AppConfig, ConfigRepository, ErrorClassifier, HttpClient, JsonFileConfigRepository, ManualEntry,
    ManualSource, NdjsonSink, NewSystemOrigin, NewSystemSource, ReportStore, WooCommerceClient, XmlFeedSource,
    csv_export::default_export_path, export_csv, init_logging_with_config, logging::log_system_info, preview,
};

#[derive(Parser, Debug)]
#[command(name = "catalog-sync", version, about = "Product feed to WooCommerce synchronizer")]
struct Cli {
    /// Config file (default: <user config dir>/catalog-sync/config.json)
    #[arg(long, global = true, env = "CATALOG_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Also append every event to this .jsonl file
    #[arg(long, global = true)]
    events_file: Option<PathBuf>,

    /// Overrides logging.level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    /// Reconcile a product source against the store
    Sync {
        #[command(flatten)]
        options: SyncFlags,
        #[command(subcommand)]
        source: SourceArgs,
    },
    /// Print the first mapped products of a source without touching the store
    Preview {
        #[command(subcommand)]
        source: SourceArgs,
    },
    /// Inspect saved run reports
    Reports {
        #[command(subcommand)]
        action: ReportsCommand,
    },
    /// Bulk price operations on the live catalog
    Prices {
        #[command(subcommand)]
        action: PricesCommand,
    },
    /// Write a source as a WooCommerce import CSV laid out like a sample export
    ExportCsv {
        /// A CSV exported from the target store; only its header row is read
        #[arg(long)]
        sample: PathBuf,
        /// Defaults to <sources.export_dir>/export-csv-<millis>.csv
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(subcommand)]
        source: SourceArgs,
    },
    /// Delete every product and category in the store
    Purge {
        /// Required confirmation
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum SourceArgs {
    /// Local XML feed
    Xml {
        /// Defaults to sources.xml_path
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// New-system JSON API, or a saved snapshot with --file
    NewSystem {
        #[arg(long, conflicts_with = "file")]
        url: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        image_base_url: Option<String>,
    },
    /// One hand-entered product
    Manual {
        #[arg(long)]
        sku: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        regular_price: Option<String>,
        #[arg(long)]
        sale_price: Option<String>,
        #[arg(long)]
        stock: Option<i64>,
        #[arg(long)]
        manage_stock: Option<bool>,
    },
}

/// Each flag overrides the persisted `sync` defaults when given
#[derive(Args, Debug, Default)]
struct SyncFlags {
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    delete_missing: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    create_new: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    update_existing: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    stock_only: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    stock_and_price_only: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    update_images: Option<bool>,
    /// Legacy: create only, never update or delete
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    only_create_new: Option<bool>,
    /// Profit margin in percent
    #[arg(long, allow_hyphen_values = true)]
    margin: Option<f64>,
    /// regular | sale | both
    #[arg(long)]
    apply_margin_on: Option<ApplyMarginOn>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    round_to_integer: Option<bool>,
    /// upload | prefer_existing_by_filename | none
    #[arg(long)]
    media_mode: Option<MediaMode>,
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    per_item_delay_ms: Option<u64>,
    /// asc | desc
    #[arg(long)]
    direction: Option<ProcessDirection>,
}

impl From<SyncFlags> for RawSyncOptions {
    fn from(flags: SyncFlags) -> Self {
        Self {
            version: None,
            only_create_new: flags.only_create_new,
            delete_missing: flags.delete_missing,
            do_create_new: flags.create_new,
            do_update_existing: flags.update_existing,
            update_stock_only: flags.stock_only,
            update_stock_and_price_only: flags.stock_and_price_only,
            update_images_on_update: flags.update_images,
            profit_margin_percent: flags.margin,
            apply_margin_on: flags.apply_margin_on,
            round_to_integer: flags.round_to_integer,
            media_mode: flags.media_mode,
            limit: flags.limit,
            per_item_delay_ms: flags.per_item_delay_ms,
            process_direction: flags.direction,
        }
    }
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum ReportsCommand {
    /// History file names, newest first
    List,
    Latest,
    Show { filename: String },
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum PricesCommand {
    /// Raise (or lower) prices by a percentage
    Bump {
        #[arg(long, allow_hyphen_values = true)]
        percent: f64,
        #[arg(long, default_value = "regular")]
        apply_on: ApplyMarginOn,
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        round_to_integer: bool,
        #[arg(long, value_delimiter = ',')]
        category_ids: Vec<u64>,
        #[arg(long, value_delimiter = ',')]
        tag_ids: Vec<u64>,
        #[arg(long)]
        category_name: Option<String>,
        #[arg(long)]
        tag_name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum ConfigCommand {
    /// Effective configuration, secrets masked
    Show,
    /// Write the default file if none exists and print its path
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let repository = match &cli.config {
        Some(path) => JsonFileConfigRepository::new(path),
        None => JsonFileConfigRepository::default_location()?,
    };
    let mut config = repository.load().await.context("Failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    init_logging_with_config(config.logging.clone())?;
    log_system_info();

    match cli.command {
        Command::Sync { options, source } => {
            sync(&config, source, options.into(), cli.events_file).await
        }
        Command::Preview { source } => {
            let source = build_source(&config, source, false)?;
            let rows = preview(source.as_ref(), &EventEmitter::detached()).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::ExportCsv { sample, output, source } => {
            let source = build_source(&config, source, false)?;
            let output = match output {
                Some(path) => path,
                None => default_export_path(&config.export_dir()?),
            };
            let summary = export_csv(source.as_ref(), &sample, &output, &EventEmitter::detached()).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Reports { action } => {
            let store = ReportStore::new(config.reports_dir()?, config.reports.retention)?;
            match action {
                ReportsCommand::List => {
                    for name in store.list().await? {
                        println!("{name}");
                    }
                }
                ReportsCommand::Latest => println!("{}", serde_json::to_string_pretty(&store.latest().await?)?),
                ReportsCommand::Show { filename } => {
                    println!("{}", serde_json::to_string_pretty(&store.read(&filename).await?)?);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Prices {
            action:
                PricesCommand::Bump {
                    percent,
                    apply_on,
                    round_to_integer,
                    category_ids,
                    tag_ids,
                    category_name,
                    tag_name,
                },
        } => {
            let options = PriceBumpOptions {
                percent,
                apply_on,
                round_to_integer,
                category_ids,
                tag_ids,
                category_name_includes: category_name,
                tag_name_includes: tag_name,
            };
            let catalog = build_catalog(&config)?;
            let (events, sink) = spawn_event_sink(cli.events_file);
            let result = PriceOps::new(catalog, events.clone()).bump_prices(&options).await;
            let code = match result {
                Ok(result) => {
                    events.info(format!("Prices updated: {}/{}", result.updated, result.total));
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    events.emit(SyncEvent::fatal(e.to_string()));
                    ExitCode::FAILURE
                }
            };
            finish_sink(events, sink).await;
            Ok(code)
        }
        Command::Purge { yes } => {
            if !yes {
                bail!("purge deletes every product and category; pass --yes to confirm");
            }
            let catalog = build_catalog(&config)?;
            let (events, sink) = spawn_event_sink(cli.events_file);
            let code = match CatalogPurge::new(catalog, events.clone()).purge_all().await {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => {
                    events.emit(SyncEvent::fatal(e.to_string()));
                    ExitCode::FAILURE
                }
            };
            finish_sink(events, sink).await;
            Ok(code)
        }
        Command::Config { action } => {
            match action {
                ConfigCommand::Show => println!("{}", serde_json::to_string_pretty(&masked(&config))?),
                ConfigCommand::Init => println!("{}", repository.path().display()),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn sync(
    config: &AppConfig,
    source: SourceArgs,
    overrides: RawSyncOptions,
    events_file: Option<PathBuf>,
) -> Result<ExitCode> {
    let (events, sink) = spawn_event_sink(events_file);

    let prepared = config
        .catalog
        .require_credentials()
        .map_err(anyhow::Error::from)
        .and_then(|()| {
            Ok((
                build_catalog(config)?,
                build_source(config, source, true)?,
                ReportStore::new(config.reports_dir()?, config.reports.retention)?,
            ))
        });
    let (catalog, source, reports) = match prepared {
        Ok(parts) => parts,
        Err(e) => {
            events.emit(SyncEvent::fatal(format!("{e:#}")));
            finish_sink(events, sink).await;
            return Err(e);
        }
    };

    let options = config.sync.clone().overlay(overrides).migrate();
    info!("⚙️ Sync options: {:?}", options);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received, stopping after the current item");
            ctrl_c.cancel();
        }
    });

    let service = SyncService::new(catalog, reports).with_retry_policy(config.retry.clone());
    let result = service.start(source.as_ref(), &options, events.clone(), cancel).await;
    finish_sink(events, sink).await;

    match result {
        Ok(summary) if summary.cancelled => Ok(ExitCode::from(130)),
        Ok(summary) => {
            if let Some(path) = &summary.report_file {
                info!("📝 Report written to {:?}", path);
            }
            if summary.report.has_errors() {
                warn!("⚠️ {} items failed, see the report", summary.report.errors.len());
            }
            Ok(ExitCode::SUCCESS)
        }
        // Already published as a fatal event
        Err(_) => Ok(ExitCode::FAILURE),
    }
}

fn build_catalog(config: &AppConfig) -> Result<Arc<dyn CatalogApi>> {
    config.catalog.require_credentials()?;
    let http = Arc::new(HttpClient::new(config.http.clone())?);
    let classifier = ErrorClassifier::new(&config.conflict).context("Invalid conflict phrase")?;
    Ok(Arc::new(WooCommerceClient::new(&config.catalog, http, classifier)))
}

fn build_source(config: &AppConfig, args: SourceArgs, save_snapshot: bool) -> Result<Box<dyn ProductSource>> {
    match args {
        SourceArgs::Xml { path } => {
            let path = path
                .or_else(|| config.sources.xml_path.clone())
                .context("No XML path: pass --path or set sources.xml_path")?;
            Ok(Box::new(XmlFeedSource::new(path)))
        }
        SourceArgs::NewSystem {
            url,
            file,
            image_base_url,
        } => {
            let origin = match file {
                Some(file) => NewSystemOrigin::File(file),
                None => {
                    let url = url
                        .or_else(|| config.sources.new_api_url.clone())
                        .context("No new-system URL: pass --url or set sources.new_api_url")?;
                    NewSystemOrigin::Api {
                        url,
                        http: Arc::new(HttpClient::new(config.http.clone())?),
                    }
                }
            };
            let mut source = NewSystemSource::new(origin)
                .with_image_base_url(image_base_url.or_else(|| config.sources.new_image_base_url.clone()));
            if save_snapshot {
                source = source.with_snapshot_dir(config.snapshot_dir()?);
            }
            Ok(Box::new(source))
        }
        SourceArgs::Manual {
            sku,
            name,
            regular_price,
            sale_price,
            stock,
            manage_stock,
        } => Ok(Box::new(ManualSource::new(ManualEntry {
            sku,
            name,
            regular_price,
            sale_price,
            stock_quantity: stock,
            manage_stock,
        }))),
    }
}

fn spawn_event_sink(events_file: Option<PathBuf>) -> (EventEmitter, JoinHandle<usize>) {
    let (events, stream) = EventEmitter::channel();
    let handle = tokio::spawn(async move {
        let sink = match events_file {
            Some(path) => match NdjsonSink::stdout().with_file(&path).await {
                Ok(sink) => sink,
                Err(e) => {
                    warn!("⚠️ Event file {:?} unavailable: {}", path, e);
                    NdjsonSink::stdout()
                }
            },
            None => NdjsonSink::stdout(),
        };
        sink.run(stream).await
    });
    (events, handle)
}

/// Drops the last emitter so the sink drains and exits
async fn finish_sink(events: EventEmitter, sink: JoinHandle<usize>) {
    drop(events);
    if let Err(e) = sink.await {
        warn!("Event sink task failed: {}", e);
    }
}

fn masked(config: &AppConfig) -> AppConfig {
    let mut shown = config.clone();
    for secret in [&mut shown.catalog.consumer_key, &mut shown.catalog.consumer_secret] {
        if !secret.is_empty() {
            *secret = "********".to_string();
        }
    }
    shown
}
