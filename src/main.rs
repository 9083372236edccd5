pub mod models {
    pub mod sds;
}

pub mod cli;
pub mod client;
pub mod config;
pub mod db {
    pub mod models;
    pub mod repository;
}
pub mod report;
pub mod schema;
pub mod utils;
pub mod services {
    pub mod export;
    pub mod fake_data;
    pub mod ingest;
    pub mod scheduler;
    pub mod sync;
}

use crate::cli::{Cli, Command};
use crate::client::SdsClient;
use crate::config::Config;
use crate::db::repository::{DeviceScope, FleetRepository};
use crate::report::summary::{self, ReportFilter};
use crate::report::{devices, meters, monitors};
use chrono::Utc;
use crate::services::export::{self, ExportOptions};
use crate::services::sync::{self, SyncOptions};
use crate::services::{fake_data, scheduler};
use diesel::PgConnection;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{debug, error, info, warn};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const TOP_SKUS: usize = 10;

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) if applied.is_empty() => {
            info!("Database schema is up to date");
            Ok(())
        }
        Ok(applied) => {
            let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
            info!("Applied {} database migration(s): {}", applied.len(), names);
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

fn connect(cfg: &Config) -> Result<PgConnection, String> {
    let mut conn = PgConnection::establish(&cfg.database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");
    apply_database_migrations(&mut conn)?;
    Ok(conn)
}

fn login(cfg: &Config) -> Result<SdsClient, String> {
    let (url, key) = cfg.api_credentials()?;
    let client = SdsClient::new(url, key, cfg.max_request_retries)
        .map_err(|e| format!("API login failed (ENCODED_KEY invalid?): {}", e))?;
    info!("Authenticated to fleet API at {}", url);
    Ok(client)
}

fn sync_options(cfg: &Config) -> SyncOptions {
    SyncOptions {
        requests_per_second: cfg.requests_per_second,
        meters_billing_date: cfg.meters_billing_date,
    }
}

fn export_once(conn: &mut PgConnection, cfg: &Config) -> Result<(), String> {
    let opts = ExportOptions {
        dir: &cfg.export_dir,
        default_recipients: &cfg.default_recipients,
        policy: &cfg.reorder_policy,
    };
    export::run(conn, &opts).map(|_| ())
}

pub fn run(cli: &Cli) -> Result<(), String> {
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (interval={}s, sync_enabled={}, export_enabled={}, export_dir={}, rps={}, billing_date={}, max_request_retries={})",
        cfg.sync_interval.as_secs(),
        cfg.sync_enabled,
        cfg.export_enabled,
        cfg.export_dir.display(),
        cfg.requests_per_second
            .map(|v| v.get().to_string())
            .unwrap_or_else(|| "-".to_string()),
        cfg.meters_billing_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string()),
        cfg.max_request_retries
    );

    let mut conn = connect(&cfg)?;
    match cli.command {
        Command::Run => run_scheduled(&mut conn, &cfg),
        Command::Sync => {
            let client = login(&cfg)?;
            sync::sync_all(&mut conn, &client, &sync_options(&cfg)).map(|_| ())
        }
        Command::Export => export_once(&mut conn, &cfg),
        Command::Report => print_report(&mut conn, &cfg, cli),
        Command::Seed => fake_data::run(&mut conn, cli.seed.unwrap_or(fake_data::DEFAULT_SEED)),
    }
}

fn run_scheduled(conn: &mut PgConnection, cfg: &Config) -> Result<(), String> {
    if !cfg.sync_enabled && !cfg.export_enabled {
        info!("Nothing to schedule: SYNC_ENABLED and EXPORT_ENABLED are both off");
        return Ok(());
    }
    let client = if cfg.sync_enabled { Some(login(cfg)?) } else { None };
    let opts = sync_options(cfg);

    info!(
        "Starting loop: interval={}s, sync={}, export={}",
        cfg.sync_interval.as_secs(),
        cfg.sync_enabled,
        cfg.export_enabled
    );
    scheduler::run_loop(cfg.sync_interval, None, |_| {
        if let Some(client) = client.as_ref() {
            sync::sync_all(conn, client, &opts)?;
        }
        if cfg.export_enabled {
            export_once(conn, cfg)?;
        }
        Ok(())
    });
    Ok(())
}

fn print_report(conn: &mut PgConnection, cfg: &Config, cli: &Cli) -> Result<(), String> {
    let mut repo = FleetRepository::new(conn);
    let consumables = repo.load_consumables()?;
    let device_records = repo.load_devices(DeviceScope::All)?;
    let mut customers = repo.load_active_customers()?;
    let monitor_records = repo.load_monitors()?;
    let readings = repo.load_meter_readings()?;

    let rows = report::build_report_with_policy(&consumables, &device_records, &customers, &cfg.reorder_policy);
    let rows = match cli.customer.as_deref() {
        Some(name) => {
            let recipients = repo.recipients_for_customer(name, &cfg.default_recipients)?;
            info!("Report for {} (recipients: {})", name, recipients.join(", "));
            customers.retain(|c| c.name.as_deref().map(str::trim) == Some(name.trim()));
            ReportFilter::for_customer(name).apply(rows)
        }
        None => rows,
    };
    if rows.is_empty() {
        warn!("Report is empty; run `sync` or `seed` first");
    }

    let s = summary::summarize(&rows, &cfg.reorder_policy, cfg.critical_days);
    info!(
        "Current monitored consumables: {}; <= {} days: {} ({:.2}%); <= {} days: {} ({:.2}%)",
        s.total,
        cfg.reorder_policy.threshold_days,
        s.within_threshold,
        s.within_threshold_pct,
        cfg.critical_days,
        s.critical,
        s.critical_pct
    );
    for band in summary::days_left_bands(&rows) {
        info!("Days left {}: {}", band.label, band.count);
    }
    for band in summary::coverage_bands(&rows) {
        info!("Coverage {}: {}", band.label, band.count);
    }
    for (kind, count) in summary::reorders_by_type(&rows) {
        info!("Reorders {}: {}", kind, count);
    }
    for sku in summary::reorders_by_sku(&rows, TOP_SKUS) {
        info!("Reorders SKU {} ({}): {}", sku.sku, sku.description, sku.count);
    }

    let fleet = devices::fleet_devices(&device_records, &customers);
    let d = devices::summarize_devices(&fleet);
    info!("Devices: {}; monitored: {} ({:.1}%)", d.total, d.monitored, d.monitored_pct);
    for (model, count) in devices::by_model(&fleet) {
        info!("Devices model {}: {}", model, count);
    }
    for place in devices::by_zone_and_location(&fleet) {
        info!("Devices zone {} / location {}: {}", place.zone, place.location, place.count);
    }

    let lines = monitors::monitor_lines(&monitor_records, &device_records, &customers, Utc::now());
    let m = monitors::summarize_monitors(&lines);
    info!(
        "Monitors: {}; online: {}; offline: {}; avg days without report: {}; licences expiring < {} days: {}",
        m.total,
        m.online,
        m.offline,
        m.avg_days_without_report
            .map(|v| format!("{:.1}", v))
            .unwrap_or_else(|| "-".to_string()),
        monitors::LICENCE_WARNING_DAYS,
        m.licences_expiring
    );
    for line in &lines {
        info!(
            "Monitor {} / {}: status={} online={} days_without_report={} days_to_expiry={}",
            line.customer,
            line.monitor.name.as_deref().unwrap_or(&line.monitor.monitor_id),
            line.monitor.status.as_deref().unwrap_or("-"),
            line.monitor.online.map(|o| o.to_string()).unwrap_or_else(|| "-".to_string()),
            line.days_without_report.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
            line.days_to_expiry.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
        );
    }

    let readings = meters::restrict_to_customers(readings, &device_records, &customers);
    let mt = meters::summarize_meters(&readings);
    let avg = |v: Option<f64>| v.map(|v| format!("{:.0}", v)).unwrap_or_else(|| "-".to_string());
    info!(
        "Meters: {} reading(s) over {} device(s); daily avg engine cycles: {}; mono pages: {}; colour pages: {}",
        mt.readings,
        mt.devices,
        avg(mt.avg_engine_cycles),
        avg(mt.avg_mono_pages),
        avg(mt.avg_colour_pages)
    );
    for latest in meters::latest_per_device(&readings) {
        debug!(
            "Meter {} at {}: engine_cycles={:?} mono={:?} colour={:?}",
            latest.device_id, latest.reading_at, latest.engine_cycles, latest.mono_pages, latest.colour_pages
        );
    }

    if let Some(path) = cli.output.as_deref() {
        let refs: Vec<_> = rows.iter().collect();
        export::write_report_csv(path, &refs)?;
        info!("Wrote {} row(s) to {}", refs.len(), path.display());
    }
    Ok(())
}

fn main() {
    let parsed = cli::parse_args(std::env::args_os().skip(1)).and_then(|cli| cli::load_env(&cli).map(|env| (cli, env)));
    let (cli, loaded_env) = match parsed {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(env) = loaded_env.as_ref() {
        let origin = if env.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, env.path.display());
    }

    info!(
        "fleet-supplies {} (git {}) starting {:?}",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH"),
        cli.command
    );
    if let Err(e) = run(&cli) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
