//! Per-customer consumable snapshots for the downstream mailer.
//!
//! One `detalle_consumibles_<customer>.csv` per ACTIVE customer plus a
//! `manifest.json` naming each file, its row count and its recipients.
//! Files are written to a temporary sibling and renamed into place, so a
//! reader never sees a half-written snapshot.

use crate::db::repository::{DeviceScope, FleetRepository, recipients_for_name};
use crate::report::summary::ReportFilter;
use crate::report::{self, CustomerRecord, EstimatedRow, REPORT_COLUMNS, ReorderPolicy};
use crate::utils::file_slug;
use chrono::{DateTime, Utc};
use diesel::PgConnection;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedFile {
    pub customer: String,
    pub file: String,
    pub rows: usize,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub generated_at: DateTime<Utc>,
    pub files: Vec<ExportedFile>,
}

pub struct ExportOptions<'a> {
    pub dir: &'a Path,
    pub default_recipients: &'a [String],
    pub policy: &'a ReorderPolicy,
}

/// Build the monitored-fleet report from the store and export it per customer.
pub fn run(conn: &mut PgConnection, opts: &ExportOptions<'_>) -> Result<Manifest, String> {
    let mut repo = FleetRepository::new(conn);
    let customers = repo.load_active_customers()?;
    let consumables = repo.load_consumables()?;
    let devices = repo.load_devices(DeviceScope::MonitoredOnly)?;
    let monitors = repo.load_monitors()?;
    info!(
        "Export: {} active customer(s), {} consumable(s), {} monitored device(s), {} monitor(s)",
        customers.len(),
        consumables.len(),
        devices.len(),
        monitors.len()
    );

    let rows = report::build_report_with_policy(&consumables, &devices, &customers, opts.policy);
    let rows = report::restrict_to_monitored_customers(rows, &monitors);
    export_snapshot(opts.dir, &customers, &rows, opts.default_recipients)
}

/// Write one CSV per customer name and the manifest. Customers sharing a
/// name share one file and their addresses are merged. A customer whose file
/// cannot be written is logged and left out of the manifest.
pub fn export_snapshot(
    dir: &Path,
    customers: &[CustomerRecord],
    rows: &[EstimatedRow],
    default_recipients: &[String],
) -> Result<Manifest, String> {
    fs::create_dir_all(dir).map_err(|e| format!("create export dir {} failed: {}", dir.display(), e))?;

    let mut done: BTreeSet<&str> = BTreeSet::new();
    let mut taken: HashSet<String> = HashSet::new();
    let mut files = Vec::new();
    for customer in customers {
        let name = match customer.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n,
            _ => {
                warn!("Export: skipping customer {} without a name", customer.customer_id);
                continue;
            }
        };
        if !done.insert(name) {
            debug!("Export: customer name {} already exported", name);
            continue;
        }

        let filter = ReportFilter::for_customer(name);
        let selected: Vec<&EstimatedRow> = rows.iter().filter(|r| filter.matches(r)).collect();
        let file = report_file_name(name, &mut taken);
        if let Err(e) = write_report_csv(&dir.join(&file), &selected) {
            warn!("Export: skipping customer {}: {}", name, e);
            continue;
        }

        let recipients = recipients_for_name(customers, name, default_recipients);
        if recipients.is_empty() {
            warn!("Export: no recipients for {} and TO_ADDRS is empty", name);
        }
        debug!("Export: {} -> {} ({} rows)", name, file, selected.len());
        files.push(ExportedFile {
            customer: name.to_string(),
            file,
            rows: selected.len(),
            recipients,
        });
    }

    let manifest = Manifest {
        generated_at: Utc::now(),
        files,
    };
    let json = serde_json::to_vec_pretty(&manifest).map_err(|e| format!("encode manifest failed: {}", e))?;
    write_atomically(&dir.join(MANIFEST_FILE), |out| {
        out.write_all(&json).map_err(|e| e.to_string())
    })?;
    info!("Export: wrote {} customer file(s) to {}", manifest.files.len(), dir.display());
    Ok(manifest)
}

/// `detalle_consumibles_<slug>.csv`, numbered `_2`, `_3`... when another name
/// already claimed the same file. Names are compared case-insensitively so
/// distinct customers never share a file on any filesystem.
fn report_file_name(name: &str, taken: &mut HashSet<String>) -> String {
    let slug = file_slug(name);
    let mut file = format!("detalle_consumibles_{}.csv", slug);
    let mut n = 1;
    while !taken.insert(file.to_lowercase()) {
        n += 1;
        file = format!("detalle_consumibles_{}_{}.csv", slug, n);
    }
    file
}

/// Write the report columns for `rows` to `path`. The header is written even
/// when there are no rows.
pub fn write_report_csv(path: &Path, rows: &[&EstimatedRow]) -> Result<(), String> {
    write_atomically(path, |out| {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
        writer.write_record(REPORT_COLUMNS).map_err(|e| e.to_string())?;
        for row in rows {
            writer.serialize(row.line()).map_err(|e| e.to_string())?;
        }
        writer.flush().map_err(|e| e.to_string())
    })
}

/// Write through a temporary sibling file, then rename it over `path`.
fn write_atomically(path: &Path, write: impl FnOnce(&mut File) -> Result<(), String>) -> Result<(), String> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("invalid export path {}", path.display()))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let result = File::create(&tmp)
        .map_err(|e| e.to_string())
        .and_then(|mut out| {
            write(&mut out)?;
            out.sync_all().map_err(|e| e.to_string())
        })
        .and_then(|_| fs::rename(&tmp, path).map_err(|e| e.to_string()));

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(format!("write {} failed: {}", path.display(), e));
    }
    Ok(())
}
