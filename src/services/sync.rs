use crate::client::{SdsClient, SdsClientError};
use crate::db::models as dbm;
use crate::db::repository::FleetRepository;
use crate::models::sds::CustomerId;
use crate::services::ingest::{self, UpsertCounts};
use chrono::NaiveDate;
use diesel::PgConnection;
use log::{debug, info, warn};
use std::fmt;
use std::num::NonZeroU32;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub requests_per_second: Option<NonZeroU32>,
    pub meters_billing_date: Option<NaiveDate>,
}

impl SyncOptions {
    fn min_spacing(&self) -> Option<Duration> {
        self.requests_per_second.map(min_spacing)
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub customers: UpsertCounts,
    pub devices: UpsertCounts,
    pub monitors: UpsertCounts,
    pub consumables: UpsertCounts,
    pub meter_readings: usize,
    /// Vendor ids of customers skipped after an error.
    pub failed_customers: Vec<String>,
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = |c: &UpsertCounts| format!("{}+{}", c.inserted, c.updated);
        write!(
            f,
            "customers={} devices={} monitors={} consumables={} meter_readings={} failed_customers={}",
            counts(&self.customers),
            counts(&self.devices),
            counts(&self.monitors),
            counts(&self.consumables),
            self.meter_readings,
            self.failed_customers.len()
        )
    }
}

/// Minimum time between two calls for a given request rate.
pub fn min_spacing(requests_per_second: NonZeroU32) -> Duration {
    Duration::from_secs(1) / requests_per_second.get()
}

/// Run `call`, then sleep out whatever is left of `spacing`.
fn paced<T>(spacing: Option<Duration>, call: impl FnOnce() -> Result<T, SdsClientError>) -> Result<T, SdsClientError> {
    let start = Instant::now();
    let result = call();
    if let Some(required) = spacing {
        let elapsed = start.elapsed();
        if elapsed < required {
            thread::sleep(required - elapsed);
        }
    }
    result
}

/// Refresh the customer list, then every stored customer's devices,
/// monitors, meters and consumables. A failing customer is logged and skipped.
pub fn sync_all(conn: &mut PgConnection, client: &SdsClient, opts: &SyncOptions) -> Result<SyncSummary, String> {
    let mut summary = SyncSummary {
        customers: sync_customers(conn, client, opts)?,
        ..SyncSummary::default()
    };

    let customer_ids = FleetRepository::new(conn).customer_ids()?;
    info!("Sync: refreshing {} customer(s)", customer_ids.len());
    for id in customer_ids {
        let customer = CustomerId(id);
        if let Err(e) = sync_customer(conn, client, &customer, opts, &mut summary) {
            warn!("Sync: skipping customer {}: {}", customer.0, e);
            summary.failed_customers.push(customer.0);
        }
    }

    info!("Sync complete: {}", summary);
    Ok(summary)
}

pub fn sync_customers(conn: &mut PgConnection, client: &SdsClient, opts: &SyncOptions) -> Result<UpsertCounts, String> {
    let customers = paced(opts.min_spacing(), || client.get_customers())
        .map_err(|e| format!("get_customers failed: {}", e))?;
    let rows: Vec<dbm::NewCustomer> = customers
        .iter()
        .filter_map(|c| {
            let row = dbm::NewCustomer::from_api(c);
            if row.is_none() {
                warn!("Sync: skipping customer without customerId");
            }
            row
        })
        .collect();
    let counts = ingest::upsert_customers(conn, &rows)?;
    info!(
        "Sync: customers fetched={} inserted={} updated={}",
        customers.len(),
        counts.inserted,
        counts.updated
    );
    Ok(counts)
}

fn sync_customer(
    conn: &mut PgConnection,
    client: &SdsClient,
    customer: &CustomerId,
    opts: &SyncOptions,
    summary: &mut SyncSummary,
) -> Result<(), String> {
    let spacing = opts.min_spacing();
    let id = &customer.0;

    let devices = paced(spacing, || client.get_devices(customer)).map_err(|e| format!("get_devices({id}) failed: {}", e))?;
    let rows: Vec<dbm::NewDevice> = devices.iter().filter_map(|d| dbm::NewDevice::from_api(d, Some(customer))).collect();
    let devices_counts = ingest::upsert_devices(conn, &rows)?;

    let monitors =
        paced(spacing, || client.get_monitors(customer)).map_err(|e| format!("get_monitors({id}) failed: {}", e))?;
    let rows: Vec<dbm::NewMonitor> = monitors.iter().filter_map(|m| dbm::NewMonitor::from_api(m, Some(customer))).collect();
    let monitor_counts = ingest::upsert_monitors(conn, &rows)?;

    let meters = paced(spacing, || client.get_meters(customer, opts.meters_billing_date))
        .map_err(|e| format!("get_meters({id}) failed: {}", e))?;
    let rows: Vec<dbm::NewMeterReading> = meters.iter().filter_map(|m| dbm::NewMeterReading::from_api(m, customer)).collect();
    if rows.len() < meters.len() {
        debug!("Sync: customer {} dropped {} undated meter reading(s)", id, meters.len() - rows.len());
    }
    let readings = ingest::insert_meter_readings(conn, &rows)?;

    let consumables = paced(spacing, || client.get_consumables(customer))
        .map_err(|e| format!("get_consumables({id}) failed: {}", e))?;
    let rows: Vec<dbm::NewConsumable> = consumables.iter().filter_map(dbm::NewConsumable::from_api).collect();
    if rows.len() < consumables.len() {
        warn!(
            "Sync: customer {} skipped {} consumable(s) without consumableId/deviceId",
            id,
            consumables.len() - rows.len()
        );
    }
    let consumable_counts = ingest::upsert_consumables(conn, &rows)?;

    debug!(
        "Sync: customer {} devices={} monitors={} meters={} consumables={}",
        id,
        devices_counts.total(),
        monitor_counts.total(),
        readings,
        consumable_counts.total()
    );
    summary.devices += devices_counts;
    summary.monitors += monitor_counts;
    summary.meter_readings += readings;
    summary.consumables += consumable_counts;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spacing_follows_request_rate() {
        let four = NonZeroU32::new(4).unwrap();
        assert_eq!(min_spacing(four), Duration::from_millis(250));
        assert_eq!(min_spacing(NonZeroU32::MIN), Duration::from_secs(1));
        assert_eq!(SyncOptions::default().min_spacing(), None);
    }

    #[test]
    fn paced_waits_out_the_spacing() {
        let start = Instant::now();
        let value = paced(Some(Duration::from_millis(30)), || Ok::<_, SdsClientError>(7)).unwrap();
        assert_eq!(value, 7);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn paced_passes_errors_through() {
        let err = paced(None, || Err::<(), _>(SdsClientError::Auth("denied".into()))).unwrap_err();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn summary_renders_counts() {
        let summary = SyncSummary {
            customers: UpsertCounts { inserted: 2, updated: 1 },
            consumables: UpsertCounts { inserted: 10, updated: 0 },
            meter_readings: 4,
            failed_customers: vec!["k-9".into()],
            ..SyncSummary::default()
        };
        assert_eq!(
            summary.to_string(),
            "customers=2+1 devices=0+0 monitors=0+0 consumables=10+0 meter_readings=4 failed_customers=1"
        );
    }
}
