//! Consumable report: joins consumables to their device and customer, marks each
//! consumable as current or replaced within its slot, and estimates coverage,
//! yield and reorder quantities.
//!
//! The builder is a pure transformation over snapshot tables. It never fails;
//! an empty input table simply produces an empty report.

pub mod devices;
pub mod lifecycle;
pub mod meters;
pub mod metrics;
pub mod monitors;
pub mod summary;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumableRecord {
    pub consumable_id: String,
    pub device_id: String,
    pub consumable_type: String,
    pub colour: String,
    pub description: String,
    pub days_left: Option<i64>,
    pub days_monitored: Option<i64>,
    /// Impressions printed while this consumable was monitored.
    pub engine_cycles_monitored: Option<i64>,
    pub last_read: Option<DateTime<Utc>>,
    pub pages_left: Option<i64>,
    pub percent_left: Option<f64>,
    pub serial_number: Option<String>,
    pub sku: Option<String>,
    /// Theoretical page life.
    pub yield_pages: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub customer_id: Option<String>,
    pub serial_number: Option<String>,
    pub ip_address: Option<String>,
    /// "Y" while the device is being monitored.
    pub monitor_status: Option<String>,
    pub model: Option<String>,
    pub zone: Option<String>,
    pub location: Option<String>,
}

impl DeviceRecord {
    pub fn is_monitored(&self) -> bool {
        self.monitor_status.as_deref() == Some("Y")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub customer_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub city: Option<String>,
    /// Comma separated addresses.
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorRecord {
    pub monitor_id: String,
    pub customer_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub online: Option<bool>,
    pub last_contact: Option<DateTime<Utc>>,
    pub licence_expiry_date: Option<DateTime<Utc>>,
}

/// Cumulative page counters of one device at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterRecord {
    pub device_id: String,
    pub reading_at: DateTime<Utc>,
    pub engine_cycles: Option<i64>,
    pub mono_pages: Option<i64>,
    pub colour_pages: Option<i64>,
}

/// A consumable with the device it sits in and the customer owning that device.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub consumable: ConsumableRecord,
    pub device: DeviceRecord,
    pub customer: CustomerRecord,
}

impl JoinedRow {
    pub fn customer_name(&self) -> &str {
        self.customer.name.as_deref().unwrap_or_default()
    }

    /// "Serial Consumible"
    pub fn consumable_serial(&self) -> Option<&str> {
        self.consumable.serial_number.as_deref()
    }

    /// "Serial Dispositivo"
    pub fn device_serial(&self) -> Option<&str> {
        self.device.serial_number.as_deref()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SupplyStatus {
    #[serde(rename = "Actual")]
    Current,
    #[serde(rename = "Reemplazado")]
    Superseded,
}

impl SupplyStatus {
    pub fn label(self) -> &'static str {
        match self {
            SupplyStatus::Current => "Actual",
            SupplyStatus::Superseded => "Reemplazado",
        }
    }
}

impl fmt::Display for SupplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parameters of the reorder forecast. Rows with an unknown `days_left` are
/// never reordered; see [`metrics::reorder_recommendation`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReorderPolicy {
    /// Days of supply a reorder should cover.
    pub target_days: i64,
    /// Consumables with at most this many days left are reordered.
    pub threshold_days: i64,
    pub adjustment_factor: f64,
}

impl Default for ReorderPolicy {
    fn default() -> Self {
        ReorderPolicy {
            target_days: 90,
            threshold_days: 30,
            adjustment_factor: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EstimatedRow {
    pub row: JoinedRow,
    pub status: SupplyStatus,
    /// "Cobertura Suministro", `None` when undefined.
    pub coverage_pct: Option<f64>,
    /// "Rendimiento Consumible", `None` when undefined.
    pub yield_pct: Option<f64>,
    pub consumption_rate: f64,
    pub reorder_recommendation: u64,
}

impl EstimatedRow {
    pub fn days_left(&self) -> Option<i64> {
        self.row.consumable.days_left
    }

    pub fn is_current(&self) -> bool {
        self.status == SupplyStatus::Current
    }

    pub fn line(&self) -> ReportLine<'_> {
        let c = &self.row.consumable;
        ReportLine {
            customer: self.row.customer_name(),
            device_serial: self.row.device_serial().unwrap_or_default(),
            consumable_type: &c.consumable_type,
            colour: &c.colour,
            sku: c.sku.as_deref().unwrap_or_default(),
            description: &c.description,
            days_left: c.days_left,
            percent_left: c.percent_left,
            impressions: c.engine_cycles_monitored,
            yield_pages: c.yield_pages,
            reorder_recommendation: self.reorder_recommendation,
            status: self.status,
            coverage_pct: self.coverage_pct,
            yield_pct: self.yield_pct,
        }
    }
}

/// Column headers of [`ReportLine`], in serialization order.
pub const REPORT_COLUMNS: [&str; 14] = [
    "Cliente",
    "Serial Dispositivo",
    "Tipo",
    "Color",
    "SKU",
    "Descripción",
    "Días Restantes",
    "Porcentaje Restante",
    "Impresiones",
    "durac_teo",
    "reorder_recommendation",
    "Estado Suministro",
    "Cobertura Suministro",
    "Rendimiento Consumible",
];

/// Output table row as read by the dashboard and the exports.
#[derive(Debug, Serialize)]
pub struct ReportLine<'a> {
    #[serde(rename = "Cliente")]
    pub customer: &'a str,
    #[serde(rename = "Serial Dispositivo")]
    pub device_serial: &'a str,
    #[serde(rename = "Tipo")]
    pub consumable_type: &'a str,
    #[serde(rename = "Color")]
    pub colour: &'a str,
    #[serde(rename = "SKU")]
    pub sku: &'a str,
    #[serde(rename = "Descripción")]
    pub description: &'a str,
    #[serde(rename = "Días Restantes")]
    pub days_left: Option<i64>,
    #[serde(rename = "Porcentaje Restante")]
    pub percent_left: Option<f64>,
    #[serde(rename = "Impresiones")]
    pub impressions: Option<i64>,
    #[serde(rename = "durac_teo")]
    pub yield_pages: Option<f64>,
    #[serde(rename = "reorder_recommendation")]
    pub reorder_recommendation: u64,
    #[serde(rename = "Estado Suministro")]
    pub status: SupplyStatus,
    #[serde(rename = "Cobertura Suministro")]
    pub coverage_pct: Option<f64>,
    #[serde(rename = "Rendimiento Consumible")]
    pub yield_pct: Option<f64>,
}

/// Inner join consumable -> device (on device id) -> customer (on the device's
/// customer id). Consumables whose device or customer is missing are dropped.
pub fn join(
    consumables: &[ConsumableRecord],
    devices: &[DeviceRecord],
    customers: &[CustomerRecord],
) -> Vec<JoinedRow> {
    let mut devices_by_id: HashMap<&str, Vec<&DeviceRecord>> = HashMap::new();
    for device in devices {
        devices_by_id.entry(device.device_id.as_str()).or_default().push(device);
    }
    let mut customers_by_id: HashMap<&str, Vec<&CustomerRecord>> = HashMap::new();
    for customer in customers {
        customers_by_id
            .entry(customer.customer_id.as_str())
            .or_default()
            .push(customer);
    }

    let mut rows = Vec::with_capacity(consumables.len());
    let mut dropped = 0usize;
    for consumable in consumables {
        let before = rows.len();
        for device in devices_by_id.get(consumable.device_id.as_str()).into_iter().flatten() {
            let owners = device
                .customer_id
                .as_deref()
                .and_then(|id| customers_by_id.get(id))
                .into_iter()
                .flatten();
            for customer in owners {
                rows.push(JoinedRow {
                    consumable: consumable.clone(),
                    device: (*device).clone(),
                    customer: (*customer).clone(),
                });
            }
        }
        if rows.len() == before {
            dropped += 1;
        }
    }

    if dropped > 0 {
        debug!(
            "Report: {} consumable(s) dropped without a matching device/customer",
            dropped
        );
    }
    rows
}

fn estimate(row: JoinedRow, status: SupplyStatus, policy: &ReorderPolicy) -> EstimatedRow {
    let c = &row.consumable;
    let impressions = c.engine_cycles_monitored.unwrap_or(0) as f64;
    let pages_left = c.pages_left.unwrap_or(0) as f64;
    let yield_pages = c.yield_pages.unwrap_or(0.0);
    let days_monitored = c.days_monitored.unwrap_or(0) as f64;

    let consumption_rate = metrics::consumption_rate(impressions, days_monitored);
    let reorder_recommendation = metrics::reorder_recommendation(policy, status, c.days_left, consumption_rate);

    EstimatedRow {
        coverage_pct: metrics::coverage_pct(status, yield_pages, impressions, pages_left),
        yield_pct: metrics::yield_pct(status, yield_pages, impressions, pages_left),
        consumption_rate,
        reorder_recommendation,
        status,
        row,
    }
}

/// Build the report with the default [`ReorderPolicy`].
pub fn build_report(
    consumables: &[ConsumableRecord],
    devices: &[DeviceRecord],
    customers: &[CustomerRecord],
) -> Vec<EstimatedRow> {
    build_report_with_policy(consumables, devices, customers, &ReorderPolicy::default())
}

pub fn build_report_with_policy(
    consumables: &[ConsumableRecord],
    devices: &[DeviceRecord],
    customers: &[CustomerRecord],
    policy: &ReorderPolicy,
) -> Vec<EstimatedRow> {
    if consumables.is_empty() || devices.is_empty() || customers.is_empty() {
        debug!(
            "Report: empty input (consumables={}, devices={}, customers={})",
            consumables.len(),
            devices.len(),
            customers.len()
        );
        return Vec::new();
    }

    let joined = join(consumables, devices, customers);
    let statuses = lifecycle::classify(&joined);
    joined
        .into_iter()
        .zip(statuses)
        .map(|(row, status)| estimate(row, status, policy))
        .collect()
}

/// Keep rows whose customer has at least one monitor.
pub fn restrict_to_monitored_customers(rows: Vec<EstimatedRow>, monitors: &[MonitorRecord]) -> Vec<EstimatedRow> {
    let watched: HashSet<&str> = monitors.iter().filter_map(|m| m.customer_id.as_deref()).collect();
    rows.into_iter()
        .filter(|r| watched.contains(r.row.customer.customer_id.as_str()))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn customer(id: &str, name: &str) -> CustomerRecord {
        CustomerRecord {
            customer_id: id.to_string(),
            name: Some(name.to_string()),
            status: Some("ACTIVE".to_string()),
            city: Some("Bogotá".to_string()),
            contact_email: None,
        }
    }

    pub(crate) fn device(id: &str, customer_id: &str) -> DeviceRecord {
        DeviceRecord {
            device_id: id.to_string(),
            customer_id: Some(customer_id.to_string()),
            serial_number: Some(format!("SN-{id}")),
            ip_address: Some("10.0.0.10".to_string()),
            monitor_status: Some("Y".to_string()),
            model: None,
            zone: None,
            location: None,
        }
    }

    pub(crate) fn toner(id: &str, device_id: &str, read: (i32, u32, u32)) -> ConsumableRecord {
        ConsumableRecord {
            consumable_id: id.to_string(),
            device_id: device_id.to_string(),
            consumable_type: "TONER".to_string(),
            colour: "BLACK".to_string(),
            description: "Black toner".to_string(),
            days_left: Some(60),
            days_monitored: Some(30),
            engine_cycles_monitored: Some(900),
            last_read: Some(Utc.with_ymd_and_hms(read.0, read.1, read.2, 12, 0, 0).unwrap()),
            pages_left: Some(2000),
            percent_left: Some(40.0),
            serial_number: Some(format!("CS-{id}")),
            sku: Some("CF226A".to_string()),
            yield_pages: Some(3100.0),
        }
    }

    fn by_id<'a>(rows: &'a [EstimatedRow], id: &str) -> &'a EstimatedRow {
        rows.iter()
            .find(|r| r.row.consumable.consumable_id == id)
            .expect("row present")
    }

    #[test]
    fn replaced_toner_scenario() {
        let a = ConsumableRecord {
            days_left: Some(20),
            days_monitored: Some(50),
            engine_cycles_monitored: Some(1000),
            pages_left: Some(500),
            yield_pages: Some(5000.0),
            ..toner("A", "D1", (2024, 1, 10))
        };
        let b = ConsumableRecord {
            days_left: Some(25),
            days_monitored: Some(10),
            engine_cycles_monitored: Some(200),
            pages_left: Some(4800),
            yield_pages: Some(5000.0),
            ..toner("B", "D1", (2024, 2, 10))
        };

        let rows = build_report(&[a, b], &[device("D1", "C1")], &[customer("C1", "Acme")]);
        assert_eq!(rows.len(), 2);

        let b = by_id(&rows, "B");
        assert_eq!(b.status, SupplyStatus::Current);
        assert_eq!(b.consumption_rate, 20.0);
        assert_eq!(b.reorder_recommendation, 130);
        assert_eq!(b.coverage_pct, Some(5.0));
        assert_eq!(b.yield_pct, Some(100.0));

        let a = by_id(&rows, "A");
        assert_eq!(a.status, SupplyStatus::Superseded);
        assert_eq!(a.coverage_pct, Some(25.0));
        assert_eq!(a.yield_pct, Some(20.0));
        assert_eq!(a.reorder_recommendation, 0);
    }

    #[test]
    fn orphans_are_dropped() {
        let consumables = vec![
            toner("kept", "D1", (2024, 1, 1)),
            toner("no-device", "D404", (2024, 1, 1)),
            toner("no-customer", "D2", (2024, 1, 1)),
        ];
        let mut headless = device("D3", "C1");
        headless.customer_id = None;
        let devices = vec![device("D1", "C1"), device("D2", "C404"), headless];
        let consumables = [consumables, vec![toner("headless", "D3", (2024, 1, 1))]].concat();

        let rows = build_report(&consumables, &devices, &[customer("C1", "Acme")]);
        let ids: Vec<_> = rows.iter().map(|r| r.row.consumable.consumable_id.as_str()).collect();
        assert_eq!(ids, vec!["kept"]);
    }

    #[test]
    fn joined_row_keeps_both_serials() {
        let rows = join(
            &[toner("X", "D1", (2024, 1, 1))],
            &[device("D1", "C1")],
            &[customer("C1", "Acme")],
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].consumable_serial(), Some("CS-X"));
        assert_eq!(rows[0].device_serial(), Some("SN-D1"));
        assert_eq!(rows[0].customer_name(), "Acme");
    }

    #[test]
    fn empty_tables_yield_empty_report() {
        let c = vec![toner("X", "D1", (2024, 1, 1))];
        let d = vec![device("D1", "C1")];
        let k = vec![customer("C1", "Acme")];
        assert!(build_report(&[], &d, &k).is_empty());
        assert!(build_report(&c, &[], &k).is_empty());
        assert!(build_report(&c, &d, &[]).is_empty());
    }

    #[test]
    fn tie_marks_every_latest_member_current() {
        let rows = build_report(
            &[
                toner("first", "D1", (2024, 3, 1)),
                toner("second", "D1", (2024, 3, 1)),
                toner("old", "D1", (2023, 12, 1)),
            ],
            &[device("D1", "C1")],
            &[customer("C1", "Acme")],
        );
        assert_eq!(by_id(&rows, "first").status, SupplyStatus::Current);
        assert_eq!(by_id(&rows, "second").status, SupplyStatus::Current);
        assert_eq!(by_id(&rows, "old").status, SupplyStatus::Superseded);
    }

    #[test]
    fn reorder_is_zero_above_threshold_or_when_replaced() {
        let mut far = toner("far", "D1", (2024, 3, 1));
        far.days_left = Some(31);
        let mut replaced = toner("replaced", "D2", (2024, 1, 1));
        replaced.days_left = Some(2);
        let newer = toner("newer", "D2", (2024, 2, 1));

        let rows = build_report(
            &[far, replaced, newer],
            &[device("D1", "C1"), device("D2", "C1")],
            &[customer("C1", "Acme")],
        );
        for row in &rows {
            if row.days_left().is_some_and(|d| d > 30) || !row.is_current() {
                assert_eq!(row.reorder_recommendation, 0, "{}", row.row.consumable.consumable_id);
            }
        }
        assert_eq!(by_id(&rows, "replaced").status, SupplyStatus::Superseded);
    }

    #[test]
    fn percentages_have_two_decimals() {
        let mut odd = toner("odd", "D1", (2024, 1, 1));
        odd.engine_cycles_monitored = Some(333);
        odd.pages_left = Some(777);
        odd.yield_pages = Some(2999.0);
        let rows = build_report(&[odd], &[device("D1", "C1")], &[customer("C1", "Acme")]);
        for value in [rows[0].coverage_pct, rows[0].yield_pct].into_iter().flatten() {
            let scaled = value * 100.0;
            assert!((scaled - scaled.round()).abs() < 1e-6, "{value}");
        }
        assert_eq!(rows[0].coverage_pct, Some(13.51));
        assert_eq!(rows[0].yield_pct, Some(37.01));
    }

    #[test]
    fn missing_counters_do_not_poison_the_reorder() {
        let blank = ConsumableRecord {
            consumable_id: "blank".to_string(),
            device_id: "D1".to_string(),
            consumable_type: "TONER".to_string(),
            colour: "BLACK".to_string(),
            days_left: Some(5),
            ..ConsumableRecord::default()
        };
        let mut unmonitored = toner("unmonitored", "D2", (2024, 1, 1));
        unmonitored.days_left = Some(5);
        unmonitored.days_monitored = Some(0);

        let rows = build_report(
            &[blank, unmonitored],
            &[device("D1", "C1"), device("D2", "C1")],
            &[customer("C1", "Acme")],
        );
        let blank = by_id(&rows, "blank");
        assert_eq!(blank.status, SupplyStatus::Current);
        assert_eq!(blank.reorder_recommendation, 0);
        assert_eq!(blank.coverage_pct, None);
        assert_eq!(blank.yield_pct, None);
        assert_eq!(by_id(&rows, "unmonitored").reorder_recommendation, 0);
    }

    #[test]
    fn monitor_restriction_is_a_semi_join() {
        let rows = build_report(
            &[toner("X", "D1", (2024, 1, 1)), toner("Y", "D2", (2024, 1, 1))],
            &[device("D1", "C1"), device("D2", "C2")],
            &[customer("C1", "Acme"), customer("C2", "Globex")],
        );
        let monitors = vec![
            MonitorRecord {
                monitor_id: "M1".to_string(),
                customer_id: Some("C1".to_string()),
                ..MonitorRecord::default()
            },
            MonitorRecord {
                monitor_id: "M2".to_string(),
                customer_id: Some("C1".to_string()),
                ..MonitorRecord::default()
            },
        ];
        let kept = restrict_to_monitored_customers(rows, &monitors);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].row.customer_name(), "Acme");
    }

    #[test]
    fn report_line_uses_display_columns() {
        let rows = build_report(
            &[toner("X", "D1", (2024, 1, 1))],
            &[device("D1", "C1")],
            &[customer("C1", "Acme")],
        );
        let json = serde_json::to_value(rows[0].line()).unwrap();
        assert_eq!(json["Cliente"], "Acme");
        assert_eq!(json["Serial Dispositivo"], "SN-D1");
        assert_eq!(json["Estado Suministro"], "Actual");
        assert_eq!(json["durac_teo"], 3100.0);
        assert!(json.get("deviceId").is_none());
        assert_eq!(json.as_object().map(|o| o.len()), Some(REPORT_COLUMNS.len()));
        for column in REPORT_COLUMNS {
            assert!(json.get(column).is_some(), "missing {column}");
        }
    }
}
