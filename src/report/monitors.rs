//! Monitoring-agent indicators: which agents report, how long since they last
//! did and whose licence is about to lapse.

use super::{CustomerRecord, DeviceRecord, MonitorRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Licences expiring in fewer days than this are flagged.
pub const LICENCE_WARNING_DAYS: i64 = 60;
/// Monitors in this status are retired and left out.
pub const DISCONTINUED: &str = "DISCONTINUED";
// Agents under these prefixes run without a licence of their own.
const UNLICENSED_PREFIXES: [&str; 2] = ["sda_", "hpc_"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorLine<'a> {
    pub customer: &'a str,
    pub monitor: &'a MonitorRecord,
    pub days_without_report: Option<i64>,
    /// Negative once expired.
    pub days_to_expiry: Option<i64>,
}

impl MonitorLine<'_> {
    fn is_licensed(&self) -> bool {
        !self
            .monitor
            .name
            .as_deref()
            .is_some_and(|n| UNLICENSED_PREFIXES.iter().any(|p| n.starts_with(p)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub avg_days_without_report: Option<f64>,
    pub licences_expiring: usize,
}

/// One line per monitor of a listed customer that owns at least one device,
/// discontinued monitors excluded. Ordered by customer and monitor name.
pub fn monitor_lines<'a>(
    monitors: &'a [MonitorRecord],
    devices: &[DeviceRecord],
    customers: &'a [CustomerRecord],
    now: DateTime<Utc>,
) -> Vec<MonitorLine<'a>> {
    let with_devices: HashSet<&str> = devices.iter().filter_map(|d| d.customer_id.as_deref()).collect();
    let mut names: HashMap<&str, &str> = HashMap::new();
    for c in customers.iter().filter(|c| with_devices.contains(c.customer_id.as_str())) {
        names.entry(c.customer_id.as_str()).or_insert(c.name.as_deref().unwrap_or_default());
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut lines: Vec<MonitorLine<'a>> = monitors
        .iter()
        .filter(|m| m.status.as_deref() != Some(DISCONTINUED))
        .filter_map(|m| {
            let customer = *names.get(m.customer_id.as_deref()?)?;
            seen.insert(m.monitor_id.as_str()).then(|| MonitorLine {
                customer,
                monitor: m,
                days_without_report: m.last_contact.map(|ts| (now - ts).num_days()),
                days_to_expiry: m.licence_expiry_date.map(|ts| (ts - now).num_days()),
            })
        })
        .collect();
    lines.sort_by(|a, b| a.customer.cmp(b.customer).then_with(|| a.monitor.name.cmp(&b.monitor.name)));
    lines
}

pub fn summarize_monitors(lines: &[MonitorLine<'_>]) -> MonitorSummary {
    let online = lines.iter().filter(|l| l.monitor.online == Some(true)).count();
    let silent: Vec<i64> = lines.iter().filter_map(|l| l.days_without_report).collect();
    MonitorSummary {
        total: lines.len(),
        online,
        offline: lines.len() - online,
        avg_days_without_report: (!silent.is_empty())
            .then(|| silent.iter().sum::<i64>() as f64 / silent.len() as f64),
        licences_expiring: lines
            .iter()
            .filter(|l| l.is_licensed() && l.days_to_expiry.is_some_and(|d| d < LICENCE_WARNING_DAYS))
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::{customer, device};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn monitor(id: &str, customer_id: Option<&str>, name: &str) -> MonitorRecord {
        MonitorRecord {
            monitor_id: id.to_string(),
            customer_id: customer_id.map(str::to_string),
            name: Some(name.to_string()),
            status: Some("ACTIVE".to_string()),
            ..MonitorRecord::default()
        }
    }

    fn fleet() -> (Vec<MonitorRecord>, Vec<DeviceRecord>, Vec<CustomerRecord>) {
        let mut lobby = monitor("M1", Some("C1"), "SDS Lobby");
        lobby.online = Some(true);
        lobby.last_contact = Some(now() - Duration::days(2));
        lobby.licence_expiry_date = Some(now() + Duration::days(30));

        let mut plant = monitor("M2", Some("C1"), "SDS Planta");
        plant.online = Some(false);
        plant.last_contact = Some(now() - Duration::days(4));
        plant.licence_expiry_date = Some(now() + Duration::days(90));

        let mut retired = monitor("M3", Some("C1"), "SDS Viejo");
        retired.status = Some(DISCONTINUED.to_string());

        let mut bundled = monitor("M5", Some("C1"), "sda_agent");
        bundled.licence_expiry_date = Some(now() + Duration::days(10));

        let monitors = vec![
            lobby.clone(),
            plant,
            retired,
            monitor("M4", Some("C2"), "SDS Globex"),
            bundled,
            lobby,
            monitor("M6", None, "SDS huérfano"),
        ];
        let customers = vec![customer("C1", "Acme"), customer("C2", "Globex")];
        (monitors, vec![device("D1", "C1")], customers)
    }

    #[test]
    fn lines_cover_live_monitors_of_customers_with_devices() {
        let (monitors, devices, customers) = fleet();
        let lines = monitor_lines(&monitors, &devices, &customers, now());
        let ids: Vec<&str> = lines.iter().map(|l| l.monitor.monitor_id.as_str()).collect();
        assert_eq!(ids, vec!["M1", "M2", "M5"]);
        assert!(lines.iter().all(|l| l.customer == "Acme"));
        assert_eq!(lines[0].days_without_report, Some(2));
        assert_eq!(lines[0].days_to_expiry, Some(30));
        assert_eq!(lines[2].days_without_report, None);
    }

    #[test]
    fn summary_counts_online_silence_and_expiring_licences() {
        let (monitors, devices, customers) = fleet();
        let summary = summarize_monitors(&monitor_lines(&monitors, &devices, &customers, now()));
        assert_eq!(
            summary,
            MonitorSummary {
                total: 3,
                online: 1,
                offline: 2,
                avg_days_without_report: Some(3.0),
                licences_expiring: 1,
            }
        );
    }

    #[test]
    fn expired_licences_count_as_expiring() {
        let mut lapsed = monitor("M1", Some("C1"), "SDS Lobby");
        lapsed.licence_expiry_date = Some(now() - Duration::days(3));
        let monitors = [lapsed];
        let customers = [customer("C1", "Acme")];
        let lines = monitor_lines(&monitors, &[device("D1", "C1")], &customers, now());
        assert_eq!(lines[0].days_to_expiry, Some(-3));
        assert_eq!(summarize_monitors(&lines).licences_expiring, 1);
        assert_eq!(summarize_monitors(&[]), MonitorSummary::default());
    }
}
