//! Device inventory indicators over the devices of reported customers.

use super::metrics::{round_to, safe_div};
use super::{CustomerRecord, DeviceRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Label for an inventory field the device never reported.
pub const UNKNOWN_LABEL: &str = "Desconocido";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub total: usize,
    pub monitored: usize,
    /// One decimal; 0 without devices.
    pub monitored_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacementCount {
    pub zone: String,
    pub location: String,
    pub count: usize,
}

fn label(value: Option<&str>) -> &str {
    value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or(UNKNOWN_LABEL)
}

/// Devices owned by one of `customers`.
pub fn fleet_devices<'a>(devices: &'a [DeviceRecord], customers: &[CustomerRecord]) -> Vec<&'a DeviceRecord> {
    let ids: HashSet<&str> = customers.iter().map(|c| c.customer_id.as_str()).collect();
    devices
        .iter()
        .filter(|d| d.customer_id.as_deref().is_some_and(|c| ids.contains(c)))
        .collect()
}

pub fn summarize_devices(devices: &[&DeviceRecord]) -> DeviceSummary {
    let monitored = devices.iter().filter(|d| d.is_monitored()).count();
    DeviceSummary {
        total: devices.len(),
        monitored,
        monitored_pct: safe_div(monitored as f64 * 100.0, devices.len() as f64)
            .map(|v| round_to(v, 1))
            .unwrap_or(0.0),
    }
}

/// Device count per zone and location, sorted by both.
pub fn by_zone_and_location(devices: &[&DeviceRecord]) -> Vec<PlacementCount> {
    let mut counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for d in devices {
        *counts.entry((label(d.zone.as_deref()), label(d.location.as_deref()))).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|((zone, location), count)| PlacementCount {
            zone: zone.to_string(),
            location: location.to_string(),
            count,
        })
        .collect()
}

/// Device count per model, most common first.
pub fn by_model<'a>(devices: &[&'a DeviceRecord]) -> Vec<(&'a str, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for &d in devices {
        *counts.entry(label(d.model.as_deref())).or_default() += 1;
    }
    let mut out: Vec<_> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    out
}
