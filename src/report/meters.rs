//! Page-counter indicators. Meter readings are cumulative, so usage is the
//! increase between consecutive readings of the same device.

use super::{CustomerRecord, DeviceRecord, MeterRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Counter increase since the previous reading of the same device. The first
/// reading of a device has nothing to compare with and every delta is `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyUsage {
    pub device_id: String,
    pub reading_at: DateTime<Utc>,
    pub engine_cycles: Option<i64>,
    pub mono_pages: Option<i64>,
    pub colour_pages: Option<i64>,
    /// Mono plus colour, when both are known.
    pub total_pages: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeterSummary {
    pub readings: usize,
    pub devices: usize,
    /// Means over the non-zero daily deltas; `None` without any.
    pub avg_engine_cycles: Option<f64>,
    pub avg_mono_pages: Option<f64>,
    pub avg_colour_pages: Option<f64>,
}

/// Readings of devices owned by one of `customers`.
pub fn restrict_to_customers(
    readings: Vec<MeterRecord>,
    devices: &[DeviceRecord],
    customers: &[CustomerRecord],
) -> Vec<MeterRecord> {
    let customer_ids: HashSet<&str> = customers.iter().map(|c| c.customer_id.as_str()).collect();
    let device_ids: HashSet<&str> = devices
        .iter()
        .filter(|d| d.customer_id.as_deref().is_some_and(|c| customer_ids.contains(c)))
        .map(|d| d.device_id.as_str())
        .collect();
    readings
        .into_iter()
        .filter(|r| device_ids.contains(r.device_id.as_str()))
        .collect()
}

/// Per-reading deltas, ordered by device and reading time.
pub fn daily_usage(readings: &[MeterRecord]) -> Vec<DailyUsage> {
    let mut sorted: Vec<&MeterRecord> = readings.iter().collect();
    sorted.sort_by(|a, b| a.device_id.cmp(&b.device_id).then(a.reading_at.cmp(&b.reading_at)));

    let mut out = Vec::with_capacity(sorted.len());
    let mut previous: Option<&MeterRecord> = None;
    for reading in sorted {
        let prev = previous.filter(|p| p.device_id == reading.device_id);
        let delta = |counter: fn(&MeterRecord) -> Option<i64>| {
            prev.and_then(|p| counter(reading)?.checked_sub(counter(p)?))
        };
        let mono_pages = delta(|r| r.mono_pages);
        let colour_pages = delta(|r| r.colour_pages);
        out.push(DailyUsage {
            device_id: reading.device_id.clone(),
            reading_at: reading.reading_at,
            engine_cycles: delta(|r| r.engine_cycles),
            mono_pages,
            colour_pages,
            total_pages: mono_pages.zip(colour_pages).map(|(m, c)| m + c),
        });
        previous = Some(reading);
    }
    out
}

fn mean_of_nonzero(values: impl Iterator<Item = Option<i64>>) -> Option<f64> {
    let (sum, n) = values
        .flatten()
        .filter(|v| *v != 0)
        .fold((0.0, 0usize), |(sum, n), v| (sum + v as f64, n + 1));
    (n > 0).then(|| sum / n as f64)
}

pub fn summarize_meters(readings: &[MeterRecord]) -> MeterSummary {
    let usage = daily_usage(readings);
    MeterSummary {
        readings: readings.len(),
        devices: readings.iter().map(|r| r.device_id.as_str()).collect::<BTreeSet<_>>().len(),
        avg_engine_cycles: mean_of_nonzero(usage.iter().map(|u| u.engine_cycles)),
        avg_mono_pages: mean_of_nonzero(usage.iter().map(|u| u.mono_pages)),
        avg_colour_pages: mean_of_nonzero(usage.iter().map(|u| u.colour_pages)),
    }
}

/// Most recent reading of each device, by device id.
pub fn latest_per_device(readings: &[MeterRecord]) -> Vec<&MeterRecord> {
    let mut latest: BTreeMap<&str, &MeterRecord> = BTreeMap::new();
    for reading in readings {
        let slot = latest.entry(reading.device_id.as_str()).or_insert(reading);
        if reading.reading_at > slot.reading_at {
            *slot = reading;
        }
    }
    latest.into_values().collect()
}
