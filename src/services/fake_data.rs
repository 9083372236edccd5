//! Synthetic fleet for demos and local development.
//!
//! The generator is seeded, so the same seed and reference time always give
//! the same fleet. It produces API payloads and stores them through the same
//! ingest path as a real sync.

use crate::db::models as dbm;
use crate::models::sds::{self, ConsumableId, CustomerId, DeviceId, MonitorId};
use crate::services::ingest::{self, UpsertCounts};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use diesel::PgConnection;
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

pub const DEFAULT_SEED: u64 = 0x5D5_F1EE7;

const CUSTOMERS: [(&str, &str, &str); 5] = [
    ("Acme Andina", "Bogotá", "compras@acme-andina.co, soporte@acme-andina.co"),
    ("Globex Caribe", "Barranquilla", ""),
    ("Initech Pacífico", "Cali", "it@initech.co"),
    ("Umbrella Norte", "Medellín", "logistica@umbrella.co"),
    ("Hooli Llanos", "Villavicencio", "admin@hooli.co"),
];
const COLOURS: [&str; 4] = ["BLACK", "CYAN", "MAGENTA", "YELLOW"];
const MODELS: [(&str, bool); 4] = [
    ("LaserJet M402", false),
    ("LaserJet M479", true),
    ("ECOSYS P3155", false),
    ("bizhub C300i", true),
];
const UNKNOWN_PARTS: [&str; 3] = ["Fuser kit", "Transfer belt", "Waste toner box"];
const METER_DAYS: i64 = 14;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeFleet {
    pub customers: Vec<sds::Customer>,
    pub monitors: Vec<sds::Monitor>,
    pub devices: Vec<sds::Device>,
    pub consumables: Vec<sds::Consumable>,
    pub meters: Vec<sds::MeterReading>,
    /// Consumables generated as the current one of their slot, both members
    /// of a tie included.
    pub current: Vec<ConsumableId>,
}

fn timestamp(ts: DateTime<Utc>, naive: bool) -> String {
    if naive {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Build a fleet relative to `now`.
///
/// Every customer but the last is ACTIVE and the second has no monitor. Each
/// slot has one to three consumables, the newest being current; some slots
/// end in a tie, some parts are UNKNOWN and some counters are missing. Every
/// device gets two weeks of daily meter readings.
pub fn generate(seed: u64, now: DateTime<Utc>) -> FakeFleet {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut fleet = FakeFleet::default();

    for (c_index, (name, city, emails)) in CUSTOMERS.iter().enumerate() {
        let customer_id = CustomerId(format!("cust-{:02}", c_index + 1));
        fleet.customers.push(sds::Customer {
            customer_id: Some(customer_id.clone()),
            name: Some(name.to_string()),
            status: Some(if c_index + 1 == CUSTOMERS.len() { "INACTIVE" } else { "ACTIVE" }.to_string()),
            city: Some(city.to_string()),
            contact_email: Some(emails.to_string()).filter(|e| !e.is_empty()),
            ..sds::Customer::default()
        });

        if c_index != 1 {
            fleet.monitors.push(sds::Monitor {
                monitor_id: Some(MonitorId(format!("mon-{:02}", c_index + 1))),
                customer_id: Some(customer_id.clone()),
                name: Some(format!("SDS {}", city)),
                status: Some("ACTIVE".to_string()),
                online: Some(rng.random_bool(0.8)),
                last_contact: Some(timestamp(now - Duration::minutes(rng.random_range(1..180)), false)),
                ..sds::Monitor::default()
            });
        }

        for d_index in 0..rng.random_range(2..=5u32) {
            let device_id = DeviceId(format!("{}-dev-{:02}", customer_id.0, d_index + 1));
            let (model, is_colour) = MODELS[rng.random_range(0..MODELS.len())];
            fleet.devices.push(sds::Device {
                device_id: Some(device_id.clone()),
                customer_id: Some(customer_id.clone()),
                serial_number: Some(format!("SN{:08}", rng.random_range(0..100_000_000u32))),
                ip_address: Some(format!("10.{}.{}.{}", c_index + 1, d_index / 200, 10 + d_index % 200)),
                monitor_status: Some(if rng.random_bool(0.85) { "Y" } else { "N" }.to_string()),
                extended_fields: Some(sds::DeviceExtendedFields {
                    model: Some(model.to_string()),
                    location: Some(format!("Piso {}", d_index + 1)),
                    ..sds::DeviceExtendedFields::default()
                }),
                last_contact: Some(timestamp(now - Duration::hours(rng.random_range(1..48)), false)),
                ..sds::Device::default()
            });

            push_meters(&mut fleet, &mut rng, now, &device_id, is_colour);

            let toner_colours = if is_colour { &COLOURS[..] } else { &COLOURS[..1] };
            for colour in toner_colours {
                push_slot(&mut fleet, &mut rng, now, &device_id, "TONER", colour, None);
            }
            push_slot(&mut fleet, &mut rng, now, &device_id, "DRUM", "BLACK", None);
            if rng.random_bool(0.3) {
                let part = UNKNOWN_PARTS[rng.random_range(0..UNKNOWN_PARTS.len())];
                push_slot(&mut fleet, &mut rng, now, &device_id, "UNKNOWN", "NONE", Some(part));
            }
        }
    }

    fleet
}

/// Daily cumulative counters ending today. Some days see no printing.
fn push_meters(fleet: &mut FakeFleet, rng: &mut SmallRng, now: DateTime<Utc>, device_id: &DeviceId, is_colour: bool) {
    let mut mono = rng.random_range(1_000..150_000i64);
    let mut colour = if is_colour { rng.random_range(500..80_000i64) } else { 0 };
    for days_ago in (0..METER_DAYS).rev() {
        if days_ago + 1 < METER_DAYS && rng.random_bool(0.85) {
            mono += rng.random_range(10..400i64);
            if is_colour {
                colour += rng.random_range(5..150i64);
            }
        }
        fleet.meters.push(sds::MeterReading {
            device_id: Some(device_id.clone()),
            reading_date_time: Some(timestamp(now - Duration::days(days_ago), false)),
            engine_cycles: Some(mono + colour),
            mono_small: Some(mono),
            colour_pages: Some(colour),
            ..sds::MeterReading::default()
        });
    }
}

/// Consumable history for one device slot, oldest first.
fn push_slot(
    fleet: &mut FakeFleet,
    rng: &mut SmallRng,
    now: DateTime<Utc>,
    device_id: &DeviceId,
    consumable_type: &str,
    colour: &str,
    part: Option<&str>,
) {
    let generations = rng.random_range(1..=3u32);
    let tie = generations > 1 && rng.random_bool(0.1);
    let yield_pages: f64 = if consumable_type == "DRUM" { 30_000.0 } else { rng.random_range(2..=12u32) as f64 * 1_000.0 };
    let latest_read = now - Duration::hours(rng.random_range(1..72));

    for generation in 0..generations {
        let current = generation + 1 == generations || (tie && generation + 2 == generations);
        let read = if current {
            latest_read
        } else {
            latest_read - Duration::days(rng.random_range(20..120i64) * (generations - generation) as i64)
        };

        let days_monitored = rng.random_range(5..200i64);
        let daily_pages = rng.random_range(5..120i64);
        let impressions = days_monitored * daily_pages;
        let pages_left = if current { ((yield_pages as i64) - impressions).max(0) } else { 0 };
        let days_left = pages_left / daily_pages.max(1);
        let sequence = fleet.consumables.len() + 1;
        let consumable_id = ConsumableId(format!("cons-{:05}", sequence));
        if current {
            fleet.current.push(consumable_id.clone());
        }
        let description = part.map(str::to_string).unwrap_or_else(|| format!("{} {}", consumable_type, colour));

        let mut consumable = sds::Consumable {
            consumable_id: Some(consumable_id),
            device_id: Some(device_id.clone()),
            consumable_type: Some(consumable_type.to_string()),
            colour: Some(colour.to_string()),
            description: Some(description),
            days_left: Some(days_left),
            days_monitored: Some(days_monitored),
            engine_cycles_monitored: Some(impressions),
            last_read: Some(timestamp(read, rng.random_bool(0.2))),
            pages_left: Some(pages_left),
            percent_left: Some((pages_left as f64 / yield_pages * 100.0).round()),
            serial_number: Some(format!("CRUM-{:06}", rng.random_range(0..1_000_000u32))),
            sku: Some(format!("{}-{}", &consumable_type[..2], &colour[..1])),
            yield_pages: Some(yield_pages),
            ..sds::Consumable::default()
        };
        if rng.random_bool(0.05) {
            consumable.yield_pages = None;
        }
        if rng.random_bool(0.05) {
            consumable.days_left = None;
        }
        fleet.consumables.push(consumable);
    }
}

/// Generate and store a fleet.
pub fn run(conn: &mut PgConnection, seed: u64) -> Result<(), String> {
    let fleet = generate(seed, Utc::now());
    info!(
        "Fake data: seeding {} customer(s), {} monitor(s), {} device(s), {} consumable(s), {} meter reading(s) (seed={:#x})",
        fleet.customers.len(),
        fleet.monitors.len(),
        fleet.devices.len(),
        fleet.consumables.len(),
        fleet.meters.len(),
        seed
    );

    let customers: Vec<dbm::NewCustomer> = fleet.customers.iter().filter_map(dbm::NewCustomer::from_api).collect();
    let monitors: Vec<dbm::NewMonitor> = fleet.monitors.iter().filter_map(|m| dbm::NewMonitor::from_api(m, None)).collect();
    let devices: Vec<dbm::NewDevice> = fleet.devices.iter().filter_map(|d| dbm::NewDevice::from_api(d, None)).collect();
    let consumables: Vec<dbm::NewConsumable> = fleet.consumables.iter().filter_map(dbm::NewConsumable::from_api).collect();

    let mut total = UpsertCounts::default();
    total += ingest::upsert_customers(conn, &customers)?;
    total += ingest::upsert_monitors(conn, &monitors)?;
    total += ingest::upsert_devices(conn, &devices)?;
    total += ingest::upsert_consumables(conn, &consumables)?;
    let readings = ingest::insert_meter_readings(conn, &meter_rows(&fleet))?;
    info!(
        "Fake data: complete (inserted={}, updated={}, meter_readings={})",
        total.inserted, total.updated, readings
    );
    Ok(())
}

/// Meter rows, attributed to the customer owning each device.
fn meter_rows(fleet: &FakeFleet) -> Vec<dbm::NewMeterReading> {
    let owners: HashMap<&DeviceId, &CustomerId> = fleet
        .devices
        .iter()
        .filter_map(|d| Some((d.device_id.as_ref()?, d.customer_id.as_ref()?)))
        .collect();
    fleet
        .meters
        .iter()
        .filter_map(|m| {
            let owner = owners.get(m.device_id.as_ref()?)?;
            dbm::NewMeterReading::from_api(m, owner)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{self, ConsumableRecord, CustomerRecord, DeviceRecord, MeterRecord, SupplyStatus, meters};
    use crate::utils::coerce_timestamp;
    use chrono::TimeZone;
    use std::collections::{BTreeMap, HashSet};

    fn reference_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    fn records(fleet: &FakeFleet) -> (Vec<ConsumableRecord>, Vec<DeviceRecord>, Vec<CustomerRecord>) {
        let consumables = fleet
            .consumables
            .iter()
            .map(|c| ConsumableRecord {
                consumable_id: c.consumable_id.clone().unwrap().0,
                device_id: c.device_id.clone().unwrap().0,
                consumable_type: c.consumable_type.clone().unwrap_or_default(),
                colour: c.colour.clone().unwrap_or_default(),
                description: c.description.clone().unwrap_or_default(),
                days_left: c.days_left,
                days_monitored: c.days_monitored,
                engine_cycles_monitored: c.engine_cycles_monitored,
                last_read: c.last_read.as_deref().and_then(coerce_timestamp),
                pages_left: c.pages_left,
                percent_left: c.percent_left,
                serial_number: c.serial_number.clone(),
                sku: c.sku.clone(),
                yield_pages: c.yield_pages,
            })
            .collect();
        let devices = fleet
            .devices
            .iter()
            .map(|d| DeviceRecord {
                device_id: d.device_id.clone().unwrap().0,
                customer_id: d.customer_id.as_ref().map(|c| c.0.clone()),
                serial_number: d.serial_number.clone(),
                monitor_status: d.monitor_status.clone(),
                ..DeviceRecord::default()
            })
            .collect();
        let customers = fleet
            .customers
            .iter()
            .map(|c| CustomerRecord {
                customer_id: c.customer_id.clone().unwrap().0,
                name: c.name.clone(),
                ..CustomerRecord::default()
            })
            .collect();
        (consumables, devices, customers)
    }

    #[test]
    fn same_seed_same_fleet() {
        let a = generate(DEFAULT_SEED, reference_time());
        let b = generate(DEFAULT_SEED, reference_time());
        assert_eq!(a, b);
        let c = generate(DEFAULT_SEED + 1, reference_time());
        assert_ne!(a.consumables, c.consumables);
    }

    #[test]
    fn fleet_has_the_expected_shape() {
        let fleet = generate(DEFAULT_SEED, reference_time());
        assert_eq!(fleet.customers.len(), CUSTOMERS.len());
        assert_eq!(fleet.monitors.len(), CUSTOMERS.len() - 1);
        assert!(!fleet.monitors.iter().any(|m| m.customer_id == Some(CustomerId("cust-02".into()))));
        assert_eq!(fleet.customers.last().unwrap().status.as_deref(), Some("INACTIVE"));
        assert!(fleet.customers[1].contact_email.is_none());

        // every payload maps onto a storable row
        assert!(fleet.consumables.iter().all(|c| dbm::NewConsumable::from_api(c).is_some()));
        assert!(fleet.devices.iter().all(|d| dbm::NewDevice::from_api(d, None).is_some()));
        assert!(fleet.consumables.iter().all(|c| c.last_read.as_deref().and_then(coerce_timestamp).is_some()));
    }

    #[test]
    fn report_marks_the_generated_current_consumables() {
        let fleet = generate(DEFAULT_SEED, reference_time());
        let (consumables, devices, customers) = records(&fleet);
        let rows = report::build_report(&consumables, &devices, &customers);
        assert_eq!(rows.len(), consumables.len());

        let current: HashSet<&str> = fleet.current.iter().map(|id| id.0.as_str()).collect();
        for row in &rows {
            let id = row.row.consumable.consumable_id.as_str();
            let expected = if current.contains(id) { SupplyStatus::Current } else { SupplyStatus::Superseded };
            assert_eq!(row.status, expected, "{id}");
        }
        assert!(rows.iter().any(|r| r.status == SupplyStatus::Superseded));
    }

    #[test]
    fn some_seeds_plant_ties() {
        // a tie leaves two current consumables in one device slot
        let tied = (0..20u64).any(|seed| {
            let fleet = generate(seed, reference_time());
            let mut per_slot: BTreeMap<(String, String, String, String), usize> = BTreeMap::new();
            for c in fleet.consumables.iter().filter(|c| fleet.current.contains(c.consumable_id.as_ref().unwrap())) {
                let key = (
                    c.device_id.clone().unwrap().0,
                    c.consumable_type.clone().unwrap_or_default(),
                    c.colour.clone().unwrap_or_default(),
                    c.description.clone().unwrap_or_default(),
                );
                *per_slot.entry(key).or_default() += 1;
            }
            per_slot.values().any(|n| *n == 2)
        });
        assert!(tied);
    }

    #[test]
    fn meters_grow_daily_and_belong_to_known_devices() {
        let fleet = generate(DEFAULT_SEED, reference_time());
        assert_eq!(fleet.meters.len(), fleet.devices.len() * METER_DAYS as usize);

        let rows = meter_rows(&fleet);
        assert_eq!(rows.len(), fleet.meters.len());
        assert!(rows.iter().all(|r| r.customer_id.is_some()));

        let readings: Vec<MeterRecord> = rows
            .iter()
            .map(|r| MeterRecord {
                device_id: r.device_id.clone(),
                reading_at: r.reading_at,
                engine_cycles: r.engine_cycles,
                mono_pages: r.mono_pages,
                colour_pages: r.colour_pages,
            })
            .collect();
        let usage = meters::daily_usage(&readings);
        assert!(usage.iter().all(|u| u.engine_cycles.is_none_or(|d| d >= 0)));
        let summary = meters::summarize_meters(&readings);
        assert_eq!(summary.devices, fleet.devices.len());
        assert!(summary.avg_mono_pages.is_some_and(|v| v > 0.0));
    }
}
