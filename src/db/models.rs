//! Diesel model structs for the fleet collections.
//!
//! Each table keeps the typed columns the reports read plus the untouched API
//! payload in `document`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::sds;
use crate::report::{ConsumableRecord, CustomerRecord, DeviceRecord, MeterRecord, MonitorRecord};
use crate::schema;
use crate::utils::coerce_timestamp;

/// Customers with this status are the ones reported on.
pub const ACTIVE_STATUS: &str = "ACTIVE";
/// `devices.monitor_status` of devices under monitoring.
pub const MONITORED: &str = "Y";

fn document<T: Serialize>(payload: &T) -> serde_json::Value {
    serde_json::to_value(payload).unwrap_or(serde_json::Value::Null)
}

fn coerce(raw: Option<&String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| coerce_timestamp(s))
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::customers)]
pub struct Customer {
    pub id: i64,
    pub customer_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub city: Option<String>,
    pub contact_email: Option<String>,
    pub document: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::customers)]
pub struct NewCustomer {
    pub customer_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub city: Option<String>,
    pub contact_email: Option<String>,
    pub document: serde_json::Value,
}

impl NewCustomer {
    /// `None` when the payload has no usable id.
    pub fn from_api(c: &sds::Customer) -> Option<Self> {
        let customer_id = c.customer_id.as_ref().map(|id| id.0.clone()).filter(|id| !id.is_empty())?;
        Some(NewCustomer {
            customer_id,
            name: c.name.clone(),
            status: c.status.clone(),
            city: c.city.clone(),
            contact_email: c.contact_email.clone(),
            document: document(c),
        })
    }
}

impl From<Customer> for CustomerRecord {
    fn from(row: Customer) -> Self {
        CustomerRecord {
            customer_id: row.customer_id,
            name: row.name,
            status: row.status,
            city: row.city,
            contact_email: row.contact_email,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::devices)]
pub struct Device {
    pub id: i64,
    pub device_id: String,
    pub customer_id: Option<String>,
    pub serial_number: Option<String>,
    pub ip_address: Option<String>,
    pub monitor_status: Option<String>,
    pub model: Option<String>,
    pub zone: Option<String>,
    pub location: Option<String>,
    pub firmware: Option<String>,
    pub discovery_date: Option<DateTime<Utc>>,
    pub last_contact: Option<DateTime<Utc>>,
    pub document: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::devices)]
pub struct NewDevice {
    pub device_id: String,
    pub customer_id: Option<String>,
    pub serial_number: Option<String>,
    pub ip_address: Option<String>,
    pub monitor_status: Option<String>,
    pub model: Option<String>,
    pub zone: Option<String>,
    pub location: Option<String>,
    pub firmware: Option<String>,
    pub discovery_date: Option<DateTime<Utc>>,
    pub last_contact: Option<DateTime<Utc>>,
    pub document: serde_json::Value,
}

impl NewDevice {
    /// `fallback_customer` fills in devices listed under a customer without
    /// repeating its id.
    pub fn from_api(d: &sds::Device, fallback_customer: Option<&sds::CustomerId>) -> Option<Self> {
        let device_id = d.device_id.as_ref().map(|id| id.0.clone()).filter(|id| !id.is_empty())?;
        let ext = d.extended_fields.as_ref();
        Some(NewDevice {
            device_id,
            customer_id: d.customer_id.as_ref().or(fallback_customer).map(|id| id.0.clone()),
            serial_number: d.serial_number.clone(),
            ip_address: d.ip_address.clone(),
            monitor_status: d.monitor_status.clone(),
            model: ext.and_then(|e| e.model.clone()),
            zone: ext.and_then(|e| e.zone.clone()),
            location: ext.and_then(|e| e.location.clone()),
            firmware: ext.and_then(|e| e.firmware.clone()),
            discovery_date: coerce(d.discovery_date.as_ref()),
            last_contact: coerce(d.last_contact.as_ref()),
            document: document(d),
        })
    }
}

impl From<Device> for DeviceRecord {
    fn from(row: Device) -> Self {
        DeviceRecord {
            device_id: row.device_id,
            customer_id: row.customer_id,
            serial_number: row.serial_number,
            ip_address: row.ip_address,
            monitor_status: row.monitor_status,
            model: row.model,
            zone: row.zone,
            location: row.location,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::consumables)]
pub struct Consumable {
    pub id: i64,
    pub consumable_id: String,
    pub device_id: String,
    pub consumable_type: Option<String>,
    pub colour: Option<String>,
    pub description: Option<String>,
    pub days_left: Option<i64>,
    pub days_monitored: Option<i64>,
    pub engine_cycles_monitored: Option<i64>,
    pub last_read: Option<DateTime<Utc>>,
    pub pages_left: Option<i64>,
    pub percent_left: Option<f64>,
    pub serial_number: Option<String>,
    pub sku: Option<String>,
    pub yield_pages: Option<f64>,
    pub document: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::consumables)]
pub struct NewConsumable {
    pub consumable_id: String,
    pub device_id: String,
    pub consumable_type: Option<String>,
    pub colour: Option<String>,
    pub description: Option<String>,
    pub days_left: Option<i64>,
    pub days_monitored: Option<i64>,
    pub engine_cycles_monitored: Option<i64>,
    pub last_read: Option<DateTime<Utc>>,
    pub pages_left: Option<i64>,
    pub percent_left: Option<f64>,
    pub serial_number: Option<String>,
    pub sku: Option<String>,
    pub yield_pages: Option<f64>,
    pub document: serde_json::Value,
}

impl NewConsumable {
    /// Consumables need both their own id and the device they sit in.
    pub fn from_api(c: &sds::Consumable) -> Option<Self> {
        let consumable_id = c.consumable_id.as_ref().map(|id| id.0.clone()).filter(|id| !id.is_empty())?;
        let device_id = c.device_id.as_ref().map(|id| id.0.clone()).filter(|id| !id.is_empty())?;
        Some(NewConsumable {
            consumable_id,
            device_id,
            consumable_type: c.consumable_type.clone(),
            colour: c.colour.clone(),
            description: c.description.clone(),
            days_left: c.days_left,
            days_monitored: c.days_monitored,
            engine_cycles_monitored: c.engine_cycles_monitored,
            last_read: coerce(c.last_read.as_ref()),
            pages_left: c.pages_left,
            percent_left: c.percent_left,
            serial_number: c.serial_number.clone(),
            sku: c.sku.clone(),
            yield_pages: c.yield_pages,
            document: document(c),
        })
    }
}

impl From<Consumable> for ConsumableRecord {
    fn from(row: Consumable) -> Self {
        ConsumableRecord {
            consumable_id: row.consumable_id,
            device_id: row.device_id,
            consumable_type: row.consumable_type.unwrap_or_default(),
            colour: row.colour.unwrap_or_default(),
            description: row.description.unwrap_or_default(),
            days_left: row.days_left,
            days_monitored: row.days_monitored,
            engine_cycles_monitored: row.engine_cycles_monitored,
            last_read: row.last_read,
            pages_left: row.pages_left,
            percent_left: row.percent_left,
            serial_number: row.serial_number,
            sku: row.sku,
            yield_pages: row.yield_pages,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::monitors)]
pub struct Monitor {
    pub id: i64,
    pub monitor_id: String,
    pub customer_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub online: Option<bool>,
    pub last_contact: Option<DateTime<Utc>>,
    pub licence_expiry_date: Option<DateTime<Utc>>,
    pub document: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::monitors)]
pub struct NewMonitor {
    pub monitor_id: String,
    pub customer_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub online: Option<bool>,
    pub last_contact: Option<DateTime<Utc>>,
    pub licence_expiry_date: Option<DateTime<Utc>>,
    pub document: serde_json::Value,
}

impl NewMonitor {
    pub fn from_api(m: &sds::Monitor, fallback_customer: Option<&sds::CustomerId>) -> Option<Self> {
        let monitor_id = m.monitor_id.as_ref().map(|id| id.0.clone()).filter(|id| !id.is_empty())?;
        Some(NewMonitor {
            monitor_id,
            customer_id: m.customer_id.as_ref().or(fallback_customer).map(|id| id.0.clone()),
            name: m.name.clone(),
            status: m.status.clone(),
            online: m.online,
            last_contact: coerce(m.last_contact.as_ref()),
            licence_expiry_date: coerce(m.licence_expiry_date.as_ref()),
            document: document(m),
        })
    }
}

impl From<Monitor> for MonitorRecord {
    fn from(row: Monitor) -> Self {
        MonitorRecord {
            monitor_id: row.monitor_id,
            customer_id: row.customer_id,
            name: row.name,
            status: row.status,
            online: row.online,
            last_contact: row.last_contact,
            licence_expiry_date: row.licence_expiry_date,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::meter_readings)]
pub struct MeterReading {
    pub id: i64,
    pub device_id: String,
    pub customer_id: Option<String>,
    pub reading_at: DateTime<Utc>,
    pub document: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub engine_cycles: Option<i64>,
    pub mono_pages: Option<i64>,
    pub colour_pages: Option<i64>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::meter_readings)]
pub struct NewMeterReading {
    pub device_id: String,
    pub customer_id: Option<String>,
    pub reading_at: DateTime<Utc>,
    pub engine_cycles: Option<i64>,
    pub mono_pages: Option<i64>,
    pub colour_pages: Option<i64>,
    pub document: serde_json::Value,
}

impl NewMeterReading {
    /// Readings without a device or a parseable reading time cannot be deduplicated and are dropped.
    pub fn from_api(m: &sds::MeterReading, customer: &sds::CustomerId) -> Option<Self> {
        let device_id = m.device_id.as_ref().map(|id| id.0.clone()).filter(|id| !id.is_empty())?;
        let reading_at = coerce(m.reading_date_time.as_ref())?;
        Some(NewMeterReading {
            device_id,
            customer_id: Some(customer.0.clone()),
            reading_at,
            engine_cycles: m.engine_cycles,
            mono_pages: m.mono_small,
            colour_pages: m.colour_pages,
            document: document(m),
        })
    }
}

impl From<MeterReading> for MeterRecord {
    fn from(row: MeterReading) -> Self {
        MeterRecord {
            device_id: row.device_id,
            reading_at: row.reading_at,
            engine_cycles: row.engine_cycles,
            mono_pages: row.mono_pages,
            colour_pages: row.colour_pages,
        }
    }
}
