//! Read side of the store: everything the report and export jobs load.

use crate::db::models::{self as dbm, ACTIVE_STATUS, MONITORED};
use crate::report::{ConsumableRecord, CustomerRecord, DeviceRecord, MeterRecord, MonitorRecord};
use crate::schema;
use crate::utils::split_contact_emails;
use diesel::PgConnection;
use diesel::prelude::*;

/// Which devices to load for a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceScope {
    All,
    MonitoredOnly,
}

/// Loads report inputs over a connection owned by the caller.
pub struct FleetRepository<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> FleetRepository<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        FleetRepository { conn }
    }

    pub fn load_consumables(&mut self) -> Result<Vec<ConsumableRecord>, String> {
        use schema::consumables::dsl as K;

        let rows: Vec<dbm::Consumable> = K::consumables
            .order(K::id.asc())
            .select(dbm::Consumable::as_select())
            .load(self.conn)
            .map_err(|e| format!("load consumables failed: {}", e))?;
        Ok(rows.into_iter().map(ConsumableRecord::from).collect())
    }

    pub fn load_devices(&mut self, scope: DeviceScope) -> Result<Vec<DeviceRecord>, String> {
        use schema::devices::dsl as D;

        let mut query = D::devices.select(dbm::Device::as_select()).order(D::id.asc()).into_boxed();
        if scope == DeviceScope::MonitoredOnly {
            query = query.filter(D::monitor_status.eq(MONITORED));
        }
        let rows: Vec<dbm::Device> = query
            .load(self.conn)
            .map_err(|e| format!("load devices failed: {}", e))?;
        Ok(rows.into_iter().map(DeviceRecord::from).collect())
    }

    pub fn load_active_customers(&mut self) -> Result<Vec<CustomerRecord>, String> {
        use schema::customers::dsl as C;

        let rows: Vec<dbm::Customer> = C::customers
            .filter(C::status.eq(ACTIVE_STATUS))
            .order(C::name.asc())
            .select(dbm::Customer::as_select())
            .load(self.conn)
            .map_err(|e| format!("load customers failed: {}", e))?;
        Ok(rows.into_iter().map(CustomerRecord::from).collect())
    }

    /// Vendor ids of every stored customer, the unit of work for a sync.
    pub fn customer_ids(&mut self) -> Result<Vec<String>, String> {
        use schema::customers::dsl as C;

        C::customers
            .order(C::customer_id.asc())
            .select(C::customer_id)
            .load(self.conn)
            .map_err(|e| format!("load customer ids failed: {}", e))
    }

    pub fn load_monitors(&mut self) -> Result<Vec<MonitorRecord>, String> {
        use schema::monitors::dsl as M;

        let rows: Vec<dbm::Monitor> = M::monitors
            .order(M::id.asc())
            .select(dbm::Monitor::as_select())
            .load(self.conn)
            .map_err(|e| format!("load monitors failed: {}", e))?;
        Ok(rows.into_iter().map(MonitorRecord::from).collect())
    }

    /// Contact addresses of the ACTIVE customers with this name, or
    /// `defaults` when there are none.
    pub fn recipients_for_customer(&mut self, name: &str, defaults: &[String]) -> Result<Vec<String>, String> {
        let customers = self.load_active_customers()?;
        Ok(recipients_for_name(&customers, name, defaults))
    }

    pub fn load_meter_readings(&mut self) -> Result<Vec<MeterRecord>, String> {
        use schema::meter_readings::dsl as R;

        let rows: Vec<dbm::MeterReading> = R::meter_readings
            .order((R::device_id.asc(), R::reading_at.asc()))
            .select(dbm::MeterReading::as_select())
            .load(self.conn)
            .map_err(|e| format!("load meter readings failed: {}", e))?;
        Ok(rows.into_iter().map(MeterRecord::from).collect())
    }
}

/// Addresses of every ACTIVE customer named `name`, merged and deduplicated,
/// falling back to `defaults`.
pub fn recipients_for_name(customers: &[CustomerRecord], name: &str, defaults: &[String]) -> Vec<String> {
    let name = name.trim();
    let stored = customers
        .iter()
        .filter(|c| c.status.as_deref() == Some(ACTIVE_STATUS))
        .filter(|c| c.name.as_deref().map(str::trim) == Some(name))
        .filter_map(|c| c.contact_email.as_deref());
    resolve_recipients(stored, defaults)
}

/// Split and dedupe stored addresses, falling back to `defaults` when nothing usable is left.
pub fn resolve_recipients<'a>(stored: impl IntoIterator<Item = &'a str>, defaults: &[String]) -> Vec<String> {
    let found = split_contact_emails(stored);
    if found.is_empty() { defaults.to_vec() } else { found }
}
