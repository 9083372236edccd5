use crate::db::models as dbm;
use crate::schema;
use chrono::Utc;
use diesel::PgConnection;
use diesel::prelude::*;
use std::collections::HashSet;

/// Rows written by one upsert batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertCounts {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }

    /// Split `keys` into new and already stored ones. Repeated keys in one
    /// batch count once as an insert, the rest as updates.
    fn tally<'a>(keys: impl IntoIterator<Item = &'a str>, existing: &HashSet<String>) -> Self {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut counts = UpsertCounts::default();
        for key in keys {
            if existing.contains(key) || !seen.insert(key) {
                counts.updated += 1;
            } else {
                counts.inserted += 1;
            }
        }
        counts
    }
}

impl std::ops::AddAssign for UpsertCounts {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
    }
}

pub fn upsert_customers(conn: &mut PgConnection, rows: &[dbm::NewCustomer]) -> Result<UpsertCounts, String> {
    if rows.is_empty() {
        return Ok(UpsertCounts::default());
    }

    use schema::customers::dsl as C;

    conn.transaction(|conn| {
        let keys: Vec<&str> = rows.iter().map(|r| r.customer_id.as_str()).collect();
        let existing: HashSet<String> = C::customers
            .filter(C::customer_id.eq_any(keys.iter().copied()))
            .select(C::customer_id)
            .load::<String>(conn)?
            .into_iter()
            .collect();

        for row in rows {
            diesel::insert_into(C::customers)
                .values(row)
                .on_conflict(C::customer_id)
                .do_update()
                .set((
                    C::name.eq(row.name.clone()),
                    C::status.eq(row.status.clone()),
                    C::city.eq(row.city.clone()),
                    C::contact_email.eq(row.contact_email.clone()),
                    C::document.eq(row.document.clone()),
                    C::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
        }
        Ok(UpsertCounts::tally(keys, &existing))
    })
    .map_err(|e: diesel::result::Error| format!("upsert customers failed: {}", e))
}

pub fn upsert_devices(conn: &mut PgConnection, rows: &[dbm::NewDevice]) -> Result<UpsertCounts, String> {
    if rows.is_empty() {
        return Ok(UpsertCounts::default());
    }

    use schema::devices::dsl as D;

    conn.transaction(|conn| {
        let keys: Vec<&str> = rows.iter().map(|r| r.device_id.as_str()).collect();
        let existing: HashSet<String> = D::devices
            .filter(D::device_id.eq_any(keys.iter().copied()))
            .select(D::device_id)
            .load::<String>(conn)?
            .into_iter()
            .collect();

        for row in rows {
            diesel::insert_into(D::devices)
                .values(row)
                .on_conflict(D::device_id)
                .do_update()
                .set((
                    D::customer_id.eq(row.customer_id.clone()),
                    D::serial_number.eq(row.serial_number.clone()),
                    D::ip_address.eq(row.ip_address.clone()),
                    D::monitor_status.eq(row.monitor_status.clone()),
                    D::model.eq(row.model.clone()),
                    D::zone.eq(row.zone.clone()),
                    D::location.eq(row.location.clone()),
                    D::firmware.eq(row.firmware.clone()),
                    D::discovery_date.eq(row.discovery_date),
                    D::last_contact.eq(row.last_contact),
                    D::document.eq(row.document.clone()),
                    D::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
        }
        Ok(UpsertCounts::tally(keys, &existing))
    })
    .map_err(|e: diesel::result::Error| format!("upsert devices failed: {}", e))
}

pub fn upsert_consumables(conn: &mut PgConnection, rows: &[dbm::NewConsumable]) -> Result<UpsertCounts, String> {
    if rows.is_empty() {
        return Ok(UpsertCounts::default());
    }

    use schema::consumables::dsl as K;

    conn.transaction(|conn| {
        let keys: Vec<&str> = rows.iter().map(|r| r.consumable_id.as_str()).collect();
        let existing: HashSet<String> = K::consumables
            .filter(K::consumable_id.eq_any(keys.iter().copied()))
            .select(K::consumable_id)
            .load::<String>(conn)?
            .into_iter()
            .collect();

        for row in rows {
            diesel::insert_into(K::consumables)
                .values(row)
                .on_conflict(K::consumable_id)
                .do_update()
                .set((
                    K::device_id.eq(row.device_id.clone()),
                    K::consumable_type.eq(row.consumable_type.clone()),
                    K::colour.eq(row.colour.clone()),
                    K::description.eq(row.description.clone()),
                    K::days_left.eq(row.days_left),
                    K::days_monitored.eq(row.days_monitored),
                    K::engine_cycles_monitored.eq(row.engine_cycles_monitored),
                    K::last_read.eq(row.last_read),
                    K::pages_left.eq(row.pages_left),
                    K::percent_left.eq(row.percent_left),
                    K::serial_number.eq(row.serial_number.clone()),
                    K::sku.eq(row.sku.clone()),
                    K::yield_pages.eq(row.yield_pages),
                    K::document.eq(row.document.clone()),
                    K::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
        }
        Ok(UpsertCounts::tally(keys, &existing))
    })
    .map_err(|e: diesel::result::Error| format!("upsert consumables failed: {}", e))
}

pub fn upsert_monitors(conn: &mut PgConnection, rows: &[dbm::NewMonitor]) -> Result<UpsertCounts, String> {
    if rows.is_empty() {
        return Ok(UpsertCounts::default());
    }

    use schema::monitors::dsl as M;

    conn.transaction(|conn| {
        let keys: Vec<&str> = rows.iter().map(|r| r.monitor_id.as_str()).collect();
        let existing: HashSet<String> = M::monitors
            .filter(M::monitor_id.eq_any(keys.iter().copied()))
            .select(M::monitor_id)
            .load::<String>(conn)?
            .into_iter()
            .collect();

        for row in rows {
            diesel::insert_into(M::monitors)
                .values(row)
                .on_conflict(M::monitor_id)
                .do_update()
                .set((
                    M::customer_id.eq(row.customer_id.clone()),
                    M::name.eq(row.name.clone()),
                    M::status.eq(row.status.clone()),
                    M::online.eq(row.online),
                    M::last_contact.eq(row.last_contact),
                    M::licence_expiry_date.eq(row.licence_expiry_date),
                    M::document.eq(row.document.clone()),
                    M::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
        }
        Ok(UpsertCounts::tally(keys, &existing))
    })
    .map_err(|e: diesel::result::Error| format!("upsert monitors failed: {}", e))
}

// Keeps each statement well under the Postgres bind parameter limit.
const METER_CHUNK: usize = 1000;

/// Readings are append-only; a repeated `(device, reading time)` is skipped.
pub fn insert_meter_readings(conn: &mut PgConnection, rows: &[dbm::NewMeterReading]) -> Result<usize, String> {
    if rows.is_empty() {
        return Ok(0);
    }

    use schema::meter_readings::dsl as R;

    let mut inserted = 0;
    for chunk in rows.chunks(METER_CHUNK) {
        inserted += diesel::insert_into(R::meter_readings)
            .values(chunk)
            .on_conflict((R::device_id, R::reading_at))
            .do_nothing()
            .execute(conn)
            .map_err(|e| format!("insert meter readings failed: {}", e))?;
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_splits_new_and_known_keys() {
        let existing: HashSet<String> = ["c-1".to_string()].into_iter().collect();
        let counts = UpsertCounts::tally(["c-1", "c-2", "c-3", "c-2"], &existing);
        assert_eq!(counts, UpsertCounts { inserted: 2, updated: 2 });
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn counts_accumulate() {
        let mut total = UpsertCounts::default();
        total += UpsertCounts { inserted: 1, updated: 2 };
        total += UpsertCounts { inserted: 3, updated: 0 };
        assert_eq!(total, UpsertCounts { inserted: 4, updated: 2 });
    }
}
