//! Slot grouping and current/replaced classification.
//!
//! A slot is one position in a device (device + type + colour). Consumables that
//! share a slot are its replacement history; the most recently read one is current.

use super::{ConsumableRecord, JoinedRow, SupplyStatus};
use std::collections::HashMap;

/// Consumable type the vendor reports when it cannot identify the part.
pub const UNKNOWN_TYPE: &str = "UNKNOWN";

/// Slot key for a consumable. Unknown parts are told apart by description.
pub fn group_key(consumable: &ConsumableRecord) -> String {
    let mut key = format!(
        "{}_{}_{}",
        consumable.device_id, consumable.consumable_type, consumable.colour
    );
    if consumable.consumable_type.to_uppercase() == UNKNOWN_TYPE {
        key.push('_');
        key.push_str(&consumable.description);
    }
    key
}

/// Status for each row, index-aligned with `rows`.
///
/// In a slot with several consumables, every member whose `last_read` equals the
/// slot maximum is current, so a tie yields more than one current consumable.
/// A member without `last_read` is never the maximum.
pub fn classify(rows: &[JoinedRow]) -> Vec<SupplyStatus> {
    let mut slots: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, row) in rows.iter().enumerate() {
        slots.entry(group_key(&row.consumable)).or_default().push(index);
    }

    let mut statuses = vec![SupplyStatus::Current; rows.len()];
    for members in slots.values().filter(|m| m.len() > 1) {
        let latest = members.iter().filter_map(|&i| rows[i].consumable.last_read).max();
        for &index in members {
            let read = rows[index].consumable.last_read;
            if latest.is_none() || read != latest {
                statuses[index] = SupplyStatus::Superseded;
            }
        }
    }
    statuses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{CustomerRecord, DeviceRecord};
    use chrono::{TimeZone, Utc};

    fn row(device: &str, kind: &str, colour: &str, description: &str, day: Option<u32>) -> JoinedRow {
        JoinedRow {
            consumable: ConsumableRecord {
                consumable_id: format!("{device}-{kind}-{colour}-{day:?}"),
                device_id: device.to_string(),
                consumable_type: kind.to_string(),
                colour: colour.to_string(),
                description: description.to_string(),
                last_read: day.map(|d| Utc.with_ymd_and_hms(2024, 1, d, 8, 0, 0).unwrap()),
                ..ConsumableRecord::default()
            },
            device: DeviceRecord {
                device_id: device.to_string(),
                customer_id: Some("C1".to_string()),
                ..DeviceRecord::default()
            },
            customer: CustomerRecord {
                customer_id: "C1".to_string(),
                ..CustomerRecord::default()
            },
        }
    }

    #[test]
    fn key_joins_device_type_and_colour() {
        let r = row("D1", "TONER", "BLACK", "HP 26A", Some(1));
        assert_eq!(group_key(&r.consumable), "D1_TONER_BLACK");
    }

    #[test]
    fn unknown_key_appends_description_case_insensitively() {
        let upper = row("D1", "UNKNOWN", "NONE", "Fuser kit", Some(1));
        let lower = row("D1", "unknown", "NONE", "Waste box", Some(1));
        assert_eq!(group_key(&upper.consumable), "D1_UNKNOWN_NONE_Fuser kit");
        assert_eq!(group_key(&lower.consumable), "D1_unknown_NONE_Waste box");
    }

    #[test]
    fn single_member_slot_is_current_even_without_read() {
        let rows = vec![row("D1", "TONER", "BLACK", "", None)];
        assert_eq!(classify(&rows), vec![SupplyStatus::Current]);
    }

    #[test]
    fn latest_read_wins_the_slot() {
        let rows = vec![
            row("D1", "TONER", "BLACK", "", Some(10)),
            row("D1", "TONER", "BLACK", "", Some(20)),
            row("D1", "TONER", "CYAN", "", Some(5)),
        ];
        assert_eq!(
            classify(&rows),
            vec![SupplyStatus::Superseded, SupplyStatus::Current, SupplyStatus::Current]
        );
    }

    #[test]
    fn ties_at_the_latest_read_are_all_current() {
        let rows = vec![
            row("D1", "DRUM", "BLACK", "", Some(20)),
            row("D1", "DRUM", "BLACK", "", Some(20)),
            row("D1", "DRUM", "BLACK", "", Some(3)),
        ];
        assert_eq!(
            classify(&rows),
            vec![SupplyStatus::Current, SupplyStatus::Current, SupplyStatus::Superseded]
        );
    }

    #[test]
    fn unknown_parts_with_different_descriptions_are_separate_slots() {
        let rows = vec![
            row("D1", "UNKNOWN", "NONE", "Fuser kit", Some(1)),
            row("D1", "UNKNOWN", "NONE", "Waste box", Some(2)),
        ];
        assert_eq!(classify(&rows), vec![SupplyStatus::Current, SupplyStatus::Current]);
    }

    #[test]
    fn unread_members_of_a_shared_slot_are_replaced() {
        let rows = vec![
            row("D1", "TONER", "BLACK", "", None),
            row("D1", "TONER", "BLACK", "", Some(4)),
        ];
        assert_eq!(classify(&rows), vec![SupplyStatus::Superseded, SupplyStatus::Current]);

        let unread = vec![row("D2", "TONER", "BLACK", "", None), row("D2", "TONER", "BLACK", "", None)];
        assert_eq!(classify(&unread), vec![SupplyStatus::Superseded, SupplyStatus::Superseded]);
    }
}
