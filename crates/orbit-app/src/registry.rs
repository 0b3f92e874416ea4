//! In-memory table of known devices
//!
//! Serials are unique and entries keep their insertion order. Bridge entries
//! are reconciled against each poll with a miss counter, so a device that
//! drops out of a single `adb devices` listing is not lost.

use chrono::Local;
use orbit_core::{Device, DeviceState, Origin};

/// What a reconcile or upsert changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    /// A serial not seen before
    Appeared(Device),

    StateChanged {
        serial: String,
        from: DeviceState,
        to: DeviceState,
    },

    /// A bridge device was absent from a poll but is still retained
    Missing {
        serial: String,
        misses: u32,
        threshold: u32,
    },

    /// A bridge device was absent from `threshold` consecutive polls
    Removed(Device),

    /// A network entry was taken over by the bridge listing
    Merged { serial: String },
}

#[derive(Debug, Clone)]
struct Entry {
    device: Device,
    misses: u32,
}

#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    entries: Vec<Entry>,
    disappear_after: u32,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(2)
    }
}

impl DeviceRegistry {
    /// `disappear_after` is clamped to at least one poll
    pub fn new(disappear_after: u32) -> Self {
        Self {
            entries: Vec::new(),
            disappear_after: disappear_after.max(1),
        }
    }

    fn position(&self, serial: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.device.serial == serial)
    }

    /// Insert or replace a device by serial
    ///
    /// A replacement keeps its position and its model when the new record has
    /// none.
    pub fn upsert(&mut self, mut device: Device) -> Option<RegistryChange> {
        match self.position(&device.serial) {
            Some(index) => {
                let entry = &mut self.entries[index];
                if device.model.is_none() {
                    device.model = entry.device.model.take();
                }
                let from = entry.device.state;
                let to = device.state;
                entry.device = device;
                entry.misses = 0;

                (from != to).then(|| RegistryChange::StateChanged {
                    serial: entry.device.serial.clone(),
                    from,
                    to,
                })
            }
            None => {
                self.entries.push(Entry {
                    device: device.clone(),
                    misses: 0,
                });
                Some(RegistryChange::Appeared(device))
            }
        }
    }

    pub fn remove(&mut self, serial: &str) -> Option<Device> {
        self.position(serial)
            .map(|index| self.entries.remove(index).device)
    }

    pub fn get(&self, serial: &str) -> Option<&Device> {
        self.entries
            .iter()
            .map(|e| &e.device)
            .find(|d| d.serial == serial)
    }

    /// Devices in insertion order
    pub fn snapshot(&self) -> Vec<Device> {
        self.entries.iter().map(|e| e.device.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reconcile bridge entries against a fresh `adb devices` listing
    ///
    /// Listed devices are inserted or refreshed; a network entry with the same
    /// serial is replaced in place. Bridge entries missing from the listing
    /// are removed once they have been missing for `disappear_after`
    /// consecutive polls. Network entries not in the listing are untouched.
    pub fn reconcile_bridge_list(&mut self, polled: Vec<Device>) -> Vec<RegistryChange> {
        let mut changes = Vec::new();
        let mut seen: Vec<String> = Vec::with_capacity(polled.len());
        let now = Local::now();

        for mut device in polled {
            if seen.contains(&device.serial) {
                continue;
            }
            seen.push(device.serial.clone());
            device.origin = Origin::Bridge;
            device.last_seen = now;

            match self.position(&device.serial) {
                Some(index) => {
                    let entry = &mut self.entries[index];
                    if device.model.is_none() {
                        device.model = entry.device.model.take();
                    }

                    if entry.device.origin == Origin::Network {
                        changes.push(RegistryChange::Merged {
                            serial: device.serial.clone(),
                        });
                    }
                    if entry.device.state != device.state {
                        changes.push(RegistryChange::StateChanged {
                            serial: device.serial.clone(),
                            from: entry.device.state,
                            to: device.state,
                        });
                    }

                    entry.device = device;
                    entry.misses = 0;
                }
                None => {
                    changes.push(RegistryChange::Appeared(device.clone()));
                    self.entries.push(Entry { device, misses: 0 });
                }
            }
        }

        let threshold = self.disappear_after;
        let mut removed = Vec::new();
        for entry in &mut self.entries {
            if entry.device.origin != Origin::Bridge || seen.contains(&entry.device.serial) {
                continue;
            }
            entry.misses += 1;
            if entry.misses >= threshold {
                removed.push(entry.device.serial.clone());
            } else {
                changes.push(RegistryChange::Missing {
                    serial: entry.device.serial.clone(),
                    misses: entry.misses,
                    threshold,
                });
            }
        }

        for serial in removed {
            if let Some(device) = self.remove(&serial) {
                changes.push(RegistryChange::Removed(device));
            }
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_bridge::test_utils::{online_device, online_device_with_model};
    use std::collections::HashSet;

    fn serials(registry: &DeviceRegistry) -> Vec<String> {
        registry.snapshot().into_iter().map(|d| d.serial).collect()
    }

    #[test]
    fn test_upsert_inserts_and_replaces() {
        let mut registry = DeviceRegistry::default();

        let change = registry.upsert(online_device_with_model("ABC123", "Pixel7"));
        assert!(matches!(change, Some(RegistryChange::Appeared(_))));

        let change = registry.upsert(Device::bridge("ABC123", DeviceState::Offline));
        assert_eq!(
            change,
            Some(RegistryChange::StateChanged {
                serial: "ABC123".to_string(),
                from: DeviceState::Online,
                to: DeviceState::Offline,
            })
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("ABC123").unwrap().model.as_deref(), Some("Pixel7"));
    }

    #[test]
    fn test_upsert_same_state_reports_nothing() {
        let mut registry = DeviceRegistry::default();
        registry.upsert(online_device("ABC123"));
        assert_eq!(registry.upsert(online_device("ABC123")), None);
    }

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let mut registry = DeviceRegistry::default();
        registry.upsert(online_device("B"));
        registry.upsert(online_device("A"));
        registry.upsert(online_device("C"));
        registry.upsert(online_device("A"));
        assert_eq!(serials(&registry), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_remove() {
        let mut registry = DeviceRegistry::default();
        registry.upsert(online_device("ABC123"));
        assert!(registry.remove("ABC123").is_some());
        assert!(registry.remove("ABC123").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reconcile_appears_and_refreshes() {
        let mut registry = DeviceRegistry::default();
        let changes = registry.reconcile_bridge_list(vec![online_device("ABC123")]);
        assert!(matches!(&changes[..], [RegistryChange::Appeared(d)] if d.serial == "ABC123"));

        let first_seen = registry.get("ABC123").unwrap().last_seen;
        let changes = registry.reconcile_bridge_list(vec![online_device("ABC123")]);
        assert!(changes.is_empty());
        assert!(registry.get("ABC123").unwrap().last_seen >= first_seen);
    }

    #[test]
    fn test_missing_device_removed_after_threshold() {
        let mut registry = DeviceRegistry::new(2);
        registry.reconcile_bridge_list(vec![online_device("ABC123")]);

        let changes = registry.reconcile_bridge_list(vec![]);
        assert_eq!(
            changes,
            vec![RegistryChange::Missing {
                serial: "ABC123".to_string(),
                misses: 1,
                threshold: 2,
            }]
        );
        assert_eq!(registry.len(), 1);

        let changes = registry.reconcile_bridge_list(vec![]);
        assert!(matches!(&changes[..], [RegistryChange::Removed(d)] if d.serial == "ABC123"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reappearing_device_resets_miss_count() {
        let mut registry = DeviceRegistry::new(2);
        registry.reconcile_bridge_list(vec![online_device("ABC123")]);
        registry.reconcile_bridge_list(vec![]);
        registry.reconcile_bridge_list(vec![online_device("ABC123")]);
        registry.reconcile_bridge_list(vec![]);

        assert_eq!(serials(&registry), vec!["ABC123"]);
    }

    #[test]
    fn test_reconcile_preserves_network_entries() {
        let mut registry = DeviceRegistry::new(1);
        registry.upsert(Device::network("192.168.1.50:5555", DeviceState::Online));

        let changes = registry.reconcile_bridge_list(vec![]);
        assert!(changes.is_empty());
        assert_eq!(serials(&registry), vec!["192.168.1.50:5555"]);
    }

    #[test]
    fn test_reconcile_merges_network_entry_in_place() {
        let mut registry = DeviceRegistry::default();
        registry.upsert(online_device("FIRST"));
        registry.upsert(
            Device::network("192.168.1.50:5555", DeviceState::Online).with_model("Pixel7"),
        );
        registry.upsert(online_device("LAST"));

        let changes = registry.reconcile_bridge_list(vec![
            online_device("FIRST"),
            Device::bridge("192.168.1.50:5555", DeviceState::Online),
            online_device("LAST"),
        ]);

        assert!(changes.contains(&RegistryChange::Merged {
            serial: "192.168.1.50:5555".to_string()
        }));
        assert_eq!(serials(&registry), vec!["FIRST", "192.168.1.50:5555", "LAST"]);
        let merged = registry.get("192.168.1.50:5555").unwrap();
        assert_eq!(merged.origin, Origin::Bridge);
        assert_eq!(merged.model.as_deref(), Some("Pixel7"));
    }

    #[test]
    fn test_reconcile_ignores_duplicate_rows() {
        let mut registry = DeviceRegistry::default();
        registry.reconcile_bridge_list(vec![online_device("ABC123"), online_device("ABC123")]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_no_duplicate_serials_under_mixed_sequences() {
        let mut registry = DeviceRegistry::new(2);
        let pool = ["A", "B", "10.0.0.2:5555", "C"];

        for round in 0..40usize {
            let serial = pool[round % pool.len()];
            match round % 5 {
                0 => {
                    registry.upsert(online_device(serial));
                }
                1 => {
                    registry.upsert(Device::network(serial, DeviceState::Online));
                }
                2 => {
                    let polled = pool
                        .iter()
                        .skip(round % 3)
                        .map(|s| online_device(s))
                        .collect();
                    registry.reconcile_bridge_list(polled);
                }
                3 => {
                    registry.reconcile_bridge_list(vec![]);
                }
                _ => {
                    registry.remove(serial);
                }
            }

            let all = serials(&registry);
            let unique: HashSet<_> = all.iter().collect();
            assert_eq!(all.len(), unique.len(), "duplicate serial after round {round}");
        }
    }
}
