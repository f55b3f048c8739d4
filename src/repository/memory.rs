// In-memory repository - a map of deep-cloned trays
//
// Intended for tests and ephemeral runs. Every save and load clones, so
// callers can keep mutating their trays without aliasing stored state.
// Not thread-safe by contract (single-writer assumption).

use super::TrayRepository;
use crate::error::{Result, TrayError};
use crate::model::{Material, Tray};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryRepository {
    trays: HashMap<String, Tray>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrayRepository for MemoryRepository {
    fn save_tray_header(&mut self, tray: &Tray) -> Result<()> {
        match self.trays.get_mut(&tray.tray_id) {
            Some(stored) => {
                // Full-field upsert: header fields are overwritten wholesale,
                // stored materials are kept
                stored.rows = tray.rows;
                stored.cols = tray.cols;
                stored.batch_name = tray.batch_name.clone();
                stored.created_at = tray.created_at;
                stored.completed_at = tray.completed_at;
            }
            None => {
                self.trays.insert(tray.tray_id.clone(), tray.clone());
            }
        }
        Ok(())
    }

    fn update_tray_completion(
        &mut self,
        tray_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let tray = self
            .trays
            .get_mut(tray_id)
            .ok_or_else(|| TrayError::NotFound(tray_id.to_owned()))?;
        tray.completed_at = Some(completed_at);
        Ok(())
    }

    fn save_material(&mut self, tray_id: &str, material: &Material) -> Result<()> {
        let tray = self
            .trays
            .get_mut(tray_id)
            .ok_or_else(|| TrayError::NotFound(tray_id.to_owned()))?;
        tray.add_or_update_material(material.clone());
        Ok(())
    }

    fn load_recent_trays(&mut self, limit: usize) -> Result<Vec<Tray>> {
        let mut trays: Vec<Tray> = self.trays.values().cloned().collect();
        trays.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        trays.truncate(limit);
        Ok(trays)
    }

    fn delete_tray(&mut self, tray_id: &str) -> Result<()> {
        self.trays
            .remove(tray_id)
            .map(|_| ())
            .ok_or_else(|| TrayError::NotFound(tray_id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_tray_does_not_alias_callers_copy() {
        let mut repo = MemoryRepository::new();
        let mut tray = Tray::new("t1", 2, 2, None, Utc::now()).unwrap();
        repo.save_tray_header(&tray).unwrap();

        // Mutate the caller's tray after saving; the stored copy is isolated
        tray.add_or_update_material(Material::new(1, 1, "OK", None, Utc::now()));
        assert_eq!(repo.load_recent_trays(1).unwrap()[0].material_count(), 0);

        // And mutating a loaded tray does not touch the store
        let mut loaded = repo.load_recent_trays(1).unwrap().remove(0);
        loaded.add_or_update_material(Material::new(2, 2, "NG", None, Utc::now()));
        assert_eq!(repo.load_recent_trays(1).unwrap()[0].material_count(), 0);
    }

    #[test]
    fn header_upsert_preserves_stored_materials() {
        let mut repo = MemoryRepository::new();
        let now = Utc::now();
        let tray = Tray::new("t1", 2, 2, Some("a".into()), now).unwrap();
        repo.save_tray_header(&tray).unwrap();
        repo.save_material("t1", &Material::new(1, 1, "OK", None, now))
            .unwrap();

        // Re-saving a header with no materials must not wipe the items
        let renamed = Tray::new("t1", 2, 2, Some("renamed".into()), now).unwrap();
        repo.save_tray_header(&renamed).unwrap();

        let got = &repo.load_recent_trays(1).unwrap()[0];
        assert_eq!(got.batch_name.as_deref(), Some("renamed"));
        assert_eq!(got.material_count(), 1);
    }
}
