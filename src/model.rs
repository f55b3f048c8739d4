// Tray data model
//
// A Tray is one physical carrier being inspected: a fixed rows x cols grid
// where each slot, once inspected, holds a Material record. Statistics are
// derived on demand and never persisted.

use crate::error::{Result, TrayError};
use crate::position::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The result label that counts toward yield, compared case-insensitively
pub const OK_RESULT: &str = "OK";

/// The recorded inspection outcome for one slot
///
/// Immutable once constructed; a later write to the same (row, col) replaces
/// the whole record rather than accumulating history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub row: u32,
    pub col: u32,
    /// Non-empty verdict label from the detection pipeline ("OK", "NG",
    /// or a defect-type string - the vocabulary is the pipeline's business)
    pub result: String,
    pub image_path: Option<String>,
    pub detection_time: DateTime<Utc>,
}

impl Material {
    pub fn new(
        row: u32,
        col: u32,
        result: impl Into<String>,
        image_path: Option<String>,
        detection_time: DateTime<Utc>,
    ) -> Self {
        Self {
            row,
            col,
            result: result.into(),
            image_path,
            detection_time,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.row, self.col)
    }

    /// Whether this material counts toward yield
    pub fn is_ok(&self) -> bool {
        self.result.eq_ignore_ascii_case(OK_RESULT)
    }
}

/// One tray: a fixed-size grid of slots plus inspection metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tray {
    pub tray_id: String,
    pub rows: u32,
    pub cols: u32,
    pub batch_name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set at most once (auto or explicit completion), never cleared
    pub completed_at: Option<DateTime<Utc>>,
    /// Inspected slots keyed by grid position; at most rows*cols entries
    pub materials: HashMap<Position, Material>,
}

impl Tray {
    /// Create an empty tray; dimensions must be positive
    pub fn new(
        tray_id: impl Into<String>,
        rows: u32,
        cols: u32,
        batch_name: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(TrayError::Validation(format!(
                "tray dimensions must be positive, got {rows}x{cols}"
            )));
        }
        Ok(Self {
            tray_id: tray_id.into(),
            rows,
            cols,
            batch_name,
            created_at,
            completed_at: None,
            materials: HashMap::new(),
        })
    }

    pub fn total_slots(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Current occupancy, used for completion checks
    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn is_full(&self) -> bool {
        self.material_count() == self.total_slots()
    }

    pub fn in_bounds(&self, row: u32, col: u32) -> bool {
        (1..=self.rows).contains(&row) && (1..=self.cols).contains(&col)
    }

    /// Upsert a material by its (row, col); returns the stored record
    pub fn add_or_update_material(&mut self, material: Material) -> &Material {
        let position = material.position();
        self.materials.insert(position, material);
        &self.materials[&position]
    }

    pub fn material_at(&self, row: u32, col: u32) -> Option<&Material> {
        self.materials.get(&Position::new(row, col))
    }

    /// Stamp the completion time unless one is already set
    pub fn mark_completed(&mut self, completed_at: DateTime<Utc>) {
        if self.completed_at.is_none() {
            self.completed_at = Some(completed_at);
        }
    }

    /// Materials sorted by detection time ascending, the order the
    /// repositories load them in
    pub fn materials_by_detection_time(&self) -> Vec<&Material> {
        let mut items: Vec<&Material> = self.materials.values().collect();
        items.sort_by_key(|m| m.detection_time);
        items
    }
}

/// Aggregate yield metrics, derived from a tray on demand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrayStatistics {
    pub total_slots: usize,
    pub inspected_count: usize,
    pub ok_count: usize,
    pub ng_count: usize,
    /// ok_count / inspected_count, 0.0 when nothing is inspected yet
    pub yield_rate: f64,
    /// Occurrence count per distinct non-OK result label
    pub defect_counts: HashMap<String, usize>,
}

impl TrayStatistics {
    /// Compute statistics for a tray; an absent tray yields all zeros
    pub fn from_tray(tray: Option<&Tray>) -> Self {
        let Some(tray) = tray else {
            return Self::default();
        };

        let mut ok_count = 0usize;
        let mut defect_counts: HashMap<String, usize> = HashMap::new();
        for material in tray.materials.values() {
            if material.is_ok() {
                ok_count += 1;
            } else {
                *defect_counts.entry(material.result.clone()).or_insert(0) += 1;
            }
        }

        let inspected_count = tray.material_count();
        let yield_rate = if inspected_count == 0 {
            0.0
        } else {
            ok_count as f64 / inspected_count as f64
        };

        Self {
            total_slots: tray.total_slots(),
            inspected_count,
            ok_count,
            ng_count: inspected_count - ok_count,
            yield_rate,
            defect_counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tray_2x2() -> Tray {
        Tray::new("t1", 2, 2, Some("batch-a".into()), Utc::now()).unwrap()
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(matches!(
            Tray::new("t0", 0, 5, None, Utc::now()),
            Err(TrayError::Validation(_))
        ));
    }

    #[test]
    fn upsert_replaces_material_at_same_slot() {
        let mut tray = tray_2x2();
        tray.add_or_update_material(Material::new(1, 1, "OK", None, Utc::now()));
        tray.add_or_update_material(Material::new(1, 1, "NG", None, Utc::now()));

        assert_eq!(tray.material_count(), 1);
        assert_eq!(tray.material_at(1, 1).unwrap().result, "NG");
    }

    #[test]
    fn mark_completed_is_set_once() {
        let mut tray = tray_2x2();
        let first = Utc::now();
        tray.mark_completed(first);
        tray.mark_completed(first + chrono::Duration::seconds(30));
        assert_eq!(tray.completed_at, Some(first));
    }

    #[test]
    fn statistics_for_absent_tray_are_zero() {
        let stats = TrayStatistics::from_tray(None);
        assert_eq!(stats.inspected_count, 0);
        assert_eq!(stats.yield_rate, 0.0);
        assert!(stats.defect_counts.is_empty());
    }

    #[test]
    fn statistics_invariants_hold() {
        let mut tray = tray_2x2();
        let now = Utc::now();
        tray.add_or_update_material(Material::new(1, 1, "OK", None, now));
        tray.add_or_update_material(Material::new(1, 2, "ok", None, now));
        tray.add_or_update_material(Material::new(2, 1, "Scratch", None, now));

        let stats = TrayStatistics::from_tray(Some(&tray));
        assert_eq!(stats.total_slots, 4);
        assert_eq!(stats.inspected_count, 3);
        assert_eq!(stats.ok_count, 2); // "OK" matching is case-insensitive
        assert_eq!(stats.ng_count, 1);
        assert_eq!(stats.ok_count + stats.ng_count, stats.inspected_count);
        assert!((stats.yield_rate - 2.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(stats.defect_counts.values().sum::<usize>(), stats.ng_count);
        assert_eq!(stats.defect_counts["Scratch"], 1);
    }

    #[test]
    fn materials_ordered_by_detection_time() {
        let mut tray = tray_2x2();
        let base = Utc::now();
        tray.add_or_update_material(Material::new(2, 2, "OK", None, base));
        tray.add_or_update_material(Material::new(1, 1, "NG", None, base + chrono::Duration::seconds(5)));

        let ordered = tray.materials_by_detection_time();
        assert_eq!((ordered[0].row, ordered[0].col), (2, 2));
        assert_eq!((ordered[1].row, ordered[1].col), (1, 1));
    }

    #[test]
    fn tray_serializes_with_position_keys() {
        let mut tray = tray_2x2();
        tray.add_or_update_material(Material::new(1, 2, "OK", None, Utc::now()));

        let json = serde_json::to_value(&tray).unwrap();
        assert!(json["materials"].get("1_2").is_some());
        let back: Tray = serde_json::from_value(json).unwrap();
        assert_eq!(back, tray);
    }
}
