// Tray state manager - single-current-tray lifecycle
//
// State machine: Idle (no current tray) -> create_tray -> Active -> a result
// filling the last slot or complete_current_tray -> Completed, which
// immediately folds into Idle + history. reset_current_tray is the only
// Active -> Idle transition that bypasses history.
//
// Not thread-safe by contract: all calls are expected on the single
// detection-pipeline thread, callers serialize access themselves.

use crate::error::{Result, TrayError};
use crate::model::{Material, Tray, TrayStatistics};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use uuid::Uuid;

/// Completed trays kept in process before the oldest is dropped
pub const DEFAULT_HISTORY_CAP: usize = 100;

/// Owns at most one "current" tray and a bounded most-recent-first history
/// of completed trays (separate from whatever a repository stores durably)
pub struct TrayStateManager {
    current: Option<Tray>,
    history: VecDeque<Tray>,
    history_cap: usize,
}

impl TrayStateManager {
    pub fn new() -> Self {
        Self::with_history_cap(DEFAULT_HISTORY_CAP)
    }

    pub fn with_history_cap(history_cap: usize) -> Self {
        Self {
            current: None,
            history: VecDeque::new(),
            history_cap,
        }
    }

    /// Create a new current tray, silently replacing any prior one
    ///
    /// The replaced tray is NOT completed or archived - callers that care
    /// about history must call `complete_current_tray` (or reset) first.
    /// A missing `tray_id` gets a random UUID; a missing `created_at`
    /// defaults to now.
    pub fn create_tray(
        &mut self,
        rows: u32,
        cols: u32,
        batch_name: Option<&str>,
        tray_id: Option<&str>,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<&Tray> {
        let tray_id = tray_id
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let tray = Tray::new(
            &tray_id,
            rows,
            cols,
            batch_name.map(str::to_owned),
            created_at.unwrap_or_else(Utc::now),
        )?;

        if let Some(old) = &self.current {
            tracing::warn!(
                replaced = %old.tray_id,
                new = %tray_id,
                "starting a new tray while one is active; prior tray discarded"
            );
        }
        tracing::info!(tray_id = %tray_id, rows, cols, "tray started");

        Ok(self.current.insert(tray))
    }

    pub fn current_tray(&self) -> Option<&Tray> {
        self.current.as_ref()
    }

    /// Record one inspection result on the current tray
    ///
    /// Upserts by (row, col). When the write fills the last free slot the
    /// tray auto-completes: completed_at is stamped, the tray moves to the
    /// head of history and the current slot empties. Failed calls leave the
    /// tray untouched.
    pub fn update_result(
        &mut self,
        row: u32,
        col: u32,
        result: &str,
        image_path: Option<&str>,
        detection_time: DateTime<Utc>,
    ) -> Result<Material> {
        let tray = self.current.as_mut().ok_or(TrayError::NoActiveTray)?;

        if result.trim().is_empty() {
            return Err(TrayError::Validation("result label is empty".into()));
        }
        if !tray.in_bounds(row, col) {
            return Err(TrayError::Range(format!(
                "position {row}_{col} outside {}x{} tray {}",
                tray.rows, tray.cols, tray.tray_id
            )));
        }

        let material = Material::new(row, col, result, image_path.map(str::to_owned), detection_time);
        let stored = tray.add_or_update_material(material).clone();
        tracing::debug!(
            tray_id = %tray.tray_id,
            position = %stored.position(),
            result = %stored.result,
            "result stored"
        );

        if tray.is_full() {
            self.complete_current_tray(None);
        }

        Ok(stored)
    }

    /// Explicitly complete the current tray, regardless of fill level
    ///
    /// This is the operator's escape hatch for closing an under-filled tray,
    /// so `inspected_count == total_slots` must never be assumed for
    /// completed trays. Returns None when there is no current tray.
    pub fn complete_current_tray(&mut self, completed_at: Option<DateTime<Utc>>) -> Option<Tray> {
        let mut tray = self.current.take()?;
        tray.mark_completed(completed_at.unwrap_or_else(Utc::now));
        tracing::info!(
            tray_id = %tray.tray_id,
            inspected = tray.material_count(),
            total = tray.total_slots(),
            "tray completed"
        );

        self.history.push_front(tray.clone());
        self.history.truncate(self.history_cap);
        Some(tray)
    }

    /// Discard the current tray without completing or archiving it
    pub fn reset_current_tray(&mut self) {
        if let Some(tray) = self.current.take() {
            tracing::info!(tray_id = %tray.tray_id, "current tray reset");
        }
    }

    /// Statistics for the current tray; zero-valued when idle
    pub fn statistics(&self) -> TrayStatistics {
        TrayStatistics::from_tray(self.current.as_ref())
    }

    /// Most-recently-completed first, truncated to `limit` (0 returns empty)
    pub fn history(&self, limit: usize) -> Vec<Tray> {
        self.history.iter().take(limit).cloned().collect()
    }
}

impl Default for TrayStateManager {
    fn default() -> Self {
        Self::new()
    }
}
