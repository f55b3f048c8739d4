// Tray component facade
//
// Composes one state manager and one injected repository, and emits events
// for downstream consumers (dashboards, exporters). The write-path policy
// is strict: every failure raises the Error event with whatever context was
// available, then propagates - the caller is never left unaware.

use crate::error::{Result, TrayError};
use crate::events::{EventBus, ResultPayload, TrayEvent};
use crate::model::{Material, Tray, TrayStatistics};
use crate::position::{MappingMode, Position};
use crate::repository::TrayRepository;
use crate::state::TrayStateManager;
use chrono::{DateTime, Utc};

pub struct TrayComponent {
    state: TrayStateManager,
    repository: Box<dyn TrayRepository>,
    bus: EventBus,
    mapping_mode: MappingMode,
}

impl TrayComponent {
    /// The repository is injected so callers pick the backend (in-memory
    /// for tests, SQLite for production)
    pub fn new(repository: Box<dyn TrayRepository>) -> Self {
        Self {
            state: TrayStateManager::new(),
            repository,
            bus: EventBus::new(),
            mapping_mode: MappingMode::default(),
        }
    }

    pub fn with_mapping_mode(repository: Box<dyn TrayRepository>, mode: MappingMode) -> Self {
        let mut component = Self::new(repository);
        component.mapping_mode = mode;
        component
    }

    /// Full constructor: mapping mode plus the completed-tray history cap
    pub fn with_options(
        repository: Box<dyn TrayRepository>,
        mode: MappingMode,
        history_cap: usize,
    ) -> Self {
        let mut component = Self::with_mapping_mode(repository, mode);
        component.state = TrayStateManager::with_history_cap(history_cap);
        component
    }

    pub fn mapping_mode(&self) -> MappingMode {
        self.mapping_mode
    }

    /// Mode used for all position parsing from here on
    pub fn set_mapping_mode(&mut self, mode: MappingMode) {
        self.mapping_mode = mode;
    }

    /// Register a synchronous observer; delivery happens on the calling
    /// thread, in registration order
    pub fn subscribe(&mut self, handler: impl Fn(&TrayEvent) + Send + 'static) {
        self.bus.subscribe(handler);
    }

    /// Start a new tray and persist its header
    pub fn start_tray(
        &mut self,
        rows: u32,
        cols: u32,
        batch_name: Option<&str>,
    ) -> Result<Tray> {
        let result = self.start_tray_inner(rows, cols, batch_name);
        if let Err(e) = &result {
            self.emit_error(e, None, None, None);
        }
        result
    }

    fn start_tray_inner(
        &mut self,
        rows: u32,
        cols: u32,
        batch_name: Option<&str>,
    ) -> Result<Tray> {
        let tray = self
            .state
            .create_tray(rows, cols, batch_name, None, None)?
            .clone();
        self.repository.save_tray_header(&tray)?;
        Ok(tray)
    }

    /// Record one inspection result against the current tray
    ///
    /// `position_text` is resolved against the current tray's dimensions
    /// using the configured mapping mode. ResultProcessed fires after the
    /// successful write and BEFORE the completion check; when the write
    /// filled the last slot, the completion is persisted and TrayCompleted
    /// follows, carrying the tray and this result's payload.
    pub fn update_result(
        &mut self,
        position_text: &str,
        result: &str,
        image_path: Option<&str>,
        detection_time: DateTime<Utc>,
    ) -> Result<Material> {
        let mut parsed: Option<Position> = None;
        let outcome =
            self.update_result_inner(position_text, result, image_path, detection_time, &mut parsed);
        if let Err(e) = &outcome {
            self.emit_error(e, parsed, Some(result), Some(detection_time));
        }
        outcome
    }

    fn update_result_inner(
        &mut self,
        position_text: &str,
        result: &str,
        image_path: Option<&str>,
        detection_time: DateTime<Utc>,
        parsed: &mut Option<Position>,
    ) -> Result<Material> {
        let tray = self.state.current_tray().ok_or(TrayError::NoActiveTray)?;
        let (rows, cols) = (tray.rows, tray.cols);
        let tray_id = tray.tray_id.clone();

        let position = Position::parse(position_text, rows, cols, self.mapping_mode)?;
        *parsed = Some(position);

        let material =
            self.state
                .update_result(position.row, position.col, result, image_path, detection_time)?;
        self.repository.save_material(&tray_id, &material)?;

        let payload = ResultPayload {
            position,
            result: material.result.clone(),
            image_path: material.image_path.clone(),
            detection_time,
        };
        self.bus.emit(&TrayEvent::ResultProcessed {
            position: payload.position,
            result: payload.result.clone(),
            image_path: payload.image_path.clone(),
            detection_time: payload.detection_time,
        });

        // The state manager clears its current slot when the write filled
        // the tray; the freshly completed tray sits at the head of history.
        if self.state.current_tray().is_none() {
            if let Some(tray) = self.state.history(1).into_iter().next() {
                self.persist_completion(&tray)?;
                self.bus.emit(&TrayEvent::TrayCompleted {
                    tray,
                    last_result: Some(payload),
                });
            }
        }

        Ok(material)
    }

    /// Explicitly complete the current tray, even when under-filled
    ///
    /// Returns None (and emits nothing) when there is no current tray.
    pub fn complete_tray(&mut self) -> Result<Option<Tray>> {
        let Some(tray) = self.state.complete_current_tray(None) else {
            return Ok(None);
        };

        if let Err(e) = self.persist_completion(&tray) {
            self.emit_error(&e, None, None, None);
            return Err(e);
        }

        self.bus.emit(&TrayEvent::TrayCompleted {
            tray: tray.clone(),
            last_result: None,
        });
        Ok(Some(tray))
    }

    /// Drop the current tray without completing it; the repository keeps
    /// whatever was already persisted
    pub fn reset_current_tray(&mut self) {
        self.state.reset_current_tray();
    }

    /// Yield statistics for the current tray; zero-valued when idle
    pub fn statistics(&self) -> TrayStatistics {
        self.state.statistics()
    }

    /// In-process completion history, most recent first
    pub fn history(&self, limit: usize) -> Vec<Tray> {
        self.state.history(limit)
    }

    /// Ask the operator pipeline to re-inspect one slot
    ///
    /// Resolves the position against the current tray and emits
    /// ManualRetestRequested; no state is mutated and nothing is persisted.
    pub fn request_manual_retest(&mut self, position_text: &str) -> Result<Position> {
        let tray = self.state.current_tray().ok_or(TrayError::NoActiveTray)?;
        let position = Position::parse(position_text, tray.rows, tray.cols, self.mapping_mode)?;

        tracing::info!(tray_id = %tray.tray_id, position = %position, "manual retest requested");
        self.bus.emit(&TrayEvent::ManualRetestRequested {
            position,
            timestamp: Utc::now(),
        });
        Ok(position)
    }

    fn persist_completion(&mut self, tray: &Tray) -> Result<()> {
        let completed_at = tray.completed_at.unwrap_or_else(Utc::now);
        self.repository
            .update_tray_completion(&tray.tray_id, completed_at)
    }

    fn emit_error(
        &self,
        error: &TrayError,
        position: Option<Position>,
        result: Option<&str>,
        detection_time: Option<DateTime<Utc>>,
    ) {
        tracing::warn!(kind = error.kind(), %error, "tray operation failed");
        self.bus.emit(&TrayEvent::Error {
            timestamp: Utc::now(),
            message: error.to_string(),
            position,
            result: result.map(str::to_owned),
            detection_time,
        });
    }
}
