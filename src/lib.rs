// Traytrack - Tray inspection result tracking core
//
// Tracks inspection results for a physical carrier ("tray") holding a fixed
// grid of material slots, maps between a linear scan order and grid
// coordinates, accumulates per-slot results, detects tray completion,
// computes pass/fail yield statistics, and persists tray state durably.
//
// Architecture:
// - position: bidirectional scan-index <-> (row, col) mapping (Snake/RowWise)
// - model: Tray / Material data model and derived yield statistics
// - state: single-current-tray lifecycle with bounded completion history
// - repository: persistence contract with in-memory and SQLite backends
// - events: synchronous observer registry for downstream consumers
// - component: facade composing state + repository + events

pub mod component;
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod position;
pub mod repository;
pub mod state;

pub use component::TrayComponent;
pub use error::{Result, TrayError};
pub use events::{EventBus, TrayEvent};
pub use model::{Material, Tray, TrayStatistics};
pub use position::{index_to_position, position_to_index, MappingMode, Position};
pub use repository::{MemoryRepository, SqliteRepository, TrayRepository};
pub use state::TrayStateManager;
