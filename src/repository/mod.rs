// Repository abstraction - durable tray storage
//
// Two substitutable implementations sit behind one trait: an in-memory
// store for tests and ephemeral use, and a SQLite store for durability.
// Every method is a blocking call; callers on latency-sensitive threads
// are responsible for off-thread dispatch. The repository owns its copies:
// saves and loads deep-clone so mutations to in-memory trays never alias
// stored state.

use crate::error::Result;
use crate::model::{Material, Tray};
use chrono::{DateTime, Utc};

mod memory;
mod sqlite;

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

/// Persistence contract for trays and their materials
///
/// Single-writer-per-process usage is assumed; the trait adds no locking.
pub trait TrayRepository {
    /// Upsert a tray header by id, overwriting ALL header fields on
    /// conflict (rows, cols, batch_name, created_at, completed_at) - never
    /// a subset. Stored materials at that id are left alone.
    fn save_tray_header(&mut self, tray: &Tray) -> Result<()>;

    /// Stamp the completion time on an existing header; `NotFound` when the
    /// tray id is unknown
    fn update_tray_completion(&mut self, tray_id: &str, completed_at: DateTime<Utc>)
        -> Result<()>;

    /// Upsert one material by (tray_id, row, col); `NotFound` when the
    /// header does not exist
    fn save_material(&mut self, tray_id: &str, material: &Material) -> Result<()>;

    /// Most-recently-created headers first, each populated with all of its
    /// persisted materials ordered by detection_time ascending. A limit of
    /// 0 returns an empty list.
    fn load_recent_trays(&mut self, limit: usize) -> Result<Vec<Tray>>;

    /// Remove a tray and all of its materials; `NotFound` when the tray id
    /// is unknown
    fn delete_tray(&mut self, tray_id: &str) -> Result<()>;
}

#[cfg(test)]
mod contract_tests {
    //! Behavior shared by both implementations, run against each

    use super::*;
    use crate::error::TrayError;
    use chrono::Duration;

    fn sample_tray(id: &str, created_at: DateTime<Utc>) -> Tray {
        Tray::new(id, 2, 2, Some("b".into()), created_at).unwrap()
    }

    fn exercise_round_trip(repo: &mut dyn TrayRepository) {
        let created = Utc::now();
        let mut tray = sample_tray("t1", created);
        tray.mark_completed(created + Duration::minutes(5));
        repo.save_tray_header(&tray).unwrap();

        let m1 = Material::new(1, 1, "OK", Some("/img/1_1.png".into()), created);
        let m2 = Material::new(1, 2, "Scratch", None, created + Duration::seconds(1));
        repo.save_material("t1", &m1).unwrap();
        repo.save_material("t1", &m2).unwrap();

        let loaded = repo.load_recent_trays(5).unwrap();
        assert_eq!(loaded.len(), 1);
        let got = &loaded[0];
        assert_eq!(got.tray_id, "t1");
        assert_eq!((got.rows, got.cols), (2, 2));
        assert_eq!(got.batch_name.as_deref(), Some("b"));
        assert_eq!(got.created_at, tray.created_at);
        assert_eq!(got.completed_at, tray.completed_at);
        assert_eq!(got.material_at(1, 1), Some(&m1));
        assert_eq!(got.material_at(1, 2), Some(&m2));
    }

    fn exercise_material_upsert(repo: &mut dyn TrayRepository) {
        let now = Utc::now();
        repo.save_tray_header(&sample_tray("t1", now)).unwrap();
        repo.save_material("t1", &Material::new(1, 1, "OK", None, now))
            .unwrap();
        repo.save_material("t1", &Material::new(1, 1, "NG", None, now))
            .unwrap();

        let loaded = repo.load_recent_trays(1).unwrap();
        assert_eq!(loaded[0].material_count(), 1);
        assert_eq!(loaded[0].material_at(1, 1).unwrap().result, "NG");
    }

    fn exercise_header_full_field_upsert(repo: &mut dyn TrayRepository) {
        let created = Utc::now();
        repo.save_tray_header(&sample_tray("t1", created)).unwrap();

        let mut updated = Tray::new("t1", 3, 4, None, created + Duration::seconds(2)).unwrap();
        updated.mark_completed(created + Duration::minutes(1));
        repo.save_tray_header(&updated).unwrap();

        let got = &repo.load_recent_trays(1).unwrap()[0];
        assert_eq!((got.rows, got.cols), (3, 4));
        assert_eq!(got.batch_name, None); // overwritten, not merged
        assert_eq!(got.created_at, updated.created_at);
        assert_eq!(got.completed_at, updated.completed_at);
    }

    fn exercise_not_found_paths(repo: &mut dyn TrayRepository) {
        let now = Utc::now();
        assert!(matches!(
            repo.update_tray_completion("missing", now),
            Err(TrayError::NotFound(_))
        ));
        assert!(matches!(
            repo.save_material("missing", &Material::new(1, 1, "OK", None, now)),
            Err(TrayError::NotFound(_))
        ));
        assert!(matches!(
            repo.delete_tray("missing"),
            Err(TrayError::NotFound(_))
        ));
    }

    fn exercise_recent_ordering_and_limit(repo: &mut dyn TrayRepository) {
        let base = Utc::now();
        for (i, id) in ["old", "mid", "new"].iter().enumerate() {
            repo.save_tray_header(&sample_tray(id, base + Duration::seconds(i as i64)))
                .unwrap();
        }

        let loaded = repo.load_recent_trays(2).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].tray_id, "new");
        assert_eq!(loaded[1].tray_id, "mid");
        assert!(repo.load_recent_trays(0).unwrap().is_empty());
    }

    fn exercise_completion_update(repo: &mut dyn TrayRepository) {
        let created = Utc::now();
        repo.save_tray_header(&sample_tray("t1", created)).unwrap();

        let done = created + Duration::minutes(3);
        repo.update_tray_completion("t1", done).unwrap();
        assert_eq!(repo.load_recent_trays(1).unwrap()[0].completed_at, Some(done));
    }

    fn exercise_delete(repo: &mut dyn TrayRepository) {
        let now = Utc::now();
        repo.save_tray_header(&sample_tray("t1", now)).unwrap();
        repo.save_material("t1", &Material::new(1, 1, "OK", None, now))
            .unwrap();

        repo.delete_tray("t1").unwrap();
        assert!(repo.load_recent_trays(5).unwrap().is_empty());
        // Materials must be gone too: re-creating the header must not
        // resurrect old items
        repo.save_tray_header(&sample_tray("t1", now)).unwrap();
        assert_eq!(repo.load_recent_trays(1).unwrap()[0].material_count(), 0);
    }

    fn run_all(make: impl Fn() -> Box<dyn TrayRepository>) {
        exercise_round_trip(make().as_mut());
        exercise_material_upsert(make().as_mut());
        exercise_header_full_field_upsert(make().as_mut());
        exercise_not_found_paths(make().as_mut());
        exercise_recent_ordering_and_limit(make().as_mut());
        exercise_completion_update(make().as_mut());
        exercise_delete(make().as_mut());
    }

    #[test]
    fn memory_repository_honors_contract() {
        run_all(|| Box::new(MemoryRepository::new()));
    }

    #[test]
    fn sqlite_repository_honors_contract() {
        run_all(|| Box::new(SqliteRepository::open_in_memory().unwrap()));
    }
}
