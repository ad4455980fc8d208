use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Engine;

/// Background task that rewrites the WAL from current state once enough
/// appends have accumulated since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let pending = engine.wal_appends_since_compact().await;
        if pending < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {pending} appends"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{Engine, RoomDraft};
    use crate::model::BookingStatus;
    use crate::wal::Wal;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("innkeep_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn draft(name: &str) -> RoomDraft {
        RoomDraft {
            name: name.into(),
            price_cents: 9_000,
            capacity: 2,
            amenities: vec![],
            description: String::new(),
            image_url: String::new(),
        }
    }

    #[tokio::test]
    async fn compaction_collapses_churn() {
        let path = test_wal_path("collapse.wal");
        let engine = Engine::new(path.clone(), BookingStatus::Confirmed).unwrap();

        let room = engine.create_room(draft("Attic")).await.unwrap();
        // Churn: repeated updates, only the last survives compaction
        for i in 0..20 {
            engine
                .update_room(room.id, draft(&format!("Attic v{i}")))
                .await
                .unwrap();
        }
        assert_eq!(engine.wal_appends_since_compact().await, 21);

        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);

        // Watermark plus the one surviving room
        let events = Wal::replay(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], crate::model::Event::Watermark { .. }));
    }
}
