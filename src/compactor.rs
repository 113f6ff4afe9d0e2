use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Background task that rewrites the WAL once enough appends have piled up
/// since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::error!("WAL compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Caller;
    use crate::engine::PropertyDraft;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("stayd_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn admin() -> Caller {
        Caller {
            user_id: Ulid::new(),
            name: "Root Admin".into(),
            admin: true,
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn compaction_resets_append_counter() {
        let path = test_wal_path("reset_counter.wal");
        let engine = Arc::new(Engine::new(path).unwrap());

        for i in 0..5 {
            engine
                .create_property(
                    &admin(),
                    PropertyDraft {
                        title: format!("Cabin {i}"),
                        description: "A cabin in the woods, allegedly".into(),
                        price_per_night_cents: 10_000,
                        available_from: d(2025, 6, 1),
                        available_to: d(2025, 12, 31),
                    },
                )
                .await
                .unwrap();
        }
        assert_eq!(engine.wal_appends_since_compact().await, 5);

        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }
}
