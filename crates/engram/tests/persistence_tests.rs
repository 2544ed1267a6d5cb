//! Restart and durability tests
//!
//! Builds a coordinator over a data directory, shuts it down (snapshot),
//! then builds a fresh coordinator over the same directory and checks that
//! nothing was lost.

use engram::memory::types::MemoryLocation;
use engram::testing::coordinator_at;

#[tokio::test]
async fn test_clean_restart_preserves_all_tiers() {
    let dir = tempfile::tempdir().unwrap();

    // First session: 3 memories for c1, 12 for c2, then a clean shutdown
    {
        let coordinator = coordinator_at(dir.path(), 5, 10).await;
        for i in 1..=3 {
            coordinator
                .add("c1", &format!("c1 remembers day {i}"), None)
                .await
                .unwrap();
        }
        for i in 1..=12 {
            coordinator
                .add("c2", &format!("c2 remembers day {i}"), None)
                .await
                .unwrap();
        }
        coordinator.snapshot().await.unwrap();
    }

    // Second session over the same directory
    let coordinator = coordinator_at(dir.path(), 5, 10).await;

    let c1 = coordinator.get_recent("c1").await;
    let contents: Vec<&str> = c1.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["c1 remembers day 1", "c1 remembers day 2", "c1 remembers day 3"]
    );

    // c2: 12 adds with R=5, B=10 leaves the last 5 recent, 7 buffered
    let c2 = coordinator.get_recent("c2").await;
    let contents: Vec<&str> = c2.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![
            "c2 remembers day 8",
            "c2 remembers day 9",
            "c2 remembers day 10",
            "c2 remembers day 11",
            "c2 remembers day 12",
        ]
    );

    let stats = coordinator.stats("c2").await.unwrap();
    assert_eq!(stats.buffer_count, 7);
    assert_eq!(stats.longterm_count, 0);
}

#[tokio::test]
async fn test_embedded_memories_searchable_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let coordinator = coordinator_at(dir.path(), 5, 10).await;
        for i in 1..=15 {
            coordinator
                .add("c2", &format!("c2 remembers day {i}"), None)
                .await
                .unwrap();
        }
        coordinator.snapshot().await.unwrap();
    }

    let coordinator = coordinator_at(dir.path(), 5, 10).await;

    // Day 4 was among the first ten, embedded before the restart
    let results = coordinator
        .search("c2", "c2 remembers day 4", Some(3))
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].memory.content, "c2 remembers day 4");
    assert!(results[0].similarity_score > 0.5);
}

#[tokio::test]
async fn test_buffer_survives_restart_without_snapshot() {
    let dir = tempfile::tempdir().unwrap();

    // No snapshot call: the process dies without a graceful shutdown. The
    // recent tier is lost, but buffered and embedded memories are durable.
    {
        let coordinator = coordinator_at(dir.path(), 5, 10).await;
        for i in 1..=8 {
            coordinator
                .add("c", &format!("day {i} at the harbor"), None)
                .await
                .unwrap();
        }
    }

    let coordinator = coordinator_at(dir.path(), 5, 10).await;
    assert!(coordinator.get_recent("c").await.is_empty());

    let stats = coordinator.stats("c").await.unwrap();
    assert_eq!(stats.buffer_count, 3);

    // The buffered entries are still drainable
    assert_eq!(coordinator.force_embed("c").await.unwrap(), 3);
    let stats = coordinator.stats("c").await.unwrap();
    assert_eq!(stats.longterm_count, 3);
}

#[tokio::test]
async fn test_restart_after_export_matches_pre_restart_export() {
    let dir = tempfile::tempdir().unwrap();

    let before = {
        let coordinator = coordinator_at(dir.path(), 5, 10).await;
        for i in 1..=12 {
            coordinator
                .add("c", &format!("chronicle entry {i}"), None)
                .await
                .unwrap();
        }
        let bundle = coordinator.export("c").await.unwrap();
        coordinator.snapshot().await.unwrap();
        bundle
    };

    let coordinator = coordinator_at(dir.path(), 5, 10).await;
    let after = coordinator.export("c").await.unwrap();

    assert_eq!(before.total_memories, after.total_memories);

    let ids = |bundle: &engram::memory::coordinator::ExportBundle| {
        let mut ids: Vec<(String, MemoryLocation)> = bundle
            .memories
            .iter()
            .map(|m| (m.entry.id.clone(), m.location))
            .collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&before), ids(&after));
}

#[tokio::test]
async fn test_list_characters_after_restart_sees_durable_tiers() {
    let dir = tempfile::tempdir().unwrap();

    {
        let coordinator = coordinator_at(dir.path(), 5, 10).await;
        for i in 1..=15 {
            coordinator
                .add("embedded_char", &format!("event {i}"), None)
                .await
                .unwrap();
        }
        for i in 1..=6 {
            coordinator
                .add("buffered_char", &format!("event {i}"), None)
                .await
                .unwrap();
        }
        coordinator.snapshot().await.unwrap();
    }

    let coordinator = coordinator_at(dir.path(), 5, 10).await;
    let summaries = coordinator.list_characters().await.unwrap();
    let ids: Vec<&str> = summaries.iter().map(|s| s.character_id.as_str()).collect();
    assert_eq!(ids, vec!["buffered_char", "embedded_char"]);
}
