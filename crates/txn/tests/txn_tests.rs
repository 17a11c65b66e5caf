//! Integration tests for streamvault-txn
//!
//! Exercise the store through its public API only:
//!
//! 1. **Snapshots** - reads see exactly the commits before their timestamp
//! 2. **Atomicity** - concurrent readers never observe half a commit
//! 3. **Locking** - prepared transactions block conflicting writers
//! 4. **Counters** - no lost updates under concurrent commits
//! 5. **Maintenance** - version GC respects live snapshots

use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use streamvault_core::{Error, Timestamp, Value};
use streamvault_txn::{
    ColumnDef, ColumnType, Mutation, Query, RowKey, SortOrder, TableSchema, TransactionStatus,
    TransactionalConfig, TransactionalStore,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn videos_schema() -> TableSchema {
    TableSchema::new("Videos")
        .column(ColumnDef::new("video_id", ColumnType::string(36)).not_null())
        .column(ColumnDef::new("title", ColumnType::string(200)).not_null())
        .column(ColumnDef::new("view_count", ColumnType::Int64).default_value(0i64))
        .column(ColumnDef::new("tags", ColumnType::array(ColumnType::string(50))))
        .primary_key(&["video_id"])
}

fn store_with(config: TransactionalConfig) -> TransactionalStore {
    let store = TransactionalStore::new(config);
    store.create_database("main", vec![videos_schema()]).unwrap();
    store
}

fn store() -> TransactionalStore {
    store_with(TransactionalConfig::default())
}

fn insert_video(id: &str) -> Mutation {
    Mutation::insert("Videos", [("video_id", id), ("title", id)])
}

fn views(store: &TransactionalStore, id: &str) -> i64 {
    store
        .read_row("main", "Videos", &RowKey::single(id), None)
        .unwrap()
        .and_then(|row| row.get("view_count").and_then(Value::as_int))
        .unwrap_or(-1)
}

// ============================================================================
// Snapshots
// ============================================================================

mod snapshots {
    use super::*;

    #[test]
    fn reader_keeps_its_snapshot() {
        let store = store();
        store.execute_mutation("main", vec![insert_video("v1")], None).unwrap();

        let reader = store.begin_transaction("main", true).unwrap();
        store
            .execute_mutation(
                "main",
                vec![Mutation::update("Videos", "v1").increment("view_count", 10)],
                None,
            )
            .unwrap();

        let old = store
            .read_row("main", "Videos", &RowKey::single("v1"), Some(reader))
            .unwrap()
            .unwrap();
        assert_eq!(old["view_count"], Value::Int(0));
        assert_eq!(views(&store, "v1"), 10);
    }

    #[test]
    fn commit_timestamps_increase() {
        let store = store();
        let mut last = Timestamp::EPOCH;
        for i in 0..20 {
            let ts = store
                .execute_mutation("main", vec![insert_video(&format!("v{}", i))], None)
                .unwrap()
                .unwrap();
            assert!(ts > last);
            last = ts;
        }
    }

    #[test]
    fn query_filters_and_orders() {
        let store = store();
        for (id, count) in [("a", 5), ("b", 50), ("c", 20)] {
            store
                .execute_mutation(
                    "main",
                    vec![
                        insert_video(id),
                        Mutation::update("Videos", id).increment("view_count", count),
                    ],
                    None,
                )
                .unwrap();
        }
        let rows = store
            .execute_query(
                "main",
                &Query::table("Videos")
                    .filter("view_count", streamvault_txn::CompareOp::Ge, 10i64)
                    .order_by("view_count", SortOrder::Desc)
                    .select(&["video_id"]),
                None,
            )
            .unwrap();
        let ids: Vec<&str> = rows.iter().filter_map(|r| r["video_id"].as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn schema_errors_do_not_poison_transaction() {
        let store = store();
        let txn = store.begin_transaction("main", false).unwrap();
        let err = store
            .execute_mutation(
                "main",
                vec![Mutation::insert("Videos", [("video_id", "v1")])],
                Some(txn),
            )
            .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation { .. }));
        assert_eq!(store.transaction_status(txn).unwrap(), TransactionStatus::Active);

        store.execute_mutation("main", vec![insert_video("v1")], Some(txn)).unwrap();
        store.commit_transaction(txn).unwrap();
        assert_eq!(views(&store, "v1"), 0);
    }
}

// ============================================================================
// Atomicity
// ============================================================================

mod atomicity {
    use super::*;

    #[test]
    fn readers_never_see_partial_commits() {
        let store = Arc::new(store());
        store
            .execute_mutation("main", vec![insert_video("left"), insert_video("right")], None)
            .unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for _ in 0..200 {
                    store
                        .execute_mutation(
                            "main",
                            vec![
                                Mutation::update("Videos", "left").increment("view_count", 1),
                                Mutation::update("Videos", "right").increment("view_count", 1),
                            ],
                            None,
                        )
                        .unwrap();
                }
                done.store(true, Ordering::Release);
            })
        };

        while !done.load(Ordering::Acquire) {
            let rows = store
                .execute_query("main", &Query::table("Videos"), None)
                .unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0]["view_count"], rows[1]["view_count"]);
        }
        writer.join().unwrap();
        assert_eq!(views(&store, "left"), 200);
    }

    #[test]
    fn failed_commit_applies_nothing() {
        let store = store();
        let txn = store.begin_transaction("main", false).unwrap();
        store
            .execute_mutation(
                "main",
                vec![
                    insert_video("new"),
                    Mutation::update("Videos", "missing").set("title", "x"),
                ],
                Some(txn),
            )
            .unwrap();
        assert!(matches!(
            store.commit_transaction(txn),
            Err(Error::RowNotFound { .. })
        ));
        assert_eq!(store.stats().live_rows, 0);
    }
}

// ============================================================================
// Locking
// ============================================================================

mod locking {
    use super::*;

    #[test]
    fn prepared_transaction_blocks_writer() {
        let store = store_with(
            TransactionalConfig::default().with_lock_timeout(Duration::from_millis(30)),
        );
        store.execute_mutation("main", vec![insert_video("v1")], None).unwrap();

        let a = store.begin_transaction("main", false).unwrap();
        store
            .execute_mutation(
                "main",
                vec![Mutation::update("Videos", "v1").set("title", "from A")],
                Some(a),
            )
            .unwrap();
        store.prepare_transaction(a).unwrap();

        let b = store.begin_transaction("main", false).unwrap();
        store
            .execute_mutation(
                "main",
                vec![Mutation::update("Videos", "v1").set("title", "from B")],
                Some(b),
            )
            .unwrap();

        let start = Instant::now();
        let err = store.commit_transaction(b).unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(matches!(err, Error::LockConflict { holder, .. } if holder == a));
        assert!(matches!(
            store.transaction_status(b).unwrap(),
            TransactionStatus::Aborted { .. }
        ));

        // readers are never blocked by the prepared transaction
        let title = store
            .read_row("main", "Videos", &RowKey::single("v1"), None)
            .unwrap()
            .unwrap()["title"]
            .clone();
        assert_eq!(title, Value::from("v1"));

        store.commit_transaction(a).unwrap();
        let title = store
            .read_row("main", "Videos", &RowKey::single("v1"), None)
            .unwrap()
            .unwrap()["title"]
            .clone();
        assert_eq!(title, Value::from("from A"));
        assert_eq!(store.stats().held_locks, 0);
    }

    #[test]
    fn disjoint_writer_commits_past_prepared_transaction() {
        let store = store_with(
            TransactionalConfig::default().with_lock_timeout(Duration::from_secs(2)),
        );
        store
            .execute_mutation("main", vec![insert_video("v1"), insert_video("v2")], None)
            .unwrap();

        let a = store.begin_transaction("main", false).unwrap();
        store
            .execute_mutation(
                "main",
                vec![Mutation::update("Videos", "v1").set("title", "from A")],
                Some(a),
            )
            .unwrap();
        store.prepare_transaction(a).unwrap();

        let b = store.begin_transaction("main", false).unwrap();
        store
            .execute_mutation(
                "main",
                vec![Mutation::update("Videos", "v2").set("title", "from B")],
                Some(b),
            )
            .unwrap();
        let start = Instant::now();
        store.commit_transaction(b).unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(store.stats().held_locks, 1);

        store.commit_transaction(a).unwrap();
        let title = |id: &str| {
            store
                .read_row("main", "Videos", &RowKey::single(id), None)
                .unwrap()
                .unwrap()["title"]
                .clone()
        };
        assert_eq!(title("v1"), Value::from("from A"));
        assert_eq!(title("v2"), Value::from("from B"));
        assert_eq!(store.stats().held_locks, 0);
    }

    #[test]
    fn disjoint_concurrent_commits_all_succeed() {
        const WRITERS: usize = 8;
        let store = Arc::new(store_with(
            TransactionalConfig::default().with_lock_timeout(Duration::from_secs(2)),
        ));
        let ids: Vec<String> = (0..WRITERS).map(|i| format!("v{}", i)).collect();
        store
            .execute_mutation("main", ids.iter().map(|id| insert_video(id)).collect(), None)
            .unwrap();

        let barrier = Arc::new(Barrier::new(WRITERS));
        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let txn = store.begin_transaction("main", false).unwrap();
                    store
                        .execute_mutation(
                            "main",
                            vec![Mutation::update("Videos", id.as_str()).increment("view_count", 1)],
                            Some(txn),
                        )
                        .unwrap();
                    barrier.wait();
                    store.commit_transaction(txn)
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        for id in &ids {
            assert_eq!(views(&store, id), 1);
        }
        assert_eq!(store.stats().held_locks, 0);
    }

    #[test]
    fn abort_releases_locks() {
        let store = store();
        store.execute_mutation("main", vec![insert_video("v1")], None).unwrap();
        let a = store.begin_transaction("main", false).unwrap();
        store
            .execute_mutation("main", vec![Mutation::delete("Videos", "v1")], Some(a))
            .unwrap();
        store.prepare_transaction(a).unwrap();
        assert_eq!(store.stats().held_locks, 1);

        store.abort_transaction(a).unwrap();
        assert_eq!(store.stats().held_locks, 0);
        store
            .execute_mutation(
                "main",
                vec![Mutation::update("Videos", "v1").increment("view_count", 1)],
                None,
            )
            .unwrap();
        assert_eq!(views(&store, "v1"), 1);
    }

    #[test]
    fn commit_wait_outlasts_uncertainty() {
        let store = store_with(TransactionalConfig::default().with_commit_wait(true));
        let ts = store
            .execute_mutation("main", vec![insert_video("v1")], None)
            .unwrap()
            .unwrap();
        assert!(store.clock().now().after(ts));
    }
}

// ============================================================================
// Counters
// ============================================================================

mod counters {
    use super::*;

    #[test]
    fn concurrent_increments_are_not_lost() {
        let store = Arc::new(store());
        store.execute_mutation("main", vec![insert_video("v1")], None).unwrap();

        let threads = 8;
        let per_thread = 25;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..per_thread {
                        loop {
                            let txn = store.begin_transaction("main", false).unwrap();
                            store
                                .execute_mutation(
                                    "main",
                                    vec![Mutation::update("Videos", "v1").increment("view_count", 1)],
                                    Some(txn),
                                )
                                .unwrap();
                            match store.commit_transaction(txn) {
                                Ok(_) => break,
                                Err(Error::LockConflict { .. }) => continue,
                                Err(e) => panic!("unexpected error: {}", e),
                            }
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(views(&store, "v1"), (threads * per_thread) as i64);
        assert_eq!(store.stats().active_transactions, 0);
    }

    proptest! {
        #[test]
        fn increments_sum(deltas in proptest::collection::vec(-1_000i64..1_000, 1..20)) {
            let store = store();
            store.execute_mutation("main", vec![insert_video("v1")], None).unwrap();
            let txn = store.begin_transaction("main", false).unwrap();
            let mutations = deltas
                .iter()
                .map(|d| Mutation::update("Videos", "v1").increment("view_count", *d))
                .collect();
            store.execute_mutation("main", mutations, Some(txn)).unwrap();
            store.commit_transaction(txn).unwrap();
            prop_assert_eq!(views(&store, "v1"), deltas.iter().sum::<i64>());
        }
    }
}

// ============================================================================
// Maintenance
// ============================================================================

mod maintenance {
    use super::*;

    #[test]
    fn gc_keeps_versions_for_open_snapshots() {
        let store = store();
        store.execute_mutation("main", vec![insert_video("v1")], None).unwrap();
        let reader = store.begin_transaction("main", true).unwrap();
        for _ in 0..5 {
            store
                .execute_mutation(
                    "main",
                    vec![Mutation::update("Videos", "v1").increment("view_count", 1)],
                    None,
                )
                .unwrap();
        }
        assert_eq!(store.stats().row_versions, 6);

        let now = store.clock().tick();
        assert_eq!(store.gc_versions("main", now).unwrap(), 0);
        let row = store
            .read_row("main", "Videos", &RowKey::single("v1"), Some(reader))
            .unwrap()
            .unwrap();
        assert_eq!(row["view_count"], Value::Int(0));

        store.commit_transaction(reader).unwrap();
        assert_eq!(store.gc_versions("main", store.clock().tick()).unwrap(), 5);
        assert_eq!(views(&store, "v1"), 5);
    }

    #[test]
    fn unknown_ids() {
        let store = store();
        assert!(matches!(
            store.begin_transaction("nope", false),
            Err(Error::DatabaseNotFound(_))
        ));
        assert!(matches!(
            store.transaction_status(9_999),
            Err(Error::TransactionNotFound(9_999))
        ));
        assert!(matches!(
            store.table_schema("main", "Nope"),
            Err(Error::TableNotFound(_))
        ));
    }
}
