//! End-to-end migration cycle against the in-memory engine.

use indexwatch_db::{
    DATABASES, FallbackRecord, IndexReport, MemoryEngine, MemoryVersionStore, OperationKind,
    OptimizeOptions, SchemaConnector, TelemetryHub, VersionStore, list_current_indexes,
    missing_index_candidates, optimize_all_databases,
};

#[test]
fn full_run_then_rerun_is_idempotent() {
    let engine = MemoryEngine::new();
    let versions = MemoryVersionStore::new();

    let first = optimize_all_databases(&engine, &versions, OptimizeOptions::default());
    assert!(first.success, "errors: {:?}", first.errors);
    assert!(!first.added_indexes.is_empty());
    assert!(first.optimized_stores.contains("products"));
    assert!(first.optimized_stores.contains("sales"));

    let versions_after_first: Vec<u32> = DATABASES
        .iter()
        .map(|db| versions.get_version(db).unwrap())
        .collect();
    assert!(versions_after_first.iter().all(|&v| v == 1));

    // Second run: everything already exists, so nothing is created and no
    // version moves.
    let second = optimize_all_databases(&engine, &versions, OptimizeOptions::default());
    assert!(second.success);
    assert!(second.added_indexes.is_empty());
    assert!(second.optimized_stores.is_empty());
    assert_eq!(
        second.performance_gain.as_deref(),
        Some("no indexes added; schema already optimal")
    );

    let versions_after_second: Vec<u32> = DATABASES
        .iter()
        .map(|db| versions.get_version(db).unwrap())
        .collect();
    assert_eq!(versions_after_first, versions_after_second);
}

#[test]
fn partially_populated_store_only_gains_the_missing_indexes() {
    let engine = MemoryEngine::new();
    let versions = MemoryVersionStore::new();

    // posDB already carries products.barcode from an earlier deployment.
    engine
        .upgrade("posDB", 1, &mut |tx| {
            tx.ensure_store("products")?;
            tx.create_index(
                "products",
                &indexwatch_db::IndexSpec {
                    store: "products",
                    name: "barcode",
                    key_paths: &["barcode"],
                    unique: true,
                },
            )
        })
        .unwrap();
    versions.set_version("posDB", 1).unwrap();

    let report = optimize_all_databases(&engine, &versions, OptimizeOptions::default());
    assert!(report.success, "errors: {:?}", report.errors);

    // The existing index is skipped inside the upgrade transaction, not
    // re-created; only the remaining targets are added.
    assert!(!report.added_indexes.contains(&"products.barcode".to_string()));
    assert!(report
        .added_indexes
        .contains(&"products.productGroupId".to_string()));
    assert!(report
        .added_indexes
        .contains(&"productGroupRelations.groupId".to_string()));

    // The upgrade ran, so posDB's version advances past the seeded one.
    assert_eq!(versions.get_version("posDB").unwrap(), 2);
    let schema = engine.describe("posDB").unwrap();
    let barcode_count = schema["products"].iter().filter(|n| *n == "barcode").count();
    assert_eq!(barcode_count, 1);
}

#[test]
fn one_failing_database_does_not_block_the_rest() {
    let engine = MemoryEngine::new();
    let versions = MemoryVersionStore::new();
    engine.fail_database("salesDB");

    let report = optimize_all_databases(&engine, &versions, OptimizeOptions::default());
    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("salesDB: "));

    // The other databases completed and their progress is retained.
    assert!(report.added_indexes.contains(&"products.barcode".to_string()));
    assert!(report.added_indexes.contains(&"customers.email".to_string()));
    assert_eq!(versions.get_version("posDB").unwrap(), 1);
    assert_eq!(versions.get_version("salesDB").unwrap(), 0);
    assert_eq!(versions.get_version("customersDB").unwrap(), 1);
    // No gain estimate on a failed run.
    assert!(report.performance_gain.is_none());

    // Once healed, only the broken database has work left.
    engine.heal_database("salesDB");
    let retry = optimize_all_databases(&engine, &versions, OptimizeOptions::default());
    assert!(retry.success);
    assert!(retry.added_indexes.iter().all(|l| {
        l.starts_with("sales.") || l.starts_with("saleItems.")
    }));
    assert_eq!(versions.get_version("salesDB").unwrap(), 1);
}

#[test]
fn simulated_mode_never_touches_the_engine() {
    let engine = MemoryEngine::new();
    let versions = MemoryVersionStore::new();

    let report = optimize_all_databases(&engine, &versions, OptimizeOptions { simulated: true });
    assert!(report.success);
    assert!(report.added_indexes.is_empty());
    for db in DATABASES {
        assert_eq!(versions.get_version(db).unwrap(), 0);
        assert!(engine.describe(db).is_err(), "{db} was created");
    }
}

#[test]
fn index_listing_covers_every_database_and_isolates_errors() {
    let engine = MemoryEngine::new();
    let versions = MemoryVersionStore::new();

    // Fresh engine: every database reports an error.
    let before = list_current_indexes(&engine);
    assert_eq!(before.len(), DATABASES.len());
    assert!(before
        .values()
        .all(|r| matches!(r, IndexReport::Error { .. })));

    optimize_all_databases(&engine, &versions, OptimizeOptions::default());

    let after = list_current_indexes(&engine);
    let IndexReport::Stores(pos) = &after["posDB"] else {
        panic!("posDB should be inspectable after migration");
    };
    assert!(pos["products"].contains(&"barcode".to_string()));
    assert!(pos["productGroupRelations"].contains(&"groupId".to_string()));
}

#[test]
fn telemetry_feeds_the_advisor_while_migration_runs() {
    let hub = TelemetryHub::new();
    let tracker = hub.tracker();

    for _ in 0..3 {
        tracker.record_fallback(FallbackRecord {
            database: "posDB".into(),
            store: "products".into(),
            index: Some("barcode".into()),
            operation: OperationKind::Query,
            reason: "missing index 'barcode'".into(),
        });
    }
    tracker.record_fallback(FallbackRecord {
        database: "salesDB".into(),
        store: "sales".into(),
        index: None,
        operation: OperationKind::Read,
        reason: "no index \"date\" available".into(),
    });

    let candidates = missing_index_candidates(tracker);
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].index, "barcode");
    assert_eq!(candidates[0].count, 3);

    // Migrating does not consume or alter the telemetry buffer.
    let engine = MemoryEngine::new();
    let versions = MemoryVersionStore::new();
    let report = optimize_all_databases(&engine, &versions, OptimizeOptions::default());
    assert!(report.success);
    assert_eq!(tracker.len(), 4);
    assert_eq!(missing_index_candidates(tracker), candidates);
}
