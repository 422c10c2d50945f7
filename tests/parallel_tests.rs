//! Parallel scan, aggregation, and hash-join through the engine.

use dotdb::{AggregateOp, Database, Filter, FilterOp, OpenOptions, Value};
use tempfile::tempdir;

fn json(text: &str) -> Value {
    Value::from_json(text).unwrap()
}

/// 500 users with ages spanning exactly 18..=77 and a deterministic
/// active flag.
fn seed_users(db: &Database) -> Vec<Value> {
    let mut docs = Vec::new();
    for i in 0..500u32 {
        let age = 18 + (i * 7) % 60;
        let active = i % 3 == 0;
        let doc = json(&format!(r#"{{"id":{i}.0,"age":{age}.0,"active":{active}}}"#));
        db.set(&format!("u.user{i:03}"), doc.clone()).unwrap();
        docs.push(doc);
    }
    docs
}

#[test]
fn test_parallel_query_equals_sequential_filter() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("app.db"), OpenOptions::new()).unwrap();
    let docs = seed_users(&db);

    let filters = [
        Filter::new("age", FilterOp::Gte, 50),
        Filter::new("active", FilterOp::Eq, true),
    ];
    let results = db.query("u", &filters).unwrap();

    let expected: Vec<Value> = docs
        .iter()
        .filter(|d| {
            d.get_key("age").and_then(Value::as_f64).unwrap_or(0.0) >= 50.0
                && d.get_key("active") == Some(&Value::Bool(true))
        })
        .cloned()
        .collect();
    assert!(!expected.is_empty());
    assert_eq!(results, expected);
    db.close().unwrap();
}

#[test]
fn test_aggregates_over_collection() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("app.db"), OpenOptions::new()).unwrap();
    seed_users(&db);

    assert_eq!(db.aggregate("u", AggregateOp::Count, None).unwrap(), Some(500.0));
    assert_eq!(db.aggregate("u", AggregateOp::Min, Some("age")).unwrap(), Some(18.0));
    assert_eq!(db.aggregate("u", AggregateOp::Max, Some("age")).unwrap(), Some(77.0));

    // Empty collection quirks: count/avg are 0, extremes absent.
    assert_eq!(db.aggregate("nobody", AggregateOp::Count, None).unwrap(), Some(0.0));
    assert_eq!(db.aggregate("nobody", AggregateOp::Avg, Some("age")).unwrap(), Some(0.0));
    assert_eq!(db.aggregate("nobody", AggregateOp::Min, Some("age")).unwrap(), None);
    db.close().unwrap();
}

#[test]
fn test_query_uses_index_seed() {
    let dir = tempdir().unwrap();
    let db = Database::open(
        dir.path().join("app.db"),
        OpenOptions::new().index("status", "jobs", "status"),
    )
    .unwrap();

    for i in 0..300 {
        let status = if i % 5 == 0 { "failed" } else { "done" };
        db.set(
            &format!("jobs.j{i:03}"),
            json(&format!(r#"{{"id":{i}.0,"status":"{status}"}}"#)),
        )
        .unwrap();
    }

    let seeded = db
        .query("jobs", &[Filter::new("status", FilterOp::Eq, "failed")])
        .unwrap();
    assert_eq!(seeded.len(), 60);
    // Index seeding composes with residual filters.
    let narrowed = db
        .query(
            "jobs",
            &[
                Filter::new("status", FilterOp::Eq, "failed"),
                Filter::new("id", FilterOp::Lt, 100),
            ],
        )
        .unwrap();
    assert_eq!(narrowed.len(), 20);
    db.close().unwrap();
}

#[test]
fn test_lookup_hash_join() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("app.db"), OpenOptions::new()).unwrap();

    db.set("users.alice", json(r#"{"id":1.0,"name":"Alice"}"#)).unwrap();
    db.set("users.bob", json(r#"{"id":2.0,"name":"Bob"}"#)).unwrap();
    db.set("users.charlie", json(r#"{"id":3.0,"name":"Charlie"}"#)).unwrap();
    for (i, user_id) in [1, 2, 2, 1, 2].iter().enumerate() {
        db.set(
            &format!("orders.o{i}"),
            json(&format!(r#"{{"userId":{user_id}.0,"n":{i}.0}}"#)),
        )
        .unwrap();
    }

    let joined = db.lookup("users", "orders", "id", "userId", "orders").unwrap();
    assert_eq!(joined.len(), 3);
    let names: Vec<&str> = joined
        .iter()
        .filter_map(|u| u.get_key("name").and_then(Value::as_str))
        .collect();
    assert_eq!(names, vec!["Alice", "Bob", "Charlie"]);
    let lengths: Vec<usize> = joined
        .iter()
        .map(|u| u.get_key("orders").and_then(Value::as_array).map_or(0, |a| a.len()))
        .collect();
    assert_eq!(lengths, vec![2, 3, 0]);

    // The stored tree is untouched by the join.
    assert!(db.get("users.alice").unwrap().get_key("orders").is_none());
    db.close().unwrap();
}

#[test]
fn test_rich_filter_ops() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("app.db"), OpenOptions::new()).unwrap();

    db.set("docs.a", json(r#"{"title":"intro to rust","tags":["lang","sys"]}"#)).unwrap();
    db.set("docs.b", json(r#"{"title":"cooking 101","tags":["food"]}"#)).unwrap();
    db.set("docs.c", json(r#"{"title":"rust patterns","tags":["lang","patterns"]}"#)).unwrap();

    let rusty = db
        .query("docs", &[Filter::new("title", FilterOp::Contains, "rust")])
        .unwrap();
    assert_eq!(rusty.len(), 2);

    let by_regex = db
        .query("docs", &[Filter::new("title", FilterOp::Regex, "^rust")])
        .unwrap();
    assert_eq!(by_regex.len(), 1);

    let tagged = db
        .query(
            "docs",
            &[Filter::new("tags", FilterOp::ContainsAny, json(r#"["food","patterns"]"#))],
        )
        .unwrap();
    assert_eq!(tagged.len(), 2);

    let picked = db
        .query(
            "docs",
            &[Filter::new("title", FilterOp::In, json(r#"["cooking 101"]"#))],
        )
        .unwrap();
    assert_eq!(picked.len(), 1);
    db.close().unwrap();
}

#[test]
fn test_readers_never_block_on_writers() {
    // P4-flavored smoke test: hammer reads while a writer mutates; every
    // observed value must be one the writer actually published.
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("app.db"), OpenOptions::new()).unwrap();
    db.set("counter", 0).unwrap();

    std::thread::scope(|scope| {
        let writer = scope.spawn(|| {
            for i in 1..=200 {
                db.set("counter", i).unwrap();
            }
        });
        let reader = scope.spawn(|| {
            let mut last = 0.0;
            for _ in 0..1000 {
                let seen = db.get("counter").and_then(|v| v.as_f64()).unwrap();
                assert!(seen >= last, "reads went backwards: {seen} < {last}");
                assert!(seen <= 200.0);
                last = seen;
            }
        });
        writer.join().unwrap();
        reader.join().unwrap();
    });
    db.close().unwrap();
}

#[test]
fn test_scan_sees_point_in_time_snapshot() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("app.db"), OpenOptions::new()).unwrap();
    for i in 0..150 {
        db.set(&format!("c.k{i:03}"), json(&format!(r#"{{"n":{i}.0}}"#))).unwrap();
    }

    std::thread::scope(|scope| {
        let scanner = scope.spawn(|| {
            for _ in 0..50 {
                let count = db.aggregate("c", AggregateOp::Count, None).unwrap().unwrap();
                // Deletions below remove whole documents; a scan must see
                // a consistent prefix count, never a partial state.
                assert!((100.0..=150.0).contains(&count));
            }
        });
        let writer = scope.spawn(|| {
            for i in 100..150 {
                db.delete(&format!("c.k{i:03}")).unwrap();
            }
        });
        scanner.join().unwrap();
        writer.join().unwrap();
    });
    db.close().unwrap();
}
