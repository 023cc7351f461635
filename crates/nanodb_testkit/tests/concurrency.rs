//! Concurrent access to one database.

use nanodb_codec::doc;
use nanodb_testkit::TestDatabase;
use std::sync::Arc;
use std::thread;

#[test]
fn concurrent_writers_lose_no_inserts() {
    let db = Arc::new(TestDatabase::file());
    let threads: i64 = 8;
    let per_thread: i64 = 200;
    let total = (threads * per_thread) as usize;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let users = db.collection("users").unwrap();
                for i in 0..per_thread {
                    users.insert(doc! { "thread" => t, "i" => i }).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let users = db.collection("users").unwrap();
    assert_eq!(users.len().unwrap(), total);
    for t in 0..threads {
        assert_eq!(
            users.query(doc! { "thread" => t }).count().unwrap(),
            per_thread as usize
        );
    }

    let ids: Vec<u64> = users
        .find(&doc! {}, 0, 0)
        .unwrap()
        .iter()
        .map(|d| d.get("id").and_then(|v| v.as_integer()).unwrap() as u64)
        .collect();
    assert_eq!(ids, (1..=total as u64).collect::<Vec<_>>());
}

#[test]
fn readers_see_whole_documents() {
    let db = TestDatabase::memory();
    let counters = db.collection("counters").unwrap();
    let target = counters.insert(doc! { "a" => 0, "b" => 0 }).unwrap();

    let writer = {
        let counters = counters.clone();
        thread::spawn(move || {
            for n in 1..=500 {
                counters
                    .update_by_id(target, &doc! { "a" => n, "b" => n })
                    .unwrap();
            }
        })
    };
    let reader = {
        let counters = counters.clone();
        thread::spawn(move || {
            for _ in 0..500 {
                let doc = counters.find_by_id(target).unwrap().unwrap();
                assert_eq!(doc.get("a"), doc.get("b"));
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn collections_open_concurrently() {
    let db = Arc::new(TestDatabase::file());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let name = format!("col_{}", t % 3);
                db.collection(&name).unwrap().insert(doc! { "t" => t }).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        db.list_collections().unwrap(),
        vec!["col_0", "col_1", "col_2"]
    );
    let total: usize = ["col_0", "col_1", "col_2"]
        .iter()
        .map(|name| db.collection(name).unwrap().len().unwrap())
        .sum();
    assert_eq!(total, 8);
}
