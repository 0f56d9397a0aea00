use std::sync::Barrier;

use facegate_core::{CosineMatcher, Embedding, EmbeddingStore, FaceError, IdentityService, Recognition, StoreError};
use facegate_store::{SqliteEmbeddingStore, SqliteStoreConfig, SqliteStoreError};

fn emb(values: &[f32]) -> Embedding {
    Embedding::new(values.to_vec())
}

fn service(dir: &tempfile::TempDir) -> IdentityService<SqliteEmbeddingStore> {
    let store = SqliteEmbeddingStore::open(SqliteStoreConfig::new(dir.path().join("identities.db"))).unwrap();
    IdentityService::new(store, CosineMatcher::default(), 3)
}

#[test]
fn register_recognize_delete_over_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir);

    assert_eq!(svc.recognize(&emb(&[1.0, 0.0, 0.0])).unwrap(), Recognition::EmptyRegistry);

    svc.register("alice", &emb(&[1.0, 0.0, 0.0])).unwrap();
    assert_eq!(
        svc.recognize(&emb(&[1.0, 0.0, 0.0])).unwrap(),
        Recognition::Match {
            identity_id: "alice".into(),
            confidence: 1.0,
        }
    );
    assert_eq!(
        svc.recognize(&emb(&[0.0, 1.0, 0.0])).unwrap(),
        Recognition::NoMatch { confidence: 0.0 }
    );

    assert_eq!(
        svc.register("bob", &emb(&[1.0, 0.0, 0.0])).unwrap_err(),
        FaceError::DuplicateFace {
            existing: "alice".into()
        }
    );
    assert_eq!(svc.store().get("bob").unwrap(), None);

    assert!(!svc.delete("carol").unwrap());
    assert!(svc.delete("alice").unwrap());
    assert_eq!(svc.store().get("alice").unwrap(), None);
}

#[test]
fn reregistration_keeps_a_single_record() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir);

    svc.register("alice", &emb(&[1.0, 0.0, 0.0])).unwrap();
    let first = svc.lookup("alice").unwrap();
    svc.register("alice", &emb(&[1.0, 0.0, 0.0])).unwrap();
    let second = svc.lookup("alice").unwrap();

    assert_eq!(svc.count().unwrap(), 1);
    assert_eq!(svc.identities().unwrap(), ["alice"]);
    assert!(second.updated_at > first.updated_at);
}

#[test]
fn tie_break_is_stable_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteEmbeddingStore::open(SqliteStoreConfig::new(dir.path().join("identities.db"))).unwrap();
    store.upsert("zoe", &emb(&[0.0, 1.0, 0.0])).unwrap();
    store.upsert("adam", &emb(&[1.0, 0.0, 0.0])).unwrap();
    let svc = IdentityService::new(store, CosineMatcher::new(0.6), 3);

    for _ in 0..10 {
        match svc.recognize(&emb(&[1.0, 1.0, 0.0])).unwrap() {
            Recognition::Match { identity_id, .. } => assert_eq!(identity_id, "adam"),
            other => panic!("expected a match, got {other:?}"),
        }
    }
}

#[test]
fn concurrent_registrations_of_one_face_admit_exactly_one_identity() {
    const WRITERS: usize = 8;

    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir);
    let barrier = Barrier::new(WRITERS);
    let face = emb(&[0.2, 0.9, 0.4]);

    let results: Vec<Result<_, FaceError>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let (svc, barrier, face) = (&svc, &barrier, &face);
                s.spawn(move || {
                    barrier.wait();
                    svc.register(&format!("user-{i}"), face)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(FaceError::DuplicateFace { .. })))
        .count();

    assert_eq!(admitted, 1, "results: {results:?}");
    assert_eq!(duplicates, WRITERS - 1, "results: {results:?}");
    assert_eq!(svc.count().unwrap(), 1);
}

#[test]
fn registry_width_is_enforced_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identities.db");
    {
        let store = SqliteEmbeddingStore::open(SqliteStoreConfig::new(&path).with_dimension(2)).unwrap();
        let svc = IdentityService::new(store, CosineMatcher::default(), 2);
        svc.register("alice", &emb(&[1.0, 0.0])).unwrap();
    }

    // A daemon restarted with another configured width refuses to start.
    assert!(matches!(
        SqliteEmbeddingStore::open(SqliteStoreConfig::new(&path).with_dimension(3)),
        Err(SqliteStoreError::DimensionMismatch { configured: 3, stored: 2 })
    ));

    // Opened without a configured width, the recorded one still binds writes.
    let store = SqliteEmbeddingStore::open(SqliteStoreConfig::new(&path)).unwrap();
    assert_eq!(
        store.upsert("bob", &emb(&[1.0, 0.0, 0.0, 0.0])).unwrap_err(),
        StoreError::DimensionMismatch { expected: 2, actual: 4 }
    );

    // A service at another width reports the mismatch instead of an empty registry.
    let svc = IdentityService::new(store, CosineMatcher::default(), 3);
    assert!(matches!(
        svc.recognize(&emb(&[1.0, 0.0, 0.0])),
        Err(FaceError::Storage(StoreError::Corrupt(_)))
    ));
    assert!(matches!(
        svc.register("bob", &emb(&[0.0, 1.0, 0.0])),
        Err(FaceError::Storage(StoreError::Corrupt(_)))
    ));
    assert_eq!(svc.count().unwrap(), 1);
}

#[test]
fn non_finite_embedding_never_reaches_the_registry() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&dir);
    svc.register("alice", &emb(&[1.0, 0.0, 0.0])).unwrap();

    assert_eq!(
        svc.store().upsert("bob", &emb(&[f32::NAN, 0.0, 0.0])).unwrap_err(),
        StoreError::NonFinite
    );

    assert_eq!(svc.identities().unwrap(), ["alice"]);
    assert!(matches!(
        svc.recognize(&emb(&[1.0, 0.0, 0.0])).unwrap(),
        Recognition::Match { ref identity_id, .. } if identity_id == "alice"
    ));
}
