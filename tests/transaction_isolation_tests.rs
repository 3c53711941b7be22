//! Snapshot isolation and commit/abort behaviour of song transactions

use soundstore::{
    ChangeKind, DbError, Song, TransactionManager, TransactionOptions, TransactionState,
};

fn song(id: &str, title: &str) -> Song {
    Song::with_id(id, title, "")
}

fn titles(manager: &TransactionManager) -> Vec<(String, String)> {
    let txn = manager.begin_read().unwrap();
    txn.iter().unwrap().map(|s| (s.id, s.title)).collect()
}

#[tokio::test]
async fn test_upsert_reports_single_update() {
    let manager = TransactionManager::new("song");

    let mut t1 = manager.begin(true).await.unwrap();
    t1.insert(song("a", "x")).unwrap();
    manager.commit(&mut t1).unwrap();

    let mut t2 = manager
        .begin_with(TransactionOptions::read_write().track_changes(true))
        .await
        .unwrap();
    t2.insert(song("a", "y")).unwrap();
    manager.commit(&mut t2).unwrap();

    let reader = manager.begin(false).await.unwrap();
    assert_eq!(reader.get("a").unwrap().title, "y");

    let changes = t2.changes().unwrap();
    assert_eq!(changes.len(), 1);
    let entry = &changes.entries()[0];
    assert_eq!(entry.kind(), ChangeKind::Updated);
    assert_eq!(entry.table(), "song");
    assert_eq!(entry.before().unwrap().title, "x");
    assert_eq!(entry.after().unwrap().title, "y");
}

#[tokio::test]
async fn test_reader_sees_exactly_committed_prefix() {
    let manager = TransactionManager::new("song");
    let mut readers = Vec::new();

    for k in 0..5 {
        readers.push(manager.begin_read().unwrap());

        let mut txn = manager.begin_write().await.unwrap();
        txn.insert(song(&format!("s{}", k), "first")).unwrap();
        if k > 0 {
            txn.insert(song(&format!("s{}", k - 1), "second")).unwrap();
        }
        manager.commit(&mut txn).unwrap();
    }

    for (k, reader) in readers.iter().enumerate() {
        // Commits 1..k are visible, commit k+1 onwards is not.
        assert_eq!(reader.len().unwrap(), k);
        assert_eq!(reader.base_version(), k as u64);
        if k > 0 {
            assert_eq!(reader.get(&format!("s{}", k - 1)).unwrap().title, "first");
        }
        if k > 1 {
            assert_eq!(reader.get(&format!("s{}", k - 2)).unwrap().title, "second");
        }
    }
}

#[tokio::test]
async fn test_abort_has_no_observable_effect() {
    let manager = TransactionManager::new("song");
    let mut seed = manager.begin_write().await.unwrap();
    seed.insert(song("a", "x")).unwrap();
    seed.insert(song("b", "y")).unwrap();
    manager.commit(&mut seed).unwrap();

    let before = titles(&manager);
    let version = manager.committed_version().unwrap();

    let mut txn = manager.begin_write().await.unwrap();
    txn.insert(song("c", "z")).unwrap();
    txn.insert(song("a", "changed")).unwrap();
    txn.delete("b").unwrap();
    manager.abort(&mut txn);
    manager.abort(&mut txn);

    assert_eq!(txn.state(), TransactionState::Aborted);
    assert_eq!(titles(&manager), before);
    assert_eq!(manager.committed_version().unwrap(), version);
}

#[tokio::test]
async fn test_dropped_writer_is_aborted() {
    let manager = TransactionManager::new("song");
    {
        let mut txn = manager.begin_write().await.unwrap();
        txn.insert(song("a", "x")).unwrap();
    }

    assert!(titles(&manager).is_empty());
    let next = manager.try_begin_write(false).unwrap();
    assert!(next.is_some());
}

#[tokio::test]
async fn test_read_your_writes_but_invisible_to_others() {
    let manager = TransactionManager::new("song");
    let early_reader = manager.begin_read().unwrap();

    let mut writer = manager.begin_write().await.unwrap();
    writer.insert(song("a", "x")).unwrap();
    assert_eq!(writer.get("a").unwrap().title, "x");

    let concurrent_reader = manager.begin_read().unwrap();
    assert!(concurrent_reader.get("a").unwrap_err().is_not_found());

    manager.commit(&mut writer).unwrap();

    assert!(early_reader.get("a").unwrap_err().is_not_found());
    assert!(concurrent_reader.get("a").unwrap_err().is_not_found());
    assert_eq!(manager.begin_read().unwrap().get("a").unwrap().title, "x");
}

#[tokio::test]
async fn test_delete_missing_leaves_table_unchanged() {
    let manager = TransactionManager::new("song");
    let mut seed = manager.begin_write().await.unwrap();
    seed.insert(song("a", "x")).unwrap();
    manager.commit(&mut seed).unwrap();

    let mut txn = manager.begin_write().await.unwrap();
    let err = txn.delete("missing").unwrap_err();
    assert!(matches!(err, DbError::NotFound(ref id) if id == "missing"));
    assert_eq!(txn.len().unwrap(), 1);
    manager.commit(&mut txn).unwrap();

    assert_eq!(titles(&manager), vec![("a".to_string(), "x".to_string())]);
}

#[tokio::test]
async fn test_finished_handles_cannot_be_reused() {
    let manager = TransactionManager::new("song");

    let mut committed = manager.begin_write().await.unwrap();
    manager.commit(&mut committed).unwrap();
    assert!(matches!(
        committed.insert(song("a", "x")),
        Err(DbError::TransactionState(_))
    ));
    assert!(matches!(
        manager.commit(&mut committed),
        Err(DbError::TransactionState(_))
    ));
    manager.abort(&mut committed);
    assert_eq!(committed.state(), TransactionState::Committed);

    let mut aborted = manager.begin_write().await.unwrap();
    aborted.abort();
    assert!(matches!(
        manager.commit(&mut aborted),
        Err(DbError::TransactionState(_))
    ));
    assert!(matches!(aborted.changes(), Err(DbError::TransactionState(_))));
}

#[tokio::test]
async fn test_iteration_survives_later_commits() {
    let manager = TransactionManager::new("song");
    let mut seed = manager.begin_write().await.unwrap();
    for id in ["c", "a", "b"] {
        seed.insert(song(id, id)).unwrap();
    }
    manager.commit(&mut seed).unwrap();

    let reader = manager.begin_read().unwrap();
    let mut iter = reader.iter().unwrap();
    assert_eq!(iter.next().unwrap().id, "a");

    let mut writer = manager.begin_write().await.unwrap();
    writer.delete("b").unwrap();
    writer.insert(song("aa", "aa")).unwrap();
    manager.commit(&mut writer).unwrap();

    let rest: Vec<String> = iter.map(|s| s.id).collect();
    assert_eq!(rest, vec!["b", "c"]);

    let fresh: Vec<String> = reader.iter().unwrap().map(|s| s.id).collect();
    assert_eq!(fresh, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_change_set_covers_create_update_delete() {
    let manager = TransactionManager::new("song");
    let mut seed = manager.begin_write().await.unwrap();
    seed.insert(song("keep", "k")).unwrap();
    seed.insert(song("drop", "d")).unwrap();
    manager.commit(&mut seed).unwrap();

    let mut txn = manager
        .begin_with(TransactionOptions::read_write().track_changes(true))
        .await
        .unwrap();
    txn.insert(song("new", "n")).unwrap();
    txn.insert(song("keep", "k2")).unwrap();
    txn.delete("drop").unwrap();
    txn.insert(song("temp", "t")).unwrap();
    txn.delete("temp").unwrap();
    let version = manager.commit(&mut txn).unwrap();

    let changes = txn.changes().unwrap();
    assert_eq!(changes.version(), version);
    let summary: Vec<(&str, ChangeKind)> = changes.iter().map(|c| (c.id(), c.kind())).collect();
    assert_eq!(
        summary,
        vec![
            ("new", ChangeKind::Created),
            ("keep", ChangeKind::Updated),
            ("drop", ChangeKind::Deleted),
        ]
    );
    assert!(changes.get("drop").unwrap().after().is_none());
    assert!(changes.get("new").unwrap().before().is_none());
}
