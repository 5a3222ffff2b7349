//! End-to-end behavior of the transaction manager against a real directory.

mod common;

use common::{Store, path};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::sync::Arc;
use std::thread;
use txfs::fs::TransactionState;
use txfs::{Checksum, ErrorKind, Operation, TransactionId, TxfsError};

fn write(raw: &str, offset: u64, data: &[u8]) -> Operation {
    Operation::Write {
        path: path(raw),
        offset,
        data: data.to_vec(),
        checksum: None,
    }
}

#[test]
fn test_writes_replay_in_order() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();

    for (offset, data) in [(0, "12"), (2, "34"), (1, "B"), (3, "D"), (4, "56")] {
        manager
            .execute(id, write("/new.txt", offset, data.as_bytes()))
            .unwrap();
    }
    manager.prepare(id).unwrap();
    manager.commit(id).unwrap();

    assert_eq!(store.contents("new.txt"), b"1B3D56");
}

#[test]
fn test_staged_write_is_invisible_before_commit() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();

    manager
        .execute(id, write("/test-file.txt", 2, b"xyz!"))
        .unwrap();
    manager.execute(id, write("/fresh.txt", 0, b"new")).unwrap();

    assert_eq!(store.contents("test-file.txt"), b"ABCD");
    assert!(!store.real("fresh.txt").exists());
    assert_eq!(
        manager.read(id, &path("/test-file.txt"), 0, 4).unwrap(),
        b"ABCD"
    );

    manager.prepare(id).unwrap();
    assert_eq!(store.contents("test-file.txt"), b"ABCD");

    manager.commit(id).unwrap();
    assert_eq!(store.contents("test-file.txt"), b"ABxyz!");
    assert_eq!(store.contents("fresh.txt"), b"new");
}

#[test]
fn test_overlapping_writes_last_wins() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();

    manager.execute(id, write("/f.txt", 0, b"aaaa")).unwrap();
    manager.execute(id, write("/f.txt", 1, b"bb")).unwrap();
    manager.execute(id, write("/f.txt", 6, b"cc")).unwrap();
    manager.prepare(id).unwrap();
    manager.commit(id).unwrap();

    // Gap between 4 and 6 is zero-filled
    assert_eq!(store.contents("f.txt"), b"abba\0\0cc");
}

#[test]
fn test_zero_length_read() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();

    assert!(
        manager
            .read(id, &path("/test-file.txt"), 0, 0)
            .unwrap()
            .is_empty()
    );
    // Short-circuits before any checks
    assert!(manager.read(id, &path("/nope"), 10, 0).unwrap().is_empty());

    manager.rollback(id, "done").unwrap();
}

#[test]
fn test_over_read_is_io_error() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();

    assert_eq!(
        manager.read(id, &path("/test-file.txt"), 1, 3).unwrap(),
        b"BCD"
    );
    let err = manager
        .read(id, &path("/test-file.txt"), 2, 3)
        .unwrap_err();
    assert!(matches!(err, TxfsError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    assert_eq!(err.kind(), ErrorKind::Io);

    manager.rollback(id, "done").unwrap();
}

#[test]
fn test_directory_access_is_illegal_in_any_state() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();
    let dir = path("/test-folder");

    let err = manager.read(id, &dir, 0, 1).unwrap_err();
    assert!(matches!(err, TxfsError::IllegalOperation(_)));
    let err = manager.execute(id, write("/test-folder", 0, b"x")).unwrap_err();
    assert!(matches!(err, TxfsError::IllegalOperation(_)));

    manager.prepare(id).unwrap();
    assert_eq!(manager.state(id).unwrap(), TransactionState::Prepared);

    let err = manager.read(id, &dir, 0, 1).unwrap_err();
    assert!(matches!(err, TxfsError::IllegalOperation(_)));
    let err = manager.execute(id, write("/test-folder", 0, b"x")).unwrap_err();
    assert!(matches!(err, TxfsError::IllegalOperation(_)));

    // Structurally fine writes are a state error once prepared
    let err = manager.execute(id, write("/other.txt", 0, b"x")).unwrap_err();
    assert!(matches!(err, TxfsError::IllegalState { .. }));

    manager.rollback(id, "done").unwrap();
}

#[test]
fn test_list_ignores_pending_delete_but_read_conflicts() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();

    manager
        .execute(
            id,
            Operation::Delete {
                path: path("/test-folder"),
                recursive: true,
            },
        )
        .unwrap();

    let files = manager.list(id, &path("/test-folder"), true).unwrap();
    let names: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "/test-folder/test-subfolder",
            "/test-folder/test-subfolder/test.png"
        ]
    );

    let err = manager
        .read(id, &path("/test-folder/test-subfolder/test.png"), 0, 1)
        .unwrap_err();
    assert!(matches!(err, TxfsError::Conflict { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    manager.prepare(id).unwrap();
    manager.commit(id).unwrap();
    assert!(!store.real("test-folder").exists());
    assert!(store.real("test-file.txt").exists());
}

#[test]
fn test_begin_yields_distinct_ids() {
    let store = Store::new();
    let manager = &store.manager;

    let ids: Vec<TransactionId> = (0..10).map(|_| manager.begin("alice").unwrap()).collect();
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());

    for id in ids {
        manager.rollback(id, "done").unwrap();
    }
}

#[test]
fn test_unknown_id_names_the_id() {
    let store = Store::new();
    let id = TransactionId::new();

    let err = store.manager.read(id, &path("/test-file.txt"), 0, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransactionNotFound);
    assert_eq!(
        err.to_string(),
        format!("No transaction found for ID `{}`", id)
    );
}

#[test]
fn test_rolled_back_id_is_unknown() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();
    manager.execute(id, write("/a.txt", 0, b"x")).unwrap();
    manager.rollback(id, "user abort").unwrap();

    assert!(!store.real("a.txt").exists());
    for err in [
        manager.execute(id, write("/a.txt", 0, b"x")).unwrap_err(),
        manager.commit(id).unwrap_err(),
        manager.rollback(id, "again").unwrap_err(),
    ] {
        assert!(matches!(err, TxfsError::TransactionNotFound(found) if found == id));
    }
}

#[test]
fn test_rollback_from_prepared() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();
    manager.execute(id, write("/test-file.txt", 0, b"ZZ")).unwrap();
    manager.prepare(id).unwrap();

    manager.rollback(id, "changed my mind").unwrap();

    assert_eq!(store.contents("test-file.txt"), b"ABCD");
    assert!(manager.active_transactions().is_empty());
}

#[test]
fn test_move_copy_create_commit() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();

    let ops = [
        Operation::Create {
            path: path("/archive"),
            directory: true,
        },
        Operation::Copy {
            from: path("/test-file.txt"),
            to: path("/archive/copy.txt"),
        },
        Operation::Move {
            from: path("/test-folder"),
            to: path("/archive/folder"),
        },
        Operation::Create {
            path: path("/empty.txt"),
            directory: false,
        },
    ];
    for op in ops {
        manager.execute(id, op).unwrap();
    }
    manager.prepare(id).unwrap();
    manager.commit(id).unwrap();

    assert_eq!(store.contents("archive/copy.txt"), b"ABCD");
    assert_eq!(store.contents("test-file.txt"), b"ABCD");
    assert_eq!(
        store.contents("archive/folder/test-subfolder/test.png"),
        b"PNG!!"
    );
    assert!(!store.real("test-folder").exists());
    assert_eq!(fs::metadata(store.real("empty.txt")).unwrap().len(), 0);
}

#[test]
fn test_prepare_rejects_impossible_log() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();

    manager
        .execute(
            id,
            Operation::Move {
                from: path("/missing"),
                to: path("/elsewhere"),
            },
        )
        .unwrap();

    let err = manager.prepare(id).unwrap_err();
    assert!(matches!(err, TxfsError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
    assert_eq!(manager.state(id).unwrap(), TransactionState::Active);

    let err = manager.execute(id, write("/a.txt", 0, b"x")).unwrap_err();
    assert!(matches!(err, TxfsError::IllegalState { .. }));

    manager.rollback(id, "prepare failed").unwrap();
}

#[test]
fn test_failed_commit_keeps_earlier_entries() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();

    manager.execute(id, write("/first.txt", 0, b"1")).unwrap();
    manager
        .execute(
            id,
            Operation::Delete {
                path: path("/test-file.txt"),
                recursive: false,
            },
        )
        .unwrap();
    manager.prepare(id).unwrap();

    // Someone else removes the file between prepare and commit
    fs::remove_file(store.real("test-file.txt")).unwrap();

    let err = manager.commit(id).unwrap_err();
    assert!(matches!(err, TxfsError::Io(_)));
    assert_eq!(store.contents("first.txt"), b"1");

    // Still registered, only rollback is allowed
    assert_eq!(manager.state(id).unwrap(), TransactionState::Prepared);
    assert!(matches!(
        manager.commit(id),
        Err(TxfsError::IllegalState { .. })
    ));
    manager.rollback(id, "commit failed").unwrap();
    assert!(manager.active_transactions().is_empty());
}

#[test]
fn test_write_past_largest_offset_rejected_before_commit() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();

    manager.execute(id, write("/first.txt", 0, b"1")).unwrap();
    let err = manager
        .execute(id, write("/big.txt", u64::MAX - 1, b"x"))
        .unwrap_err();
    assert!(matches!(err, TxfsError::IllegalOperation(_)));
    assert_eq!(manager.operations(id).unwrap().len(), 1);

    // The rest of the transaction is unaffected
    manager.prepare(id).unwrap();
    manager.commit(id).unwrap();
    assert_eq!(store.contents("first.txt"), b"1");
    assert!(!store.real("big.txt").exists());
}

#[test]
fn test_write_checksum_mismatch_rejected() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();

    let err = manager
        .execute(
            id,
            Operation::Write {
                path: path("/test-file.txt"),
                offset: 0,
                data: b"WXYZ".to_vec(),
                checksum: Some(Checksum::of(b"ABCD")),
            },
        )
        .unwrap_err();
    assert!(matches!(err, TxfsError::IllegalOperation(ref m) if m.contains("checksum")));
    assert!(manager.operations(id).unwrap().is_empty());

    manager
        .execute(
            id,
            Operation::Write {
                path: path("/test-file.txt"),
                offset: 0,
                data: b"WXYZ".to_vec(),
                checksum: Some(Checksum::of(b"WXYZ")),
            },
        )
        .unwrap();
    manager.prepare(id).unwrap();
    manager.commit(id).unwrap();
    assert_eq!(store.contents("test-file.txt"), b"WXYZ");
}

#[test]
fn test_copy_directory_tree() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();

    manager
        .execute(
            id,
            Operation::Copy {
                from: path("/test-folder"),
                to: path("/backup"),
            },
        )
        .unwrap();
    manager.prepare(id).unwrap();
    manager.commit(id).unwrap();

    assert_eq!(store.contents("backup/test-subfolder/test.png"), b"PNG!!");
    assert_eq!(
        store.contents("test-folder/test-subfolder/test.png"),
        b"PNG!!"
    );
}

#[test]
fn test_create_existing_file_keeps_content() {
    let store = Store::new();
    let manager = &store.manager;
    let id = manager.begin("alice").unwrap();

    manager
        .execute(
            id,
            Operation::Create {
                path: path("/test-file.txt"),
                directory: false,
            },
        )
        .unwrap();
    manager.prepare(id).unwrap();
    manager.commit(id).unwrap();

    assert_eq!(store.contents("test-file.txt"), b"ABCD");
}

#[test]
fn test_concurrent_transactions() {
    let store = Store::new();
    let manager = Arc::new(store.manager);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let id = manager.begin(format!("worker-{}", i)).unwrap();
                let data = format!("worker {}", i).into_bytes();
                manager
                    .execute(id, write(&format!("/out/{}.txt", i), 0, &data))
                    .unwrap();
                manager.prepare(id).unwrap();
                manager.commit(id).unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(manager.active_transactions().is_empty());
    for i in 0..8 {
        let written = fs::read(store.temp.path().join(format!("store/out/{}.txt", i))).unwrap();
        assert_eq!(written, format!("worker {}", i).into_bytes());
    }
}

#[test]
fn test_concurrent_calls_on_one_transaction() {
    let store = Store::new();
    let manager = Arc::new(store.manager);
    let id = manager.begin("shared").unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                manager
                    .execute(id, write(&format!("/f{}.txt", i), 0, b"x"))
                    .unwrap()
                    .sequence
            })
        })
        .collect();

    let mut sequences: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    sequences.sort();
    assert_eq!(sequences, vec![0, 1, 2, 3]);

    manager.rollback(id, "done").unwrap();
}
