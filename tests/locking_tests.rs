mod common;

use common::{drill, issue, ledger_with_drill, stock_of, unlocked};
use std::sync::{Arc, Mutex};
use std::thread;
use stockfold::{Journal, Ledger, LedgerError, LockMode, MovementKind, MovementRequest};
use tempfile::tempdir;

#[test]
fn test_second_writer_fails() {
    let dir = tempdir().unwrap();
    let _ledger = Ledger::open(dir.path()).unwrap();

    let result = Ledger::open(dir.path());
    assert!(result.is_err(), "second writer should fail to open");
    let err = result.err().unwrap();
    assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
    let msg = err.to_string();
    assert!(
        msg.contains("another writer holds the lock"),
        "error should mention the lock: {msg}"
    );
    assert!(
        msg.contains("ledger.lock"),
        "error should mention the lock file: {msg}"
    );
}

#[test]
fn test_lock_released_on_drop() {
    let dir = tempdir().unwrap();
    {
        let _ledger = Ledger::open(dir.path()).unwrap();
    }
    let _ledger = Ledger::open(dir.path()).unwrap();
}

#[test]
fn test_lock_mode_none_allows_multiple() {
    let dir = tempdir().unwrap();
    let _a = Journal::open_with_lock(dir.path(), LockMode::None).unwrap();
    let _b = Journal::open_with_lock(dir.path(), LockMode::None).unwrap();
}

#[test]
fn test_lock_survives_compaction() {
    let dir = tempdir().unwrap();
    let mut ledger = ledger_with_drill(dir.path(), 5);
    issue(&mut ledger, &drill(), 1);
    ledger.compact().unwrap();

    let result = Ledger::open(dir.path());
    assert_eq!(
        result.err().unwrap().kind(),
        std::io::ErrorKind::AlreadyExists
    );
}

#[test]
fn test_stale_writer_gets_conflict_and_writes_nothing() {
    let dir = tempdir().unwrap();
    let mut a = unlocked(dir.path());
    a.register_tool(drill(), "Taladro", 5).unwrap();

    let mut b = unlocked(dir.path());
    assert_eq!(stock_of(&b, &drill()), 5);

    // Both believe 5 units are available; A issues 4 first.
    issue(&mut a, &drill(), 4);
    let size_before = a.reader().active_log_size().unwrap();

    let err = b
        .append_movement(&drill(), MovementRequest::new(MovementKind::Salida, 4))
        .unwrap_err();
    match err {
        LedgerError::Conflict {
            expected_offset,
            actual_offset,
        } => assert!(actual_offset > expected_offset),
        other => panic!("expected Conflict, got {other:?}"),
    }
    assert_eq!(a.reader().active_log_size().unwrap(), size_before);

    // After catching up, B sees the real stock and the overdraw is refused.
    b.refresh().unwrap();
    assert_eq!(stock_of(&b, &drill()), 1);
    let err = b
        .append_movement(&drill(), MovementRequest::new(MovementKind::Salida, 4))
        .unwrap_err();
    assert!(matches!(err, LedgerError::StockViolation { .. }));
}

#[test]
fn test_concurrent_issues_never_overdraw() {
    let dir = tempdir().unwrap();
    let ledger = Arc::new(Mutex::new(ledger_with_drill(dir.path(), 10)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                let mut accepted: i64 = 0;
                for _ in 0..5 {
                    let mut ledger = ledger.lock().unwrap();
                    match ledger
                        .append_movement(&drill(), MovementRequest::new(MovementKind::Salida, 1))
                    {
                        Ok(_) => accepted += 1,
                        Err(LedgerError::StockViolation { .. }) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
                accepted
            })
        })
        .collect();

    let accepted: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    let ledger = ledger.lock().unwrap();
    assert_eq!(accepted, 10);
    assert_eq!(stock_of(&ledger, &drill()), 0);
    assert_eq!(ledger.list_movements(&drill()).unwrap().len(), 10);
}
