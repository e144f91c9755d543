//! Scenario: Accumulation Completes Only When Every Line Balances
//!
//! # Invariant under test
//! With expected lines A×2 and B×1, completion is reached exactly on the
//! third acknowledged scan — never earlier — and the ledger only moves on
//! server acknowledgement. Completion does not stop the camera: the
//! operator may keep working until an explicit confirm.

use smk_ledger::{ExpectedLine, LedgerLine};
use smk_session::{SessionConfig, SessionStatus};
use smk_testkit::{InMemoryRemote, ScanRig};

fn two_line_rig() -> ScanRig {
    ScanRig::new(
        SessionConfig::accumulate(
            "INV-1",
            vec![
                ExpectedLine::new("A", "Item A", 2),
                ExpectedLine::new("B", "Item B", 1),
            ],
        ),
        InMemoryRemote::for_transaction("INV-1")
            .with_line("A", "A", 2)
            .with_line("B", "B", 1),
    )
}

// ---------------------------------------------------------------------------
// 1. Third acknowledged scan completes, not the second
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completion_on_exactly_the_last_required_scan() {
    let rig = two_line_rig();
    rig.start().await.unwrap();

    rig.scan("A", 1_000).await;
    assert!(!rig.engine.can_confirm().await);

    rig.scan("B", 2_000).await;
    assert!(!rig.engine.can_confirm().await, "A is still short");

    rig.scan("A", 3_000).await;
    assert!(rig.engine.is_ledger_complete().await);
    assert!(rig.engine.can_confirm().await);

    // Completion is a ledger property, not a state change.
    assert_eq!(rig.engine.status().await, SessionStatus::Scanning);
    assert_eq!(rig.decoder.live_track_count(), 1, "camera stays live");
}

// ---------------------------------------------------------------------------
// 2. Every acknowledged scan publishes a ledger snapshot
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ledger_snapshots_track_server_counts() {
    let rig = two_line_rig();
    rig.start().await.unwrap();

    rig.scan("A", 1_000).await;
    rig.scan("A", 2_000).await;
    rig.scan("B", 3_000).await;

    let updates = rig.ledger_updates.lock().unwrap();
    assert_eq!(updates.len(), 3, "one snapshot per acknowledged scan");

    let qty = |lines: &[LedgerLine], key: &str| {
        lines
            .iter()
            .find(|l| l.item_key == key)
            .map(|l| l.scanned_qty)
            .unwrap()
    };
    assert_eq!(qty(&updates[0], "A"), 1);
    assert_eq!(qty(&updates[1], "A"), 2);
    assert_eq!(qty(&updates[2], "B"), 1);
    assert!(updates[2].iter().all(LedgerLine::is_matched));
}

// ---------------------------------------------------------------------------
// 3. Counts are server-authoritative, never locally incremented
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ledger_mirrors_backend_counts_exactly() {
    let rig = two_line_rig();
    rig.start().await.unwrap();

    rig.scan("A", 1_000).await;
    rig.scan("B", 2_000).await;

    assert_eq!(rig.remote.scanned_qty("A"), 1);
    assert_eq!(rig.remote.scanned_qty("B"), 1);

    let summary = rig.engine.ledger_summary().await;
    assert_eq!(summary.total_scanned, 2);
    assert_eq!(summary.lines_matched, 1, "only B balances so far");
    assert_eq!(summary.lines_total, 2);
}
