mod common;

use common::{drill, give_back, intake, issue, ledger_with_drill, saw};
use stockfold::{
    Anomaly, Ledger, LedgerError, OutstandingOverride, StockBand, Thresholds,
};
use tempfile::tempdir;

#[test]
fn test_clean_tool_has_no_anomalies() {
    let dir = tempdir().unwrap();
    let mut ledger = ledger_with_drill(dir.path(), 10);
    issue(&mut ledger, &drill(), 3);
    give_back(&mut ledger, &drill(), 1);

    let report = ledger.verify_tool(&drill()).unwrap();
    assert!(!report.has_anomaly());
    assert_eq!(report.tool.stock, 8);
    assert_eq!(report.outstanding, 2);
    assert_eq!(report.movement_count, 2);
    assert!(ledger.audit().is_empty());
}

#[test]
fn test_availability_bands() {
    let dir = tempdir().unwrap();
    let mut ledger = ledger_with_drill(dir.path(), 20);

    let report = ledger.get_tool(&drill()).unwrap();
    assert_eq!(report.availability.percent, Some(100));
    assert_eq!(report.availability.band, Some(StockBand::Good));

    issue(&mut ledger, &drill(), 10);
    let report = ledger.get_tool(&drill()).unwrap();
    assert_eq!(report.availability.percent, Some(50));
    assert_eq!(report.availability.band, Some(StockBand::Medium));

    issue(&mut ledger, &drill(), 5);
    let report = ledger.get_tool(&drill()).unwrap();
    assert_eq!(report.availability.percent, Some(25));
    assert_eq!(report.availability.band, Some(StockBand::Low));

    issue(&mut ledger, &drill(), 3);
    let report = ledger.get_tool(&drill()).unwrap();
    assert_eq!(report.availability.percent, Some(10));
    assert_eq!(report.availability.band, Some(StockBand::Critical));
}

#[test]
fn test_availability_undefined_without_initial_stock() {
    let dir = tempdir().unwrap();
    let mut ledger = ledger_with_drill(dir.path(), 0);

    let report = ledger.get_tool(&drill()).unwrap();
    assert_eq!(report.availability.percent, None);
    assert_eq!(report.availability.band, None);

    // Any intake on a zero-initial tool is an overage.
    intake(&mut ledger, &drill(), 2);
    let report = ledger.get_tool(&drill()).unwrap();
    assert_eq!(report.availability.percent, None);
    assert_eq!(
        report.anomalies,
        vec![Anomaly::StockAboveInitial {
            stock: 2,
            initial_stock: 0
        }]
    );
}

#[test]
fn test_configured_thresholds() {
    let dir = tempdir().unwrap();
    let mut ledger = Ledger::builder(dir.path())
        .thresholds(Thresholds {
            critical: 30,
            low: 60,
            medium: 90,
        })
        .open()
        .unwrap();
    ledger.register_tool(drill(), "Taladro", 10).unwrap();
    issue(&mut ledger, &drill(), 5);

    let report = ledger.get_tool(&drill()).unwrap();
    assert_eq!(report.availability.band, Some(StockBand::Low));
}

#[test]
fn test_intake_above_initial_is_accepted_and_flagged() {
    let dir = tempdir().unwrap();
    let mut ledger = ledger_with_drill(dir.path(), 10);

    intake(&mut ledger, &drill(), 3);
    let report = ledger.get_tool(&drill()).unwrap();
    assert_eq!(report.tool.stock, 13);
    assert_eq!(report.availability.percent, Some(130));
    assert_eq!(
        report.anomalies,
        vec![Anomaly::StockAboveInitial {
            stock: 13,
            initial_stock: 10
        }]
    );

    let err = ledger.verify_tool(&drill()).unwrap_err();
    match err {
        LedgerError::ReconciliationAnomaly { tool_id, anomalies } => {
            assert_eq!(tool_id, drill());
            assert_eq!(anomalies.len(), 1);
        }
        other => panic!("expected ReconciliationAnomaly, got {other:?}"),
    }

    // Raising stock_inicial clears the flag.
    ledger
        .edit_initial_stock(&drill(), 13, OutstandingOverride::Refuse)
        .unwrap();
    assert!(!ledger.get_tool(&drill()).unwrap().has_anomaly());
}

#[test]
fn test_out_of_band_correction_reported_as_divergence() {
    let dir = tempdir().unwrap();
    let mut ledger = ledger_with_drill(dir.path(), 10);
    issue(&mut ledger, &drill(), 4);

    ledger.correct_stock(&drill(), 5).unwrap();

    let report = ledger.get_tool(&drill()).unwrap();
    assert_eq!(
        report.anomalies,
        vec![Anomaly::ReplayDivergence {
            ledger_base: 10,
            reconstructed: 9
        }]
    );
    // Reported, never repaired.
    assert_eq!(report.tool.stock, 5);

    let flagged = ledger.audit();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].tool.id, drill());
}

#[test]
fn test_correction_rejects_negative_stock() {
    let dir = tempdir().unwrap();
    let mut ledger = ledger_with_drill(dir.path(), 10);
    let err = ledger.correct_stock(&drill(), -1).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidStock(-1)));
    assert_eq!(ledger.get_tool(&drill()).unwrap().tool.stock, 10);
}

#[test]
fn test_lowering_initial_below_outstanding_needs_override() {
    let dir = tempdir().unwrap();
    let mut ledger = ledger_with_drill(dir.path(), 10);
    issue(&mut ledger, &drill(), 6);
    give_back(&mut ledger, &drill(), 2);

    let err = ledger
        .edit_initial_stock(&drill(), 3, OutstandingOverride::Refuse)
        .unwrap_err();
    match err {
        LedgerError::OutstandingExceedsInitial {
            requested,
            outstanding,
            ..
        } => {
            assert_eq!(requested, 3);
            assert_eq!(outstanding, 4);
        }
        other => panic!("expected OutstandingExceedsInitial, got {other:?}"),
    }
    assert_eq!(ledger.get_tool(&drill()).unwrap().tool.initial_stock, 10);

    // At the outstanding quantity no override is needed.
    let tool = ledger
        .edit_initial_stock(&drill(), 4, OutstandingOverride::Refuse)
        .unwrap();
    assert_eq!(tool.initial_stock, 4);

    let tool = ledger
        .edit_initial_stock(&drill(), 1, OutstandingOverride::Acknowledge)
        .unwrap();
    assert_eq!(tool.initial_stock, 1);
    assert_eq!(tool.stock, 6, "editing stock_inicial leaves stock alone");

    let report = ledger.get_tool(&drill()).unwrap();
    assert_eq!(
        report.anomalies,
        vec![Anomaly::StockAboveInitial {
            stock: 6,
            initial_stock: 1
        }]
    );
}

#[test]
fn test_edit_initial_stock_rejects_negative() {
    let dir = tempdir().unwrap();
    let mut ledger = ledger_with_drill(dir.path(), 10);
    let err = ledger
        .edit_initial_stock(&drill(), -5, OutstandingOverride::Acknowledge)
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidStock(-5)));
}

#[test]
fn test_audit_lists_only_flagged_tools() {
    let dir = tempdir().unwrap();
    let mut ledger = ledger_with_drill(dir.path(), 10);
    ledger.register_tool(saw(), "Sierra", 4).unwrap();
    issue(&mut ledger, &drill(), 1);
    intake(&mut ledger, &saw(), 1);

    let flagged = ledger.audit();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].tool.id, saw());
}

#[test]
fn test_anomaly_display() {
    let anomaly = Anomaly::ReplayDivergence {
        ledger_base: 10,
        reconstructed: 9,
    };
    assert_eq!(
        anomaly.to_string(),
        "history reconstructs an opening stock of 9, expected 10"
    );
}
