//! Settlement state must survive stopping and reopening the RocksDB store

use rgs::games::ManualClock;
use rgs::{
    MathModel, PrizeTier, RgsConfig, RgsError, RgsMetrics, RocksStorage, SettlementOrchestrator,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config() -> RgsConfig {
    let mut config = RgsConfig::default();
    // Every crash round crashes at step 50
    config.crash.min_crash_step = 50;
    config.crash.max_crash_step = 50;
    config
}

fn open(dir: &TempDir, clock: &ManualClock) -> SettlementOrchestrator {
    let storage = Arc::new(RocksStorage::open(dir.path()).expect("Failed to open store"));
    SettlementOrchestrator::open_with_clock(
        storage,
        &config(),
        Arc::new(RgsMetrics::new().unwrap()),
        Arc::new(clock.clone()),
    )
    .expect("Failed to open orchestrator")
}

fn lucky_star() -> MathModel {
    MathModel::new(
        "lucky_star",
        vec![
            PrizeTier::new("LOSE", 0.0, 70),
            PrizeTier::new("T1", 2.0, 20),
            PrizeTier::new("T2", 5.0, 10),
        ],
    )
}

#[test]
fn test_settlements_persist_across_restarts() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::default();

    // === PHASE 1: register, settle, open a crash round ===
    let (recorded, content_hash) = {
        let orch = open(&dir, &clock);
        orch.register_math_model(lucky_star()).unwrap();
        let settlement = orch
            .settle_instant_round("inst-1", 3.0, None, "lucky_star")
            .unwrap();
        orch.start_crash_round("crash-1", 10.0, Some("EUR")).unwrap();

        let hash = orch
            .get_math_model("lucky_star")
            .and_then(|m| m.integrity.clone())
            .map(|i| i.content_hash);
        (settlement.result, hash)
    };

    // === PHASE 2: reopen and verify ===
    let orch = open(&dir, &clock);

    let model = orch.get_math_model("lucky_star").expect("model survives restart");
    assert_eq!(model.integrity.as_ref().map(|i| i.content_hash.clone()), content_hash);

    let replay = orch
        .settle_instant_round("inst-1", 999.0, None, "lucky_star")
        .unwrap();
    assert!(replay.replayed);
    assert_eq!(replay.result, recorded);

    // The open round keeps its start time and crash step
    clock.advance(Duration::from_millis(3_000));
    let status = orch.crash_round_status("crash-1").unwrap();
    assert_eq!(status.current_step, 30);
    assert!(!status.crashed);

    let cashout = orch.cashout_crash_round("crash-1", 30).unwrap().result;
    assert_eq!(cashout.currency, "EUR");
    assert!((cashout.payout - 13.0).abs() < 1e-9);

    let audit = orch.audit_log(10).unwrap();
    let ids: Vec<&str> = audit.iter().map(|r| r.round_id.as_str()).collect();
    assert_eq!(ids, vec!["inst-1", "crash-1"]);
}

#[test]
fn test_crash_round_expired_while_down_settles_as_loss() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::default();

    {
        let orch = open(&dir, &clock);
        orch.start_crash_round("crash-2", 4.0, None).unwrap();
    }

    clock.advance(Duration::from_secs(60));
    let orch = open(&dir, &clock);

    let status = orch.crash_round_status("crash-2").unwrap();
    assert!(status.crashed);
    assert_eq!(status.crash_step, Some(50));
    let result = status.result.unwrap();
    assert!((result.balance_delta + 4.0).abs() < 1e-9);

    match orch.cashout_crash_round("crash-2", 10) {
        Err(RgsError::Conflict(_)) => {}
        other => panic!("expected conflict, got {:?}", other),
    }
}

#[test]
fn test_hilo_round_survives_restart() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::default();

    let shown = {
        let orch = open(&dir, &clock);
        orch.register_math_model(lucky_star()).unwrap();
        for i in 0..3 {
            orch.settle_instant_round(&format!("inst-{i}"), 1.0, None, "lucky_star")
                .unwrap();
        }
        orch.start_hilo_round("hilo-1", 2.0, None).unwrap().current_number
    };

    let orch = open(&dir, &clock);
    let result = orch.end_hilo_round("hilo-1", "lower").unwrap().result;
    assert_eq!(result.hilo.as_ref().map(|d| d.current_number), Some(shown));

    // Newest two entries, read from the end of the log
    let tail: Vec<String> = orch
        .audit_log(2)
        .unwrap()
        .into_iter()
        .map(|r| r.round_id)
        .collect();
    assert_eq!(tail, vec!["inst-2", "hilo-1"]);

    match orch.end_hilo_round("hilo-1", "higher") {
        Err(RgsError::Conflict(_)) => {}
        other => panic!("expected conflict, got {:?}", other),
    }
}
