//! Every item is acted on exactly once however a job is split into runs.

use std::sync::Arc;

use batch_flow::{BatchOrchestrator, DriverConfig, RunReport, RunRequest};
use carousel_checkpoint_store::{CheckpointStore, FileCheckpointStore};
use carousel_core_types::{ActionKind, ActionSpec};
use carousel_sim::{FaultPlan, SimCarousel, SimConfig};
use tokio_util::sync::CancellationToken;

const TOTAL: usize = 12;

struct Outcome {
    /// Remote-side actions across every session, in order
    remote: Vec<usize>,
    /// Items the reports claim, in order
    reported: Vec<usize>,
    runs: usize,
}

/// Run a job over every item of `sim_config` in slices of
/// `batches_per_run` batches, each slice in a new carousel session sharing
/// one checkpoint directory.
async fn run_in_slices(
    sim_config: SimConfig,
    faults: impl Fn(usize) -> FaultPlan,
    config: DriverConfig,
    batches_per_run: usize,
) -> Outcome {
    let total = sim_config.total;
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let mut outcome = Outcome {
        remote: Vec::new(),
        reported: Vec::new(),
        runs: 0,
    };

    loop {
        let sim = SimCarousel::new(sim_config.clone(), faults(outcome.runs));
        let store = FileCheckpointStore::open(dir.path(), "slices").unwrap();
        let orchestrator =
            BatchOrchestrator::new(sim.clone(), store.clone(), config.clone()).unwrap();
        let request = RunRequest::new(ActionSpec::repeat(ActionKind::VarySubtle, total))
            .resuming(outcome.runs > 0)
            .stop_after(batches_per_run);

        let report: RunReport = orchestrator.run(&request, &cancel).await.unwrap();
        outcome.runs += 1;
        outcome.remote.extend(sim.acted_indices());
        outcome.reported.extend(report.acted.iter().copied());

        let saved = store.load().await.unwrap().unwrap();
        assert_eq!(Some(&saved), report.last_checkpoint.as_ref());
        assert_eq!(saved.fingerprint(), &sim.fingerprint_of(saved.index_hint()));

        if report.is_complete() {
            assert_eq!(saved.index_hint(), total - 1);
            return outcome;
        }
        assert!(outcome.runs <= total, "job never completed");
    }
}

fn seeded() -> SimConfig {
    SimConfig::default().with_total(TOTAL).with_seed(11)
}

fn everything() -> Vec<usize> {
    (0..TOTAL).collect()
}

#[tokio::test(start_paused = true)]
async fn every_split_acts_on_each_item_once() {
    for batch_size in [1, 3, 5, 10, 12] {
        let total_batches = TOTAL.div_ceil(batch_size);
        for batches_per_run in 1..=total_batches {
            let config = DriverConfig {
                batch_size,
                ..DriverConfig::default()
            };
            let outcome =
                run_in_slices(seeded(), |_| FaultPlan::none(), config, batches_per_run).await;

            assert_eq!(
                outcome.remote,
                everything(),
                "batch_size={} batches_per_run={}",
                batch_size,
                batches_per_run
            );
            assert_eq!(outcome.reported, everything());
            assert_eq!(outcome.runs, total_batches.div_ceil(batches_per_run));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn work_lists_shorter_and_longer_than_a_batch_split_cleanly() {
    for total in [1, 2, 4, 7, 13] {
        let sim_config = SimConfig::default().with_total(total).with_seed(11);
        for batch_size in [1, 3, 5, 10, 12] {
            let total_batches = total.div_ceil(batch_size);
            for batches_per_run in [1, 2] {
                let config = DriverConfig {
                    batch_size,
                    ..DriverConfig::default()
                };
                let outcome = run_in_slices(
                    sim_config.clone(),
                    |run| FaultPlan::none().goto_lands_behind(if run > 0 { 1 } else { 0 }),
                    config,
                    batches_per_run,
                )
                .await;

                let expected: Vec<usize> = (0..total).collect();
                assert_eq!(
                    outcome.remote, expected,
                    "total={} batch_size={} batches_per_run={}",
                    total, batch_size, batches_per_run
                );
                assert_eq!(outcome.reported, expected);
                assert_eq!(outcome.runs, total_batches.div_ceil(batches_per_run));
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn lagging_jumps_and_dropped_steps_do_not_skip_items() {
    let faults = |run: usize| {
        FaultPlan::none()
            .goto_lands_behind(if run > 0 { 1 } else { 0 })
            .drop_step_at(2)
            .drop_step_at(6)
            .drop_step_at(9)
    };
    let config = DriverConfig {
        batch_size: 4,
        ..DriverConfig::default()
    };

    let outcome = run_in_slices(seeded(), faults, config, 1).await;

    assert_eq!(outcome.runs, 3);
    assert_eq!(outcome.remote, everything());
    assert_eq!(outcome.reported, everything());
}

#[tokio::test(start_paused = true)]
async fn slow_loading_items_are_waited_for_not_skipped() {
    let sim_config = SimConfig {
        load_gap_ms: 900,
        ..seeded()
    };
    let config = DriverConfig {
        batch_size: 5,
        ..DriverConfig::default()
    };

    let outcome = run_in_slices(sim_config, |_| FaultPlan::none(), config, 1).await;

    assert_eq!(outcome.remote, everything());
}

#[tokio::test(start_paused = true)]
async fn address_bar_cursors_survive_a_lagging_address() {
    // Without fingerprint-derived addresses the cursor comes from the
    // address bar, which trails the view for a second after each move.
    let sim_config = SimConfig {
        supports_address_for: false,
        address_lag_ms: 1_000,
        ..seeded()
    };
    let config = DriverConfig {
        batch_size: 5,
        ..DriverConfig::default()
    };

    let outcome = run_in_slices(sim_config, |_| FaultPlan::none(), config, 1).await;

    assert_eq!(outcome.runs, 3);
    assert_eq!(outcome.remote, everything());
}

#[tokio::test(start_paused = true)]
async fn saving_the_same_cursor_twice_leaves_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimCarousel::new(seeded(), FaultPlan::none());
    let store = FileCheckpointStore::open(dir.path(), "idempotent").unwrap();
    let orchestrator =
        BatchOrchestrator::new(sim.clone(), store.clone(), DriverConfig::default()).unwrap();

    let report = orchestrator
        .run(
            &RunRequest::new(ActionSpec::repeat(ActionKind::VarySubtle, TOTAL)).stop_after(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let cursor = report.last_checkpoint.unwrap();

    let before = store.record().await.unwrap().unwrap();
    store.save(&cursor).await.unwrap();
    let reopened = FileCheckpointStore::open(dir.path(), "idempotent").unwrap();
    let after = reopened.record().await.unwrap().unwrap();

    assert_eq!(after.index, before.index);
    assert_eq!(after.address, before.address);
    assert_eq!(after.fingerprint, before.fingerprint);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}
