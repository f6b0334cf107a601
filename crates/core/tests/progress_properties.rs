// crates/core/tests/progress_properties.rs
//! Monotonicity of reconciled progress over arbitrary inputs.

use std::time::{Duration, Instant};

use opwatch_core::{ElapsedProjector, ProgressReconciler, ProgressSources};
use opwatch_types::{OperationEvent, ProgressRecord, Severity, StepRecord};
use proptest::prelude::*;
use proptest::test_runner::Config;

fn arb_severity() -> impl Strategy<Value = Severity> {
    prop_oneof![
        8 => Just(Severity::Info),
        2 => Just(Severity::Debug),
        2 => Just(Severity::Warning),
        1 => Just(Severity::Error),
    ]
}

fn arb_event() -> impl Strategy<Value = OperationEvent> {
    (
        arb_severity(),
        prop::option::of(0_u32..12),
        prop::option::of(0_u32..12),
        prop::option::of(0.0_f64..5_000.0),
        prop::option::of(any::<bool>()),
        prop_oneof![
            6 => Just("working"),
            1 => Just("Workflow completed"),
            1 => Just("workflow failed: boom"),
        ],
    )
        .prop_map(|(severity, step_index, total_steps, elapsed, terminal, text)| {
            OperationEvent {
                severity,
                text: text.into(),
                step: step_index.map(|i| format!("step-{i}")),
                step_index,
                total_steps,
                elapsed_seconds: elapsed,
                terminal,
                ..Default::default()
            }
        })
}

fn arb_step() -> impl Strategy<Value = StepRecord> {
    (any::<bool>(), 0.0_f64..600.0).prop_map(|(success, duration_seconds)| StepRecord {
        step: "step".into(),
        success,
        duration_seconds,
        ..Default::default()
    })
}

proptest! {
    #![proptest_config(Config::with_cases(256))]

    #[test]
    fn reconciled_progress_never_decreases(
        live in prop::collection::vec(arb_event(), 0..24),
        log in prop::option::of(prop::collection::vec(arb_event(), 0..12)),
        steps in prop::option::of(prop::collection::vec(arb_step(), 0..6)),
        log_arrives_at in 0_usize..24,
    ) {
        let mut reconciler = ProgressReconciler::new();
        let mut previous: Option<ProgressRecord> = None;

        for seen in 0..=live.len() {
            let sources = ProgressSources {
                live: &live[..seen],
                event_log: log.as_deref().filter(|_| seen >= log_arrives_at),
                step_history: steps.as_deref(),
            };
            let record = reconciler.compute(sources);

            if let Some(prev) = &previous {
                prop_assert!(record.progress_percent >= prev.progress_percent);
                prop_assert!(record.elapsed_seconds >= prev.elapsed_seconds);
                if prev.lifecycle_status.is_terminal() {
                    prop_assert_eq!(&record, prev);
                }
            }
            prop_assert!(record.progress_percent <= 100);
            previous = Some(record);
        }
    }

    #[test]
    fn projected_display_never_decreases(
        updates in prop::collection::vec((0_u64..10_000, 0_u64..5_000), 1..32),
    ) {
        let start = Instant::now();
        let mut projector = ElapsedProjector::new();
        let mut shown = 0;

        for (authoritative, at_ms) in updates {
            let now = start + Duration::from_millis(at_ms);
            projector.update(authoritative, now);
            let display = projector.tick(now);
            prop_assert!(display >= shown);
            prop_assert!(display >= authoritative);
            shown = display;
        }
    }
}
