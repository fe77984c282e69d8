//! End-to-end runs of small graphs through `execute_blocking`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sluice_core::engine::{Pipeline, StageState};
use sluice_core::{BoxError, ExecutionReport, GraphError};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Counts error-level events.
#[derive(Clone, Default)]
struct ErrorCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Records the `queue_capacity` field of the pipeline start event.
#[derive(Clone, Default)]
struct CapacityRecorder(Arc<AtomicUsize>);

impl Visit for CapacityRecorder {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "queue_capacity" {
            self.0.store(value as usize, Ordering::SeqCst);
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
}

impl<S: Subscriber> Layer<S> for CapacityRecorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        event.record(&mut self.clone());
    }
}

/// Run the pipeline on a helper thread and fail the test if it hangs.
fn run_within(pipeline: Pipeline, limit: Duration) -> Result<ExecutionReport, GraphError> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let dispatch = tracing::dispatcher::get_default(tracing::Dispatch::clone);
    thread::spawn(move || {
        let report = tracing::dispatcher::with_default(&dispatch, || pipeline.execute_blocking());
        let _ = tx.send(report);
    });
    rx.recv_timeout(limit)
        .expect("pipeline did not terminate in time")
}

/// source → distributor → K identity chains → merger → collector
fn fan_out_fan_in(
    tokens: Vec<u32>,
    chains: usize,
    fail_chain_on: Option<(usize, usize)>,
) -> (Pipeline, sluice_core::engine::Collected<u32>) {
    let mut pipeline = Pipeline::with_capacity(2);
    let source = pipeline.add_source("source", tokens);
    pipeline.declare_active(&source).unwrap();
    let distribute = pipeline.add_distributor::<u32>("distribute");
    pipeline.connect(source.output(), distribute.input()).unwrap();

    let merge = pipeline.add_merger::<u32>("merge");
    pipeline.declare_active(&merge).unwrap();
    let (sink, collected) = pipeline.add_collector("sink");
    pipeline.connect(merge.output(), sink.input()).unwrap();

    for chain in 0..chains {
        let mut seen = 0;
        let fail_on = fail_chain_on
            .filter(|(failing, _)| *failing == chain)
            .map(|(_, nth)| nth);
        let identity = pipeline.add_transform(format!("chain-{chain}"), move |x: u32| {
            seen += 1;
            if Some(seen) == fail_on {
                return Err::<Option<u32>, BoxError>(format!("rejected {x}").into());
            }
            Ok(Some(x))
        });
        pipeline.declare_active(&identity).unwrap();

        let fanned = pipeline.new_output_port(&distribute).unwrap();
        pipeline.connect(fanned, identity.input()).unwrap();
        let merged = pipeline.new_input_port(&merge).unwrap();
        pipeline.connect(identity.output(), merged).unwrap();
    }

    (pipeline, collected)
}

#[test]
fn test_fan_out_fan_in_delivers_every_token() {
    let (pipeline, collected) = fan_out_fan_in(vec![1, 2, 3, 4], 2, None);
    let report = run_within(pipeline, Duration::from_secs(10)).unwrap();

    assert!(report.is_success());
    let received: HashSet<u32> = collected.take().into_iter().collect();
    assert_eq!(received, HashSet::from([1, 2, 3, 4]));

    for outcome in &report.stages {
        assert_eq!(outcome.state, StageState::Terminated);
    }
    assert_eq!(report.stage("source").unwrap().processed, 4);
}

#[test]
fn test_faulting_chain_is_logged_once_and_others_finish() {
    let errors = ErrorCounter::default();
    let subscriber = tracing_subscriber::registry().with(errors.clone());

    let tokens: Vec<u32> = (0..40).collect();
    let (pipeline, collected) = fan_out_fan_in(tokens.clone(), 2, Some((0, 2)));
    let report = tracing::subscriber::with_default(subscriber, || {
        run_within(pipeline, Duration::from_secs(10))
    })
    .unwrap();

    assert_eq!(errors.0.load(Ordering::SeqCst), 1);
    assert_eq!(report.failure_count(), 1);
    let failed = report.failures().next().unwrap();
    assert_eq!(failed.stage, "chain-0");
    assert!(failed.error.as_deref().unwrap().contains("rejected"));

    let received = collected.take();
    assert!(received.len() < tokens.len());
    assert!(report.stage("chain-1").unwrap().is_success());
    assert!(report.stage("merge").unwrap().is_success());
}

#[test]
fn test_bounded_queue_holds_back_fast_source() {
    let produced = Arc::new(AtomicUsize::new(0));
    let consumed = Arc::new(AtomicUsize::new(0));
    let max_gap = Arc::new(AtomicUsize::new(0));

    let mut pipeline = Pipeline::with_capacity(1);
    let counter = Arc::clone(&produced);
    let source = pipeline.add_source(
        "fast",
        (0..20_u32).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    pipeline.declare_active(&source).unwrap();

    let (made, done, gap) = (
        Arc::clone(&produced),
        Arc::clone(&consumed),
        Arc::clone(&max_gap),
    );
    let sink = pipeline.add_sink("slow", move |_: u32| {
        thread::sleep(Duration::from_millis(5));
        let ahead = made.load(Ordering::SeqCst) - done.load(Ordering::SeqCst);
        gap.fetch_max(ahead, Ordering::SeqCst);
        done.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    pipeline.declare_active(&sink).unwrap();
    pipeline.connect(source.output(), sink.input()).unwrap();

    let report = run_within(pipeline, Duration::from_secs(10)).unwrap();
    assert!(report.is_success());
    assert_eq!(consumed.load(Ordering::SeqCst), 20);
    // One element in the sink, one queued, one held by the blocked source.
    assert!(max_gap.load(Ordering::SeqCst) <= 3);
}

#[test]
fn test_panicking_stage_is_reported_and_downstream_ends() {
    let mut pipeline = Pipeline::with_capacity(2);
    let source = pipeline.add_source("numbers", 0..10_u32);
    pipeline.declare_active(&source).unwrap();
    let explode = pipeline.add_map("explode", |x: u32| {
        if x == 3 {
            panic!("cannot handle three");
        }
        x
    });
    pipeline.declare_active(&explode).unwrap();
    let (sink, collected) = pipeline.add_collector("sink");
    pipeline.declare_active(&sink).unwrap();

    pipeline.connect(source.output(), explode.input()).unwrap();
    pipeline.connect(explode.output(), sink.input()).unwrap();

    let report = run_within(pipeline, Duration::from_secs(10)).unwrap();
    let failed = report.stage("explode").unwrap();
    assert!(failed.error.as_deref().unwrap().contains("cannot handle three"));
    assert!(report.stage("sink").unwrap().is_success());
    assert_eq!(collected.take(), vec![0, 1, 2]);
}

#[test]
fn test_passive_chain_runs_on_feeding_thread() {
    let mut pipeline = Pipeline::with_capacity(2);
    let source = pipeline.add_source("feeder", vec!["a", "b"]);
    pipeline.declare_active(&source).unwrap();
    let tag = pipeline.add_map("tag", |s: &'static str| {
        let thread = thread::current().name().unwrap_or_default().to_string();
        format!("{s}@{thread}")
    });
    let (sink, collected) = pipeline.add_collector("sink");
    pipeline.connect(source.output(), tag.input()).unwrap();
    pipeline.connect(tag.output(), sink.input()).unwrap();

    let report = run_within(pipeline, Duration::from_secs(10)).unwrap();
    assert_eq!(report.stages.len(), 1);
    assert_eq!(collected.take(), vec!["a@feeder", "b@feeder"]);
}

#[test]
fn test_execute_rejects_unconnected_graph() {
    let mut pipeline = Pipeline::with_capacity(2);
    let source = pipeline.add_source("lonely", 0..3_u32);
    pipeline.declare_active(&source).unwrap();

    let err = pipeline.execute_blocking().unwrap_err();
    assert!(matches!(err, GraphError::UnconnectedPort { .. }));
}

#[test]
fn test_empty_source_terminates_whole_graph() {
    let (pipeline, collected) = fan_out_fan_in(Vec::new(), 3, None);
    let report = run_within(pipeline, Duration::from_secs(10)).unwrap();
    assert!(report.is_success());
    assert!(collected.is_empty());
}

#[test]
fn test_failing_sink_behind_merger_logs_one_error() {
    let errors = ErrorCounter::default();
    let subscriber = tracing_subscriber::registry().with(errors.clone());
    let chains = 3;

    let mut pipeline = Pipeline::with_capacity(2);
    let source = pipeline.add_source("source", 0..200_u32);
    pipeline.declare_active(&source).unwrap();
    let distribute = pipeline.add_distributor::<u32>("distribute");
    pipeline.connect(source.output(), distribute.input()).unwrap();
    let merge = pipeline.add_merger::<u32>("merge");
    pipeline.declare_active(&merge).unwrap();

    let mut written = 0;
    let sink = pipeline.add_sink("sink", move |_: u32| {
        written += 1;
        if written == 3 {
            return Err::<(), BoxError>("disk full".into());
        }
        Ok(())
    });
    pipeline.declare_active(&sink).unwrap();
    pipeline.connect(merge.output(), sink.input()).unwrap();

    for chain in 0..chains {
        let identity = pipeline.add_map(format!("chain-{chain}"), |x: u32| x);
        pipeline.declare_active(&identity).unwrap();
        let fanned = pipeline.new_output_port(&distribute).unwrap();
        pipeline.connect(fanned, identity.input()).unwrap();
        let merged = pipeline.new_input_port(&merge).unwrap();
        pipeline.connect(identity.output(), merged).unwrap();
    }

    let report = tracing::subscriber::with_default(subscriber, || {
        run_within(pipeline, Duration::from_secs(10))
    })
    .unwrap();

    assert_eq!(errors.0.load(Ordering::SeqCst), 1);
    assert_eq!(report.root_failure_count(), 1);
    assert_eq!(report.failure_count(), chains + 2);

    let sink = report.stage("sink").unwrap();
    assert!(sink.is_root_failure());
    assert!(sink.error.as_deref().unwrap().contains("disk full"));
    for outcome in report.failures().filter(|o| o.stage != "sink") {
        assert!(outcome.cascaded, "{} should be a consequence", outcome.stage);
    }
}

#[test]
fn test_start_event_reports_queue_capacity() {
    let capacity = CapacityRecorder::default();
    let subscriber = tracing_subscriber::registry().with(capacity.clone());

    let mut pipeline = Pipeline::with_capacity(7);
    let source = pipeline.add_source("source", 0..3_u32);
    pipeline.declare_active(&source).unwrap();
    let (sink, collected) = pipeline.add_collector("sink");
    pipeline.connect(source.output(), sink.input()).unwrap();

    tracing::subscriber::with_default(subscriber, || {
        run_within(pipeline, Duration::from_secs(10))
    })
    .unwrap();

    assert_eq!(capacity.0.load(Ordering::SeqCst), 7);
    assert_eq!(collected.take(), vec![0, 1, 2]);
}
