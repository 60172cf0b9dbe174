//! Integration tests for telemetry initialization and span helpers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;
use vidpool::pool::{EventSink, ExitReason, Operation, PoolEvent, PoolState, RunId};
use vidpool::telemetry::TracingSink;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    // init_telemetry uses try_init(), so a second call returns Err
    // instead of panicking.
    let config = vidpool::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "vidpool-test".to_string(),
        log_level: "debug".to_string(),
    };
    if let Ok(guard) = vidpool::telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn conversion_span_records_transitions_and_outputs() {
    let id = Uuid::new_v4();
    let span = vidpool::telemetry::video::start_conversion_span(&id);
    vidpool::telemetry::video::record_status_transition(&span, "pending", "processing");
    vidpool::telemetry::video::record_output_files(&span, 12);
}

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn tracing_sink_maps_events_to_levels() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let sink = TracingSink::new("test");
    let run_id = RunId::new();
    let events = [
        PoolEvent::RunStarted { run_id, workers: 2 },
        PoolEvent::WorkerStarted {
            run_id,
            worker_id: 0,
        },
        PoolEvent::JobCompleted {
            run_id,
            worker_id: 0,
            elapsed: Duration::from_millis(12),
        },
        PoolEvent::JobPanicked {
            run_id,
            worker_id: 1,
            message: "boom".to_string(),
            recovered: false,
        },
        PoolEvent::ResultDropped {
            run_id,
            worker_id: 0,
            reason: ExitReason::Stopped,
        },
        PoolEvent::StopRequested { run_id },
        PoolEvent::WorkerExited {
            run_id,
            worker_id: 0,
            reason: ExitReason::Stopped,
        },
        PoolEvent::WorkerExited {
            run_id,
            worker_id: 1,
            reason: ExitReason::InputClosed,
        },
        PoolEvent::RunDrained { run_id },
        PoolEvent::Rejected {
            operation: Operation::Stop,
            state: PoolState::Idle,
        },
    ];
    tracing::subscriber::with_default(subscriber, || {
        for event in events {
            sink.emit(event);
        }
    });

    let lines = captured.lines();
    let logged = |level: &str, message: &str| {
        lines
            .iter()
            .filter(|l| l.contains(level) && l.contains(message))
            .count()
    };
    assert_eq!(logged("INFO", "pool run started"), 1);
    assert_eq!(logged("ERROR", "job panicked"), 1);
    assert_eq!(logged("WARN", "result dropped"), 1);
    assert_eq!(logged("INFO", "state_transition"), 1);
    assert_eq!(logged("INFO", "pool run drained"), 1);
    assert_eq!(logged("WARN", "lifecycle call rejected"), 1);
    // Stopped exits log at info; input-closed exits at debug, filtered here.
    assert_eq!(logged("INFO", "worker exited"), 1);
    assert!(lines.iter().all(|l| !l.contains("worker started")));
    assert!(lines.iter().all(|l| !l.contains("job completed")));
    assert!(lines.iter().any(|l| l.contains("boom")));
}

#[test]
fn run_id_displays_short_form() {
    let run_id = RunId::new();
    let shown = run_id.to_string();
    assert_eq!(shown.len(), 8);
    assert!(run_id.0.to_string().starts_with(&shown));
}
