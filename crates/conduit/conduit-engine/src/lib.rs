use conduit_analyzer::{Alert, DetectorConfig, run_all_detectors};
use conduit_config::{ConduitConfig, IpcKind, TimingSettings};
use conduit_sim::{IpcSimulator, ProcessId, ProcessInfo, SimError, SimOptions, StopOutcome, WorkerSpec};
use conduit_trace::{ExportError, TraceEvent, export_json_string, export_to_path, now_secs};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Payload the shared-memory recipe's writer puts in the segment.
const SHM_PAYLOAD: &[u8] = b"hello";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Simulator plus analyzer behind the narrow surface a front end polls.
pub struct ConduitEngine {
    sim: IpcSimulator,
    timing: TimingSettings,
    detectors: DetectorConfig,
    segment_size: usize,
    throughput_window_s: f64,
}

impl ConduitEngine {
    pub fn new(config: &ConduitConfig) -> Result<Self, EngineError> {
        let sim = IpcSimulator::new(SimOptions {
            segment_dir: config.segment_dir.clone(),
            trace_capacity: config.trace_capacity,
            stop_grace: config.timing.stop_grace(),
        })?;
        let d = &config.detectors;
        Ok(Self {
            sim,
            timing: config.timing.clone(),
            detectors: DetectorConfig {
                backlog_threshold: d.backlog_threshold,
                latency_threshold_ms: d.latency_threshold_ms,
                deadlock_window_s: d.deadlock_window_s,
                backlog_window_s: d.backlog_window_s,
            },
            segment_size: config.segment_size,
            throughput_window_s: d.throughput_window_s,
        })
    }

    /// Starts `count` units of traffic of the given kind and returns the ids
    /// of every process started.
    ///
    /// Pipes get one sender/receiver pair per pipe, queues share one queue
    /// among `count` pairs, and shared memory gets one writer with
    /// `max(1, count - 1)` readers on a fresh segment.
    pub fn start_simulation(
        &self,
        kind: IpcKind,
        count: usize,
        rate: Duration,
        processing_delay: Duration,
    ) -> Result<Vec<ProcessId>, EngineError> {
        let started = match kind {
            IpcKind::Pipe => self.start_pipes(count, rate, processing_delay)?,
            IpcKind::Queue => self.start_queue(count, rate, processing_delay)?,
            IpcKind::SharedMemory => self.start_shared_memory(count)?,
        };
        info!(%kind, count, processes = started.len(), "simulation started");
        Ok(started)
    }

    fn start_pipes(&self, count: usize, rate: Duration, processing_delay: Duration) -> Result<Vec<ProcessId>, SimError> {
        let mut started = Vec::with_capacity(count * 2);
        for i in 0..count {
            let n = self.sim.allocate_group();
            let (tx, rx) = self.sim.create_pipe();
            let sender = WorkerSpec::pipe_sender(tx, rate).with_prefix(format!("p{i}"));
            let receiver = WorkerSpec::PipeReceiver {
                endpoint: rx,
                poll: self.timing.pipe_poll(),
                processing_delay,
            };
            started.push(self.sim.start_process(format!("pipe_sender_{n}"), sender)?);
            started.push(self.sim.start_process(format!("pipe_receiver_{n}"), receiver)?);
        }
        Ok(started)
    }

    fn start_queue(&self, count: usize, rate: Duration, processing_delay: Duration) -> Result<Vec<ProcessId>, SimError> {
        let queue = self.sim.create_queue();
        let mut started = Vec::with_capacity(count * 2);
        for i in 0..count {
            let n = self.sim.allocate_group();
            let sender = WorkerSpec::queue_sender(queue.clone(), rate).with_prefix(format!("q{i}"));
            let receiver = WorkerSpec::QueueReceiver {
                queue: queue.clone(),
                get_timeout: self.timing.queue_get_timeout(),
                processing_delay,
            };
            started.push(self.sim.start_process(format!("queue_sender_{n}"), sender)?);
            started.push(self.sim.start_process(format!("queue_receiver_{n}"), receiver)?);
        }
        Ok(started)
    }

    fn start_shared_memory(&self, count: usize) -> Result<Vec<ProcessId>, SimError> {
        let (name, _handle) = self.sim.create_shared_segment(self.segment_size)?;
        let n = self.sim.allocate_group();
        let readers = count.saturating_sub(1).max(1);
        let mut started = Vec::with_capacity(readers + 1);

        let writer = WorkerSpec::segment_writer(&name, self.timing.shm_writer_interval()).with_payload(SHM_PAYLOAD);
        started.push(self.sim.start_process(format!("shm_writer_{n}"), writer)?);
        for i in 0..readers {
            let reader = WorkerSpec::segment_reader(&name, self.timing.shm_reader_interval());
            started.push(self.sim.start_process(format!("shm_reader_{n}_{i}"), reader)?);
        }
        Ok(started)
    }

    pub fn stop_process(&self, id: &str) -> Result<StopOutcome, EngineError> {
        Ok(self.sim.stop_process(id)?)
    }

    pub fn list_active_processes(&self) -> Vec<ProcessInfo> {
        self.sim.list_active_processes()
    }

    pub fn trace_snapshot(&self) -> Vec<TraceEvent> {
        self.sim.trace_snapshot()
    }

    /// Backlog, latency and deadlock alerts for the current trace.
    ///
    /// Stopped processes stay registered, so a simulation whose workers
    /// have all gone quiet is still reported as a possible deadlock.
    pub fn run_detectors(&self) -> Vec<Alert> {
        let events = self.sim.trace_snapshot();
        let registered = self.sim.process_count();
        run_all_detectors(&events, registered, &self.detectors, now_secs())
    }

    /// Messages per second over the configured trailing window.
    pub fn throughput(&self) -> f64 {
        conduit_analyzer::throughput(&self.sim.trace_snapshot(), now_secs(), self.throughput_window_s)
    }

    pub fn export_trace_snapshot(&self) -> Result<String, EngineError> {
        Ok(export_json_string(&self.sim.trace_snapshot())?)
    }

    pub fn export_trace_to(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        export_to_path(&self.sim.trace_snapshot(), path)?;
        Ok(())
    }

    pub fn simulator(&self) -> &IpcSimulator {
        &self.sim
    }

    pub fn shutdown(&self) -> Result<(), EngineError> {
        Ok(self.sim.shutdown()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_sim::{Role, WorkerState};
    use conduit_trace::{EventKind, import_json_str};
    use std::thread;

    fn engine() -> (tempfile::TempDir, ConduitEngine) {
        engine_with(ConduitConfig::default())
    }

    fn engine_with(config: ConduitConfig) -> (tempfile::TempDir, ConduitEngine) {
        let dir = tempfile::tempdir().unwrap();
        let config = ConduitConfig {
            segment_dir: dir.path().join("shm"),
            ..config
        };
        let engine = ConduitEngine::new(&config).unwrap();
        (dir, engine)
    }

    fn ids(started: &[ProcessId]) -> Vec<&str> {
        started.iter().map(ProcessId::as_str).collect()
    }

    #[test]
    fn queue_recipe_starts_paired_workers_on_one_queue() {
        let (_dir, engine) = engine();
        let started = engine
            .start_simulation(IpcKind::Queue, 2, Duration::from_millis(20), Duration::ZERO)
            .unwrap();
        assert_eq!(
            ids(&started),
            ["queue_sender_1", "queue_receiver_1", "queue_sender_2", "queue_receiver_2"]
        );
        thread::sleep(Duration::from_millis(60));
        engine.shutdown().unwrap();

        let payloads: Vec<String> = engine
            .trace_snapshot()
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::QueuePut { payload, .. } => Some(payload),
                _ => None,
            })
            .collect();
        assert!(payloads.iter().any(|p| p.starts_with("q0-")));
        assert!(payloads.iter().any(|p| p.starts_with("q1-")));
    }

    #[test]
    fn pipe_recipe_numbers_each_pair() {
        let (_dir, engine) = engine();
        let started = engine
            .start_simulation(IpcKind::Pipe, 2, Duration::from_millis(20), Duration::ZERO)
            .unwrap();
        assert_eq!(
            ids(&started),
            ["pipe_sender_1", "pipe_receiver_1", "pipe_sender_2", "pipe_receiver_2"]
        );
        let roles: Vec<Role> = engine.list_active_processes().iter().map(|p| p.role).collect();
        assert_eq!(
            roles,
            [Role::PipeSender, Role::PipeReceiver, Role::PipeSender, Role::PipeReceiver]
        );
    }

    #[test]
    fn shared_memory_recipe_has_at_least_one_reader() {
        let (_dir, engine) = engine();
        let started = engine
            .start_simulation(IpcKind::SharedMemory, 1, Duration::ZERO, Duration::ZERO)
            .unwrap();
        assert_eq!(ids(&started), ["shm_writer_1", "shm_reader_1_0"]);

        let started = engine
            .start_simulation(IpcKind::SharedMemory, 3, Duration::ZERO, Duration::ZERO)
            .unwrap();
        assert_eq!(ids(&started), ["shm_writer_2", "shm_reader_2_0", "shm_reader_2_1"]);

        let segments: Vec<_> = engine
            .list_active_processes()
            .into_iter()
            .filter_map(|p| p.segment)
            .collect();
        assert_eq!(segments.len(), 5);
        assert_eq!(engine.simulator().segment_names().len(), 2);
    }

    #[test]
    fn stopping_through_the_engine_is_idempotent() {
        let (_dir, engine) = engine();
        engine
            .start_simulation(IpcKind::Queue, 1, Duration::from_millis(20), Duration::ZERO)
            .unwrap();
        assert!(matches!(
            engine.stop_process("queue_sender_1").unwrap(),
            StopOutcome::Exited(_)
        ));
        assert_eq!(engine.stop_process("queue_sender_1").unwrap(), StopOutcome::NotRunning);

        let info = engine.simulator().process("queue_sender_1").unwrap();
        assert_eq!(info.state, WorkerState::Stopped);
        assert_eq!(engine.list_active_processes().len(), 1);
    }

    #[test]
    fn idle_engine_raises_no_alerts() {
        let (_dir, engine) = engine();
        assert!(engine.run_detectors().is_empty());
        assert_eq!(engine.throughput(), 0.0);
    }

    #[test]
    fn silence_after_every_worker_stopped_is_a_possible_deadlock() {
        let mut config = ConduitConfig::default();
        config.detectors.deadlock_window_s = 0.2;
        let (_dir, engine) = engine_with(config);
        engine
            .start_simulation(IpcKind::Queue, 1, Duration::from_millis(20), Duration::ZERO)
            .unwrap();
        thread::sleep(Duration::from_millis(40));
        engine.stop_process("queue_sender_1").unwrap();
        engine.stop_process("queue_receiver_1").unwrap();
        assert!(engine.list_active_processes().is_empty());

        thread::sleep(Duration::from_millis(400));
        let deadlocks: Vec<_> = engine
            .run_detectors()
            .into_iter()
            .filter(|a| a.issue() == "possible_deadlock")
            .collect();
        assert_eq!(deadlocks.len(), 1);
    }

    #[test]
    fn simulation_cannot_start_after_shutdown() {
        let (dir, engine) = engine();
        engine.shutdown().unwrap();

        let err = engine
            .start_simulation(IpcKind::SharedMemory, 2, Duration::ZERO, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, EngineError::Sim(SimError::ShutDown)));
        let err = engine
            .start_simulation(IpcKind::Queue, 1, Duration::from_millis(5), Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, EngineError::Sim(SimError::ShutDown)));

        let shm_dir = dir.path().join("shm");
        drop(engine);
        assert_eq!(std::fs::read_dir(shm_dir).unwrap().count(), 0);
    }

    #[test]
    fn exported_snapshot_parses_back() {
        let (_dir, engine) = engine();
        engine
            .start_simulation(IpcKind::SharedMemory, 2, Duration::ZERO, Duration::ZERO)
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        engine.shutdown().unwrap();

        let text = engine.export_trace_snapshot().unwrap();
        assert_eq!(import_json_str(&text).unwrap(), engine.trace_snapshot());
    }

    #[test]
    fn export_to_file_writes_records() {
        let (dir, engine) = engine();
        engine
            .start_simulation(IpcKind::Queue, 1, Duration::from_millis(5), Duration::ZERO)
            .unwrap();
        thread::sleep(Duration::from_millis(20));
        engine.shutdown().unwrap();

        let path = dir.path().join("trace.json");
        engine.export_trace_to(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"type\": \"process_start\""));
    }
}
