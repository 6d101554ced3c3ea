use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
pub struct ConduitConfig {
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default = "defaults::segment_dir")]
    pub segment_dir: PathBuf,
    #[serde(default = "defaults::segment_size")]
    pub segment_size: usize,
    /// Retained trace events; unbounded when absent.
    #[serde(default)]
    pub trace_capacity: Option<usize>,
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default)]
    pub detectors: DetectorSettings,
    #[serde(default)]
    pub run: RunSettings,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TimingSettings {
    #[serde(default = "defaults::stop_grace_ms")]
    pub stop_grace_ms: u64,
    #[serde(default = "defaults::pipe_poll_ms")]
    pub pipe_poll_ms: u64,
    #[serde(default = "defaults::queue_get_timeout_ms")]
    pub queue_get_timeout_ms: u64,
    #[serde(default = "defaults::shm_writer_interval_ms")]
    pub shm_writer_interval_ms: u64,
    #[serde(default = "defaults::shm_reader_interval_ms")]
    pub shm_reader_interval_ms: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DetectorSettings {
    #[serde(default = "defaults::backlog_threshold")]
    pub backlog_threshold: i64,
    #[serde(default = "defaults::latency_threshold_ms")]
    pub latency_threshold_ms: f64,
    #[serde(default = "defaults::deadlock_window_s")]
    pub deadlock_window_s: f64,
    /// Restrict the backlog count to a trailing window; whole trace when absent.
    #[serde(default)]
    pub backlog_window_s: Option<f64>,
    #[serde(default = "defaults::throughput_window_s")]
    pub throughput_window_s: f64,
}

/// Parameters of the headless driver's simulation run.
#[derive(Deserialize, Debug, Clone)]
pub struct RunSettings {
    #[serde(default = "defaults::ipc_kind")]
    pub ipc_kind: IpcKind,
    #[serde(default = "defaults::process_count")]
    pub process_count: usize,
    #[serde(default = "defaults::rate_ms")]
    pub rate_ms: u64,
    #[serde(default)]
    pub processing_delay_ms: u64,
    #[serde(default = "defaults::duration_s")]
    pub duration_s: u64,
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IpcKind {
    Pipe,
    Queue,
    SharedMemory,
}

impl fmt::Display for IpcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IpcKind::Pipe => "pipe",
            IpcKind::Queue => "queue",
            IpcKind::SharedMemory => "shared_memory",
        })
    }
}

impl FromStr for IpcKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pipe" => Ok(IpcKind::Pipe),
            "queue" => Ok(IpcKind::Queue),
            "shared_memory" | "shm" => Ok(IpcKind::SharedMemory),
            other => Err(ConfigError::UnknownIpcKind(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("unknown ipc kind '{0}'")]
    UnknownIpcKind(String),
}

mod defaults {
    use super::IpcKind;
    use std::path::PathBuf;

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn segment_dir() -> PathBuf {
        std::env::temp_dir().join("conduit_shm")
    }

    pub fn segment_size() -> usize {
        256
    }

    pub fn stop_grace_ms() -> u64 {
        1_000
    }

    pub fn pipe_poll_ms() -> u64 {
        200
    }

    pub fn queue_get_timeout_ms() -> u64 {
        1_000
    }

    pub fn shm_writer_interval_ms() -> u64 {
        200
    }

    pub fn shm_reader_interval_ms() -> u64 {
        300
    }

    pub fn backlog_threshold() -> i64 {
        50
    }

    pub fn latency_threshold_ms() -> f64 {
        500.0
    }

    pub fn deadlock_window_s() -> f64 {
        5.0
    }

    pub fn throughput_window_s() -> f64 {
        5.0
    }

    pub fn ipc_kind() -> IpcKind {
        IpcKind::Queue
    }

    pub fn process_count() -> usize {
        2
    }

    pub fn rate_ms() -> u64 {
        200
    }

    pub fn duration_s() -> u64 {
        10
    }

    pub fn poll_interval_ms() -> u64 {
        800
    }
}

impl ConduitConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let toml_to_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&toml_to_str)
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }
}

impl Default for ConduitConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level(),
            segment_dir: defaults::segment_dir(),
            segment_size: defaults::segment_size(),
            trace_capacity: None,
            timing: TimingSettings::default(),
            detectors: DetectorSettings::default(),
            run: RunSettings::default(),
        }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            stop_grace_ms: defaults::stop_grace_ms(),
            pipe_poll_ms: defaults::pipe_poll_ms(),
            queue_get_timeout_ms: defaults::queue_get_timeout_ms(),
            shm_writer_interval_ms: defaults::shm_writer_interval_ms(),
            shm_reader_interval_ms: defaults::shm_reader_interval_ms(),
        }
    }
}

impl TimingSettings {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn pipe_poll(&self) -> Duration {
        Duration::from_millis(self.pipe_poll_ms)
    }

    pub fn queue_get_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_get_timeout_ms)
    }

    pub fn shm_writer_interval(&self) -> Duration {
        Duration::from_millis(self.shm_writer_interval_ms)
    }

    pub fn shm_reader_interval(&self) -> Duration {
        Duration::from_millis(self.shm_reader_interval_ms)
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backlog_threshold: defaults::backlog_threshold(),
            latency_threshold_ms: defaults::latency_threshold_ms(),
            deadlock_window_s: defaults::deadlock_window_s(),
            backlog_window_s: None,
            throughput_window_s: defaults::throughput_window_s(),
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            ipc_kind: defaults::ipc_kind(),
            process_count: defaults::process_count(),
            rate_ms: defaults::rate_ms(),
            processing_delay_ms: 0,
            duration_s: defaults::duration_s(),
            poll_interval_ms: defaults::poll_interval_ms(),
            export_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = ConduitConfig::parse("").unwrap();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.segment_size, 256);
        assert_eq!(cfg.trace_capacity, None);
        assert_eq!(cfg.timing.stop_grace(), Duration::from_secs(1));
        assert_eq!(cfg.timing.pipe_poll(), Duration::from_millis(200));
        assert_eq!(cfg.detectors.backlog_threshold, 50);
        assert_eq!(cfg.detectors.latency_threshold_ms, 500.0);
        assert_eq!(cfg.run.ipc_kind, IpcKind::Queue);
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = ConduitConfig::parse(
            r#"
            trace_capacity = 10000

            [timing]
            stop_grace_ms = 250

            [detectors]
            backlog_threshold = 5
            backlog_window_s = 30.0

            [run]
            ipc_kind = "shared_memory"
            process_count = 4
            "#,
        )
        .unwrap();
        assert_eq!(cfg.trace_capacity, Some(10_000));
        assert_eq!(cfg.timing.stop_grace_ms, 250);
        assert_eq!(cfg.timing.queue_get_timeout_ms, 1_000);
        assert_eq!(cfg.detectors.backlog_window_s, Some(30.0));
        assert_eq!(cfg.run.ipc_kind, IpcKind::SharedMemory);
        assert_eq!(cfg.run.process_count, 4);
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let err = ConduitConfig::parse("segment_size = \"big\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = ConduitConfig::load("/nonexistent/conduit.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn ipc_kind_parses_from_cli_names() {
        assert_eq!("pipe".parse::<IpcKind>().unwrap(), IpcKind::Pipe);
        assert_eq!("shm".parse::<IpcKind>().unwrap(), IpcKind::SharedMemory);
        assert!("socket".parse::<IpcKind>().is_err());
        assert_eq!(IpcKind::SharedMemory.to_string(), "shared_memory");
    }
}
