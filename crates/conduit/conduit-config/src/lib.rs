mod config;

pub use config::{ConduitConfig, ConfigError, DetectorSettings, IpcKind, RunSettings, TimingSettings};
