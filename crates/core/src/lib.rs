pub mod config;
pub mod ddns;
pub mod decoder;
pub mod metrics;
pub mod observation;
pub mod process;
pub mod satellite;
pub mod store;
pub mod task;
pub mod testing;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use ddns::{DdnsClient, DdnsResponse, NoIpClient, NoIpTask};
pub use decoder::{CommandDsp, DecodeResult, DecoderRegistry, SamplePipelineAdapter};
pub use observation::{Observation, ObservationContext, ObservationPlanner, ObservationState};
pub use process::{ProcessPipe, StopHandle};
pub use satellite::{DecoderMode, SatelliteDescriptor};
pub use store::{ResultStore, SqliteResultStore};
pub use task::{PeriodicWork, ResilientTask, Scheduler, SqliteStateStore, StateStore};
