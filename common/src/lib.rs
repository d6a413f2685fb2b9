pub mod burn;
pub mod config;
pub mod monitor;
pub mod pool;
pub mod sample;
pub mod temperature;

/* --------- re-exports para el binario --------- */

pub use burn::{
    burn_forever, lower_priority, ProcessSpawner, ThreadSpawner, WorkerHandle, WorkerSpawner,
    BURN_SUBCOMMAND,
};
pub use config::{hardware_concurrency, HeaterConfig};
pub use monitor::{Sampler, SystemMonitor};
pub use pool::{Adjustment, WorkerPool};
pub use sample::Sample;
pub use temperature::TemperatureProbe;
