use anyhow::{bail, Result};
use std::{env, time::Duration};

pub const DEFAULT_IDLE_THRESHOLD: f32 = 30.0;
pub const DEFAULT_BUSY_THRESHOLD: f32 = 90.0;
pub const DEFAULT_TICK_SECS: u64 = 2;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

pub const ENV_IDLE_THRESHOLD: &str = "HEATER_IDLE_THRESHOLD";
pub const ENV_BUSY_THRESHOLD: &str = "HEATER_BUSY_THRESHOLD";
pub const ENV_TICK_SECS: &str = "HEATER_TICK_SECS";
pub const ENV_MAX_WORKERS: &str = "HEATER_MAX_WORKERS";

/// Cantidad de CPUs lógicas del host (cota superior del pool).
pub fn hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Parámetros del lazo de control.
///
/// Los valores por defecto son los del calefactor original: se agrega un
/// worker con CPU < 30%, se quita uno con CPU > 90%, tick de 2s.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaterConfig {
    /// Por debajo de este % de CPU se agrega un worker
    pub idle_threshold: f32,
    /// Por encima de este % de CPU se quita un worker
    pub busy_threshold: f32,
    /// Duración de la ventana de muestreo y también de la pausa entre ticks
    pub tick_interval: Duration,
    pub min_workers: usize,
    pub max_workers: usize,
    /// Espera máxima por worker al terminarlo
    pub shutdown_grace: Duration,
}

impl Default for HeaterConfig {
    fn default() -> Self {
        Self::with_max_workers(hardware_concurrency())
    }
}

impl HeaterConfig {
    pub fn with_max_workers(max_workers: usize) -> Self {
        Self {
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            busy_threshold: DEFAULT_BUSY_THRESHOLD,
            tick_interval: Duration::from_secs(DEFAULT_TICK_SECS),
            min_workers: 0,
            max_workers,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Defaults + overrides desde variables de entorno.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables inyectable.
    /// Un valor que no parsea se ignora y queda el default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup(ENV_IDLE_THRESHOLD).and_then(|s| s.trim().parse::<f32>().ok()) {
            cfg.idle_threshold = v;
        }
        if let Some(v) = lookup(ENV_BUSY_THRESHOLD).and_then(|s| s.trim().parse::<f32>().ok()) {
            cfg.busy_threshold = v;
        }
        if let Some(v) = lookup(ENV_TICK_SECS).and_then(|s| s.trim().parse::<u64>().ok()) {
            cfg.tick_interval = Duration::from_secs(v);
        }
        if let Some(v) = lookup(ENV_MAX_WORKERS).and_then(|s| s.trim().parse::<usize>().ok()) {
            cfg.max_workers = v;
        }

        cfg
    }

    /// Workers a lanzar antes del primer tick: la mitad de `max_workers`
    /// (redondeando hacia abajo), al menos uno, dentro de [min, max].
    pub fn initial_workers(&self) -> usize {
        (self.max_workers / 2)
            .max(1)
            .max(self.min_workers)
            .min(self.max_workers)
    }

    /// Valida contra las CPUs lógicas del host.
    pub fn validate(&self) -> Result<()> {
        self.validate_for(hardware_concurrency())
    }

    /// `max_workers` nunca puede superar `cpus`: el pool no pasa de un
    /// worker por CPU lógica.
    pub fn validate_for(&self, cpus: usize) -> Result<()> {
        let in_range = |v: f32| v.is_finite() && (0.0..=100.0).contains(&v);

        if !in_range(self.idle_threshold) || !in_range(self.busy_threshold) {
            bail!(
                "umbrales fuera de rango [0,100]: idle={} busy={}",
                self.idle_threshold,
                self.busy_threshold
            );
        }
        if self.idle_threshold >= self.busy_threshold {
            bail!(
                "idle_threshold ({}) debe ser menor que busy_threshold ({})",
                self.idle_threshold,
                self.busy_threshold
            );
        }
        if self.max_workers == 0 {
            bail!("max_workers debe ser al menos 1");
        }
        if self.max_workers > cpus {
            bail!(
                "max_workers ({}) no puede superar las CPUs lógicas ({})",
                self.max_workers,
                cpus
            );
        }
        if self.min_workers > self.max_workers {
            bail!(
                "min_workers ({}) no puede superar max_workers ({})",
                self.min_workers,
                self.max_workers
            );
        }
        if self.tick_interval.is_zero() {
            bail!("tick_interval no puede ser 0");
        }
        Ok(())
    }
}
