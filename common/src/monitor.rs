use anyhow::{bail, Result};
use std::{future::Future, time::Duration};
use sysinfo::{CpuExt, CpuRefreshKind, RefreshKind, System, SystemExt};
use tracing::debug;

use crate::sample::Sample;
use crate::temperature::{default_probes, first_reading, TemperatureProbe};

/// Fuente de muestras del lazo de control.
pub trait Sampler: Send {
    /// Mide durante `interval` y devuelve la foto.
    fn sample(
        &mut self,
        interval: Duration,
        worker_count: usize,
    ) -> impl Future<Output = Sample> + Send;
}

/// Sensor de sólo lectura: CPU promedio en una ventana, memoria y
/// temperatura (si hay algún sensor accesible).
pub struct SystemMonitor {
    sys: System,
    probes: Vec<Box<dyn TemperatureProbe>>,
}

impl SystemMonitor {
    /// Falla si la plataforma no expone métricas de CPU; es el único
    /// error de arranque fatal.
    pub fn new() -> Result<Self> {
        Self::with_probes(default_probes())
    }

    pub fn with_probes(probes: Vec<Box<dyn TemperatureProbe>>) -> Result<Self> {
        if !System::IS_SUPPORTED {
            bail!("sysinfo no soporta esta plataforma: no hay métricas de CPU");
        }

        let mut sys = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::new().with_cpu_usage())
                .with_memory(),
        );
        sys.refresh_cpu();

        if sys.cpus().is_empty() {
            bail!("el sistema no reporta ninguna CPU");
        }

        Ok(Self { sys, probes })
    }

    /// CPUs lógicas según sysinfo.
    pub fn logical_cpus(&self) -> usize {
        self.sys.cpus().len()
    }
}

impl Sampler for SystemMonitor {
    /// El % de CPU es el promedio de todo el host entre dos refrescos
    /// separados por la ventana, no una lectura instantánea.
    async fn sample(&mut self, interval: Duration, worker_count: usize) -> Sample {
        let window = interval.max(System::MINIMUM_CPU_UPDATE_INTERVAL);

        self.sys.refresh_cpu();
        tokio::time::sleep(window).await;
        self.sys.refresh_cpu();
        let cpu_percent = self.sys.global_cpu_info().cpu_usage();

        self.sys.refresh_memory();
        let memory_percent =
            memory_percent(self.sys.total_memory(), self.sys.available_memory());

        let cpu_temp_celsius = first_reading(&mut self.probes);

        debug!(
            "muestra: cpu={:.1}% mem={:.1}% temp={:?} workers={}",
            cpu_percent, memory_percent, cpu_temp_celsius, worker_count
        );

        Sample::new(cpu_percent, cpu_temp_celsius, memory_percent, worker_count)
    }
}

/// % de memoria en uso: (total - disponible) / total.
pub fn memory_percent(total: u64, available: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    let used = total.saturating_sub(available);
    (used as f64 / total as f64 * 100.0) as f32
}
