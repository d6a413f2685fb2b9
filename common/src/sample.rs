use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Foto del sistema tomada en un tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Uso promedio de CPU del host durante la ventana de muestreo [0,100]
    pub cpu_percent: f32,
    /// `None` si ningún sensor respondió
    pub cpu_temp_celsius: Option<f32>,
    /// Uso de memoria instantáneo [0,100]
    pub memory_percent: f32,
    /// Workers vivos al momento de muestrear
    pub worker_count: usize,
    pub taken_at: DateTime<Utc>,
}

impl Sample {
    pub fn new(
        cpu_percent: f32,
        cpu_temp_celsius: Option<f32>,
        memory_percent: f32,
        worker_count: usize,
    ) -> Self {
        Self {
            cpu_percent: clamp_percent(cpu_percent),
            cpu_temp_celsius,
            memory_percent: clamp_percent(memory_percent),
            worker_count,
            taken_at: Utc::now(),
        }
    }
}

/// Lleva un porcentaje a [0,100]; NaN cuenta como 0.
pub fn clamp_percent(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 100.0)
    }
}
