use anyhow::Result;
use common::Sample;
use std::io::{self, Write};

use crate::cli::OutputFormat;

/// Limpia la terminal y lleva el cursor arriba a la izquierda.
const CLEAR_SCREEN: &str = "\x1B[2J\x1B[1;1H";
const RULE: &str = "==========";

pub struct Reporter {
    format: OutputFormat,
    max_workers: usize,
    out: Box<dyn Write + Send>,
}

impl Reporter {
    pub fn new(format: OutputFormat, max_workers: usize) -> Self {
        Self::with_writer(format, max_workers, Box::new(io::stdout()))
    }

    pub fn with_writer(
        format: OutputFormat,
        max_workers: usize,
        out: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            format,
            max_workers,
            out,
        }
    }

    /// Mensajes sueltos de arranque/cierre; en modo JSON la salida queda
    /// reservada para las muestras.
    pub fn banner(&mut self, msg: &str) {
        if self.format == OutputFormat::Text {
            let _ = writeln!(self.out, "{msg}").and_then(|_| self.out.flush());
        }
    }

    /// Cada render sale en una sola escritura.
    pub fn render(&mut self, sample: &Sample) -> Result<()> {
        let text = match self.format {
            OutputFormat::Text => format!("{CLEAR_SCREEN}{}", render_text(sample, self.max_workers)),
            OutputFormat::Json => format!("{}\n", serde_json::to_string(sample)?),
        };
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

pub fn render_text(sample: &Sample, max_workers: usize) -> String {
    let temp = match sample.cpu_temp_celsius {
        Some(c) => format!("{c:.1}°C"),
        None => "no disponible".to_string(),
    };

    let lines = [
        RULE.to_string(),
        "CALEFACTOR".to_string(),
        RULE.to_string(),
        format!("Uso de CPU: {:.1}%", sample.cpu_percent),
        format!("Temperatura de CPU: {temp}"),
        format!("Uso de memoria: {:.1}%", sample.memory_percent),
        format!("Workers activos: {}/{}", sample.worker_count, max_workers),
        "-".repeat(RULE.len()),
        "Si hay otros programas trabajando, los workers les ceden la CPU.".to_string(),
        "Para salir, presiona Ctrl+C".to_string(),
        RULE.to_string(),
    ];

    let mut text = lines.join("\n");
    text.push('\n');
    text
}
