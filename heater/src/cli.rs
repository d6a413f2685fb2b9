use clap::{Args, Parser, Subcommand, ValueEnum};
use common::{HeaterConfig, BURN_SUBCOMMAND};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "room-heater")]
#[command(about = "Calefactor: usa la CPU ociosa como estufa y le cede el lugar a cualquier otra carga")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Proceso worker: quema CPU con prioridad mínima hasta recibir una señal
    #[command(name = BURN_SUBCOMMAND, hide = true)]
    Burn,
}

/// Flags opcionales; sin ninguno se usan los defaults (o las env vars).
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// % de CPU por debajo del cual se agrega un worker
    #[arg(long, value_name = "PCT")]
    pub idle_threshold: Option<f32>,

    /// % de CPU por encima del cual se quita un worker
    #[arg(long, value_name = "PCT")]
    pub busy_threshold: Option<f32>,

    /// Segundos de muestreo y de pausa entre ticks
    #[arg(long, value_name = "SEGUNDOS")]
    pub tick_secs: Option<u64>,

    /// Tope de workers (por defecto y como máximo, la cantidad de CPUs lógicas)
    #[arg(long, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Cómo correr los workers
    #[arg(long, value_enum, default_value_t = WorkerMode::Process)]
    pub mode: WorkerMode,

    /// Formato de la salida por tick
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Un proceso hijo por worker (se terminan con señales)
    Process,
    /// Un hilo por worker (se terminan con un flag)
    Thread,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pantalla de estado que se redibuja en cada tick
    Text,
    /// Una muestra JSON por línea
    Json,
}

impl RunArgs {
    /// Pisa la config con los flags que vinieron.
    pub fn apply(&self, mut cfg: HeaterConfig) -> HeaterConfig {
        if let Some(v) = self.idle_threshold {
            cfg.idle_threshold = v;
        }
        if let Some(v) = self.busy_threshold {
            cfg.busy_threshold = v;
        }
        if let Some(v) = self.tick_secs {
            cfg.tick_interval = Duration::from_secs(v);
        }
        if let Some(v) = self.max_workers {
            cfg.max_workers = v;
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sin_flags_usa_defaults() {
        let cli = Cli::try_parse_from(["room-heater"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.run.mode, WorkerMode::Process);
        assert_eq!(cli.run.output, OutputFormat::Text);

        let base = HeaterConfig::with_max_workers(6);
        assert_eq!(cli.run.apply(base.clone()), base);
    }

    #[test]
    fn flags_pisan_la_config() {
        let cli = Cli::try_parse_from([
            "room-heater",
            "--idle-threshold",
            "25",
            "--busy-threshold",
            "80",
            "--tick-secs",
            "3",
            "--max-workers",
            "2",
            "--mode",
            "thread",
            "--output",
            "json",
        ])
        .unwrap();

        let cfg = cli.run.apply(HeaterConfig::with_max_workers(16));
        assert_eq!(cfg.idle_threshold, 25.0);
        assert_eq!(cfg.busy_threshold, 80.0);
        assert_eq!(cfg.tick_interval, Duration::from_secs(3));
        assert_eq!(cfg.max_workers, 2);
        assert_eq!(cli.run.mode, WorkerMode::Thread);
        assert_eq!(cli.run.output, OutputFormat::Json);
    }

    #[test]
    fn subcomando_burn_oculto() {
        let cli = Cli::try_parse_from(["room-heater", BURN_SUBCOMMAND]).unwrap();
        assert_eq!(cli.command, Some(Commands::Burn));
    }

    #[test]
    fn max_workers_por_encima_de_las_cpus_no_valida() {
        let too_many = (common::hardware_concurrency() + 1).to_string();
        let cli = Cli::try_parse_from(["room-heater", "--max-workers", too_many.as_str()]).unwrap();

        let cfg = cli.run.apply(HeaterConfig::default());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn modo_desconocido_es_error() {
        assert!(Cli::try_parse_from(["room-heater", "--mode", "gpu"]).is_err());
    }
}
