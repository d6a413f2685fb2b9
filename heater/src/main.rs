mod cli;
mod reporter;
mod supervisor;

use anyhow::{Context, Result};
use clap::Parser;
use common::{HeaterConfig, ProcessSpawner, SystemMonitor, ThreadSpawner, WorkerSpawner};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, WorkerMode};
use crate::reporter::Reporter;

/// El crate del binario es `room_heater` (por el nombre del `[[bin]]`).
const DEFAULT_LOG_FILTER: &str = "room_heater=info,common=info";

fn main() -> Result<()> {
    let cli = Cli::parse();

    // proceso hijo: nada de logs ni runtime, sólo quemar
    if let Some(Commands::Burn) = cli.command {
        common::burn_forever();
    }

    // logs a stderr: stdout es de la pantalla de estado / las líneas JSON
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    // defaults < env vars < flags
    let config = cli.run.apply(HeaterConfig::from_env());
    config.validate().context("configuración inválida")?;

    let spawner: Box<dyn WorkerSpawner> = match cli.run.mode {
        WorkerMode::Process => Box::new(
            ProcessSpawner::current_exe().context("no se pudo ubicar el binario actual")?,
        ),
        WorkerMode::Thread => Box::new(ThreadSpawner::new()),
    };

    let mut reporter = Reporter::new(cli.run.output, config.max_workers);
    reporter.banner("Iniciando calefactor...");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("no se pudo crear el runtime de tokio")?;
    runtime.block_on(async move {
        // el handler va antes que cualquier worker: un Ctrl+C en el arranque
        // también termina en apagado ordenado
        let mut interrupts =
            supervisor::listen_interrupts().context("no se pudo instalar el handler de Ctrl+C")?;
        let monitor = SystemMonitor::new().context("no hay métricas de sistema disponibles")?;

        supervisor::run(config, spawner, monitor, reporter, &mut interrupts).await
    })
}
