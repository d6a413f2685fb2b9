use anyhow::{Context, Result};
use common::{HeaterConfig, Sampler, WorkerPool, WorkerSpawner};
use std::io;
use tokio::{sync::mpsc, time::sleep};
use tracing::{debug, info, warn};

use crate::reporter::Reporter;

/// Cada `()` es un Ctrl+C.
pub type Interrupts = mpsc::Receiver<()>;

/// Instala el handler de Ctrl+C en el momento (no en el primer poll), así
/// una interrupción durante el arranque también termina en apagado ordenado.
/// Tiene que llamarse dentro del runtime.
#[cfg(unix)]
pub fn listen_interrupts() -> io::Result<Interrupts> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        while sigint.recv().await.is_some() {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

#[cfg(windows)]
pub fn listen_interrupts() -> io::Result<Interrupts> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c()?;
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        while ctrl_c.recv().await.is_some() {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

/// Loop principal del calefactor:
/// - muestrea CPU/memoria/temperatura durante `tick_interval`
/// - ajusta el pool en ±1
/// - redibuja el estado
/// - duerme y repite, hasta la primera interrupción
pub async fn run<S: Sampler>(
    config: HeaterConfig,
    spawner: Box<dyn WorkerSpawner>,
    mut sampler: S,
    mut reporter: Reporter,
    interrupts: &mut Interrupts,
) -> Result<()> {
    reporter.banner("Iniciando workers...");
    let mut pool = WorkerPool::new(config, spawner);
    pool.start();

    // la señal se mira entre ticks; si llega a mitad de uno, el tick se descarta
    loop {
        tokio::select! {
            _ = interrupts.recv() => break,
            _ = tick(&mut sampler, &mut pool, &mut reporter) => {}
        }
    }

    info!("Ctrl+C recibido, apagando...");
    reporter.banner("\n\nApagando...");

    shutdown(pool, interrupts).await?;
    reporter.banner("Calefactor apagado.");
    Ok(())
}

async fn tick<S: Sampler>(sampler: &mut S, pool: &mut WorkerPool, reporter: &mut Reporter) {
    let interval = pool.config().tick_interval;

    let sample = sampler.sample(interval, pool.len()).await;
    let adjustment = pool.adjust(&sample);
    debug!("tick: {:?} -> {} workers", adjustment, pool.len());

    if let Err(e) = reporter.render(&sample) {
        warn!("no se pudo mostrar el estado: {:?}", e);
    }

    sleep(interval).await;
}

/// Apaga el pool fuera del runtime (espera bloqueante por cada worker).
/// Otro Ctrl+C durante el apagado sólo se registra.
async fn shutdown(mut pool: WorkerPool, interrupts: &mut Interrupts) -> Result<()> {
    let mut handle = tokio::task::spawn_blocking(move || pool.shutdown());

    loop {
        tokio::select! {
            res = &mut handle => {
                res.context("el apagado del pool terminó con panic")?;
                return Ok(());
            }
            Some(()) = interrupts.recv() => {
                warn!("apagado ya en curso, esperando a los workers...");
            }
        }
    }
}
