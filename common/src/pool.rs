use tracing::{debug, info, warn};

use crate::burn::{WorkerHandle, WorkerSpawner};
use crate::config::HeaterConfig;
use crate::sample::Sample;

/// Decisión tomada en un tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Added,
    Removed,
    Unchanged,
    /// Tocaba agregar pero el spawn falló; se reintenta en el próximo tick
    SpawnFailed,
    /// El pool ya fue apagado
    Halted,
}

/// Controlador del pool de workers.
///
/// Es el único dueño de los handles: sólo el hilo de control lo muta, así
/// que no hace falta ningún lock. Los workers se tratan como una pila: el
/// último en entrar es el primero en salir.
///
/// Cada tick mueve el tamaño del pool como mucho en ±1, aunque la CPU esté
/// muy lejos de los umbrales. Converge lento pero no oscila.
pub struct WorkerPool {
    config: HeaterConfig,
    spawner: Box<dyn WorkerSpawner>,
    workers: Vec<Box<dyn WorkerHandle>>,
    shut_down: bool,
}

impl WorkerPool {
    pub fn new(config: HeaterConfig, spawner: Box<dyn WorkerSpawner>) -> Self {
        Self {
            config,
            spawner,
            workers: Vec::new(),
            shut_down: false,
        }
    }

    pub fn config(&self) -> &HeaterConfig {
        &self.config
    }

    /// Cantidad de handles en el pool (vivos al último reap).
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Consulta a cada worker si sigue corriendo.
    pub fn live_workers(&mut self) -> usize {
        self.workers
            .iter_mut()
            .map(|w| w.is_alive())
            .filter(|alive| *alive)
            .count()
    }

    /// ids en orden de llegada (el último es el próximo en salir)
    pub fn worker_ids(&self) -> Vec<u32> {
        self.workers.iter().map(|w| w.id()).collect()
    }

    /// Lanza la tanda inicial de workers. Devuelve cuántos arrancaron.
    pub fn start(&mut self) -> usize {
        if self.shut_down {
            return 0;
        }

        let target = self.config.initial_workers();
        while self.workers.len() < target {
            if !self.spawn_one() {
                break;
            }
        }

        info!(
            "pool iniciado con {}/{} workers (objetivo {})",
            self.workers.len(),
            self.config.max_workers,
            target
        );
        self.workers.len()
    }

    /// Aplica la ley de control a una muestra.
    pub fn adjust(&mut self, sample: &Sample) -> Adjustment {
        if self.shut_down {
            return Adjustment::Halted;
        }

        self.reap();
        let current = self.workers.len();
        let cpu = sample.cpu_percent;

        if cpu < self.config.idle_threshold && current < self.config.max_workers {
            if self.spawn_one() {
                info!(
                    "CPU {:.1}% < {:.0}%: agregando worker ({}/{})",
                    cpu,
                    self.config.idle_threshold,
                    self.workers.len(),
                    self.config.max_workers
                );
                Adjustment::Added
            } else {
                Adjustment::SpawnFailed
            }
        } else if cpu > self.config.busy_threshold && current > self.config.min_workers {
            self.remove_last();
            info!(
                "CPU {:.1}% > {:.0}%: cediendo un worker ({}/{})",
                cpu,
                self.config.busy_threshold,
                self.workers.len(),
                self.config.max_workers
            );
            Adjustment::Removed
        } else {
            Adjustment::Unchanged
        }
    }

    /// Saca del pool los workers que terminaron solos. Devuelve cuántos.
    pub fn reap(&mut self) -> usize {
        let before = self.workers.len();
        self.workers.retain_mut(|w| {
            if w.is_alive() {
                return true;
            }
            warn!("worker {} terminó por su cuenta, sacándolo del pool", w.id());
            // ya salió: el join sólo recoge el estado
            w.join(std::time::Duration::ZERO);
            false
        });
        before - self.workers.len()
    }

    /// Cancela todos los workers y espera a cada uno hasta `shutdown_grace`.
    /// Llamarlo más de una vez no hace nada.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        info!("apagando {} workers...", self.workers.len());

        // primero avisar a todos, después esperar: así la espera se solapa
        for w in self.workers.iter_mut() {
            w.cancel();
        }

        let grace = self.config.shutdown_grace;
        let mut forced = 0;
        while let Some(mut w) = self.workers.pop() {
            if !w.join(grace) {
                forced += 1;
            }
        }

        if forced > 0 {
            warn!("{} workers no terminaron a tiempo y fueron forzados", forced);
        }
        info!("pool apagado");
    }

    fn spawn_one(&mut self) -> bool {
        match self.spawner.spawn() {
            Ok(w) => {
                debug!("worker {} agregado", w.id());
                self.workers.push(w);
                true
            }
            Err(e) => {
                warn!("no se pudo lanzar un worker: {}", e);
                false
            }
        }
    }

    fn remove_last(&mut self) {
        if let Some(mut w) = self.workers.pop() {
            w.cancel();
            if !w.join(self.config.shutdown_grace) {
                warn!("worker {} tuvo que ser forzado", w.id());
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
