use std::{
    ffi::OsString,
    hint::black_box,
    io,
    path::PathBuf,
    process::{Child, Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// Subcomando oculto con el que el binario se relanza como worker.
pub const BURN_SUBCOMMAND: &str = "burn";

/// Nice más bajo en unix (19 = menor prioridad).
pub const LOWEST_NICE: i32 = 19;

const BURN_CHUNK: u32 = 1 << 16;
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Handle de un worker vivo, en manos exclusivas del pool.
pub trait WorkerHandle: Send {
    /// pid para procesos, secuencia para hilos
    fn id(&self) -> u32;

    fn is_alive(&mut self) -> bool;

    /// Pide la terminación. Idempotente y no bloquea.
    fn cancel(&mut self);

    /// Espera hasta `grace` a que termine. Devuelve `false` si hubo que
    /// forzarlo (o abandonarlo, en el caso de hilos).
    fn join(&mut self, grace: Duration) -> bool;
}

pub trait WorkerSpawner: Send {
    fn spawn(&mut self) -> io::Result<Box<dyn WorkerHandle>>;
}

/* ---------------- núcleo de cómputo ---------------- */

fn burn_chunk(mut n: u64) -> u64 {
    for _ in 0..BURN_CHUNK {
        n = black_box(n.wrapping_add(1));
    }
    n
}

/// Quema CPU hasta que `stop` pase a `true`.
pub fn burn_until(stop: &AtomicBool) {
    let mut n = 0u64;
    while !stop.load(Ordering::Relaxed) {
        n = burn_chunk(n);
    }
    black_box(n);
}

/// Punto de entrada del proceso worker: baja prioridad y quema para siempre.
/// Sólo termina por señal.
pub fn burn_forever() -> ! {
    if let Err(e) = lower_priority() {
        debug!("no se pudo bajar la prioridad del worker: {}", e);
    }

    let mut n = 0u64;
    loop {
        n = burn_chunk(n);
    }
}

/// Baja la prioridad de planificación al mínimo (nice 19).
///
/// En Linux el nice es por hilo, así que con `who = 0` sólo afecta al hilo
/// que llama; en otros unix afecta al proceso entero.
#[cfg(unix)]
pub fn lower_priority() -> io::Result<()> {
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, LOWEST_NICE) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn lower_priority() -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "setpriority no disponible en esta plataforma",
    ))
}

/* ---------------- workers en hilos ---------------- */

/// Worker en un hilo del propio proceso. Se cancela con un flag cooperativo.
pub struct ThreadWorker {
    id: u32,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadWorker {
    pub fn spawn(id: u32) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();

        let handle = thread::Builder::new()
            .name(format!("burn-{id}"))
            .spawn(move || {
                if let Err(e) = lower_priority() {
                    warn!("worker {} no pudo bajar su prioridad: {}", id, e);
                }
                burn_until(&flag);
            })?;

        Ok(Self {
            id,
            stop,
            handle: Some(handle),
        })
    }
}

impl WorkerHandle for ThreadWorker {
    fn id(&self) -> u32 {
        self.id
    }

    fn is_alive(&mut self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn cancel(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    fn join(&mut self, grace: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        let deadline = Instant::now() + grace;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(JOIN_POLL);
        }

        if !handle.is_finished() {
            // un hilo no se puede matar: lo soltamos y que termine cuando vea el flag
            warn!(
                "worker {} no terminó en {:?}, queda desacoplado",
                self.id, grace
            );
            return false;
        }

        if handle.join().is_err() {
            warn!("worker {} terminó con panic", self.id);
        }
        true
    }
}

#[derive(Debug, Default)]
pub struct ThreadSpawner {
    next_id: u32,
}

impl ThreadSpawner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkerSpawner for ThreadSpawner {
    fn spawn(&mut self) -> io::Result<Box<dyn WorkerHandle>> {
        self.next_id += 1;
        let worker = ThreadWorker::spawn(self.next_id)?;
        Ok(Box::new(worker))
    }
}

/* ---------------- workers en procesos ---------------- */

/// Worker en un proceso hijo. Se cancela con SIGTERM y, si no sale a
/// tiempo, SIGKILL.
pub struct ProcessWorker {
    child: Child,
    cancelled: bool,
}

impl ProcessWorker {
    pub fn new(child: Child) -> Self {
        Self {
            child,
            cancelled: false,
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.kill()
}

impl WorkerHandle for ProcessWorker {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;

        // ya reapeado: el pid podría estar reutilizado, no mandar nada
        if !self.is_alive() {
            return;
        }
        if let Err(e) = terminate(&mut self.child) {
            debug!("no se pudo terminar el worker {}: {}", self.child.id(), e);
        }
    }

    fn join(&mut self, grace: Duration) -> bool {
        let pid = self.child.id();
        let deadline = Instant::now() + grace;

        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!("worker {} terminó ({})", pid, status);
                    return true;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(JOIN_POLL),
                Ok(None) => break,
                Err(e) => {
                    warn!("error esperando al worker {}: {}", pid, e);
                    break;
                }
            }
        }

        warn!("worker {} sigue vivo tras {:?}, forzando kill", pid, grace);
        if let Err(e) = self.child.kill() {
            warn!("kill del worker {} falló: {}", pid, e);
        }
        if let Err(e) = self.child.wait() {
            warn!("no se pudo recoger al worker {} tras el kill: {}", pid, e);
        }
        false
    }
}

/// Lanza workers como procesos hijos: `exe args...`, sin stdio.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    exe: PathBuf,
    args: Vec<OsString>,
}

impl ProcessSpawner {
    pub fn new<I, S>(exe: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            exe: exe.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// El propio binario relanzado con el subcomando `burn`.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, [BURN_SUBCOMMAND]))
    }
}

impl WorkerSpawner for ProcessSpawner {
    fn spawn(&mut self) -> io::Result<Box<dyn WorkerHandle>> {
        let mut cmd = Command::new(&self.exe);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        configure_child(&mut cmd);

        let child = cmd.spawn()?;
        debug!("worker lanzado con pid {}", child.id());
        Ok(Box::new(ProcessWorker::new(child)))
    }
}

#[cfg(target_os = "linux")]
fn configure_child(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    // si el supervisor muere sin apagar el pool, el kernel mata al worker
    unsafe {
        cmd.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(windows)]
fn configure_child(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    const IDLE_PRIORITY_CLASS: u32 = 0x0000_0040;
    cmd.creation_flags(IDLE_PRIORITY_CLASS);
}

#[cfg(not(any(target_os = "linux", windows)))]
fn configure_child(_cmd: &mut Command) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burn_until_retorna_cuando_el_flag_ya_esta_activo() {
        let stop = AtomicBool::new(true);
        burn_until(&stop);
    }

    #[test]
    fn thread_worker_corre_hasta_cancelarse() {
        let mut spawner = ThreadSpawner::new();
        let mut w = spawner.spawn().unwrap();

        assert_eq!(w.id(), 1);
        assert!(w.is_alive());

        w.cancel();
        assert!(w.join(Duration::from_secs(2)));
        assert!(!w.is_alive());
    }

    #[test]
    fn thread_worker_cancel_y_join_son_idempotentes() {
        let mut w = ThreadWorker::spawn(7).unwrap();
        w.cancel();
        w.cancel();
        assert!(w.join(Duration::from_secs(2)));
        assert!(w.join(Duration::from_secs(2)));
    }

    #[test]
    fn thread_spawner_numera_los_workers() {
        let mut spawner = ThreadSpawner::new();
        let mut a = spawner.spawn().unwrap();
        let mut b = spawner.spawn().unwrap();
        assert_eq!((a.id(), b.id()), (1, 2));

        for w in [&mut a, &mut b] {
            w.cancel();
            assert!(w.join(Duration::from_secs(2)));
        }
    }

    #[cfg(unix)]
    #[test]
    fn lower_priority_siempre_se_puede_bajar() {
        // en un hilo aparte para no tocar el nice del hilo de tests
        let res = thread::spawn(lower_priority).join().unwrap();
        assert!(res.is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn process_worker_termina_con_sigterm() {
        let mut spawner = ProcessSpawner::new("sleep", ["30"]);
        let mut w = spawner.spawn().unwrap();
        assert!(w.is_alive());

        w.cancel();
        assert!(w.join(Duration::from_secs(2)));
        assert!(!w.is_alive());

        // cancelar de nuevo no debe mandar señales a un pid ya reapeado
        w.cancel();
    }

    #[cfg(unix)]
    #[test]
    fn process_worker_que_ignora_sigterm_se_mata_y_se_recoge() {
        let mut spawner = ProcessSpawner::new("sh", ["-c", "trap '' TERM; sleep 30"]);
        let mut w = spawner.spawn().unwrap();
        // darle tiempo a instalar el trap antes del SIGTERM
        thread::sleep(Duration::from_millis(200));

        w.cancel();
        assert!(!w.join(Duration::from_millis(200)));
        assert!(!w.is_alive());
    }

    #[cfg(unix)]
    #[test]
    fn process_worker_que_ya_salio_no_esta_vivo() {
        let mut spawner = ProcessSpawner::new("true", std::iter::empty::<&str>());
        let mut w = spawner.spawn().unwrap();
        assert!(w.join(Duration::from_secs(2)));
        assert!(!w.is_alive());
    }

    #[test]
    fn process_spawner_falla_con_binario_inexistente() {
        let mut spawner =
            ProcessSpawner::new("/no/existe/room-heater", [BURN_SUBCOMMAND]);
        assert!(spawner.spawn().is_err());
    }
}
