use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
};
use sysinfo::{ComponentExt, System, SystemExt};
use tracing::debug;

const SYS_THERMAL_DIR: &str = "/sys/class/thermal";

/// Etiquetas que delatan un sensor de CPU (en minúsculas).
const CPU_HINTS: &[&str] = &[
    "x86_pkg_temp",
    "coretemp",
    "k10temp",
    "tctl",
    "package",
    "cpu",
    "soc",
];

/// Una fuente de temperatura de CPU. `None` = sin lectura, nunca un error.
pub trait TemperatureProbe: Send {
    fn name(&self) -> &'static str;
    fn read(&mut self) -> Option<f32>;
}

/// Sondas en orden de prioridad para la plataforma actual.
pub fn default_probes() -> Vec<Box<dyn TemperatureProbe>> {
    let mut probes: Vec<Box<dyn TemperatureProbe>> = Vec::new();
    if cfg!(target_os = "linux") {
        probes.push(Box::new(ThermalZoneProbe::new()));
    }
    probes.push(Box::new(ComponentsProbe::new()));
    probes
}

/// Primera lectura válida recorriendo las sondas en orden.
pub fn first_reading(probes: &mut [Box<dyn TemperatureProbe>]) -> Option<f32> {
    for probe in probes.iter_mut() {
        if let Some(celsius) = probe.read().and_then(valid_reading) {
            debug!("temperatura {:.1}°C desde {}", celsius, probe.name());
            return Some(celsius);
        }
    }
    None
}

fn valid_reading(celsius: f32) -> Option<f32> {
    (celsius.is_finite() && celsius > 0.0).then_some(celsius)
}

fn looks_like_cpu(label: &str) -> bool {
    let label = label.to_ascii_lowercase();
    CPU_HINTS.iter().any(|hint| label.contains(hint))
}

/// De una lista (etiqueta, °C) se queda con la primera que parezca de CPU;
/// si no hay ninguna, con la primera lectura válida.
fn pick_reading<I>(readings: I) -> Option<f32>
where
    I: IntoIterator<Item = (String, f32)>,
{
    let mut fallback = None;
    for (label, celsius) in readings {
        let Some(celsius) = valid_reading(celsius) else {
            continue;
        };
        if looks_like_cpu(&label) {
            return Some(celsius);
        }
        fallback.get_or_insert(celsius);
    }
    fallback
}

/// sysfs guarda la temperatura en miligrados.
pub fn parse_millidegrees(raw: &str) -> Option<f32> {
    raw.trim().parse::<i64>().ok().map(|m| m as f32 / 1000.0)
}

/* ---------------- Linux: /sys/class/thermal ---------------- */

pub struct ThermalZoneProbe {
    root: PathBuf,
}

impl ThermalZoneProbe {
    pub fn new() -> Self {
        Self::with_root(SYS_THERMAL_DIR)
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ThermalZoneProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn read_zone(zone: &Path) -> Option<(String, f32)> {
    let kind = fs::read_to_string(zone.join("type")).unwrap_or_default();
    let raw = fs::read_to_string(zone.join("temp")).ok()?;
    Some((kind.trim().to_string(), parse_millidegrees(&raw)?))
}

impl TemperatureProbe for ThermalZoneProbe {
    fn name(&self) -> &'static str {
        "thermal_zone"
    }

    fn read(&mut self) -> Option<f32> {
        let pattern = self.root.join("thermal_zone*");
        let zones = glob(pattern.to_str()?).ok()?;
        pick_reading(zones.filter_map(Result::ok).filter_map(|z| read_zone(&z)))
    }
}

/* ---------------- genérico: componentes de sysinfo ---------------- */

pub struct ComponentsProbe {
    sys: System,
    listed: bool,
}

impl ComponentsProbe {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            listed: false,
        }
    }
}

impl Default for ComponentsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl TemperatureProbe for ComponentsProbe {
    fn name(&self) -> &'static str {
        "sysinfo_components"
    }

    fn read(&mut self) -> Option<f32> {
        // la lista de sensores se descubre una vez; después sólo se refresca
        if self.listed {
            self.sys.refresh_components();
        } else {
            self.sys.refresh_components_list();
            self.listed = true;
        }

        pick_reading(
            self.sys
                .components()
                .iter()
                .map(|c| (c.label().to_string(), c.temperature())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        env,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("temperature_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn write_zone(root: &Path, n: u32, kind: &str, temp: &str) {
        let zone = root.join(format!("thermal_zone{n}"));
        fs::create_dir_all(&zone).unwrap();
        fs::write(zone.join("type"), format!("{kind}\n")).unwrap();
        fs::write(zone.join("temp"), format!("{temp}\n")).unwrap();
    }

    struct FixedProbe {
        value: Option<f32>,
        calls: Arc<AtomicUsize>,
    }

    impl TemperatureProbe for FixedProbe {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn read(&mut self) -> Option<f32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.value
        }
    }

    fn fixed(value: Option<f32>) -> (Box<dyn TemperatureProbe>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = FixedProbe {
            value,
            calls: calls.clone(),
        };
        (Box::new(probe), calls)
    }

    #[test]
    fn first_reading_gana_la_primera_sonda_con_dato() {
        let (a, calls_a) = fixed(None);
        let (b, calls_b) = fixed(Some(48.5));
        let (c, calls_c) = fixed(Some(70.0));
        let mut probes = vec![a, b, c];

        assert_eq!(first_reading(&mut probes), Some(48.5));
        assert_eq!(calls_a.load(Ordering::SeqCst), 1);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
        assert_eq!(calls_c.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn first_reading_descarta_lecturas_absurdas() {
        let (a, _) = fixed(Some(f32::NAN));
        let (b, _) = fixed(Some(0.0));
        let (c, _) = fixed(Some(55.0));
        let mut probes = vec![a, b, c];

        assert_eq!(first_reading(&mut probes), Some(55.0));
    }

    #[test]
    fn first_reading_sin_sondas_es_none() {
        let mut probes: Vec<Box<dyn TemperatureProbe>> = Vec::new();
        assert_eq!(first_reading(&mut probes), None);

        let (a, _) = fixed(None);
        assert_eq!(first_reading(&mut [a]), None);
    }

    #[test]
    fn parse_millidegrees_convierte_a_celsius() {
        assert_eq!(parse_millidegrees("45000\n"), Some(45.0));
        assert_eq!(parse_millidegrees(" 51250 "), Some(51.25));
        assert_eq!(parse_millidegrees("n/a"), None);
    }

    #[test]
    fn pick_reading_prefiere_sensores_de_cpu() {
        let readings = vec![
            ("acpitz".to_string(), 27.8),
            ("Package id 0".to_string(), 61.0),
        ];
        assert_eq!(pick_reading(readings), Some(61.0));

        let readings = vec![("nvme".to_string(), -1.0), ("acpitz".to_string(), 27.8)];
        assert_eq!(pick_reading(readings), Some(27.8));
    }

    #[test]
    fn thermal_zone_probe_lee_sysfs() {
        let root = temp_dir("zones");
        write_zone(&root, 0, "acpitz", "27800");
        write_zone(&root, 1, "x86_pkg_temp", "63000");
        write_zone(&root, 2, "iwlwifi_1", "garbage");

        let mut probe = ThermalZoneProbe::with_root(&root);
        assert_eq!(probe.read(), Some(63.0));
    }

    #[test]
    fn thermal_zone_probe_sin_zonas_es_none() {
        let root = temp_dir("empty");
        let mut probe = ThermalZoneProbe::with_root(root.join("no_existe"));
        assert_eq!(probe.read(), None);
    }

    #[test]
    fn components_probe_nunca_falla() {
        // el host de CI puede no tener sensores; sólo importa que no explote
        let mut probe = ComponentsProbe::new();
        if let Some(c) = probe.read() {
            assert!(c > 0.0);
        }
        let _ = probe.read();
    }
}
