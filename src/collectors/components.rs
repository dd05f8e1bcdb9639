use crate::state::SensorReading;
use sysinfo::{ComponentExt, System, SystemExt};

const CPU_MARKERS: &[&str] = &["cpu", "package", "tctl", "tdie", "coretemp", "k10temp"];
const GPU_MARKERS: &[&str] = &["gpu", "nvidia", "amdgpu", "radeon"];

/// Temperature sensors exposed by the OS, in Celsius. Non-positive readings
/// are dropped.
pub fn temperature_readings() -> Vec<SensorReading> {
    let mut system = System::new();
    system.refresh_components_list();
    system.refresh_components();

    system
        .components()
        .iter()
        .map(|c| (c.label().to_string(), c.temperature() as f64))
        .filter(|(_, celsius)| *celsius > 0.0)
        .map(|(label, value)| SensorReading {
            label,
            value,
            unit: "°C".to_string(),
        })
        .collect()
}

/// Picks the hottest CPU sensor; falls back to the hottest non-GPU one.
pub fn cpu_temperature(readings: &[SensorReading]) -> Option<f64> {
    let plausible = readings
        .iter()
        .filter(|r| r.value > 0.0 && r.value <= 130.0)
        .filter(|r| !has_marker(&r.label, GPU_MARKERS));

    hottest(plausible.clone().filter(|r| has_marker(&r.label, CPU_MARKERS)))
        .or_else(|| hottest(plausible))
}

fn has_marker(label: &str, markers: &[&str]) -> bool {
    let label = label.to_lowercase();
    markers.iter().any(|m| label.contains(m))
}

fn hottest<'a>(readings: impl Iterator<Item = &'a SensorReading>) -> Option<f64> {
    readings.map(|r| r.value).max_by(|a, b| a.total_cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(label: &str, value: f64) -> SensorReading {
        SensorReading {
            label: label.to_string(),
            value,
            unit: "°C".to_string(),
        }
    }

    #[test]
    fn cpu_sensor_beats_hotter_gpu() {
        let readings = vec![
            reading("amdgpu edge", 88.0),
            reading("k10temp Tctl", 54.0),
            reading("nvme Composite", 41.0),
            reading("coretemp Package id 0", 57.5),
        ];
        assert_eq!(cpu_temperature(&readings), Some(57.5));
    }

    #[test]
    fn falls_back_to_non_gpu() {
        let readings = vec![reading("nvidia GPU", 70.0), reading("acpitz temp1", 44.0)];
        assert_eq!(cpu_temperature(&readings), Some(44.0));
    }

    #[test]
    fn implausible_values_are_ignored() {
        let readings = vec![reading("cpu", 0.0), reading("cpu die", 250.0)];
        assert_eq!(cpu_temperature(&readings), None);
    }
}
