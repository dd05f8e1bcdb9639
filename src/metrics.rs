use crate::state::State;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub battery_percent: GaugeVec,
    pub battery_capacity_percent: GaugeVec,
    pub battery_cycle_count: GaugeVec,
    pub battery_count: Gauge,
    pub cpu_temperature_celsius: Gauge,
    pub cpu_temperature_available: Gauge,
    pub sensor_value: GaugeVec,
    pub sensor_count: Gauge,
    pub disk_used_bytes: GaugeVec,
    pub disk_total_bytes: GaugeVec,
    pub disk_usage_percent: GaugeVec,
    pub disk_external: GaugeVec,
    pub disk_count: Gauge,
    pub disk_read_mib_per_sec: Gauge,
    pub disk_write_mib_per_sec: Gauge,
    pub memory_committed_bytes: Gauge,
    pub memory_committed_limit_bytes: Gauge,
    pub memory_paged_pool_bytes: Gauge,
    pub memory_non_paged_pool_bytes: Gauge,
    pub uptime_seconds: Gauge,
    pub scrape_count_total: Counter,
    pub collect_errors_total: CounterVec,
    pub last_collect_timestamp_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let battery_percent = GaugeVec::new(
            opts!("hostpulse_battery_percent", "Battery charge in percent (0..100)"),
            &["battery", "state"],
        )?;
        let battery_capacity_percent = GaugeVec::new(
            opts!(
                "hostpulse_battery_capacity_percent",
                "Full-charge capacity relative to design capacity in percent"
            ),
            &["battery", "health"],
        )?;
        let battery_cycle_count = GaugeVec::new(
            opts!("hostpulse_battery_cycle_count", "Battery charge cycles"),
            &["battery"],
        )?;
        let battery_count =
            Gauge::with_opts(opts!("hostpulse_battery_count", "Number of batteries"))?;
        let cpu_temperature_celsius = Gauge::with_opts(opts!(
            "hostpulse_cpu_temperature_celsius",
            "CPU temperature in Celsius, 0 when unavailable"
        ))?;
        let cpu_temperature_available = Gauge::with_opts(opts!(
            "hostpulse_cpu_temperature_available",
            "1 when a CPU temperature reading is available"
        ))?;
        let sensor_value = GaugeVec::new(
            opts!("hostpulse_sensor_value", "Sensor value by label and unit"),
            &["sensor", "unit"],
        )?;
        let sensor_count =
            Gauge::with_opts(opts!("hostpulse_sensor_count", "Number of sensor readings"))?;
        let disk_used_bytes = GaugeVec::new(
            opts!("hostpulse_disk_used_bytes", "Disk used bytes by mount"),
            &["mount", "device"],
        )?;
        let disk_total_bytes = GaugeVec::new(
            opts!("hostpulse_disk_total_bytes", "Disk total bytes by mount"),
            &["mount", "device"],
        )?;
        let disk_usage_percent = GaugeVec::new(
            opts!("hostpulse_disk_usage_percent", "Disk usage in percent by mount"),
            &["mount", "device"],
        )?;
        let disk_external = GaugeVec::new(
            opts!("hostpulse_disk_external", "1 for removable or external volumes"),
            &["mount"],
        )?;
        let disk_count =
            Gauge::with_opts(opts!("hostpulse_disk_count", "Number of reported disks"))?;
        let disk_read_mib_per_sec = Gauge::with_opts(opts!(
            "hostpulse_disk_read_mib_per_sec",
            "Disk read throughput over the last interval in MiB/s"
        ))?;
        let disk_write_mib_per_sec = Gauge::with_opts(opts!(
            "hostpulse_disk_write_mib_per_sec",
            "Disk write throughput over the last interval in MiB/s"
        ))?;
        let memory_committed_bytes = Gauge::with_opts(opts!(
            "hostpulse_memory_committed_bytes",
            "Committed virtual memory in bytes"
        ))?;
        let memory_committed_limit_bytes = Gauge::with_opts(opts!(
            "hostpulse_memory_committed_limit_bytes",
            "Commit limit in bytes"
        ))?;
        let memory_paged_pool_bytes = Gauge::with_opts(opts!(
            "hostpulse_memory_paged_pool_bytes",
            "Kernel paged pool in bytes"
        ))?;
        let memory_non_paged_pool_bytes = Gauge::with_opts(opts!(
            "hostpulse_memory_non_paged_pool_bytes",
            "Kernel non-paged pool in bytes"
        ))?;
        let uptime_seconds =
            Gauge::with_opts(opts!("hostpulse_uptime_seconds", "Agent uptime in seconds"))?;
        let scrape_count_total = Counter::with_opts(opts!(
            "hostpulse_scrape_count_total",
            "Total number of /metrics scrapes"
        ))?;
        let collect_errors_total = CounterVec::new(
            opts!(
                "hostpulse_collect_errors_total",
                "Collection errors by capability"
            ),
            &["capability"],
        )?;
        let last_collect_timestamp_seconds = Gauge::with_opts(opts!(
            "hostpulse_last_collect_timestamp_seconds",
            "Unix timestamp of the last completed collection"
        ))?;

        register(&registry, &battery_percent)?;
        register(&registry, &battery_capacity_percent)?;
        register(&registry, &battery_cycle_count)?;
        register(&registry, &battery_count)?;
        register(&registry, &cpu_temperature_celsius)?;
        register(&registry, &cpu_temperature_available)?;
        register(&registry, &sensor_value)?;
        register(&registry, &sensor_count)?;
        register(&registry, &disk_used_bytes)?;
        register(&registry, &disk_total_bytes)?;
        register(&registry, &disk_usage_percent)?;
        register(&registry, &disk_external)?;
        register(&registry, &disk_count)?;
        register(&registry, &disk_read_mib_per_sec)?;
        register(&registry, &disk_write_mib_per_sec)?;
        register(&registry, &memory_committed_bytes)?;
        register(&registry, &memory_committed_limit_bytes)?;
        register(&registry, &memory_paged_pool_bytes)?;
        register(&registry, &memory_non_paged_pool_bytes)?;
        register(&registry, &uptime_seconds)?;
        register(&registry, &scrape_count_total)?;
        register(&registry, &collect_errors_total)?;
        register(&registry, &last_collect_timestamp_seconds)?;

        Ok(Arc::new(Self {
            registry,
            battery_percent,
            battery_capacity_percent,
            battery_cycle_count,
            battery_count,
            cpu_temperature_celsius,
            cpu_temperature_available,
            sensor_value,
            sensor_count,
            disk_used_bytes,
            disk_total_bytes,
            disk_usage_percent,
            disk_external,
            disk_count,
            disk_read_mib_per_sec,
            disk_write_mib_per_sec,
            memory_committed_bytes,
            memory_committed_limit_bytes,
            memory_paged_pool_bytes,
            memory_non_paged_pool_bytes,
            uptime_seconds,
            scrape_count_total,
            collect_errors_total,
            last_collect_timestamp_seconds,
        }))
    }

    pub fn update_from_state(&self, state: &State) {
        self.last_collect_timestamp_seconds
            .set(state.last_collect_timestamp_seconds as f64);
        self.uptime_seconds
            .set(now_unix().saturating_sub(state.started_at_unix) as f64);

        self.battery_percent.reset();
        self.battery_capacity_percent.reset();
        self.battery_cycle_count.reset();
        self.sensor_value.reset();
        self.disk_used_bytes.reset();
        self.disk_total_bytes.reset();
        self.disk_usage_percent.reset();
        self.disk_external.reset();

        let Some(snapshot) = &state.snapshot else {
            return;
        };

        for (i, b) in snapshot.batteries.iter().enumerate() {
            let id = i.to_string();
            self.battery_percent
                .with_label_values(&[&id, b.state.as_str()])
                .set(b.percent);
            self.battery_capacity_percent
                .with_label_values(&[&id, b.health.as_str()])
                .set(b.capacity_percent as f64);
            self.battery_cycle_count
                .with_label_values(&[&id])
                .set(b.cycle_count as f64);
        }
        self.battery_count.set(snapshot.batteries.len() as f64);

        self.cpu_temperature_celsius.set(snapshot.thermal.cpu_celsius);
        self.cpu_temperature_available
            .set(if snapshot.thermal.available { 1.0 } else { 0.0 });

        for s in &snapshot.sensors {
            self.sensor_value
                .with_label_values(&[&s.label, &s.unit])
                .set(s.value);
        }
        self.sensor_count.set(snapshot.sensors.len() as f64);

        for d in &snapshot.disks {
            let labels = [d.mount.as_str(), d.device.as_str()];
            self.disk_used_bytes
                .with_label_values(&labels)
                .set(d.used_bytes as f64);
            self.disk_total_bytes
                .with_label_values(&labels)
                .set(d.total_bytes as f64);
            self.disk_usage_percent
                .with_label_values(&labels)
                .set(d.used_percent);
            self.disk_external
                .with_label_values(&[&d.mount])
                .set(if d.external { 1.0 } else { 0.0 });
        }
        self.disk_count.set(snapshot.disks.len() as f64);

        self.disk_read_mib_per_sec.set(snapshot.disk_io.read_rate);
        self.disk_write_mib_per_sec.set(snapshot.disk_io.write_rate);

        let m = &snapshot.memory;
        self.memory_committed_bytes.set(m.committed_bytes as f64);
        self.memory_committed_limit_bytes
            .set(m.committed_limit_bytes as f64);
        self.memory_paged_pool_bytes.set(m.paged_pool_bytes as f64);
        self.memory_non_paged_pool_bytes
            .set(m.non_paged_pool_bytes as f64);
    }

    pub fn inc_scrape_count(&self) {
        self.scrape_count_total.inc();
    }

    pub fn inc_collect_error(&self, capability: &str) {
        self.collect_errors_total
            .with_label_values(&[capability])
            .inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::Snapshot;
    use crate::state::{DiskIoStatus, DiskStatus, ThermalStatus};

    #[test]
    fn snapshot_values_are_exported() {
        let metrics = Metrics::new().unwrap();
        let mut state = State::new(now_unix(), "linux");
        state.update_collected(
            100,
            Snapshot {
                thermal: ThermalStatus::celsius(47.5),
                disks: vec![DiskStatus {
                    mount: "/".to_string(),
                    device: "/dev/sda1".to_string(),
                    used_bytes: 40,
                    total_bytes: 100,
                    used_percent: 40.0,
                    fs_type: "ext4".to_string(),
                    external: false,
                }],
                disk_io: DiskIoStatus {
                    read_rate: 1.5,
                    write_rate: 0.25,
                },
                ..Snapshot::default()
            },
        );
        metrics.update_from_state(&state);
        metrics.inc_collect_error("battery");

        let text = String::from_utf8(metrics.encode_metrics().unwrap()).unwrap();
        assert!(text.contains("hostpulse_cpu_temperature_celsius 47.5"));
        assert!(text.contains("hostpulse_disk_read_mib_per_sec 1.5"));
        assert!(text.contains(r#"hostpulse_disk_usage_percent{device="/dev/sda1",mount="/"} 40"#));
        assert!(text.contains(r#"hostpulse_collect_errors_total{capability="battery"} 1"#));
        assert!(text.contains("hostpulse_last_collect_timestamp_seconds 100"));
    }

    #[test]
    fn empty_state_exports_without_snapshot() {
        let metrics = Metrics::new().unwrap();
        metrics.update_from_state(&State::new(0, "generic"));
        let text = String::from_utf8(metrics.encode_metrics().unwrap()).unwrap();
        assert!(text.contains("hostpulse_uptime_seconds"));
    }
}
