//! Linux backend built on sysfs and procfs. Every path is resolved against
//! `root`, which is `/` outside of tests.

use crate::collectors::backend::Backend;
use crate::collectors::components;
use crate::collectors::disks::{self, DiskLimits};
use crate::collectors::error::CollectError;
use crate::collectors::parse::{parse_f64_loose, parse_fields, Fields};
use crate::collectors::windows::format_minutes;
use crate::state::{
    BatteryHealth, BatteryState, BatteryStatus, DiskIoCounters, DiskStatus, MemoryDetails,
    SensorReading, ThermalStatus,
};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `/proc/diskstats` counts 512-byte sectors regardless of the device's
/// real sector size.
const DISK_SECTOR_SIZE: u64 = 512;

const UEVENT_KEYS: &[&str] = &[
    "POWER_SUPPLY_TYPE",
    "POWER_SUPPLY_STATUS",
    "POWER_SUPPLY_CAPACITY",
    "POWER_SUPPLY_CAPACITY_LEVEL",
    "POWER_SUPPLY_CYCLE_COUNT",
    "POWER_SUPPLY_ENERGY_FULL",
    "POWER_SUPPLY_ENERGY_FULL_DESIGN",
    "POWER_SUPPLY_ENERGY_NOW",
    "POWER_SUPPLY_POWER_NOW",
    "POWER_SUPPLY_CHARGE_FULL",
    "POWER_SUPPLY_CHARGE_FULL_DESIGN",
    "POWER_SUPPLY_CHARGE_NOW",
    "POWER_SUPPLY_CURRENT_NOW",
];

/// Thermal zone types that track the CPU package, best first.
const CPU_ZONE_MARKERS: &[&str] = &["x86_pkg_temp", "cpu", "coretemp", "k10temp", "soc", "acpitz"];

const VIRTUAL_BLOCK_PREFIXES: &[&str] = &["loop", "ram", "zram", "dm-", "md", "sr"];

pub struct LinuxBackend {
    root: PathBuf,
    limits: DiskLimits,
}

impl LinuxBackend {
    pub fn new(root: impl Into<PathBuf>, limits: DiskLimits) -> Self {
        Self {
            root: root.into(),
            limits,
        }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn read_batteries(&self) -> Result<Vec<BatteryStatus>, CollectError> {
        let dir = self.path("sys/class/power_supply");
        let Ok(entries) = fs::read_dir(&dir) else {
            return Err(CollectError::NoData("battery"));
        };

        let mut supplies: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        supplies.sort();

        let batteries: Vec<BatteryStatus> = supplies
            .iter()
            .filter_map(|supply| fs::read_to_string(supply.join("uevent")).ok())
            .map(|text| parse_fields(&text, UEVENT_KEYS))
            .filter(|fields| {
                fields
                    .get("POWER_SUPPLY_TYPE")
                    .is_some_and(|t| t.eq_ignore_ascii_case("battery"))
            })
            .filter_map(|fields| battery_from_uevent(&fields))
            .collect();

        if batteries.is_empty() {
            return Err(CollectError::NoData("battery"));
        }
        Ok(batteries)
    }

    fn read_thermal(&self) -> ThermalStatus {
        let Ok(entries) = fs::read_dir(self.path("sys/class/thermal")) else {
            return ThermalStatus::default();
        };

        let zones: Vec<(String, f64)> = entries
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("thermal_zone"))
            .filter_map(|e| {
                let path = e.path();
                let raw = fs::read_to_string(path.join("temp")).ok()?;
                let celsius = millidegrees_to_celsius(raw.trim().parse::<f64>().ok()?)?;
                let kind = fs::read_to_string(path.join("type"))
                    .map(|s| s.trim().to_ascii_lowercase())
                    .unwrap_or_default();
                Some((kind, celsius))
            })
            .collect();

        pick_cpu_zone(&zones)
            .map(ThermalStatus::celsius)
            .unwrap_or_default()
    }

    fn read_disk_io(&self) -> Result<Vec<DiskIoCounters>, CollectError> {
        let path = self.path("proc/diskstats");
        let text = fs::read_to_string(&path)
            .map_err(|err| CollectError::io(path.display().to_string(), &err))?;
        let block = self.path("sys/block");

        Ok(text
            .lines()
            .filter_map(parse_diskstats_line)
            .filter(|c| is_physical_device(&block, &c.device))
            .collect())
    }

    fn read_memory_details(&self) -> MemoryDetails {
        let Ok(text) = fs::read_to_string(self.path("proc/meminfo")) else {
            return MemoryDetails::default();
        };
        let fields = parse_fields(&text, &["Committed_AS", "CommitLimit"]);
        let kib = |key: &str| {
            fields
                .get(key)
                .and_then(parse_f64_loose)
                .map(|v| (v.max(0.0) as u64).saturating_mul(1024))
                .unwrap_or(0)
        };
        MemoryDetails {
            committed_bytes: kib("Committed_AS"),
            committed_limit_bytes: kib("CommitLimit"),
            paged_pool_bytes: 0,
            non_paged_pool_bytes: 0,
        }
    }
}

#[async_trait]
impl Backend for LinuxBackend {
    fn name(&self) -> &'static str {
        "linux"
    }

    async fn collect_batteries(&self) -> Result<Vec<BatteryStatus>, CollectError> {
        self.read_batteries()
    }

    async fn collect_thermal(&self) -> ThermalStatus {
        self.read_thermal()
    }

    async fn collect_sensors(&self) -> Result<Vec<SensorReading>, CollectError> {
        Ok(components::temperature_readings())
    }

    async fn collect_disks(&self) -> Result<Vec<DiskStatus>, CollectError> {
        Ok(disks::select_disks(disks::list_partitions(), self.limits))
    }

    async fn collect_disk_io_raw(&self) -> Result<Vec<DiskIoCounters>, CollectError> {
        self.read_disk_io()
    }

    async fn collect_memory_details(&self) -> MemoryDetails {
        self.read_memory_details()
    }
}

fn battery_from_uevent(fields: &Fields) -> Option<BatteryStatus> {
    let percent = fields
        .f64("POWER_SUPPLY_CAPACITY")
        .unwrap_or(0.0)
        .clamp(0.0, 100.0);
    let status = fields.get("POWER_SUPPLY_STATUS");
    if percent <= 0.0 && status.is_none() {
        return None;
    }

    let state = match status.map(str::to_ascii_lowercase).as_deref() {
        Some("discharging") => match fields.get("POWER_SUPPLY_CAPACITY_LEVEL") {
            Some(level) if level.eq_ignore_ascii_case("critical") => BatteryState::Critical,
            Some(level) if level.eq_ignore_ascii_case("low") => BatteryState::Low,
            _ => BatteryState::Discharging,
        },
        Some("charging") | Some("not charging") => BatteryState::AcPower,
        Some("full") => BatteryState::FullyCharged,
        _ => BatteryState::Unknown,
    };

    let (design, full, now, rate) = if fields.contains("POWER_SUPPLY_ENERGY_FULL_DESIGN") {
        (
            "POWER_SUPPLY_ENERGY_FULL_DESIGN",
            "POWER_SUPPLY_ENERGY_FULL",
            "POWER_SUPPLY_ENERGY_NOW",
            "POWER_SUPPLY_POWER_NOW",
        )
    } else {
        (
            "POWER_SUPPLY_CHARGE_FULL_DESIGN",
            "POWER_SUPPLY_CHARGE_FULL",
            "POWER_SUPPLY_CHARGE_NOW",
            "POWER_SUPPLY_CURRENT_NOW",
        )
    };
    let (health, capacity_percent) = BatteryHealth::classify(
        fields.i64(design).unwrap_or(0),
        fields.i64(full).unwrap_or(0),
    );

    let time_left = match (state, fields.f64(now), fields.f64(rate)) {
        (BatteryState::Discharging | BatteryState::Low | BatteryState::Critical, Some(n), Some(r))
            if r > 0.0 =>
        {
            format_minutes((n / r * 60.0).round() as i64)
        }
        _ => String::new(),
    };

    Some(BatteryStatus {
        percent,
        state,
        time_left,
        health,
        cycle_count: fields
            .u64("POWER_SUPPLY_CYCLE_COUNT")
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or(0),
        capacity_percent,
    })
}

fn millidegrees_to_celsius(raw: f64) -> Option<f64> {
    let celsius = if raw.abs() > 1000.0 { raw / 1000.0 } else { raw };
    (0.0..=130.0).contains(&celsius).then_some(celsius)
}

fn pick_cpu_zone(zones: &[(String, f64)]) -> Option<f64> {
    CPU_ZONE_MARKERS
        .iter()
        .find_map(|marker| {
            zones
                .iter()
                .filter(|(kind, _)| kind.contains(marker))
                .map(|(_, c)| *c)
                .max_by(|a, b| a.total_cmp(b))
        })
        .or_else(|| zones.iter().map(|(_, c)| *c).max_by(|a, b| a.total_cmp(b)))
}

/// Parses one `/proc/diskstats` line (Linux 2.6+ layout).
fn parse_diskstats_line(line: &str) -> Option<DiskIoCounters> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 10 {
        return None;
    }
    let sectors_read = parts[5].parse::<u64>().ok()?;
    let sectors_written = parts[9].parse::<u64>().ok()?;
    Some(DiskIoCounters {
        device: parts[2].to_string(),
        read_bytes: sectors_read.saturating_mul(DISK_SECTOR_SIZE),
        write_bytes: sectors_written.saturating_mul(DISK_SECTOR_SIZE),
    })
}

/// Whole devices have a `/sys/block` entry; partitions do not.
fn is_physical_device(sys_block: &Path, device: &str) -> bool {
    if VIRTUAL_BLOCK_PREFIXES.iter().any(|p| device.starts_with(p)) {
        return false;
    }
    let present = sys_block.join(device).exists();
    if !present {
        debug!(device, "skipping partition or unknown block device");
    }
    present
}
