//! Windows backend. Battery, thermal, sensor, disk-type, disk I/O and memory
//! details come from WMI through PowerShell; capacity comes from `sysinfo`.

use crate::collectors::backend::Backend;
use crate::collectors::disks::{self, DiskLimits, Partition};
use crate::collectors::error::CollectError;
use crate::collectors::parse::{parse_f64_loose, parse_fields, parse_records};
use crate::collectors::runner::ToolRunner;
use crate::config::ToolTimeouts;
use crate::state::{
    BatteryHealth, BatteryState, BatteryStatus, DiskIoCounters, DiskStatus, MemoryDetails,
    SensorReading, ThermalStatus,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const POWERSHELL: &str = "powershell";

const BATTERY_SCRIPT: &str = "Get-WmiObject -Class Win32_Battery | Select-Object EstimatedChargeRemaining,BatteryStatus,EstimatedRunTime,DesignCapacity,FullChargeCapacity | ConvertTo-Json";
const BATTERY_KEYS: &[&str] = &[
    "EstimatedChargeRemaining",
    "BatteryStatus",
    "EstimatedRunTime",
    "DesignCapacity",
    "FullChargeCapacity",
];

const THERMAL_SCRIPT: &str = "Get-WmiObject -Namespace \"root/WMI\" -Class MSAcpi_ThermalZoneTemperature | Select-Object -First 1 CurrentTemperature | ConvertTo-Json";

const SENSOR_SCRIPT: &str = "$n=@('root/LibreHardwareMonitor','root/OpenHardwareMonitor'); foreach($ns in $n){ try { $s=Get-CimInstance -Namespace $ns -ClassName Sensor -ErrorAction Stop } catch { continue }; if($s){ $s | ForEach-Object { \"$($_.SensorType)|$($_.Name)|$($_.Value)\" }; break } }";

const DRIVE_TYPE_SCRIPT: &str =
    "Get-WmiObject -Class Win32_LogicalDisk | Select-Object DeviceID,DriveType | ConvertTo-Json";

const DISK_IO_SCRIPT: &str = "Get-CimInstance -ClassName Win32_PerfRawData_PerfDisk_PhysicalDisk -Filter \"Name='_Total'\" | Select-Object DiskReadBytesPersec,DiskWriteBytesPersec | ConvertTo-Json";

const MEMORY_SCRIPT: &str = r#"
$os = Get-WmiObject -Class Win32_OperatingSystem
$perf = Get-WmiObject -Class Win32_PerfFormattedData_PerfOS_Memory
$committed = [uint64]$os.TotalVirtualMemorySize - [uint64]$os.FreeVirtualMemory
$committedLimit = [uint64]$os.TotalVirtualMemorySize
Write-Output "Committed=$committed"
Write-Output "CommittedLimit=$committedLimit"
Write-Output "PagedPool=$([uint64]$perf.PoolPagedBytes)"
Write-Output "NonPagedPool=$([uint64]$perf.PoolNonpagedBytes)"
"#;

/// `EstimatedRunTime` reported while on AC power.
const WMI_RUNTIME_UNKNOWN: i64 = 71_582_788;

const EXTERNAL_DRIVE_TYPES: &[u64] = &[2, 5, 6];

pub struct WindowsBackend {
    runner: Arc<dyn ToolRunner>,
    timeouts: ToolTimeouts,
    limits: DiskLimits,
    partitions: fn() -> Vec<Partition>,
}

impl WindowsBackend {
    pub fn new(runner: Arc<dyn ToolRunner>, timeouts: ToolTimeouts, limits: DiskLimits) -> Self {
        Self {
            runner,
            timeouts,
            limits,
            partitions: disks::list_partitions,
        }
    }

    async fn powershell(&self, script: &str, timeout: Duration) -> Result<String, CollectError> {
        if !self.runner.is_available(POWERSHELL) {
            return Err(CollectError::ToolUnavailable {
                tool: POWERSHELL.to_string(),
            });
        }
        self.runner
            .run(
                POWERSHELL,
                &["-NoProfile", "-NonInteractive", "-Command", script],
                timeout,
            )
            .await
    }

    async fn annotate_disk_types(&self, disks: &mut [DiskStatus]) {
        if disks.is_empty() {
            return;
        }
        match self
            .powershell(DRIVE_TYPE_SCRIPT, self.timeouts.disk_annotate)
            .await
        {
            Ok(raw) => mark_external(disks, &external_drives(&raw)),
            Err(err) => debug!(error = %err, "drive type query failed, disks left unannotated"),
        }
    }
}

#[async_trait]
impl Backend for WindowsBackend {
    fn name(&self) -> &'static str {
        "windows"
    }

    async fn collect_batteries(&self) -> Result<Vec<BatteryStatus>, CollectError> {
        let raw = self.powershell(BATTERY_SCRIPT, self.timeouts.battery).await?;
        let batteries = parse_batteries(&raw);
        if batteries.is_empty() {
            return Err(CollectError::NoData("battery"));
        }
        Ok(batteries)
    }

    async fn collect_thermal(&self) -> ThermalStatus {
        match self.powershell(THERMAL_SCRIPT, self.timeouts.thermal).await {
            Ok(raw) => parse_thermal(&raw),
            Err(err) => {
                debug!(error = %err, "thermal zone query failed");
                ThermalStatus::default()
            }
        }
    }

    async fn collect_sensors(&self) -> Result<Vec<SensorReading>, CollectError> {
        let raw = self.powershell(SENSOR_SCRIPT, self.timeouts.sensors).await?;
        Ok(parse_sensor_lines(&raw))
    }

    async fn collect_disks(&self) -> Result<Vec<DiskStatus>, CollectError> {
        let mut disks = disks::select_disks((self.partitions)(), self.limits);
        self.annotate_disk_types(&mut disks).await;
        Ok(disks)
    }

    async fn collect_disk_io_raw(&self) -> Result<Vec<DiskIoCounters>, CollectError> {
        let raw = self.powershell(DISK_IO_SCRIPT, self.timeouts.disk_io).await?;
        parse_disk_io(&raw).map(|counters| vec![counters])
    }

    async fn collect_memory_details(&self) -> MemoryDetails {
        match self.powershell(MEMORY_SCRIPT, self.timeouts.memory).await {
            Ok(raw) => parse_memory_details(&raw),
            Err(err) => {
                debug!(error = %err, "memory detail query failed");
                MemoryDetails::default()
            }
        }
    }
}

pub fn parse_batteries(raw: &str) -> Vec<BatteryStatus> {
    parse_records(raw, BATTERY_KEYS)
        .iter()
        .filter_map(|fields| {
            let percent = fields
                .f64("EstimatedChargeRemaining")
                .unwrap_or(0.0)
                .clamp(0.0, 100.0);
            let state = fields
                .contains("BatteryStatus")
                .then(|| BatteryState::from_wmi_code(fields.i64("BatteryStatus").unwrap_or(0)));
            if percent <= 0.0 && state.is_none() {
                return None;
            }

            let (health, capacity_percent) = BatteryHealth::classify(
                fields.i64("DesignCapacity").unwrap_or(0),
                fields.i64("FullChargeCapacity").unwrap_or(0),
            );
            let time_left = fields
                .i64("EstimatedRunTime")
                .filter(|m| *m != WMI_RUNTIME_UNKNOWN)
                .map(format_minutes)
                .unwrap_or_default();

            Some(BatteryStatus {
                percent,
                state: state.unwrap_or(BatteryState::Unknown),
                time_left,
                health,
                // WMI does not expose cycle count.
                cycle_count: 0,
                capacity_percent,
            })
        })
        .collect()
}

/// `H:MM`, or empty for non-positive estimates.
pub fn format_minutes(minutes: i64) -> String {
    if minutes <= 0 {
        return String::new();
    }
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

pub fn parse_thermal(raw: &str) -> ThermalStatus {
    parse_fields(raw, &["CurrentTemperature"])
        .f64("CurrentTemperature")
        .and_then(tenths_kelvin_to_celsius)
        .map(ThermalStatus::celsius)
        .unwrap_or_default()
}

/// Converts `MSAcpi_ThermalZoneTemperature` units; implausible results are
/// treated as no reading.
pub fn tenths_kelvin_to_celsius(raw: f64) -> Option<f64> {
    let celsius = raw / 10.0 - 273.15;
    (0.0..=130.0).contains(&celsius).then_some(celsius)
}

pub fn parse_sensor_lines(raw: &str) -> Vec<SensorReading> {
    raw.lines()
        .filter_map(|line| {
            let mut parts = line.split('|').map(str::trim);
            let sensor_type = parts.next()?;
            let name = parts.next()?;
            let value = parse_f64_loose(parts.next()?)?;
            if name.is_empty() || !value.is_finite() {
                return None;
            }
            Some(SensorReading {
                label: format!("{name} ({sensor_type})"),
                value,
                unit: sensor_unit(sensor_type).to_string(),
            })
        })
        .collect()
}

fn sensor_unit(sensor_type: &str) -> &'static str {
    match sensor_type.to_ascii_lowercase().as_str() {
        "temperature" => "°C",
        "load" | "control" | "level" => "%",
        "fan" => "RPM",
        "voltage" => "V",
        "current" => "A",
        "clock" => "MHz",
        "power" => "W",
        "data" => "GB",
        "smalldata" => "MB",
        "throughput" => "B/s",
        _ => "",
    }
}

/// Drive letters (`C:`) whose `DriveType` marks them as external.
pub fn external_drives(raw: &str) -> HashSet<String> {
    parse_records(raw, &["DeviceID", "DriveType"])
        .iter()
        .filter(|r| {
            r.u64("DriveType")
                .is_some_and(|t| EXTERNAL_DRIVE_TYPES.contains(&t))
        })
        .filter_map(|r| r.get("DeviceID").map(str::to_ascii_uppercase))
        .collect()
}

fn mark_external(disks: &mut [DiskStatus], external: &HashSet<String>) {
    for disk in disks {
        if let Some(letter) = disk.mount.get(..2) {
            if external.contains(&letter.to_ascii_uppercase()) {
                disk.external = true;
            }
        }
    }
}

pub fn parse_disk_io(raw: &str) -> Result<DiskIoCounters, CollectError> {
    let fields = parse_fields(raw, &["DiskReadBytesPersec", "DiskWriteBytesPersec"]);
    match (
        fields.u64("DiskReadBytesPersec"),
        fields.u64("DiskWriteBytesPersec"),
    ) {
        (Some(read_bytes), Some(write_bytes)) => Ok(DiskIoCounters {
            device: "_Total".to_string(),
            read_bytes,
            write_bytes,
        }),
        _ => Err(CollectError::NoData("disk I/O")),
    }
}

pub fn parse_memory_details(raw: &str) -> MemoryDetails {
    let fields = parse_fields(
        raw,
        &["Committed", "CommittedLimit", "PagedPool", "NonPagedPool"],
    );
    MemoryDetails {
        // Win32_OperatingSystem reports KiB.
        committed_bytes: fields.u64("Committed").unwrap_or(0).saturating_mul(1024),
        committed_limit_bytes: fields
            .u64("CommittedLimit")
            .unwrap_or(0)
            .saturating_mul(1024),
        paged_pool_bytes: fields.u64("PagedPool").unwrap_or(0),
        non_paged_pool_bytes: fields.u64("NonPagedPool").unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::disks::GIB;
    use crate::collectors::runner::testing::ScriptedRunner;

    fn backend(runner: ScriptedRunner) -> WindowsBackend {
        WindowsBackend::new(
            Arc::new(runner),
            ToolTimeouts::default(),
            DiskLimits::default(),
        )
    }

    fn fixed_partitions() -> Vec<Partition> {
        vec![
            Partition {
                mount: "C:\\".to_string(),
                device: "C:".to_string(),
                fs_type: "NTFS".to_string(),
                total_bytes: 500 * GIB,
                available_bytes: 200 * GIB,
                removable: false,
            },
            Partition {
                mount: "E:\\".to_string(),
                device: "E:".to_string(),
                fs_type: "FAT32".to_string(),
                total_bytes: 32 * GIB,
                available_bytes: 30 * GIB,
                removable: false,
            },
        ]
    }

    #[test]
    fn battery_from_flat_output() {
        let raw = "EstimatedChargeRemaining: 42\nBatteryStatus: 1\nEstimatedRunTime: 125\n";
        let batteries = parse_batteries(raw);
        assert_eq!(batteries.len(), 1);
        let b = &batteries[0];
        assert_eq!(b.percent, 42.0);
        assert_eq!(b.state.as_str(), "Discharging");
        assert_eq!(b.time_left, "2:05");
        assert_eq!(b.health, BatteryHealth::Unknown);
        assert_eq!(b.capacity_percent, 0);
        assert_eq!(b.cycle_count, 0);
    }

    #[test]
    fn battery_health_from_json() {
        let raw = r#"{
    "EstimatedChargeRemaining":  100,
    "BatteryStatus":  2,
    "EstimatedRunTime":  71582788,
    "DesignCapacity":  2000,
    "FullChargeCapacity":  1300
}"#;
        let b = &parse_batteries(raw)[0];
        assert_eq!(b.state, BatteryState::AcPower);
        assert_eq!(b.time_left, "");
        assert_eq!(b.health, BatteryHealth::Poor);
        assert_eq!(b.capacity_percent, 65);
    }

    #[test]
    fn unparseable_percent_keeps_default_and_later_fields() {
        let raw = "EstimatedChargeRemaining: N/A\nBatteryStatus: 3\nEstimatedRunTime: 45\n";
        let b = &parse_batteries(raw)[0];
        assert_eq!(b.percent, 0.0);
        assert_eq!(b.state, BatteryState::FullyCharged);
        assert_eq!(b.time_left, "0:45");
    }

    #[test]
    fn battery_array_yields_one_status_each() {
        let raw = r#"[
    {
        "EstimatedChargeRemaining":  80,
        "BatteryStatus":  1
    },
    {
        "EstimatedChargeRemaining":  60,
        "BatteryStatus":  2
    }
]"#;
        let batteries = parse_batteries(raw);
        assert_eq!(batteries.len(), 2);
        assert_eq!(batteries[0].percent, 80.0);
        assert_eq!(batteries[1].percent, 60.0);
        assert_eq!(batteries[1].state, BatteryState::AcPower);
    }

    #[test]
    fn empty_battery_output_has_no_records() {
        assert!(parse_batteries("").is_empty());
        assert!(parse_batteries("EstimatedChargeRemaining: 0\n").is_empty());
    }

    #[test]
    fn minutes_formatting() {
        assert_eq!(format_minutes(125), "2:05");
        assert_eq!(format_minutes(59), "0:59");
        assert_eq!(format_minutes(60), "1:00");
        assert_eq!(format_minutes(0), "");
        assert_eq!(format_minutes(-3), "");
    }

    #[test]
    fn thermal_conversion() {
        let c = tenths_kelvin_to_celsius(3010.0).unwrap();
        assert!((c - 27.85).abs() < 1e-9);
        let c = tenths_kelvin_to_celsius(3000.0).unwrap();
        assert!((c - 26.85).abs() < 1e-9);
        assert_eq!(tenths_kelvin_to_celsius(0.0), None);
        assert_eq!(tenths_kelvin_to_celsius(5000.0), None);
        assert_eq!(tenths_kelvin_to_celsius(2731.5), Some(0.0));
        assert_eq!(tenths_kelvin_to_celsius(4040.0), None);
    }

    #[test]
    fn thermal_from_json() {
        let t = parse_thermal("{\n    \"CurrentTemperature\":  3182\n}");
        assert!(t.available);
        assert!((t.cpu_celsius - 45.05).abs() < 1e-9);
        assert_eq!(parse_thermal(""), ThermalStatus::default());
    }

    #[test]
    fn sensor_lines() {
        let raw = "Temperature|CPU Package|54.5\nLoad|GPU Core|12\nbroken\nFan|Fan #1|n/a\n";
        let sensors = parse_sensor_lines(raw);
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].label, "CPU Package (Temperature)");
        assert_eq!(sensors[0].unit, "°C");
        assert_eq!(sensors[1].unit, "%");
    }

    #[test]
    fn drive_types() {
        let raw = r#"[
    {
        "DeviceID":  "C:",
        "DriveType":  3
    },
    {
        "DeviceID":  "D:",
        "DriveType":  5
    },
    {
        "DeviceID":  "e:",
        "DriveType":  2
    }
]"#;
        let external = external_drives(raw);
        assert_eq!(external.len(), 2);
        assert!(external.contains("D:"));
        assert!(external.contains("E:"));
    }

    #[test]
    fn disk_io_counters() {
        let raw = "{\n \"DiskReadBytesPersec\": 1048576,\n \"DiskWriteBytesPersec\": 2097152\n}";
        let c = parse_disk_io(raw).unwrap();
        assert_eq!(c.read_bytes, 1_048_576);
        assert_eq!(c.write_bytes, 2_097_152);
        assert_eq!(parse_disk_io("{}"), Err(CollectError::NoData("disk I/O")));
    }

    #[test]
    fn memory_units() {
        let raw = "Committed=1024\nCommittedLimit=2048\nPagedPool=4096\nNonPagedPool=oops\n";
        let m = parse_memory_details(raw);
        assert_eq!(m.committed_bytes, 1024 * 1024);
        assert_eq!(m.committed_limit_bytes, 2048 * 1024);
        assert_eq!(m.paged_pool_bytes, 4096);
        assert_eq!(m.non_paged_pool_bytes, 0);
    }

    #[tokio::test]
    async fn missing_powershell_short_circuits() {
        let runner = ScriptedRunner {
            available: false,
            ..ScriptedRunner::default()
        };
        let b = backend(runner);
        let err = b.collect_batteries().await.unwrap_err();
        assert!(matches!(err, CollectError::ToolUnavailable { .. }));
        assert_eq!(b.collect_thermal().await, ThermalStatus::default());
        assert_eq!(b.collect_memory_details().await, MemoryDetails::default());
    }

    #[tokio::test]
    async fn battery_without_records_is_no_data() {
        let b = backend(ScriptedRunner::new().reply("Win32_Battery", ""));
        assert_eq!(
            b.collect_batteries().await,
            Err(CollectError::NoData("battery"))
        );
    }

    #[tokio::test]
    async fn battery_timeout_propagates() {
        let timeout = CollectError::Timeout {
            tool: POWERSHELL.to_string(),
            after: Duration::from_secs(3),
        };
        let b = backend(ScriptedRunner::new().fail("Win32_Battery", timeout.clone()));
        assert_eq!(b.collect_batteries().await, Err(timeout));
    }

    #[tokio::test]
    async fn disks_are_annotated_from_drive_types() {
        let runner = ScriptedRunner::new().reply(
            "Win32_LogicalDisk",
            "{\n \"DeviceID\": \"E:\",\n \"DriveType\": 2\n}",
        );
        let mut b = backend(runner);
        b.partitions = fixed_partitions;
        let disks = b.collect_disks().await.unwrap();
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[0].mount, "C:\\");
        assert!(!disks[0].external);
        assert!(disks[1].external);
    }

    #[tokio::test]
    async fn annotation_failure_still_returns_disks() {
        let runner = ScriptedRunner::new().fail(
            "Win32_LogicalDisk",
            CollectError::Timeout {
                tool: POWERSHELL.to_string(),
                after: Duration::from_secs(2),
            },
        );
        let mut b = backend(runner);
        b.partitions = fixed_partitions;
        let disks = b.collect_disks().await.unwrap();
        assert_eq!(disks.len(), 2);
        assert!(disks.iter().all(|d| !d.external));
    }

    #[tokio::test]
    async fn empty_disk_list_skips_annotation_query() {
        let runner = Arc::new(ScriptedRunner::new());
        let mut b = WindowsBackend::new(
            runner.clone(),
            ToolTimeouts::default(),
            DiskLimits::default(),
        );
        b.partitions = Vec::new;
        assert!(b.collect_disks().await.unwrap().is_empty());
        assert_eq!(runner.call_count(), 0);
    }
}
