use crate::collectors::Snapshot;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatteryState {
    Discharging,
    #[serde(rename = "AC Power")]
    AcPower,
    #[serde(rename = "Fully Charged")]
    FullyCharged,
    Low,
    Critical,
    Unknown,
}

impl BatteryState {
    /// Maps the `Win32_Battery.BatteryStatus` code.
    pub fn from_wmi_code(code: i64) -> Self {
        match code {
            1 => Self::Discharging,
            2 => Self::AcPower,
            3 => Self::FullyCharged,
            4 => Self::Low,
            5 => Self::Critical,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discharging => "Discharging",
            Self::AcPower => "AC Power",
            Self::FullyCharged => "Fully Charged",
            Self::Low => "Low",
            Self::Critical => "Critical",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatteryHealth {
    Good,
    Fair,
    Poor,
    Unknown,
}

impl BatteryHealth {
    /// Classifies wear from the full-charge vs. design capacity.
    ///
    /// Returns the health together with the capacity percent, which is 0 when
    /// either input is missing.
    pub fn classify(design_capacity: i64, full_charge_capacity: i64) -> (Self, u32) {
        if design_capacity <= 0 || full_charge_capacity <= 0 {
            return (Self::Unknown, 0);
        }
        let capacity =
            (full_charge_capacity as f64 / design_capacity as f64 * 100.0).round() as u32;
        let health = if capacity >= 85 {
            Self::Good
        } else if capacity >= 70 {
            Self::Fair
        } else {
            Self::Poor
        };
        (health, capacity)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryStatus {
    pub percent: f64,
    pub state: BatteryState,
    /// `H:MM`, or empty when the estimate is unknown.
    pub time_left: String,
    pub health: BatteryHealth,
    pub cycle_count: u32,
    pub capacity_percent: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ThermalStatus {
    pub cpu_celsius: f64,
    pub available: bool,
}

impl ThermalStatus {
    pub fn celsius(value: f64) -> Self {
        Self {
            cpu_celsius: value,
            available: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub label: String,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskStatus {
    pub mount: String,
    pub device: String,
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub used_percent: f64,
    pub fs_type: String,
    pub external: bool,
}

/// Rates in MiB/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DiskIoStatus {
    pub read_rate: f64,
    pub write_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskIoCounters {
    pub device: String,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryDetails {
    pub committed_bytes: u64,
    pub committed_limit_bytes: u64,
    pub paged_pool_bytes: u64,
    pub non_paged_pool_bytes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct State {
    pub started_at_unix: i64,
    pub last_collect_timestamp_seconds: i64,
    pub backend: &'static str,
    pub snapshot: Option<Snapshot>,
}

impl State {
    pub fn new(now_unix: i64, backend: &'static str) -> Self {
        Self {
            started_at_unix: now_unix,
            backend,
            ..Self::default()
        }
    }

    pub fn update_collected(&mut self, now_unix: i64, snapshot: Snapshot) {
        self.last_collect_timestamp_seconds = now_unix;
        self.snapshot = Some(snapshot);
    }
}
