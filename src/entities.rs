use serde::Serialize;
use std::collections::BTreeMap;

/// Core system information and resource utilization
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SystemStats {
    pub system: SystemInfo,
    pub firmware: Firmware,
    pub uptime: Uptime,
    pub cpu: Cpu,
    pub memory: Memory,
    /// Network interfaces keyed by interface name (`eth0`, `eth1`, ...)
    pub nics: BTreeMap<String, Nic>,
    /// Configured DNS servers
    pub dns: Vec<String>,
    /// System fans keyed by fan name (`sysfan0`, `sysfan1`, ...)
    pub sysfans: BTreeMap<String, SysFan>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SystemInfo {
    pub name: String,
    pub model: String,
    pub serial_number: String,
    pub temp_c: i64,
    pub temp_f: i64,
    pub timezone: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Firmware {
    pub version: String,
    pub build: String,
    pub patch: String,
    pub build_time: String,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uptime {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

/// Processor information, model and temperatures are not reported by every firmware
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Cpu {
    pub model: Option<String>,
    pub usage_percent: f64,
    pub temp_c: Option<i64>,
    pub temp_f: Option<i64>,
}

/// Memory figures in megabytes
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Memory {
    pub total: f64,
    pub free: f64,
}

/// Network interface details
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Nic {
    pub link_status: LinkStatus,
    /// Maximum link speed in Mbit/s
    pub max_speed: i64,
    pub ip: String,
    pub mask: String,
    pub mac: String,
    pub usage: String,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub err_packets: u64,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Up,
    Down,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysFan {
    /// Fan speed in RPM
    pub speed: i64,
    pub status: FanStatus,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FanStatus {
    Ok,
    Alert,
}

/// Overall system health as reported by the device (e.g. "good")
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SystemHealth {
    pub status: String,
}

/// SMART information about a single drive
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    pub drive_number: String,
    pub health: String,
    pub temp_c: Option<i64>,
    pub temp_f: Option<i64>,
    /// Capacity as formatted by the device, e.g. "2.73 TB"
    pub capacity: String,
    pub model: String,
    pub serial: String,
    #[serde(rename = "type")]
    pub disk_type: DiskType,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiskType {
    Hdd,
    Ssd,
}

/// Storage volume and the shared folders it holds
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub id: String,
    pub label: String,
    /// Free space in bytes, zero when the device reports no usage for the volume
    pub free_size: i64,
    /// Total space in bytes, zero when the device reports no usage for the volume
    pub total_size: i64,
    pub folders: Vec<Folder>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub sharename: String,
    /// Used space in bytes
    pub used_size: i64,
}

/// Current traffic of a network interface
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    /// Received bytes per second
    pub rx: u64,
    /// Transmitted bytes per second
    pub tx: u64,
    /// Whether this is the default gateway interface
    pub is_default: bool,
}

/// Firmware version available for installation
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FirmwareUpdate {
    pub new_version: String,
}

/// Volumes keyed by label
pub type Volumes = BTreeMap<String, Volume>;

/// Disks keyed by drive number
pub type DiskHealth = BTreeMap<String, Disk>;

/// Interfaces keyed by interface id (`eth0`, `wlan0`, ...)
pub type Bandwidth = BTreeMap<String, Interface>;
