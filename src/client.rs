use crate::client::QnapError::*;
use crate::entities::{
    Bandwidth, Cpu, Disk, DiskHealth, DiskType, FanStatus, Firmware, FirmwareUpdate, Folder,
    Interface, LinkStatus, Memory, Nic, SysFan, SystemHealth, SystemInfo, SystemStats, Uptime,
    Volume, Volumes,
};
use crate::session::{Credentials, SessionManager};
use crate::transport::Transport;
use crate::utils::{
    fan_status_field, indexed_field, interface_name, parse_optional, parse_required, per_second,
    required, required_string,
};
use crate::xml::{Document, Value};
use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::env;
use thiserror::Error;

const SYSTEM_STATS_PATH: &str = "management/manaRequest.cgi?subfunc=sysinfo&hd=no&multicpu=1";
const SYSTEM_HEALTH_PATH: &str = "management/manaRequest.cgi?subfunc=sysinfo&sysHealth=1";
const VOLUMES_PATH: &str =
    "management/chartReq.cgi?chart_func=disk_usage&disk_select=all&include=all";
const SMART_DISK_HEALTH_PATH: &str = "disk/qsmart.cgi?func=all_hd_data";
const BANDWIDTH_PATH: &str = "management/chartReq.cgi?chart_func=QSM40bandwidth";
/// Bandwidth query used by firmware older than QTS 4.5.4
const LEGACY_BANDWIDTH_PATH: &str = "management/chartReq.cgi?chart_func=bandwidth";
const FIRMWARE_UPDATE_PATH: &str = "sys/sysRequest.cgi?subfunc=firm_update";
const EXTERNAL_DEVICES_PATH: &str = "devices/devRequest.cgi";
const EXTERNAL_STORAGE_PATH: &str = "disk/disk_manage.cgi";

/// How many times a request is repeated after the device rejected its session
const AUTH_RETRIES: usize = 1;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Custom error types for the [`QnapStats`] client
#[derive(Error, Debug)]
pub enum QnapError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Network request error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("XML parsing error: {0}")]
    Parse(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Environment variable error: {0}")]
    Environment(#[from] env::VarError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Request method of a call going through the request executor
#[derive(Clone, Copy)]
enum Method<'a> {
    Get,
    Post(&'a [(&'a str, &'a str)]),
}

/// QNAP statistics client
///
/// Every operation performs a fresh request. The session is created on the
/// first request and renewed whenever the device rejects it, so calling
/// [`Self::authorize()`] up front is optional.
pub struct QnapStats {
    transport: Transport,
    session: SessionManager,
}

impl QnapStats {
    /// Creates a new `QnapStats` client with default settings
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Username, password, or host is empty
    /// - The HTTP client cannot be created
    pub fn new(host: String, port: u16, username: String, password: String) -> Result<Self> {
        Self::builder()
            .host(host)
            .port(port)
            .username(username)
            .password(password)
            .build()
    }

    /// Creates a new `QnapStats` client with a builder pattern
    #[must_use]
    pub fn builder() -> QnapStatsBuilder {
        QnapStatsBuilder::default()
    }

    /// Logs in unless a valid session is already held
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Network request fails
    /// - The device rejects the credentials
    pub async fn authorize(&self) -> Result<()> {
        self.session
            .ensure_session(&self.transport)
            .await
            .context("Failed to authorize")?;
        Ok(())
    }

    /// Whether a session token is currently held
    pub async fn is_authorized(&self) -> bool {
        self.session.is_authorized().await
    }

    /// Obtains core system information and resource utilization
    ///
    /// Returns `None` if the device does not support the query.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Network request fails
    /// - Session cannot be established
    /// - Response is malformed or misses a required field
    pub async fn get_system_stats(&self) -> Result<Option<SystemStats>> {
        let response = self
            .get_url(SYSTEM_STATS_PATH, &["DNS_LIST"])
            .await
            .context("Failed to get system stats")?;

        response
            .map(|response| parse_system_stats(&response))
            .transpose()
            .context("Failed to get system stats")
    }

    /// Obtains the system's overall health
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Network request fails
    /// - Session cannot be established
    /// - Response is malformed
    pub async fn get_system_health(&self) -> Result<Option<SystemHealth>> {
        let response = self
            .get_url(SYSTEM_HEALTH_PATH, &[])
            .await
            .context("Failed to get system health")?;

        Ok(response.and_then(|response| {
            response
                .path(&["func", "ownContent", "sysHealth"])
                .and_then(|health| health.text("status"))
                .map(|status| SystemHealth {
                    status: status.to_string(),
                })
        }))
    }

    /// Obtains SMART information about each disk, keyed by drive number
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Network request fails
    /// - Session cannot be established
    /// - Response is malformed or misses a required field
    pub async fn get_smart_disk_health(&self) -> Result<Option<DiskHealth>> {
        let response = self
            .get_url(SMART_DISK_HEALTH_PATH, &["entry"])
            .await
            .context("Failed to get SMART disk health")?;

        response
            .map(|response| parse_disk_health(&response))
            .transpose()
            .context("Failed to get SMART disk health")
    }

    /// Obtains information about volumes and shared folders, keyed by volume label
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Network request fails
    /// - Session cannot be established
    /// - Response is malformed or misses a required field
    pub async fn get_volumes(&self) -> Result<Option<Volumes>> {
        let response = self
            .get_url(VOLUMES_PATH, &["volume", "volumeUse", "folder_element"])
            .await
            .context("Failed to get volumes")?;

        response
            .map(|response| parse_volumes(&response))
            .transpose()
            .context("Failed to get volumes")
    }

    /// Obtains the current bandwidth usage per interface
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Network request fails
    /// - Session cannot be established
    /// - Response is malformed or misses a required field
    pub async fn get_bandwidth(&self) -> Result<Option<Bandwidth>> {
        let mut response = self
            .get_url(BANDWIDTH_PATH, &["item"])
            .await
            .context("Failed to get bandwidth")?;

        if response
            .as_ref()
            .is_some_and(|response| !response.contains("bandwidth_info"))
        {
            debug!("No bandwidth_info in response, using legacy bandwidth query");
            response = self
                .get_url(LEGACY_BANDWIDTH_PATH, &[])
                .await
                .context("Failed to get bandwidth")?;
        }

        response
            .map(|response| parse_bandwidth(&response))
            .transpose()
            .context("Failed to get bandwidth")
    }

    /// Gets the firmware version available for update, if any
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Network request fails
    /// - Session cannot be established
    /// - Response is malformed
    pub async fn get_firmware_update(&self) -> Result<Option<FirmwareUpdate>> {
        let response = self
            .get_url(FIRMWARE_UPDATE_PATH, &[])
            .await
            .context("Failed to get firmware update")?;

        Ok(response.and_then(|response| {
            response
                .path(&["func", "ownContent"])
                .and_then(|content| content.text("newVersion"))
                .map(|version| FirmwareUpdate {
                    new_version: version.to_string(),
                })
        }))
    }

    /// Lists external drives connected to the device
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Network request fails
    /// - Session cannot be established
    /// - Response is malformed
    pub async fn list_external_drives(&self) -> Result<Option<Vec<Document>>> {
        let response = self
            .post_url(
                EXTERNAL_DEVICES_PATH,
                &[("func", "getExternalDev")],
                &["externalDevice"],
            )
            .await
            .context("Failed to list external drives")?;

        let drives: Vec<Document> = response
            .as_ref()
            .and_then(|response| response.path(&["func", "ownContent"]))
            .map(|content| {
                content
                    .list("externalDevice")
                    .iter()
                    .filter_map(Value::as_document)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(drives).filter(|drives| !drives.is_empty()))
    }

    /// Gets volume information of the connected external drives
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Network request fails
    /// - Session cannot be established
    /// - Response is malformed
    pub async fn get_external_storage_info(&self) -> Result<Option<Value>> {
        let response = self
            .post_url(EXTERNAL_STORAGE_PATH, &[("func", "external_get_all")], &[])
            .await
            .context("Failed to get external storage information")?;

        Ok(response
            .as_ref()
            .and_then(|response| response.get("Disk_Vol"))
            .filter(|volumes| **volumes != Value::Empty)
            .cloned())
    }

    async fn get_url(&self, path: &str, repeatable: &[&str]) -> Result<Option<Document>, QnapError> {
        self.execute(path, Method::Get, repeatable).await
    }

    async fn post_url(
        &self,
        path: &str,
        form: &[(&str, &str)],
        repeatable: &[&str],
    ) -> Result<Option<Document>, QnapError> {
        self.execute(path, Method::Post(form), repeatable).await
    }

    /// Sends an authenticated request, logging in again once if the device
    /// reports the session as invalid
    async fn execute(
        &self,
        path: &str,
        method: Method<'_>,
        repeatable: &[&str],
    ) -> Result<Option<Document>, QnapError> {
        for attempt in 0..=AUTH_RETRIES {
            let sid = self.session.ensure_session(&self.transport).await?;

            let response = match method {
                Method::Get => {
                    self.transport
                        .get(path, &[("sid", sid.as_str())], repeatable)
                        .await?
                }
                Method::Post(form) => {
                    let mut form: Vec<(&str, &str)> = form.to_vec();
                    form.push(("sid", sid.as_str()));
                    self.transport.post(path, &form, repeatable).await?
                }
            };

            match response {
                Some(document) if auth_failed(&document) => {
                    warn!(
                        "Session rejected on {path} (attempt {}), logging in again",
                        attempt + 1
                    );
                    self.session.invalidate(&sid).await;
                }
                other => return Ok(other),
            }
        }

        Err(Auth(format!(
            "Session rejected on {path} even after logging in again"
        )))
    }
}

fn auth_failed(response: &Document) -> bool {
    response.text("authPassed") == Some("0")
}

fn parse_system_stats(response: &Document) -> Result<SystemStats, QnapError> {
    let root = response
        .path(&["func", "ownContent", "root"])
        .ok_or_else(|| InvalidResponse("missing `func/ownContent/root`".into()))?;
    let model = response
        .child("model")
        .ok_or_else(|| InvalidResponse("missing `model`".into()))?;
    let firmware = response
        .child("firmware")
        .ok_or_else(|| InvalidResponse("missing `firmware`".into()))?;

    Ok(SystemStats {
        system: SystemInfo {
            name: required_string(root, "server_name")?,
            model: required_string(model, "displayModelName")?,
            serial_number: required_string(root, "serial_number")?,
            temp_c: parse_required(root, "sys_tempc")?,
            temp_f: parse_required(root, "sys_tempf")?,
            timezone: required_string(root, "timezone")?,
        },
        firmware: Firmware {
            version: required_string(firmware, "version")?,
            build: required_string(firmware, "build")?,
            patch: required_string(firmware, "patch")?,
            build_time: required_string(firmware, "buildTime")?,
        },
        uptime: Uptime {
            days: parse_required(root, "uptime_day")?,
            hours: parse_required(root, "uptime_hour")?,
            minutes: parse_required(root, "uptime_min")?,
            seconds: parse_required(root, "uptime_sec")?,
        },
        cpu: Cpu {
            model: root.text("cpu_model").map(str::to_string),
            usage_percent: parse_percent(required(root, "cpu_usage")?)?,
            temp_c: parse_optional(root, "cpu_tempc")?,
            temp_f: parse_optional(root, "cpu_tempf")?,
        },
        memory: Memory {
            total: parse_required(root, "total_memory")?,
            free: parse_required(root, "free_memory")?,
        },
        nics: parse_nics(root)?,
        dns: root
            .child("dnsInfo")
            .map(|dns| {
                dns.list("DNS_LIST")
                    .iter()
                    .filter_map(Value::as_text)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        sysfans: parse_sysfans(root)?,
    })
}

fn parse_percent(value: &str) -> Result<f64, QnapError> {
    value
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse()
        .map_err(|_| InvalidResponse(format!("field `cpu_usage` is not a percentage: {value}")))
}

/// Interfaces are described by `<field><index>` elements, index running from 1 to `nic_cnt`
fn parse_nics(root: &Document) -> Result<BTreeMap<String, Nic>, QnapError> {
    let count: usize = parse_required(root, "nic_cnt")?;
    let mut nics = BTreeMap::new();

    for index in 1..=count {
        let field = |prefix: &str| indexed_field(prefix, index);
        let link_status = if required_string(root, &field("eth_status"))? == "1" {
            LinkStatus::Up
        } else {
            LinkStatus::Down
        };

        nics.insert(
            interface_name(index),
            Nic {
                link_status,
                max_speed: parse_required(root, &field("eth_max_speed"))?,
                ip: required_string(root, &field("eth_ip"))?,
                mask: required_string(root, &field("eth_mask"))?,
                mac: required_string(root, &field("eth_mac"))?,
                usage: required_string(root, &field("eth_usage"))?,
                rx_packets: parse_required(root, &field("rx_packet"))?,
                tx_packets: parse_required(root, &field("tx_packet"))?,
                err_packets: parse_required(root, &field("err_packet"))?,
            },
        );
    }

    Ok(nics)
}

fn parse_sysfans(root: &Document) -> Result<BTreeMap<String, SysFan>, QnapError> {
    let count: usize = parse_optional(root, "sysfan_count")?.unwrap_or_default();
    let mut fans = BTreeMap::new();

    for index in 1..=count {
        let status: i64 = parse_required(root, &fan_status_field(index))?;
        fans.insert(
            format!("sysfan{}", index - 1),
            SysFan {
                speed: parse_required(root, &indexed_field("sysfan", index))?,
                status: if status == -1 {
                    FanStatus::Alert
                } else {
                    FanStatus::Ok
                },
            },
        );
    }

    Ok(fans)
}

fn parse_disk_health(response: &Document) -> Result<DiskHealth, QnapError> {
    let mut disks = DiskHealth::new();
    let Some(info) = response.child("Disk_Info") else {
        return Ok(disks);
    };

    for disk in info.list("entry").iter().filter_map(Value::as_document) {
        match parse_disk(disk) {
            Ok(Some(disk)) => {
                disks.insert(disk.drive_number.clone(), disk);
            }
            // Empty drive bays are listed without a model
            Ok(None) => {}
            Err(e) => warn!("Skipping disk entry: {e}"),
        }
    }

    Ok(disks)
}

fn parse_disk(disk: &Document) -> Result<Option<Disk>, QnapError> {
    let Some(model) = disk.text("Model") else {
        return Ok(None);
    };

    let drive_number = required_string(disk, "HDNo")?;
    let temperature = |name: &str| {
        let temperature = disk.child("Temperature")?;
        parse_optional::<i64>(temperature, name)
            .inspect_err(|e| warn!("Ignoring temperature of disk {drive_number}: {e}"))
            .ok()
            .flatten()
    };
    let is_ssd = disk
        .text("hd_is_ssd")
        .and_then(|value| value.parse::<i64>().ok())
        .is_some_and(|value| value != 0);

    Ok(Some(Disk {
        health: required_string(disk, "Health")?,
        temp_c: temperature("oC"),
        temp_f: temperature("oF"),
        capacity: required_string(disk, "Capacity")?,
        model: model.to_string(),
        serial: required_string(disk, "Serial")?,
        disk_type: if is_ssd { DiskType::Ssd } else { DiskType::Hdd },
        drive_number,
    }))
}

fn parse_volumes(response: &Document) -> Result<Volumes, QnapError> {
    let mut volumes = Volumes::new();
    let (Some(volume_list), Some(usage_list)) =
        (response.child("volumeList"), response.child("volumeUseList"))
    else {
        return Ok(volumes);
    };

    let mut labels: HashMap<String, String> = HashMap::new();
    for volume in volume_list.list("volume").iter().filter_map(Value::as_document) {
        let id = required_string(volume, "volumeValue")?;
        let label = volume
            .text("volumeLabel")
            .map_or_else(|| format!("Volume {id}"), str::to_string);

        labels.insert(id.clone(), label.clone());
        volumes.insert(
            label.clone(),
            Volume {
                id,
                label,
                free_size: 0,
                total_size: 0,
                folders: Vec::new(),
            },
        );
    }

    for usage in usage_list.list("volumeUse").iter().filter_map(Value::as_document) {
        let id = required(usage, "volumeValue")?;
        let Some(volume) = labels.get(id).and_then(|label| volumes.get_mut(label)) else {
            debug!("Skipping usage of system reserved volume {id}");
            continue;
        };

        let sizes = parse_required::<i64>(usage, "free_size")
            .and_then(|free| Ok((free, parse_required::<i64>(usage, "total_size")?)));
        match sizes {
            Ok((free_size, total_size)) => {
                volume.free_size = free_size;
                volume.total_size = total_size;
            }
            Err(e) => {
                warn!("Skipping usage entry of volume {}: {e}", volume.label);
                continue;
            }
        }

        for folder in usage.list("folder_element") {
            match parse_folder(folder) {
                Ok(folder) => volume.folders.push(folder),
                Err(e) => warn!("Skipping folder entry of volume {}: {e}", volume.label),
            }
        }
    }

    Ok(volumes)
}

fn parse_folder(folder: &Value) -> Result<Folder, QnapError> {
    let folder = folder
        .as_document()
        .ok_or_else(|| InvalidResponse("folder entry has no fields".into()))?;

    Ok(Folder {
        sharename: required_string(folder, "sharename")?,
        used_size: parse_required(folder, "used_size")?,
    })
}

fn parse_bandwidth(response: &Document) -> Result<Bandwidth, QnapError> {
    let info = response
        .child("bandwidth_info")
        .ok_or_else(|| InvalidResponse("missing `bandwidth_info`".into()))?;
    let default = response
        .text("df_gateway")
        .or_else(|| info.text("df_gateway"));

    let mut interfaces: Vec<(String, &Document)> = Vec::new();
    if info.contains("item") {
        for item in info.list("item").iter().filter_map(Value::as_document) {
            interfaces.push((required_string(item, "id")?, item));
        }
    } else {
        // Legacy responses list the interface indexes and nest each interface under its id
        let ids = index_list(info, "eth_index_list", "eth")
            .into_iter()
            .chain(index_list(info, "wlan_index_list", "wlan"));
        for id in ids {
            let item = info
                .child(&id)
                .ok_or_else(|| InvalidResponse(format!("missing interface `{id}`")))?;
            interfaces.push((id, item));
        }
    }

    let mut bandwidth = Bandwidth::new();
    for (id, item) in interfaces {
        let name = item
            .text("dname")
            .or_else(|| item.text("name"))
            .ok_or_else(|| InvalidResponse(format!("interface `{id}` has no name")))?;

        let interface = Interface {
            name: name.to_string(),
            rx: per_second(parse_required(item, "rx")?),
            tx: per_second(parse_required(item, "tx")?),
            is_default: default == Some(id.as_str()),
        };
        bandwidth.insert(id, interface);
    }

    Ok(bandwidth)
}

/// Expands a comma separated index list such as `0,1` into interface ids `eth0`, `eth1`
fn index_list(info: &Document, field: &str, prefix: &str) -> Vec<String> {
    info.text(field)
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|index| !index.is_empty())
                .map(|index| format!("{prefix}{index}"))
                .collect()
        })
        .unwrap_or_default()
}

/// Builder for [`QnapStats`] client
#[derive(Default)]
pub struct QnapStatsBuilder {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    debug: bool,
    verify_ssl: Option<bool>,
    timeout: Option<u64>,
}

impl QnapStatsBuilder {
    /// Creates a builder from the `QNAP_HOST`, `QNAP_USERNAME`, `QNAP_PASSWORD`
    /// and optional `QNAP_PORT` environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is not set or the port is not a number
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::default()
            .host(env::var("QNAP_HOST").map_err(Environment)?)
            .username(env::var("QNAP_USERNAME").map_err(Environment)?)
            .password(env::var("QNAP_PASSWORD").map_err(Environment)?);

        if let Ok(port) = env::var("QNAP_PORT") {
            let port = port
                .parse()
                .map_err(|_| Configuration(format!("QNAP_PORT is not a valid port: {port}")))?;
            builder = builder.port(port);
        }

        Ok(builder)
    }

    /// Sets the host, optionally prefixed with `http://` or `https://`
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the port of the web management interface
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the username
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Logs session tokens, response headers and bodies at debug level
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Enables or disables TLS certificate verification
    #[must_use]
    pub fn verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = Some(verify_ssl);
        self
    }

    /// Sets the request timeout in milliseconds
    #[must_use]
    pub fn timeout(mut self, timeout_millis: u64) -> Self {
        self.timeout = Some(timeout_millis);
        self
    }

    /// Builds the [`QnapStats`] client
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required fields (host, username, password) are not provided or empty
    /// - The HTTP client cannot be created
    pub fn build(self) -> Result<QnapStats> {
        let host = self
            .host
            .ok_or_else(|| Configuration("Host is required".into()))?;
        let username = self
            .username
            .ok_or_else(|| Configuration("Username is required".into()))?;
        let password = self
            .password
            .ok_or_else(|| Configuration("Password is required".into()))?;

        if host.is_empty() {
            return Err(Configuration("Host cannot be empty".into()).into());
        }
        if username.is_empty() {
            return Err(Configuration("Username cannot be empty".into()).into());
        }
        if password.is_empty() {
            return Err(Configuration("Password cannot be empty".into()).into());
        }

        let port = self.port.unwrap_or(DEFAULT_PORT);
        let base_url = base_url(&host, port);
        debug!("Using base URL {base_url}");

        let transport = Transport::new(
            base_url,
            self.timeout.unwrap_or(DEFAULT_TIMEOUT_MS),
            self.verify_ssl.unwrap_or(true),
            self.debug,
        )?;

        Ok(QnapStats {
            transport,
            session: SessionManager::new(Credentials::new(username, &password)),
        })
    }
}

fn base_url(host: &str, port: u16) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{host}:{port}/cgi-bin/")
    } else {
        format!("http://{host}:{port}/cgi-bin/")
    }
}
