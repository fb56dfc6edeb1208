//!# QNAP Stats Client
//!
//! A Rust client library for reading system statistics from QNAP NAS devices through
//! their web management CGI interface.
//!
//! ## Features
//!
//! - Session handling: automatic login, transparent re-login when the device drops the session
//! - System stats: model, firmware, uptime, CPU, memory, network interfaces, DNS and fans
//! - Overall system health and available firmware updates
//! - SMART disk health
//! - Volumes and shared folder usage
//! - Current bandwidth per interface
//! - External drives and their volumes
//!
//! Endpoints a device does not support return `Ok(None)` rather than an error.
//!
//! ## Usage example
//!
//! ```rust,no_run
//! use anyhow::Result;
//! use qnap_stats::client::QnapStats;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<()> {
//!     let qnap = QnapStats::builder()
//!         .host("https://nas.local")
//!         .port(443)
//!         .username("admin")
//!         .password("secret")
//!         .build()?;
//!
//!     if let Some(stats) = qnap.get_system_stats().await? {
//!         println!("{} running firmware {}", stats.system.model, stats.firmware.version);
//!     }
//!
//!     if let Some(volumes) = qnap.get_volumes().await? {
//!         for (label, volume) in volumes {
//!             println!("{label}: {} free of {}", volume.calculate_free(), volume.calculate_total());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod entities;
mod session;
mod transport;
pub mod utils;
pub mod xml;
