use crate::client::QnapError;
use crate::client::QnapError::InvalidResponse;
use crate::entities::{Folder, Uptime, Volume};
use crate::xml::Document;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use byte_unit::{Byte, UnitType};
use chrono::TimeDelta;
use std::str::FromStr;

/// Encodes a plaintext password the way `authLogin.cgi` expects it
#[must_use]
pub fn encode_password(password: &str) -> String {
    STANDARD.encode(password.as_bytes())
}

/// Name of the `index`-th (1-based) per-interface field, e.g. `eth_status` + 1 = `eth_status1`
#[must_use]
pub fn indexed_field(prefix: &str, index: usize) -> String {
    format!("{prefix}{index}")
}

/// Name of the `index`-th (1-based) fan status field, e.g. `sysfan1_stat`
#[must_use]
pub fn fan_status_field(index: usize) -> String {
    format!("sysfan{index}_stat")
}

/// Interface name for the `index`-th (1-based) NIC, which the device numbers from zero
#[must_use]
pub fn interface_name(index: usize) -> String {
    format!("eth{}", index.saturating_sub(1))
}

/// Converts a raw counter sampled over five seconds into a per-second rate, rounded to nearest
#[must_use]
pub fn per_second(raw: u64) -> u64 {
    raw.saturating_add(2) / 5
}

pub(crate) fn required<'a>(document: &'a Document, name: &str) -> Result<&'a str, QnapError> {
    document
        .text(name)
        .ok_or_else(|| InvalidResponse(format!("missing field `{name}`")))
}

/// Like [`required`] but an empty element yields an empty string
pub(crate) fn required_string(document: &Document, name: &str) -> Result<String, QnapError> {
    if document.contains(name) {
        Ok(document.text(name).unwrap_or_default().to_string())
    } else {
        Err(InvalidResponse(format!("missing field `{name}`")))
    }
}

pub(crate) fn parse_required<T: FromStr>(document: &Document, name: &str) -> Result<T, QnapError> {
    let value = required(document, name)?;
    value
        .parse()
        .map_err(|_| InvalidResponse(format!("field `{name}` is not a number: {value}")))
}

/// Parses an optional field, treating a missing element as `None`
pub(crate) fn parse_optional<T: FromStr>(
    document: &Document,
    name: &str,
) -> Result<Option<T>, QnapError> {
    document
        .text(name)
        .map(|value| {
            value
                .parse()
                .map_err(|_| InvalidResponse(format!("field `{name}` is not a number: {value}")))
        })
        .transpose()
}

fn human_size(bytes: i64) -> String {
    let size = Byte::from(u64::try_from(bytes).unwrap_or_default());
    format!("{:#.2}", size.get_appropriate_unit(UnitType::Decimal))
}

impl Volume {
    #[must_use]
    pub fn used_size(&self) -> i64 {
        self.total_size - self.free_size
    }

    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn used_percent(&self) -> f64 {
        if self.total_size <= 0 {
            return 0.0;
        }
        (self.used_size() as f64 / self.total_size as f64 * 100.0).round()
    }

    #[must_use]
    pub fn calculate_free(&self) -> String {
        human_size(self.free_size)
    }

    #[must_use]
    pub fn calculate_total(&self) -> String {
        human_size(self.total_size)
    }
}

impl Folder {
    #[must_use]
    pub fn calculate_used(&self) -> String {
        human_size(self.used_size)
    }
}

impl Uptime {
    #[must_use]
    pub fn total(&self) -> TimeDelta {
        TimeDelta::days(self.days)
            + TimeDelta::hours(self.hours)
            + TimeDelta::minutes(self.minutes)
            + TimeDelta::seconds(self.seconds)
    }
}
