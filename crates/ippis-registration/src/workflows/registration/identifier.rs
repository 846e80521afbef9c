use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::domain::RegistrationId;
use crate::config::RegistrationConfig;

/// Layout of the time-derived component of a registration id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdFormat {
    /// `PREFIX-yyyyMMddHHmmssSSS-NNNN`, lexicographically ordered by creation time.
    Sortable,
    /// `PREFIX-NNNNNN-NNNN` built from the last six digits of the millisecond clock.
    Compact,
}

impl IdFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sortable" | "timestamp" => Some(Self::Sortable),
            "compact" | "short" => Some(Self::Compact),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            IdFormat::Sortable => "sortable",
            IdFormat::Compact => "compact",
        }
    }
}

/// Builds human-readable registration ids from the clock plus a random suffix.
///
/// Uniqueness is best effort; the workflow retries on a store conflict.
#[derive(Debug, Clone)]
pub struct RegistrationIdGenerator {
    prefix: String,
    format: IdFormat,
}

impl RegistrationIdGenerator {
    const SUFFIX_RANGE: u16 = 10_000;

    pub fn new(prefix: impl Into<String>, format: IdFormat) -> Self {
        Self {
            prefix: prefix.into(),
            format,
        }
    }

    pub fn from_config(config: &RegistrationConfig) -> Self {
        Self::new(config.id_prefix.clone(), config.id_format)
    }

    pub fn format(&self) -> IdFormat {
        self.format
    }

    pub fn generate(&self) -> RegistrationId {
        self.generate_at(Utc::now(), &mut rand::thread_rng())
    }

    pub fn generate_at<R: Rng>(&self, now: DateTime<Utc>, rng: &mut R) -> RegistrationId {
        let stamp = match self.format {
            IdFormat::Sortable => now.format("%Y%m%d%H%M%S%3f").to_string(),
            IdFormat::Compact => format!("{:06}", now.timestamp_millis().rem_euclid(1_000_000)),
        };
        let suffix = rng.gen_range(0..Self::SUFFIX_RANGE);
        RegistrationId(format!("{}-{}-{:04}", self.prefix, stamp, suffix))
    }
}

impl Default for RegistrationIdGenerator {
    fn default() -> Self {
        Self::from_config(&RegistrationConfig::default())
    }
}
