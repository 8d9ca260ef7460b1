//! Document shapes written by the workload.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Collection holding entity records.
pub const ROBOTS: &str = "robots";

/// Collection holding catalog records (seed mode only).
pub const BRANDS: &str = "brands";

/// Repeating token of the filler written at insert time.
pub const INSERT_FILLER_TOKEN: &str = "payload.";

/// Repeating token of the filler written by the replace-update phase.
pub const REPLACE_FILLER_TOKEN: &str = "refresh.";

/// Upper bound (exclusive) of the generated `tasked` value.
pub const MAX_TASKED: i32 = 20;

/// Repeat `token` until the result is at least `size` bytes long.
pub fn filler(token: &str, size: usize) -> String {
    if size == 0 || token.is_empty() {
        return String::new();
    }
    token.repeat(size.div_ceil(token.len()))
}

/// Stats embedded in every robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub tasked: i32,
    pub battery: i32,
    pub under_maintenance: bool,
}

impl Stats {
    /// Stats for a robot with `tasked` assignments.
    pub fn for_tasked(tasked: i32) -> Self {
        let battery = 100 - tasked * 5;
        Self {
            tasked,
            battery,
            under_maintenance: battery > 25,
        }
    }

    /// Random stats with `tasked` drawn uniformly from `[0, MAX_TASKED)`.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self::for_tasked(rng.random_range(0..MAX_TASKED))
    }
}

/// Entity record benchmarked by every phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Robot {
    pub name: String,
    pub nickname: String,
    pub description: String,
    pub stats: Stats,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Robot {
    pub fn new(name: String, description: String, stats: Stats) -> Self {
        Self {
            nickname: name.clone(),
            name,
            description,
            stats,
            updated_at: Utc::now(),
        }
    }
}

/// Catalog record linking a SKU to a robot name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub name: String,
    pub sku: String,
}

/// Placeholder SKU: uppercase hex digest of an empty input.
///
/// Computed once per process and shared by every brand; it does not identify
/// the robot's content.
pub fn placeholder_sku() -> &'static str {
    static SKU: OnceLock<String> = OnceLock::new();
    SKU.get_or_init(|| hex::encode_upper(Sha256::new().finalize()))
}
