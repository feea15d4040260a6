use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::booking::DateRange;
use crate::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Listable,
    Unavailable,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Listable => "listable",
            VehicleStatus::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "listable" => Ok(VehicleStatus::Listable),
            "unavailable" => Ok(VehicleStatus::Unavailable),
            other => Err(CoreError::Internal(format!("unknown vehicle status '{}'", other))),
        }
    }
}

/// A rentable car. Read-only to the booking engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    pub id: Uuid,
    pub owner_id: String,
    pub model: String,
    pub plate_number: String,
    pub daily_rate: i64,
    pub status: VehicleStatus,
    pub available_from: DateTime<Utc>,
    pub available_until: DateTime<Utc>,
    pub airport_location: String,
}

impl Vehicle {
    pub fn is_listable(&self) -> bool {
        self.status == VehicleStatus::Listable
    }

    pub fn availability_window(&self) -> DateRange {
        DateRange { start: self.available_from, end: self.available_until }
    }

    /// Rental label shown on the gateway checkout page.
    pub fn order_name(&self) -> String {
        format!("{} rental", self.model)
    }
}
