//! Job categories.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Traffic class a job belongs to, used for track length limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficClass {
    Passenger,
    Freight,
}

/// Category of a job (train type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobCategory {
    Freight,
    /// Light engine / shunting move.
    Lis,
    Postal,
    Regional,
    FastRegional,
    Local,
    Intercity,
    Express,
    Direct,
    HighSpeed,
}

impl JobCategory {
    /// All categories, in display order.
    pub const ALL: [JobCategory; 10] = [
        JobCategory::Freight,
        JobCategory::Lis,
        JobCategory::Postal,
        JobCategory::Regional,
        JobCategory::FastRegional,
        JobCategory::Local,
        JobCategory::Intercity,
        JobCategory::Express,
        JobCategory::Direct,
        JobCategory::HighSpeed,
    ];

    /// Short label used in job names, e.g. "RV 2045".
    pub fn abbreviation(self) -> &'static str {
        match self {
            JobCategory::Freight => "FRT",
            JobCategory::Lis => "LIS",
            JobCategory::Postal => "P",
            JobCategory::Regional => "R",
            JobCategory::FastRegional => "RV",
            JobCategory::Local => "L",
            JobCategory::Intercity => "IC",
            JobCategory::Express => "EXP",
            JobCategory::Direct => "D",
            JobCategory::HighSpeed => "AV",
        }
    }

    /// Built-in dwell time at intermediate stops. Zero means transit.
    pub fn default_stop_mins(self) -> u32 {
        match self {
            JobCategory::Freight | JobCategory::Lis | JobCategory::Postal => 10,
            JobCategory::Regional | JobCategory::FastRegional | JobCategory::Local => 2,
            JobCategory::Intercity
            | JobCategory::Express
            | JobCategory::Direct
            | JobCategory::HighSpeed => 0,
        }
    }

    pub fn traffic_class(self) -> TrafficClass {
        match self {
            JobCategory::Freight | JobCategory::Lis | JobCategory::Postal => TrafficClass::Freight,
            _ => TrafficClass::Passenger,
        }
    }
}

impl fmt::Display for JobCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}
