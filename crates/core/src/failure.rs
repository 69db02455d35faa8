//! Failure injection for exercising the pipeline's error handling.
//!
//! Each role has its own mode, configured per process. `None` is the
//! default and injects nothing. Probabilistic modes fire on a fraction of
//! calls; the fraction can be overridden with a rate in `[0, 1]`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Delay used by the worker's `slow` mode.
pub const SLOW_TICK_DELAY: Duration = Duration::from_secs(5);

/// Delay used by the retention worker's `timeout` mode.
pub const RETENTION_TIMEOUT_DELAY: Duration = Duration::from_secs(30);

/// Returns true with probability `rate`.
pub fn roll(rate: f64) -> bool {
    if rate >= 1.0 {
        true
    } else if rate <= 0.0 || rate.is_nan() {
        false
    } else {
        rand::random::<f64>() < rate
    }
}

/// Injected failure applied at the start of every worker tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerFailureMode {
    #[default]
    None,
    /// The tick fails and the worker exits immediately.
    Crash,
    /// Every tick is delayed by [`SLOW_TICK_DELAY`].
    Slow,
    /// Half of all ticks fail with a schema error.
    BadSchema,
}

impl WorkerFailureMode {
    pub fn default_rate(self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::BadSchema => 0.5,
            Self::Crash | Self::Slow => 1.0,
        }
    }
}

/// Injected failure applied at the start of every retention run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionFailureMode {
    #[default]
    None,
    /// Each run stalls for [`RETENTION_TIMEOUT_DELAY`] before purging.
    Timeout,
    /// Each run fails as if the store were unreachable.
    DbFail,
}

impl RetentionFailureMode {
    pub fn default_rate(self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Timeout | Self::DbFail => 1.0,
        }
    }
}

/// Injected failure applied to event ingestion requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFailureMode {
    #[default]
    None,
    /// 30% of requests fail with 500.
    #[serde(rename = "random_500")]
    Random500,
    /// Every request fails with 503.
    Db,
}

impl ApiFailureMode {
    pub fn default_rate(self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Random500 => 0.3,
            Self::Db => 1.0,
        }
    }
}

/// Error returned when parsing an unknown failure mode name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFailureMode(pub String);

impl fmt::Display for UnknownFailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown failure mode: {}", self.0)
    }
}

impl std::error::Error for UnknownFailureMode {}

macro_rules! failure_mode_names {
    ($ty:ty { $($name:literal => $variant:ident),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = UnknownFailureMode;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    "" => Ok(Self::None),
                    $($name => Ok(Self::$variant),)+
                    other => Err(UnknownFailureMode(other.to_string())),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

failure_mode_names!(WorkerFailureMode {
    "none" => None,
    "crash" => Crash,
    "slow" => Slow,
    "bad_schema" => BadSchema,
});

failure_mode_names!(RetentionFailureMode {
    "none" => None,
    "timeout" => Timeout,
    "db_fail" => DbFail,
});

failure_mode_names!(ApiFailureMode {
    "none" => None,
    "random_500" => Random500,
    "db" => Db,
});
