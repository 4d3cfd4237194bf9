//! Time windows applied before aggregation

use serde::Serialize;
use std::fmt;

const MINUTE_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// Unrecognized label or a zero-length lookback
    InvalidWindow(String),
}

impl fmt::Display for WindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowError::InvalidWindow(label) => write!(f, "Invalid window: {:?}", label),
        }
    }
}

impl std::error::Error for WindowError {}

/// Which movements an aggregation covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowSpec {
    /// Movements with timestamp >= now - minutes
    Relative { minutes: u32 },
    AllTime,
}

impl WindowSpec {
    pub fn relative(minutes: u32) -> Result<Self, WindowError> {
        if minutes == 0 {
            return Err(WindowError::InvalidWindow("0 minutes".to_string()));
        }
        Ok(WindowSpec::Relative { minutes })
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match self {
            WindowSpec::Relative { minutes } => Some(i64::from(*minutes) * MINUTE_MS),
            WindowSpec::AllTime => None,
        }
    }

    /// Inclusive lower timestamp bound at `now_ms`, `None` for all time
    pub fn cutoff(&self, now_ms: i64) -> Option<i64> {
        self.duration_ms().map(|d| now_ms - d)
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowSpec::Relative { minutes } => write!(f, "last {} minutes", minutes),
            WindowSpec::AllTime => f.write_str("all time"),
        }
    }
}

/// User-selectable window labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowLabel {
    Min15,
    Min30,
    Hour1,
    Hour3,
    AllDay,
    AllTime,
}

impl WindowLabel {
    /// Used when a requested label cannot be resolved
    pub const FALLBACK: WindowLabel = WindowLabel::Min15;

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowLabel::Min15 => "15 minutes",
            WindowLabel::Min30 => "30 minutes",
            WindowLabel::Hour1 => "1 hour",
            WindowLabel::Hour3 => "3 hours",
            WindowLabel::AllDay => "all day",
            WindowLabel::AllTime => "all time",
        }
    }

    pub fn spec(&self) -> WindowSpec {
        match self {
            WindowLabel::Min15 => WindowSpec::Relative { minutes: 15 },
            WindowLabel::Min30 => WindowSpec::Relative { minutes: 30 },
            WindowLabel::Hour1 => WindowSpec::Relative { minutes: 60 },
            WindowLabel::Hour3 => WindowSpec::Relative { minutes: 180 },
            WindowLabel::AllDay => WindowSpec::Relative { minutes: 1440 },
            WindowLabel::AllTime => WindowSpec::AllTime,
        }
    }

    /// Case-insensitive; accepts an optional "last " prefix and short forms (15m, 1h, 24h)
    pub fn from_str(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase();
        let normalized = normalized.strip_prefix("last ").unwrap_or(&normalized);

        match normalized {
            "15 minutes" | "15 min" | "15m" => Some(WindowLabel::Min15),
            "30 minutes" | "30 min" | "30m" => Some(WindowLabel::Min30),
            "1 hour" | "hour" | "60 minutes" | "1h" => Some(WindowLabel::Hour1),
            "3 hours" | "180 minutes" | "3h" => Some(WindowLabel::Hour3),
            "all day" | "day" | "24 hours" | "1440 minutes" | "24h" => Some(WindowLabel::AllDay),
            "all time" | "all" => Some(WindowLabel::AllTime),
            _ => None,
        }
    }

    pub fn all() -> [WindowLabel; 6] {
        [
            WindowLabel::Min15,
            WindowLabel::Min30,
            WindowLabel::Hour1,
            WindowLabel::Hour3,
            WindowLabel::AllDay,
            WindowLabel::AllTime,
        ]
    }
}

/// Resolve a label to a window, failing on anything unrecognized
pub fn parse_window_label(label: &str) -> Result<WindowSpec, WindowError> {
    WindowLabel::from_str(label)
        .map(|l| l.spec())
        .ok_or_else(|| WindowError::InvalidWindow(label.to_string()))
}
