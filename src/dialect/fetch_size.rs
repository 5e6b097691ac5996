//! Fetch-size rules for streaming result sets.

use serde::Serialize;

/// Driver tag used by the bundled sqlx pools.
pub const SQLX_DRIVER: &str = "sqlx";

/// Driver tag for JDBC-style cursor drivers.
pub const JDBC_DRIVER: &str = "jdbc";

/// How many rows a statement pulls from the backend per round trip when
/// memory must stay bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case", tag = "mode", content = "rows")]
pub enum FetchSizeRule {
    /// Leave the driver's own setting alone.
    #[default]
    DriverDefault,
    /// Row-by-row streaming without buffering the result set.
    Streaming,
    /// Cursor-based fetching in batches of this many rows.
    Fixed(u32),
}

impl FetchSizeRule {
    /// Rows per fetch, if the rule pins a batch size.
    pub fn rows_per_fetch(&self) -> Option<u32> {
        match self {
            Self::Fixed(rows) => Some(*rows),
            Self::DriverDefault | Self::Streaming => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

impl std::fmt::Display for FetchSizeRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DriverDefault => write!(f, "driver-default"),
            Self::Streaming => write!(f, "streaming"),
            Self::Fixed(rows) => write!(f, "fixed({rows})"),
        }
    }
}
