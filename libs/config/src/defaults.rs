//! Default values and constants shared by Tidal pools
//!
//! Every pool setting has a default here so a pool can be built without a
//! configuration file. Values mirror the reference deployment.

/// Pool defaults
pub mod pool {
    /// Steps (blocks) per settlement interval
    pub const INTERVAL_LENGTH: u64 = 10;

    /// Instant swap fee numerator (3 / 1000 = 0.3%)
    pub const FEE_NUMERATOR: u32 = 3;

    /// Instant swap fee denominator
    pub const FEE_DENOMINATOR: u32 = 1_000;

    /// Interval boundaries crossed per virtualization pass
    pub const MAX_INTERVALS_PER_CALL: u64 = 1_000;

    /// Longest accepted long-term order, in intervals
    pub const MAX_ORDER_INTERVALS: u64 = 100_000;
}

/// Logging defaults
pub mod logging {
    /// Default log level
    pub const LEVEL: &str = "info";

    /// Levels accepted by `LoggingSettings::validate`
    pub const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
}

/// Configuration file locations and environment prefix
pub mod files {
    /// Base configuration file, relative to the working directory
    pub const BASE_CONFIG_PATH: &str = "config/pool.toml";

    /// Directory holding `<environment>.toml` overlays
    pub const ENVIRONMENTS_DIR: &str = "config/environments";

    /// Prefix for environment variable overrides (`TIDAL_POOL__FEE_NUMERATOR`)
    pub const ENV_PREFIX: &str = "TIDAL";

    /// Separator between nested keys in environment variable names
    pub const ENV_SEPARATOR: &str = "__";
}
