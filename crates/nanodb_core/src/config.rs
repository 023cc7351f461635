//! Database configuration.

/// Configuration for opening a database.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Whether to create the database directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to `fsync` the segment after every mutation (safer but slower).
    ///
    /// When off, appends still reach the OS before the call returns, so a
    /// process crash loses nothing; segments are synced on close and after
    /// compaction.
    pub sync_on_write: bool,

    /// Whether collections compact themselves once enough records are dead.
    pub auto_compact: bool,

    /// Minimum number of dead records before automatic compaction runs.
    pub compaction_min_records: u64,

    /// Minimum dead/total record ratio before automatic compaction runs.
    pub compaction_ratio: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: false,
            auto_compact: true,
            compaction_min_records: 1024,
            compaction_ratio: 0.5,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the segment on every mutation.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Enables or disables automatic compaction.
    #[must_use]
    pub const fn auto_compact(mut self, value: bool) -> Self {
        self.auto_compact = value;
        self
    }

    /// Sets the dead record count that makes a segment eligible for compaction.
    #[must_use]
    pub const fn compaction_min_records(mut self, count: u64) -> Self {
        self.compaction_min_records = count;
        self
    }

    /// Sets the dead/total ratio that makes a segment eligible for compaction.
    #[must_use]
    pub const fn compaction_ratio(mut self, ratio: f64) -> Self {
        self.compaction_ratio = ratio;
        self
    }

    /// Returns whether a segment with these record counts should be compacted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn should_compact(&self, total_records: u64, dead_records: u64) -> bool {
        if !self.auto_compact || total_records == 0 {
            return false;
        }
        dead_records >= self.compaction_min_records
            && dead_records as f64 / total_records as f64 >= self.compaction_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(!config.sync_on_write);
        assert!(config.auto_compact);
        assert_eq!(config.compaction_min_records, 1024);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .create_if_missing(false)
            .sync_on_write(true)
            .compaction_min_records(8)
            .compaction_ratio(0.25);

        assert!(!config.create_if_missing);
        assert!(config.sync_on_write);
        assert_eq!(config.compaction_min_records, 8);
        assert!((config.compaction_ratio - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn compaction_thresholds() {
        let config = Config::new().compaction_min_records(10).compaction_ratio(0.5);
        assert!(!config.should_compact(0, 0));
        assert!(!config.should_compact(100, 9));
        assert!(!config.should_compact(100, 40));
        assert!(config.should_compact(100, 50));
        assert!(config.should_compact(12, 10));

        let off = config.auto_compact(false);
        assert!(!off.should_compact(12, 10));
    }
}
