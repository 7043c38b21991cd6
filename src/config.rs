//! Configuration options for a shard writer.

/// Default number of buffered entries that triggers a flush.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 100_000;

/// Default merge and cursor batch size (in entries).
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Configuration options for creating a shard writer.
#[derive(Debug, Clone)]
pub struct Options {
    /// Number of buffered entries at which a write triggers a flush.
    /// Default: 100_000
    pub max_buffer_size: usize,

    /// Entries pulled per cursor refill and buffered per output write
    /// during the merge. Bounds merge memory.
    /// Default: 1024
    pub batch_size: usize,

    /// Fsync chunk and output files before reporting success.
    /// Default: true
    pub sync_on_flush: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            sync_on_flush: true,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flush threshold.
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// Sets the merge batch size.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Enables or disables fsync on flush and close.
    pub fn sync_on_flush(mut self, value: bool) -> Self {
        self.sync_on_flush = value;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_buffer_size == 0 {
            return Err(crate::Error::invalid_argument("max_buffer_size must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(crate::Error::invalid_argument("batch_size must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert_eq!(opts.max_buffer_size, DEFAULT_MAX_BUFFER_SIZE);
        assert_eq!(opts.batch_size, DEFAULT_BATCH_SIZE);
        assert!(opts.sync_on_flush);
    }

    #[test]
    fn test_options_builder() {
        let opts = Options::new().max_buffer_size(2).batch_size(16).sync_on_flush(false);

        assert_eq!(opts.max_buffer_size, 2);
        assert_eq!(opts.batch_size, 16);
        assert!(!opts.sync_on_flush);
    }

    #[test]
    fn test_options_validation() {
        let mut opts = Options::default();
        assert!(opts.validate().is_ok());

        opts.max_buffer_size = 0;
        assert!(opts.validate().is_err());

        opts.max_buffer_size = 10;
        opts.batch_size = 0;
        assert!(opts.validate().is_err());
    }
}
