//! Cache configuration.

/// Configuration for the pixmap cache.
///
/// The only tunable is the byte budget; everything else (eviction policy,
/// visible-range protection) is fixed behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum total bytes of cached pixmaps.
    pub byte_budget: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            byte_budget: 256 * 1024 * 1024, // 256 MB
        }
    }
}

impl CacheConfig {
    pub fn new(byte_budget: usize) -> Self {
        Self { byte_budget }
    }

    /// Set the byte budget in megabytes.
    pub fn with_mb(mut self, mb: usize) -> Self {
        self.byte_budget = mb * 1024 * 1024;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_budget_in_mb() {
        let config = CacheConfig::default().with_mb(64);
        assert_eq!(config.byte_budget, 64 * 1024 * 1024);
    }
}
