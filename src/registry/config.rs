//! Registry configuration

/// Default upper bound of the smallest-free-ID search
pub const DEFAULT_ID_SEARCH_WINDOW: u32 = 10_000;

/// Configuration for the device registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// IDs `1..=id_search_window` are reused smallest-first; beyond that a
    /// monotonically increasing counter takes over
    pub id_search_window: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            id_search_window: DEFAULT_ID_SEARCH_WINDOW,
        }
    }
}

impl RegistryConfig {
    /// Set the smallest-free-ID search window
    pub fn id_search_window(mut self, window: u32) -> Self {
        self.id_search_window = window;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert_eq!(RegistryConfig::default().id_search_window, 10_000);
    }

    #[test]
    fn test_builder() {
        let config = RegistryConfig::default().id_search_window(4);
        assert_eq!(config.id_search_window, 4);
    }
}
