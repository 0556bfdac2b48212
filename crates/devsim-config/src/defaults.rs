use crate::types::DevsimConfig;

impl DevsimConfig {
    /// Normalize the configuration in place.
    pub fn apply_defaults(&mut self) {
        let trimmed = self.api.base_url.trim().trim_end_matches('/');
        self.api.base_url = trimmed.to_string();
    }

    /// Returns a new config with all defaults applied.
    pub fn effective(&self) -> DevsimConfig {
        let mut config = self.clone();
        config.apply_defaults();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slashes_stripped() {
        let mut config = DevsimConfig::default();
        config.api.base_url = " http://sim:8000// ".to_string();
        config.apply_defaults();
        assert_eq!(config.api.base_url, "http://sim:8000");
    }

    #[test]
    fn test_effective_leaves_original_untouched() {
        let mut config = DevsimConfig::default();
        config.api.base_url = "http://sim:8000/".to_string();
        let effective = config.effective();
        assert_eq!(effective.api.base_url, "http://sim:8000");
        assert_eq!(config.api.base_url, "http://sim:8000/");
    }
}
