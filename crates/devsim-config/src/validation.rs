use crate::types::DevsimConfig;
use crate::ConfigError;

impl DevsimConfig {
    /// Validate the configuration and return a list of errors.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ConfigError::InvalidBaseUrl(
                url.to_string(),
                "URL must start with http:// or https://".to_string(),
            ));
        }

        let intervals = [
            ("api.timeout", self.api.timeout),
            ("api.connect_timeout", self.api.connect_timeout),
            ("playback.base_interval", self.playback.base_interval),
            ("playback.frame_interval", self.playback.frame_interval),
            ("playback.default_window", self.playback.default_window),
            ("polling.interval", self.polling.interval),
        ];
        for (name, value) in intervals {
            if value.as_duration().is_zero() {
                errors.push(ConfigError::ZeroInterval(name));
            }
        }

        if self.playback.range_limit == 0 {
            errors.push(ConfigError::InvalidConfig(
                "playback.range_limit must be at least 1".to_string(),
            ));
        }

        // A frame slower than the 1x step would make playback lag its own cadence.
        if self.playback.frame_interval.as_duration() > self.playback.base_interval.as_duration() {
            errors.push(ConfigError::InvalidConfig(format!(
                "playback.frame_interval ({}) exceeds playback.base_interval ({})",
                self.playback.frame_interval, self.playback.base_interval
            )));
        }

        errors
    }

    /// Validate and return Ok(()) if valid, or Err with the first error.
    pub fn validate_or_err(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
