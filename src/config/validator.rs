use crate::config::Config;
use crate::error::{Result, TermpulseError, ValidationError};

/// Configuration validator
///
/// Two phases: `sanitize` clamps out-of-range numeric values to safe
/// defaults with a warning so a bad value never disables the pipeline,
/// and `validate` rejects structural problems outright.
pub struct ConfigValidator;

const DEBOUNCE_RANGE_MS: (u64, u64) = (200, 2000);
const POLL_RANGE_MS: (u64, u64) = (100, 10_000);
const DEDUP_RANGE_SECS: (u64, u64) = (1, 300);
const THROTTLE_RANGE_SECS: (u64, u64) = (1, 3600);
const MAX_CONTEXT_WINDOW: usize = 10;

impl ConfigValidator {
    /// Clamp out-of-range numeric settings, warning about each adjustment.
    pub fn sanitize(config: &mut Config) {
        config.watch.debounce_ms = clamp_u64(
            "watch.debounce_ms",
            config.watch.debounce_ms,
            DEBOUNCE_RANGE_MS,
        );
        config.watch.poll_interval_ms = clamp_u64(
            "watch.poll_interval_ms",
            config.watch.poll_interval_ms,
            POLL_RANGE_MS,
        );
        config.detection.dedup_window_secs = clamp_u64(
            "detection.dedup_window_secs",
            config.detection.dedup_window_secs,
            DEDUP_RANGE_SECS,
        );
        config.throttle.base_interval_secs = clamp_u64(
            "throttle.base_interval_secs",
            config.throttle.base_interval_secs,
            THROTTLE_RANGE_SECS,
        );

        let threshold = config.detection.threshold;
        if !(0.0..=1.0).contains(&threshold) || threshold.is_nan() {
            tracing::warn!(
                value = threshold,
                "detection.threshold out of range, using 0.5"
            );
            config.detection.threshold = 0.5;
        }

        if config.detection.context_window > MAX_CONTEXT_WINDOW {
            tracing::warn!(
                value = config.detection.context_window,
                "detection.context_window too large, using {}",
                MAX_CONTEXT_WINDOW
            );
            config.detection.context_window = MAX_CONTEXT_WINDOW;
        }

        if config.detection.cache_capacity == 0 {
            tracing::warn!("detection.cache_capacity must be positive, using 1000");
            config.detection.cache_capacity = 1000;
        }

        if config.sessions.max_recent_inactive == 0 {
            tracing::warn!("sessions.max_recent_inactive must be positive, using 10");
            config.sessions.max_recent_inactive = 10;
        }

        if config.sessions.idle_timeout_secs >= config.sessions.stale_timeout_secs {
            tracing::warn!(
                idle = config.sessions.idle_timeout_secs,
                stale = config.sessions.stale_timeout_secs,
                "Session idle timeout must be below stale timeout, using defaults"
            );
            config.sessions.idle_timeout_secs = 300;
            config.sessions.stale_timeout_secs = 86_400;
        }
    }

    /// Reject structurally invalid configurations.
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_log(config, &mut errors);
        Self::validate_watch(config, &mut errors);
        Self::validate_rules(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TermpulseError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_log(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is not checked: the shell hook may not have written
        // the log yet and the tailer treats a missing file as empty
        if config.log.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "log.path",
                "Activity log path cannot be empty",
            ));
        }

        if config.log.store_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "log.store_path",
                "Entry store path cannot be empty",
            ));
        }
    }

    fn validate_watch(config: &Config, errors: &mut Vec<ValidationError>) {
        let backend = &config.watch.backend;
        if backend != "notify" && backend != "poll" {
            errors.push(ValidationError::new(
                "watch.backend",
                format!("Backend must be 'notify' or 'poll', got '{}'", backend),
            ));
        }
    }

    fn validate_rules(config: &Config, errors: &mut Vec<ValidationError>) {
        for (i, rule) in config.rules.iter().enumerate() {
            if rule.name.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("rules[{}].name", i),
                    "Rule name cannot be empty",
                ));
            }
            if rule.pattern.is_empty() {
                errors.push(ValidationError::new(
                    format!("rules[{}].pattern", i),
                    "Rule pattern cannot be empty",
                ));
            }
        }
    }
}

fn clamp_u64(path: &str, value: u64, (min, max): (u64, u64)) -> u64 {
    if value < min || value > max {
        let clamped = value.clamp(min, max);
        tracing::warn!(path, value, clamped, "Config value out of range, clamped");
        clamped
    } else {
        value
    }
}
