use crate::types::DEFAULT_STACK_SIZE;
use std::time::Duration;

/// Smallest stack the runtime will allocate for a spawned thread.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Bytes of stack allocated for every spawned thread.
    pub stack_size: usize,
    /// Period of the preemption timer. `None` runs the threads cooperatively:
    /// they only switch at `yield_now`, `join` and contended `lock` calls.
    pub timer_interval: Option<Duration>,
}

impl RuntimeConfig {
    pub const fn new() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            timer_interval: Some(Duration::from_millis(10)),
        }
    }

    pub const fn cooperative() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            timer_interval: None,
        }
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn with_timer_interval(mut self, interval: Option<Duration>) -> Self {
        self.timer_interval = interval;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err(format!(
                "stack size {} is below the {} byte minimum",
                self.stack_size, MIN_STACK_SIZE
            ));
        }
        if self.timer_interval == Some(Duration::ZERO) {
            return Err("timer interval must be non-zero".into());
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_table_geometry() {
        let config = RuntimeConfig::default();
        assert_eq!(config.stack_size, 64 * 1024);
        assert!(config.timer_interval.is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_settings() {
        let tiny = RuntimeConfig::cooperative().with_stack_size(1024);
        assert!(tiny.validate().is_err());

        let zero = RuntimeConfig::new().with_timer_interval(Some(Duration::ZERO));
        assert!(zero.validate().is_err());

        assert!(RuntimeConfig::cooperative().validate().is_ok());
    }
}
