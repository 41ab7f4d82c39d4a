use crate::error::ConfigurationError;

/// Master clock of a typical home console crystal. Hosts normally override it.
pub const DEFAULT_MASTER_RATE: u64 = 21_477_272;

/// Clock units per master cycle.
pub const DEFAULT_SUBTICKS: u32 = 4096;

/// Rendezvous rounds without any clock progress tolerated before reporting a deadlock.
pub const DEFAULT_RETRY_LIMIT: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Master clock rate in Hz. Every actor frequency is expressed against it.
    pub master_rate: u64,
    /// Fixed-point resolution of a master cycle.
    pub subticks: u32,
    /// Rendezvous rounds a waiter tolerates while no actor clock anywhere moves.
    pub retry_limit: u32,
}

impl SchedulerConfig {
    pub fn with_master_rate(master_rate: u64) -> Self {
        Self {
            master_rate,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.master_rate == 0 {
            return Err(ConfigurationError::ZeroMasterRate);
        }
        if self.subticks == 0 {
            return Err(ConfigurationError::ZeroSubticks);
        }
        if self.retry_limit == 0 {
            return Err(ConfigurationError::ZeroRetryLimit);
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            master_rate: DEFAULT_MASTER_RATE,
            subticks: DEFAULT_SUBTICKS,
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_parameters_are_rejected() {
        let cfg = SchedulerConfig::with_master_rate(0);
        assert_eq!(cfg.validate(), Err(ConfigurationError::ZeroMasterRate));

        let cfg = SchedulerConfig {
            subticks: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigurationError::ZeroSubticks));

        let cfg = SchedulerConfig {
            retry_limit: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigurationError::ZeroRetryLimit));

        assert_eq!(SchedulerConfig::default().validate(), Ok(()));
    }
}
