use std::fmt;

use crate::config::SchedulerConfig;
use crate::error::ConfigurationError;

/// Cycles per second of an actor, as a reduced ratio so fractional rates (NTSC colorburst
/// multiples and the like) stay exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frequency {
    numerator: u64,
    denominator: u64,
}

impl Frequency {
    pub const fn hz(hz: u64) -> Self {
        Self::ratio(hz, 1)
    }

    /// `numerator / denominator` cycles per second. A zero on either side is kept as is and
    /// rejected when the frequency is attached to an actor.
    pub const fn ratio(numerator: u64, denominator: u64) -> Self {
        let g = gcd(numerator, denominator);
        if g <= 1 {
            return Self {
                numerator,
                denominator,
            };
        }
        Self {
            numerator: numerator / g,
            denominator: denominator / g,
        }
    }

    pub const fn numerator(&self) -> u64 {
        self.numerator
    }

    pub const fn denominator(&self) -> u64 {
        self.denominator
    }

    pub const fn is_zero(&self) -> bool {
        self.numerator == 0 || self.denominator == 0
    }
}

impl From<u64> for Frequency {
    fn from(hz: u64) -> Self {
        Self::hz(hz)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{} Hz", self.numerator)
        } else {
            write!(f, "{}/{} Hz", self.numerator, self.denominator)
        }
    }
}

/// Clock units one actor cycle is worth: `units / divisor`, reduced.
///
/// An actor's clock is `floor(cycles * units / divisor)` over every cycle it has stepped since
/// power-on. The remainder below one unit is carried in a per-actor fraction, so splitting a run
/// of cycles across many `step` calls never drifts from the single-call result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Scale {
    units: u64,
    divisor: u64,
}

impl Scale {
    pub(crate) fn new(
        config: &SchedulerConfig,
        frequency: Frequency,
    ) -> Result<Self, ConfigurationError> {
        if frequency.is_zero() {
            return Err(ConfigurationError::ZeroFrequency);
        }
        config.validate()?;

        let units = u128::from(config.master_rate)
            * u128::from(config.subticks)
            * u128::from(frequency.denominator());
        let divisor = u128::from(frequency.numerator());
        let g = gcd_wide(units, divisor);
        let (units, divisor) = (units / g, divisor / g);

        match (u64::try_from(units), u64::try_from(divisor)) {
            (Ok(u), Ok(d)) => Ok(Self {
                units: u,
                divisor: d,
            }),
            _ => Err(ConfigurationError::ScaleOverflow { units, divisor }),
        }
    }

    pub(crate) fn divisor(&self) -> u64 {
        self.divisor
    }

    /// Adds `cycles` to a clock/fraction pair. Returns `true` if the clock had to be pinned
    /// at `i64::MAX`.
    pub(crate) fn advance(&self, clock: &mut i64, fraction: &mut u64, cycles: u64) -> bool {
        let divisor = u128::from(self.divisor);
        let total = u128::from(*fraction) + u128::from(cycles) * u128::from(self.units);
        *fraction = (total % divisor) as u64;
        match i64::try_from(total / divisor)
            .ok()
            .and_then(|whole| clock.checked_add(whole))
        {
            Some(next) => {
                *clock = next;
                false
            }
            None => {
                *clock = i64::MAX;
                true
            }
        }
    }

    /// Re-expresses a fraction of `from` in this scale's sub-unit, rounding down.
    pub(crate) fn convert_fraction(&self, fraction: u64, from: &Scale) -> u64 {
        let converted = u128::from(fraction) * u128::from(self.divisor) / u128::from(from.divisor);
        // fraction < from.divisor, so the result is below self.divisor.
        converted as u64
    }
}

const fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn gcd_wide(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}
