use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

/// Maximum requests per second. Zero is rejected when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate(NonZeroU32);

impl Rate {
    pub fn new(per_second: u32) -> Option<Rate> {
        NonZeroU32::new(per_second).map(Rate)
    }

    pub fn per_second(&self) -> u32 {
        self.0.get()
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(1) / self.0.get()
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate(NonZeroU32::new(10).expect("10 is nonzero"))
    }
}

impl FromStr for Rate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let per_second: u32 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid rate `{}`", s))?;
        Rate::new(per_second).ok_or_else(|| "rate must be greater than zero".to_string())
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} req/s", self.per_second())
    }
}

/// Spaces consecutive requests at least `1 / rate` apart, without bursts.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
}

impl Pacer {
    pub fn new(rate: Rate) -> Pacer {
        Pacer {
            interval: rate.min_interval(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleeps whatever is left of the interval that began at `started`.
    pub fn pace(&self, started: Instant) {
        if let Some(remaining) = self.interval.checked_sub(started.elapsed()) {
            thread::sleep(remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_from_rate() {
        assert_eq!("5".parse::<Rate>().unwrap().min_interval(), Duration::from_millis(200));
        assert_eq!(Rate::default().min_interval(), Duration::from_millis(100));
    }

    #[test]
    fn zero_and_garbage_are_rejected() {
        assert!("0".parse::<Rate>().is_err());
        assert!("-3".parse::<Rate>().is_err());
        assert!("fast".parse::<Rate>().is_err());
    }

    #[test]
    fn pace_waits_for_the_remainder() {
        let pacer = Pacer::new(Rate::new(20).unwrap());
        let started = Instant::now();
        pacer.pace(started);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn slow_exchanges_are_not_delayed_further() {
        let pacer = Pacer::new(Rate::new(1000).unwrap());
        let started = Instant::now();
        thread::sleep(Duration::from_millis(5));
        let before = Instant::now();
        pacer.pace(started);
        assert!(before.elapsed() < Duration::from_millis(5));
    }
}
