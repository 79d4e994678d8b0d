use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Repeat interval per popup frequency setting, in milliseconds.
pub const POPUP_INTERVALS_MS: [u64; 6] = [0, 10_000, 5_000, 2_000, 1_000, 500];
pub const DEFAULT_POPUP_FREQUENCY: u8 = 3;

/// Validated popup frequency index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupFrequency(u8);

impl PopupFrequency {
    /// Unset or out-of-table values fall back to the default index.
    pub fn from_setting(value: Option<u8>) -> Self {
        match value {
            Some(index) if usize::from(index) < POPUP_INTERVALS_MS.len() => Self(index),
            _ => Self(DEFAULT_POPUP_FREQUENCY),
        }
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Spawn interval, or `None` when spawning is disabled (index 0).
    pub fn interval(self) -> Option<Duration> {
        match POPUP_INTERVALS_MS[usize::from(self.0)] {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimerSchedule {
    pub every: Duration,
    pub probability: f64,
}

impl TimerSchedule {
    pub fn validate(&self) -> Result<(), String> {
        if self.every.is_zero() {
            return Err("interval must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(format!(
                "probability must be within [0, 1], got {}",
                self.probability
            ));
        }
        Ok(())
    }
}

/// A repeating timer whose first tick lands one full period after creation.
pub fn repeating(every: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + every, every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Wait for the next tick of an optional timer; never resolves when absent.
pub async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
