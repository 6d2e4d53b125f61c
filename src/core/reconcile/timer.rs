use chrono::{DateTime, Utc};

/// Wall-clock duration of the active run, advanced by explicit ticks.
#[derive(Debug, Clone, Default)]
pub struct DurationTimer {
    started_at: Option<DateTime<Utc>>,
    elapsed_ms: u64,
}

impl DurationTimer {
    /// Start from zero; a previous run's value is discarded.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.started_at = Some(now);
        self.elapsed_ms = 0;
    }

    pub fn tick(&mut self, now: DateTime<Utc>) {
        if let Some(started) = self.started_at {
            self.elapsed_ms = now
                .signed_duration_since(started)
                .num_milliseconds()
                .max(0) as u64;
        }
    }

    /// Stop and freeze the elapsed value at `now`.
    pub fn stop(&mut self, now: DateTime<Utc>) {
        self.tick(now);
        self.started_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }
}
