// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recurring-job scheduler.
//!
//! Keeps one deadline per enabled job; the daemon loop drains due
//! firings on a coarse tick and rearms for the next occurrence. Firing
//! never executes anything, it only records a pending marker for the
//! extension to consume later.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use chrono_tz::Tz;
use companion_store::{CronJob, CronSchedule};
use tracing::warn;

/// Deadline map for recurring jobs, keyed by job id.
#[derive(Debug, Default)]
pub struct CronScheduler {
    timers: HashMap<String, u64>,
}

impl CronScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for a job. Disabled jobs are unscheduled.
    pub fn schedule_job(&mut self, job: &CronJob, now_ms: u64) {
        if !job.enabled {
            self.unschedule(&job.id);
            return;
        }
        let delay = next_fire_delay_ms(&job.schedule, now_ms);
        self.timers.insert(job.id.clone(), now_ms + delay);
    }

    /// Arm a job at an explicit deadline, bypassing the schedule math.
    /// Used when restoring state or forcing an imminent firing.
    pub fn arm_at(&mut self, id: &str, fire_at_ms: u64) {
        self.timers.insert(id.to_string(), fire_at_ms);
    }

    /// Cancel the timer for a job.
    pub fn unschedule(&mut self, id: &str) {
        self.timers.remove(id);
    }

    /// Drain all due job ids. Callers record the firing and re-arm via
    /// [`CronScheduler::schedule_job`].
    pub fn fired(&mut self, now_ms: u64) -> Vec<String> {
        let due: Vec<String> = self
            .timers
            .iter()
            .filter(|(_, fires_at)| **fires_at <= now_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &due {
            self.timers.remove(id);
        }
        due
    }

    /// The earliest armed deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.values().copied().min()
    }

    pub fn is_scheduled(&self, id: &str) -> bool {
        self.timers.contains_key(id)
    }
}

/// Delay until the next firing of `schedule`, from `now_ms` (epoch ms).
pub fn next_fire_delay_ms(schedule: &CronSchedule, now_ms: u64) -> u64 {
    match schedule {
        CronSchedule::Interval { minutes } => (*minutes).max(1) * 60_000,
        CronSchedule::Daily { hour, minute, tz } => {
            let now = Utc
                .timestamp_millis_opt(now_ms as i64)
                .single()
                .unwrap_or_else(Utc::now);
            next_daily_delay_ms(*hour, *minute, tz, now)
        }
    }
}

/// Delay until the next `hour:minute` in `tz`: today if still in the
/// future in that zone, otherwise tomorrow. Invalid timezone names fall
/// back to UTC.
fn next_daily_delay_ms(hour: u8, minute: u8, tz: &str, now: DateTime<Utc>) -> u64 {
    let zone: Tz = match tz.parse() {
        Ok(zone) => zone,
        Err(_) => {
            warn!(tz, "unknown timezone for daily job, falling back to UTC");
            chrono_tz::UTC
        }
    };
    let local = now.with_timezone(&zone);

    let target = local
        .date_naive()
        .and_hms_opt(u32::from(hour), u32::from(minute), 0)
        .and_then(|naive| zone.from_local_datetime(&naive).earliest());
    let target = match target {
        Some(t) if t > local => t,
        _ => {
            // Today's slot has passed (or does not exist due to a DST
            // gap); aim for tomorrow.
            let tomorrow = local.date_naive() + ChronoDuration::days(1);
            match tomorrow
                .and_hms_opt(u32::from(hour), u32::from(minute), 0)
                .and_then(|naive| zone.from_local_datetime(&naive).earliest())
            {
                Some(t) => t,
                None => local + ChronoDuration::days(1),
            }
        }
    };

    (target.with_timezone(&Utc) - now).num_milliseconds().max(0) as u64
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
