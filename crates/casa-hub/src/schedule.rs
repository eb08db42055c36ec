//! Standing schedules
//!
//! No cron dependency: each job computes its next local occurrence with
//! chrono and sleeps until it is due. The sunset fade is special, since
//! its times move every day; refreshing it replaces the pending fade
//! task wholesale.

use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::config::{parse_time, ConfigError, ScheduleConfig};
use casa_lights::scenes::{self, FADE_END, FADE_START};

/// Job times, parsed once at startup.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleTimes {
    pub morning: NaiveTime,
    pub night: NaiveTime,
    pub sunset_refresh: NaiveTime,
}

impl ScheduleTimes {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            morning: parse_time(&config.morning)?,
            night: parse_time(&config.night)?,
            sunset_refresh: parse_time(&config.sunset_refresh)?,
        })
    }
}

/// Next occurrence of a wall-clock time after `now`, optionally skipping
/// weekends. A job firing exactly at `now` schedules for the next day.
fn next_occurrence(now: NaiveDateTime, at: NaiveTime, weekdays_only: bool) -> NaiveDateTime {
    let mut candidate = now.date().and_time(at);
    if candidate <= now {
        candidate += ChronoDuration::days(1);
    }
    if weekdays_only {
        while candidate.weekday().number_from_monday() > 5 {
            candidate += ChronoDuration::days(1);
        }
    }
    candidate
}

/// Fade steps still ahead of `now`, with their original step index so the
/// color ramp stays anchored even when half the steps are already past.
fn remaining_steps(times: &[NaiveDateTime], now: NaiveDateTime) -> Vec<(usize, NaiveDateTime)> {
    times
        .iter()
        .enumerate()
        .filter(|(_, at)| **at > now)
        .map(|(index, at)| (index, *at))
        .collect()
}

async fn wait_until(at: NaiveTime, weekdays_only: bool) {
    let now = Local::now().naive_local();
    let next = next_occurrence(now, at, weekdays_only);
    let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
    debug!("next run at {}", next);
    tokio::time::sleep(delay).await;
}

/// Resolve today's sunset and replace the pending fade task.
///
/// Resolution failures are logged and leave the previous fade (if any)
/// running untouched.
async fn refresh_sunset_fade(state: &Arc<AppState>, slot: &Mutex<Option<JoinHandle<()>>>) {
    let steps = state.config.schedules.fade_steps;
    let window = ChronoDuration::minutes(i64::from(state.config.schedules.fade_duration_minutes));

    let report = match state.weather.sunset(&state.config.default_location).await {
        Ok(report) => report,
        Err(err) => {
            warn!("could not resolve sunset schedule: {}", err);
            return;
        }
    };

    let times = scenes::fade_schedule(report.sunset, steps, window);
    let now = Local::now().naive_local();
    let pending = remaining_steps(&times, now);
    info!(
        "scheduled {} sunset fade step(s) for {} (sunset {})",
        pending.len(),
        report.resolved_location,
        report.sunset
    );

    let lights = state.lights.clone();
    let task = tokio::spawn(async move {
        for (index, at) in pending {
            let delay = (at - Local::now().naive_local())
                .to_std()
                .unwrap_or(Duration::ZERO);
            tokio::time::sleep(delay).await;

            let color = scenes::interpolate(FADE_START, FADE_END, index, steps);
            match lights.set_color_on_active(color).await {
                Ok(count) => debug!("fade step {} recolored {} bulb(s)", index, count),
                Err(err) => warn!("fade step {} failed: {}", index, err),
            }
        }
    });

    let mut slot = slot.lock().await;
    if let Some(old) = slot.replace(task) {
        old.abort();
    }
}

/// Spawn the standing jobs: weekday mornings, nightly wind-down, and the
/// daily sunset-fade refresh (which also runs once right away).
pub fn spawn(state: Arc<AppState>, times: ScheduleTimes) {
    {
        let state = state.clone();
        tokio::spawn(async move {
            loop {
                wait_until(times.morning, true).await;
                info!("running morning scene");
                if let Err(err) = state.lights.morning_scene().await {
                    warn!("morning scene failed: {}", err);
                }
            }
        });
    }

    {
        let state = state.clone();
        tokio::spawn(async move {
            loop {
                wait_until(times.night, false).await;
                info!("running night scene");
                if let Err(err) = state.lights.night_scene().await {
                    warn!("night scene failed: {}", err);
                }
            }
        });
    }

    tokio::spawn(async move {
        let fade_slot = Mutex::new(None);
        refresh_sunset_fade(&state, &fade_slot).await;
        loop {
            wait_until(times.sunset_refresh, false).await;
            refresh_sunset_fade(&state, &fade_slot).await;
        }
    });
}
