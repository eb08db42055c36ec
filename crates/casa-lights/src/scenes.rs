//! Scenes and colors
//!
//! Named colors, the fixed morning/night scenes, and the sunset fade: a
//! linear HSV walk from candle light to deep red, stepped across a window
//! centered on sunset.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Hue 0-360, saturation 0-100, value 0-100 (value doubles as brightness).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hsv {
    pub hue: u16,
    pub saturation: u8,
    pub value: u8,
}

impl Hsv {
    pub const fn new(hue: u16, saturation: u8, value: u8) -> Self {
        Self {
            hue,
            saturation,
            value,
        }
    }
}

/// Soft warm white for wake-up.
pub const MORNING: Hsv = Hsv::new(40, 10, 100);

/// Deep amber for wind-down.
pub const NIGHT: Hsv = Hsv::new(16, 100, 99);

/// Sunset fade endpoints: candle light into red.
pub const FADE_START: Hsv = Hsv::new(30, 40, 100);
pub const FADE_END: Hsv = Hsv::new(0, 100, 100);

const COLOR_MAP: &[(&str, Hsv)] = &[
    ("red", Hsv::new(0, 100, 100)),
    ("orange", Hsv::new(30, 100, 100)),
    ("yellow", Hsv::new(55, 100, 100)),
    ("green", Hsv::new(120, 100, 100)),
    ("blue", Hsv::new(220, 100, 100)),
    ("indigo", Hsv::new(250, 100, 100)),
    ("violet", Hsv::new(275, 100, 100)),
    ("white", Hsv::new(0, 0, 100)),
    ("candle light", Hsv::new(30, 40, 100)),
];

/// Look up a color by spoken name ("Candle-Light" works too).
pub fn color_by_name(name: &str) -> Option<Hsv> {
    let normalized = name
        .trim()
        .to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    COLOR_MAP
        .iter()
        .find(|(key, _)| *key == normalized)
        .map(|(_, hsv)| *hsv)
}

/// Linear interpolation between two colors at `step` of `total_steps`.
///
/// Step 0 is exactly `start`; the last step is exactly `end`.
pub fn interpolate(start: Hsv, end: Hsv, step: usize, total_steps: usize) -> Hsv {
    if total_steps <= 1 {
        return start;
    }
    let fraction = step.min(total_steps - 1) as f64 / (total_steps - 1) as f64;
    let lerp = |a: f64, b: f64| (a + (b - a) * fraction).round();
    Hsv {
        hue: lerp(start.hue as f64, end.hue as f64) as u16,
        saturation: lerp(start.saturation as f64, end.saturation as f64) as u8,
        value: lerp(start.value as f64, end.value as f64) as u8,
    }
}

/// Step times for a fade of `steps` across `window`, centered on `sunset`.
pub fn fade_schedule(sunset: NaiveDateTime, steps: usize, window: Duration) -> Vec<NaiveDateTime> {
    if steps == 0 {
        return Vec::new();
    }
    if steps == 1 {
        return vec![sunset];
    }
    let start = sunset - window / 2;
    let interval = window / (steps as i32 - 1);
    (0..steps).map(|i| start + interval * i as i32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_color_by_name_normalizes() {
        assert_eq!(color_by_name("red"), Some(Hsv::new(0, 100, 100)));
        assert_eq!(color_by_name("  Candle-Light "), Some(FADE_START));
        assert_eq!(color_by_name("candle_light"), Some(FADE_START));
        assert_eq!(color_by_name("candle  light"), Some(FADE_START));
        assert_eq!(color_by_name("chartreuse"), None);
    }

    #[test]
    fn test_interpolate_endpoints() {
        assert_eq!(interpolate(FADE_START, FADE_END, 0, 20), FADE_START);
        assert_eq!(interpolate(FADE_START, FADE_END, 19, 20), FADE_END);
    }

    #[test]
    fn test_interpolate_midpoint_rounds() {
        // Halfway through an even-span fade: 30→0 hue gives 15, 40→100
        // saturation gives 70
        let mid = interpolate(FADE_START, FADE_END, 5, 11);
        assert_eq!(mid, Hsv::new(15, 70, 100));
    }

    #[test]
    fn test_fade_schedule_centered_and_even() {
        let sunset = NaiveDate::from_ymd_opt(2026, 2, 10)
            .unwrap()
            .and_hms_opt(17, 30, 0)
            .unwrap();
        // 13 steps over an hour: 12 gaps of 5 minutes
        let times = fade_schedule(sunset, 13, Duration::minutes(60));

        assert_eq!(times.len(), 13);
        assert_eq!(times[0], sunset - Duration::minutes(30));
        assert_eq!(times[12], sunset + Duration::minutes(30));
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::minutes(5));
        }
    }

    #[test]
    fn test_fade_schedule_degenerate_counts() {
        let sunset = NaiveDate::from_ymd_opt(2026, 2, 10)
            .unwrap()
            .and_hms_opt(17, 30, 0)
            .unwrap();
        assert!(fade_schedule(sunset, 0, Duration::minutes(60)).is_empty());
        assert_eq!(
            fade_schedule(sunset, 1, Duration::minutes(60)),
            vec![sunset]
        );
    }
}
