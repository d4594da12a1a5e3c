use chrono::{DateTime, Duration, Timelike, Utc};
use rand::Rng;

use crate::config::EngineConfig;

/// Short deferral used when urgency collides with fatigue.
const SHORT_DEFER_MINUTES: i64 = 15;

/// Do-not-disturb gate over the user's quiet hours. The default window is
/// 23:00–08:00; windows that do not cross midnight work too.
#[derive(Clone)]
pub struct DndGate {
    start_hour: u32,
    end_hour: u32,
}

impl DndGate {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            start_hour: config.dnd_start_hour,
            end_hour: config.dnd_end_hour,
        }
    }

    /// The window label when `now` falls inside quiet hours.
    pub fn check(&self, now: DateTime<Utc>) -> Option<String> {
        let hour = now.hour();
        let in_window = if self.start_hour > self.end_hour {
            hour >= self.start_hour || hour < self.end_hour
        } else {
            (self.start_hour..self.end_hour).contains(&hour)
        };
        in_window.then(|| format!("{:02}:00-{:02}:00", self.start_hour, self.end_hour))
    }

    /// The next end-of-window boundary strictly in the future.
    pub fn next_allowed(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let boundary = now
            .date_naive()
            .and_hms_opt(self.end_hour, 0, 0)
            .expect("window end is a valid wall-clock hour")
            .and_utc();
        if now.hour() < self.end_hour {
            boundary
        } else {
            boundary + Duration::days(1)
        }
    }
}

pub fn short_defer(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(SHORT_DEFER_MINUTES)
}

/// Deferral target for mid-band scores. Low-urgency broadcast types wait a
/// few hours; everything else comes back within the hour.
pub fn optimal_window(event_type: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let delay_secs = if matches!(event_type, "promotion" | "low_value_promo" | "system_update") {
        rand::thread_rng().gen_range(2 * 3_600..=5 * 3_600)
    } else {
        rand::thread_rng().gen_range(15 * 60..=45 * 60)
    };
    now + Duration::seconds(delay_secs)
}

#[cfg(test)]
mod tests {
    use super::{DndGate, optimal_window, short_defer};
    use crate::config::EngineConfig;
    use chrono::{Duration, TimeZone, Timelike, Utc};

    fn gate() -> DndGate {
        DndGate::new(&EngineConfig::default())
    }

    #[test]
    fn late_night_and_early_morning_are_quiet() {
        let gate = gate();
        let late = Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).unwrap();
        let midday = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(gate.check(late).as_deref(), Some("23:00-08:00"));
        assert!(gate.check(early).is_some());
        assert!(gate.check(midday).is_none());
    }

    #[test]
    fn window_edges_behave() {
        let gate = gate();
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 23, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        assert!(gate.check(start).is_some(), "23:00 is inside");
        assert!(gate.check(end).is_none(), "08:00 is outside");
    }

    #[test]
    fn next_allowed_is_today_before_the_boundary() {
        let gate = gate();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).unwrap();
        let allowed = gate.next_allowed(now);
        assert_eq!(allowed, Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap());
        assert!(allowed > now);
    }

    #[test]
    fn next_allowed_is_tomorrow_after_the_boundary() {
        let gate = gate();
        let late = Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap();
        assert_eq!(
            gate.next_allowed(late),
            Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
        );
        // Exactly on the boundary still lands strictly in the future.
        let at_eight = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(
            gate.next_allowed(at_eight),
            Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn non_wrapping_window_works() {
        let gate = DndGate::new(&EngineConfig {
            dnd_start_hour: 13,
            dnd_end_hour: 15,
            ..EngineConfig::default()
        });
        let inside = Utc.with_ymd_and_hms(2026, 3, 1, 14, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2026, 3, 1, 16, 0, 0).unwrap();
        assert!(gate.check(inside).is_some());
        assert!(gate.check(outside).is_none());
        assert_eq!(gate.next_allowed(inside).hour(), 15);
    }

    #[test]
    fn short_defer_is_fifteen_minutes() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(short_defer(now) - now, Duration::minutes(15));
    }

    #[test]
    fn optimal_window_ranges_by_event_class() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        for _ in 0..20 {
            let promo = optimal_window("promotion", now) - now;
            assert!(promo >= Duration::hours(2) && promo <= Duration::hours(5));
            let urgent = optimal_window("direct_message", now) - now;
            assert!(urgent >= Duration::minutes(15) && urgent <= Duration::minutes(45));
        }
    }
}
