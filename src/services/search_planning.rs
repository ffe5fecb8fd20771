//! Sizing and pacing of donor searches
//!
//! How many donors a blood request still needs, and how long to wait before
//! the next search round.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Urgency {
    Urgent,
    Regular,
}

#[derive(Debug, Clone, Copy)]
struct DelayRange {
    min: f64,
    max: f64,
}

impl Urgency {
    fn extra_donors(self) -> u32 {
        match self {
            Urgency::Urgent => 2,
            Urgency::Regular => 1,
        }
    }

    /// Bounds in minutes for a first round, in hours for a reinstated one
    fn delay_range(self, reinstated: bool) -> DelayRange {
        match (self, reinstated) {
            (Urgency::Urgent, false) => DelayRange { min: 5.0, max: 7.0 },
            (Urgency::Urgent, true) => DelayRange { min: 0.6, max: 1.0 },
            (Urgency::Regular, false) => DelayRange { min: 7.0, max: 15.0 },
            (Urgency::Regular, true) => DelayRange { min: 1.0, max: 2.0 },
        }
    }

    fn delay_weight(self, reinstated: bool) -> f64 {
        match (self, reinstated) {
            (Urgency::Urgent, false) => 0.5,
            (Urgency::Urgent, true) => 0.1,
            (Urgency::Regular, false) => 1.0,
            (Urgency::Regular, true) => 0.2,
        }
    }
}

pub fn remaining_bags_needed(blood_quantity: u32, donors_found: u32) -> u32 {
    blood_quantity.saturating_sub(donors_found)
}

/// Donors to look for: the remaining bags plus replacements for rejections
/// and a small urgency margin. Zero once nothing is needed.
pub fn total_donors_to_find(remaining_bags: u32, rejected_donors: u32, urgency: Urgency) -> u32 {
    if remaining_bags == 0 {
        return 0;
    }
    remaining_bags + rejected_donors + urgency.extra_donors()
}

/// Seconds to wait before the next search round
///
/// Scales with the hours left until donation and shrinks with the bags
/// still needed, bounded per urgency. Reinstated searches are paced in hours
/// rather than minutes. A donation time in the past counts as zero hours;
/// with no bags remaining the upper bound applies.
pub fn delay_period(
    remaining_bags: u32,
    donation_time: DateTime<Utc>,
    urgency: Urgency,
    reinstated: bool,
    now: DateTime<Utc>,
) -> u64 {
    let hours_until_donation =
        ((donation_time - now).num_milliseconds() as f64 / 3_600_000.0).max(0.0);
    let range = urgency.delay_range(reinstated);

    let delay = if remaining_bags == 0 {
        range.max
    } else {
        (hours_until_donation * urgency.delay_weight(reinstated) / remaining_bags as f64)
            .clamp(range.min, range.max)
    };

    let unit_seconds = if reinstated { 3600.0 } else { 60.0 };
    (delay * unit_seconds).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
    }

    #[rstest]
    #[case(3, 1, 2)]
    #[case(2, 5, 0)]
    #[case(4, 4, 0)]
    fn test_remaining_bags(#[case] quantity: u32, #[case] found: u32, #[case] expected: u32) {
        assert_eq!(remaining_bags_needed(quantity, found), expected);
    }

    #[rstest]
    #[case(0, 3, Urgency::Urgent, 0)]
    #[case(2, 1, Urgency::Urgent, 5)]
    #[case(2, 1, Urgency::Regular, 4)]
    fn test_total_donors(
        #[case] remaining: u32,
        #[case] rejected: u32,
        #[case] urgency: Urgency,
        #[case] expected: u32,
    ) {
        assert_eq!(total_donors_to_find(remaining, rejected, urgency), expected);
    }

    #[test]
    fn test_delay_within_bounds() {
        // 12h * 1.0 / 1 bag = 12 minutes
        let delay = delay_period(1, now() + Duration::hours(12), Urgency::Regular, false, now());
        assert_eq!(delay, 12 * 60);
    }

    #[test]
    fn test_delay_clamped() {
        let soon = delay_period(3, now() + Duration::minutes(10), Urgency::Urgent, false, now());
        assert_eq!(soon, 5 * 60);

        let far = delay_period(1, now() + Duration::days(10), Urgency::Urgent, false, now());
        assert_eq!(far, 7 * 60);
    }

    #[test]
    fn test_past_donation_uses_minimum() {
        let delay = delay_period(2, now() - Duration::hours(2), Urgency::Regular, false, now());
        assert_eq!(delay, 7 * 60);
    }

    #[test]
    fn test_reinstated_delay_in_hours() {
        let delay = delay_period(1, now() + Duration::hours(1), Urgency::Urgent, true, now());
        assert_eq!(delay, 2160); // 0.6 h

        // 10h * 0.2 / 1 = 2h, at the upper bound
        let delay = delay_period(1, now() + Duration::hours(10), Urgency::Regular, true, now());
        assert_eq!(delay, 7200);
    }

    #[test]
    fn test_no_bags_remaining_uses_maximum() {
        let delay = delay_period(0, now() + Duration::hours(1), Urgency::Regular, false, now());
        assert_eq!(delay, 15 * 60);
    }

    #[test]
    fn test_urgency_parsing() {
        assert_eq!("urgent".parse::<Urgency>().unwrap(), Urgency::Urgent);
        assert_eq!(Urgency::Regular.to_string(), "regular");
    }
}
