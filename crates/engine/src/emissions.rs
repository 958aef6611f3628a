//! Token emissions schedule.
//!
//! Three flat tiers keyed on whole days elapsed since launch, no smoothing:
//! - days 0-13: 10,000 per day
//! - days 14-27: 25,000 per day
//! - day 28 onwards: 100,000 per day
//!
//! Days before launch (negative) fall in the first tier.

/// Length of the first tier in days.
pub const TIER_ONE_DAYS: i64 = 14;

/// End of the second tier in days since launch (exclusive).
pub const TIER_TWO_END_DAYS: i64 = 28;

/// Daily emission during the first tier.
pub const TIER_ONE_DAILY: f64 = 10_000.0;

/// Daily emission during the second tier.
pub const TIER_TWO_DAILY: f64 = 25_000.0;

/// Daily emission from the third tier onwards.
pub const TIER_THREE_DAILY: f64 = 100_000.0;

/// Daily emission for a day `days_since_launch` whole days after launch.
pub fn daily_emissions(days_since_launch: i64) -> f64 {
    if days_since_launch < TIER_ONE_DAYS {
        TIER_ONE_DAILY
    } else if days_since_launch < TIER_TWO_END_DAYS {
        TIER_TWO_DAILY
    } else {
        TIER_THREE_DAILY
    }
}

/// Emissions for a seven day window.
///
/// Every day of the window is priced at the rate of `days_since_launch`
/// (the day the payout runs), not at each day's own historical rate.
pub fn weekly_emissions(days_since_launch: i64) -> f64 {
    (0..7).map(|_| daily_emissions(days_since_launch)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_switch_on_exact_day_boundaries() {
        assert_eq!(daily_emissions(-3), 10_000.0);
        assert_eq!(daily_emissions(0), 10_000.0);
        assert_eq!(daily_emissions(13), 10_000.0);
        assert_eq!(daily_emissions(14), 25_000.0);
        assert_eq!(daily_emissions(27), 25_000.0);
        assert_eq!(daily_emissions(28), 100_000.0);
        assert_eq!(daily_emissions(10_000), 100_000.0);
    }

    #[test]
    fn weekly_uses_single_rate_for_all_days() {
        // A window straddling the tier boundary is still priced at the run day's rate.
        assert_eq!(weekly_emissions(15), 175_000.0);
        assert_eq!(weekly_emissions(30), 700_000.0);
    }
}
