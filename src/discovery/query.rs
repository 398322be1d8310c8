//! Search query construction.

use chrono::{Months, NaiveDate};

/// Filters shared by every per-language query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilters {
    pub min_stars: u32,
    pub max_stars: u32,
    /// Only repositories last pushed strictly before this date match.
    pub pushed_before: NaiveDate,
    /// SPDX-style license key, e.g. `mit`.
    pub license: String,
}

/// Returns the date `months` calendar months before `today`.
///
/// Days past the end of the target month are clamped (Aug 31 minus six
/// months is Feb 28/29). Returns `None` only if the result underflows the
/// calendar.
pub fn staleness_cutoff(today: NaiveDate, months: u32) -> Option<NaiveDate> {
    today.checked_sub_months(Months::new(months))
}

/// Builds the search query for one language.
pub fn build_query(language: &str, filters: &QueryFilters) -> String {
    [
        format!("language:{}", language),
        format!("stars:{}..{}", filters.min_stars, filters.max_stars),
        format!("pushed:<{}", filters.pushed_before.format("%Y-%m-%d")),
        "archived:false".to_string(),
        "is:public".to_string(),
        "fork:false".to_string(),
        format!("license:{}", filters.license),
    ]
    .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn query_has_every_filter() {
        let filters = QueryFilters {
            min_stars: 3,
            max_stars: 10,
            pushed_before: date(2024, 1, 15),
            license: "mit".to_string(),
        };
        assert_eq!(
            build_query("TypeScript", &filters),
            "language:TypeScript stars:3..10 pushed:<2024-01-15 archived:false is:public fork:false license:mit"
        );
    }

    #[test]
    fn cutoff_subtracts_calendar_months() {
        assert_eq!(staleness_cutoff(date(2024, 7, 15), 6), Some(date(2024, 1, 15)));
        assert_eq!(staleness_cutoff(date(2024, 3, 10), 6), Some(date(2023, 9, 10)));
    }

    #[test]
    fn cutoff_clamps_to_month_end() {
        assert_eq!(staleness_cutoff(date(2024, 8, 31), 6), Some(date(2024, 2, 29)));
    }

    #[test]
    fn zero_months_is_today() {
        assert_eq!(staleness_cutoff(date(2024, 8, 31), 0), Some(date(2024, 8, 31)));
    }
}
