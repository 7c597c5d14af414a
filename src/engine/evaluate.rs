use crate::engine::types::Effectiveness;

/// Crashes per year over an observation period. A period that is not a
/// positive number of years gives a rate of 0.
pub fn crash_rate(crashes: f64, years: f64) -> f64 {
    if years.is_finite() && years > 0.0 {
        crashes / years
    } else {
        0.0
    }
}

/// Compares the crash rate before treatment with the rate observed after.
///
/// `percent_reduction` is `None` when there were no crashes before, since
/// there is nothing to reduce relative to. An after period that is not a
/// positive number of years has no observed rate: the reduction is reported
/// as 0 and the percentage as `None`.
pub fn evaluate(before_rate: f64, after_crashes: f64, after_years: f64) -> Effectiveness {
    if !(after_years.is_finite() && after_years > 0.0) {
        return Effectiveness {
            before_rate,
            after_rate: 0.0,
            reduction: 0.0,
            percent_reduction: None,
        };
    }
    let after_rate = crash_rate(after_crashes, after_years);
    let reduction = before_rate - after_rate;
    let percent_reduction = if before_rate == 0.0 {
        None
    } else {
        Some(reduction / before_rate * 100.0)
    };

    Effectiveness {
        before_rate,
        after_rate,
        reduction,
        percent_reduction,
    }
}

/// [`evaluate`] from raw counts on both sides.
pub fn evaluate_counts(
    before_crashes: f64,
    before_years: f64,
    after_crashes: f64,
    after_years: f64,
) -> Effectiveness {
    evaluate(crash_rate(before_crashes, before_years), after_crashes, after_years)
}
