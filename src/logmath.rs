use ordered_float::OrderedFloat;

/// Log probability standing in for a zero probability.  Log 0 is
/// negative infinity, which does not survive arithmetic, so a very
/// large negative value is used instead.
pub const ZERO_LOG_PROB: f64 = -(f32::MAX as f64) / 2.0;

/// Add probabilities given as natural logs, returning the log of the
/// sum.  An empty list, or one where every value is at or below
/// [`ZERO_LOG_PROB`], sums to [`ZERO_LOG_PROB`].  NaN values are
/// skipped, and any positive infinity makes the sum infinite.
pub fn log_sum_exp(log_probs: &[f64]) -> f64 {
    let valid = || log_probs.iter().copied().filter(|lp| !lp.is_nan());
    let max = match valid().map(OrderedFloat).max() {
        Some(OrderedFloat(max)) if max == f64::INFINITY => return max,
        Some(OrderedFloat(max)) if max > ZERO_LOG_PROB => max,
        _ => return ZERO_LOG_PROB,
    };
    let sum: f64 = valid().map(|lp| (lp - max).exp()).sum();
    max + sum.ln()
}

/// Natural log of a probability, flooring zero at [`ZERO_LOG_PROB`]
pub fn prob_to_log(prob: f64) -> f64 {
    if prob > 0.0 {
        prob.ln().max(ZERO_LOG_PROB)
    } else {
        ZERO_LOG_PROB
    }
}
