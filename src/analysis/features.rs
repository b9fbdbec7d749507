/// Feature engineering shared by the training pipelines and the serving path.
///
/// `engineer_features` turns a time-ordered table of `SensorReading`s into
/// `FeatureRow`s using finite differences against the previous row.
/// `complete_features` builds the same row for a single prediction request,
/// where the client supplies the deltas instead of historical lookback.
///
/// Both paths run every derived value through the same helpers, so fields
/// shared between them are bit-identical for identical inputs.

use crate::config::{DangerWeights, FeatureConfig};
use crate::model::{FeatureInput, FeatureRow, SensorReading};

// ---------------------------------------------------------------------------
// Arithmetic helpers
// ---------------------------------------------------------------------------

/// Replaces NaN and ±∞ with zero.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Value delta per second; zero when the time delta is not positive.
pub fn rate_of_change(delta: f64, time_delta_secs: f64) -> f64 {
    if time_delta_secs > 0.0 {
        finite_or_zero(delta / time_delta_secs)
    } else {
        0.0
    }
}

/// Ratio with an epsilon-guarded, sign-insensitive denominator.
pub fn guarded_ratio(numerator: f64, denominator: f64, epsilon: f64) -> f64 {
    finite_or_zero(numerator / (denominator.abs() + epsilon))
}

/// The five primitives blended into the danger index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DangerInputs {
    pub upstream_level: f64,
    pub downstream_level: f64,
    pub rate_of_change: f64,
    pub absolute_change: f64,
    pub level_gap: f64,
}

/// Weighted linear combination of level, rate, absolute change and gap.
///
/// Pure in its inputs; the absolute change contributes by magnitude.
pub fn danger_index(inputs: &DangerInputs, weights: &DangerWeights) -> f64 {
    let terms = [
        weights.upstream_level * inputs.upstream_level,
        weights.downstream_level * inputs.downstream_level,
        weights.rate_of_change * inputs.rate_of_change,
        weights.absolute_change * inputs.absolute_change.abs(),
        weights.level_gap * inputs.level_gap,
    ];
    finite_or_zero(terms.iter().sum())
}

/// Rain flag if recorded, otherwise inferred from an active countdown.
fn rain_indicator(is_raining: Option<bool>, countdown: Option<f64>) -> f64 {
    let raining = match is_raining {
        Some(flag) => flag,
        None => countdown.is_some_and(|c| c > 0.0),
    };
    if raining { 1.0 } else { 0.0 }
}

/// Fills the fields derived identically on both paths.
fn finish_row(mut row: FeatureRow, config: &FeatureConfig) -> FeatureRow {
    row.ab_relative_diff = guarded_ratio(row.ab_diff, row.mucnuoca, config.epsilon);
    row.danger_index = danger_index(
        &DangerInputs {
            upstream_level: row.mucnuoca,
            downstream_level: row.mucnuocb,
            rate_of_change: row.b_rate_of_change,
            absolute_change: row.b_absolute_change,
            level_gap: row.ab_diff,
        },
        &config.danger_weights,
    );
    row
}

// ---------------------------------------------------------------------------
// Training path
// ---------------------------------------------------------------------------

/// Derives one `FeatureRow` per reading.
///
/// Readings are sorted by `created_at` first (stable for equal timestamps).
/// First-row differences are zero, and `b_trend` uses partial windows until
/// `trend_window` rows are available.
pub fn engineer_features(readings: &[SensorReading], config: &FeatureConfig) -> Vec<FeatureRow> {
    let mut ordered: Vec<&SensorReading> = readings.iter().collect();
    ordered.sort_by_key(|r| r.created_at);

    let mut rows: Vec<FeatureRow> = Vec::with_capacity(ordered.len());
    let mut previous: Option<&SensorReading> = None;

    for reading in ordered {
        let (time_diff, b_delta, flow_delta) = match previous {
            Some(prev) => {
                let millis = (reading.created_at - prev.created_at).num_milliseconds();
                (
                    millis as f64 / 1000.0,
                    reading.mucnuocb - prev.mucnuocb,
                    reading.luuluong - prev.luuluong,
                )
            }
            None => (0.0, 0.0, 0.0),
        };

        let row = FeatureRow {
            mucnuoca: finite_or_zero(reading.mucnuoca),
            mucnuocb: finite_or_zero(reading.mucnuocb),
            luuluong: finite_or_zero(reading.luuluong),
            is_raining_now: rain_indicator(reading.is_raining, reading.countdown_seconds),
            time_diff,
            b_rate_of_change: rate_of_change(b_delta, time_diff),
            flow_rate_of_change: rate_of_change(flow_delta, time_diff),
            b_absolute_change: finite_or_zero(b_delta),
            ab_diff: finite_or_zero(reading.mucnuocb - reading.mucnuoca),
            ab_relative_diff: 0.0,
            b_trend: 0.0,
            danger_index: 0.0,
            countdown_seconds: reading.countdown_seconds.map(finite_or_zero).unwrap_or(0.0),
        };

        rows.push(finish_row(row, config));
        previous = Some(reading);
    }

    apply_trend(&mut rows, config.trend_window.max(1));
    rows
}

/// Rolling mean of `b_rate_of_change` over the trailing `window` rows.
fn apply_trend(rows: &mut [FeatureRow], window: usize) {
    let rates: Vec<f64> = rows.iter().map(|r| r.b_rate_of_change).collect();
    for (i, row) in rows.iter_mut().enumerate() {
        let start = (i + 1).saturating_sub(window);
        let slice = &rates[start..=i];
        row.b_trend = finite_or_zero(slice.iter().sum::<f64>() / slice.len() as f64);
    }
}

// ---------------------------------------------------------------------------
// Serving path
// ---------------------------------------------------------------------------

/// Builds a single-row `FeatureRow` from client-supplied primitives.
///
/// Any client-side danger index is ignored; it is always recomputed here.
/// `b_trend` is the supplied rate (a window of one) and there is no
/// countdown at serving time.
pub fn complete_features(input: &FeatureInput, config: &FeatureConfig) -> FeatureRow {
    let row = FeatureRow {
        mucnuoca: finite_or_zero(input.mucnuoca),
        mucnuocb: finite_or_zero(input.mucnuocb),
        luuluong: finite_or_zero(input.luuluong),
        is_raining_now: if input.is_raining_now > 0.0 { 1.0 } else { 0.0 },
        time_diff: 0.0,
        b_rate_of_change: finite_or_zero(input.b_rate_of_change),
        flow_rate_of_change: finite_or_zero(input.flow_rate_of_change),
        b_absolute_change: finite_or_zero(input.b_absolute_change),
        ab_diff: finite_or_zero(input.ab_diff),
        ab_relative_diff: 0.0,
        b_trend: finite_or_zero(input.b_rate_of_change),
        danger_index: 0.0,
        countdown_seconds: 0.0,
    };
    finish_row(row, config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
