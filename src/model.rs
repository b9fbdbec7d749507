/// Core data types for the flood early-warning AI service.
///
/// This module defines the shared domain model imported by all other modules:
/// raw sensor readings, derived feature rows, the risk label enumeration and
/// the countdown text helpers. It contains no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Feature layout
// ---------------------------------------------------------------------------

/// Ordered feature names the models are trained on.
///
/// The first seven entries are the legacy feature vector; artifacts trained
/// on that width are served by truncating the full vector.
pub const MODEL_FEATURES: [&str; 9] = [
    "mucnuoca",
    "mucnuocb",
    "luuluong",
    "is_raining_now",
    "b_rate_of_change",
    "flow_rate_of_change",
    "ab_diff",
    "b_absolute_change",
    "danger_index",
];

/// Width of the legacy (pre danger-index) feature vector.
pub const LEGACY_FEATURE_COUNT: usize = 7;

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// One raw row from the `sensor_data` table.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Upstream water level (point A), cm.
    pub mucnuoca: f64,
    /// Downstream water level (point B), cm.
    pub mucnuocb: f64,
    /// Flow rate, m³/s.
    pub luuluong: f64,
    /// Rain sensor state, if it was recorded for this row.
    pub is_raining: Option<bool>,
    pub created_at: DateTime<Utc>,
    /// Seconds until upstream reaches danger level, if a flood is in progress.
    pub countdown_seconds: Option<f64>,
}

/// Engineered features for one reading.
///
/// Produced by `features::engineer_features` at training time and by
/// `features::complete_features` at serving time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub mucnuoca: f64,
    pub mucnuocb: f64,
    pub luuluong: f64,
    /// 1.0 when raining, 0.0 otherwise.
    pub is_raining_now: f64,
    /// Seconds since the previous reading (0 for the first row).
    pub time_diff: f64,
    pub b_rate_of_change: f64,
    pub flow_rate_of_change: f64,
    pub b_absolute_change: f64,
    /// mucnuocb − mucnuoca
    pub ab_diff: f64,
    pub ab_relative_diff: f64,
    /// Rolling mean of `b_rate_of_change`.
    pub b_trend: f64,
    pub danger_index: f64,
    /// Countdown to danger; 0 when absent.
    pub countdown_seconds: f64,
}

impl FeatureRow {
    /// Model input vector, ordered as `MODEL_FEATURES`.
    pub fn model_vector(&self) -> Vec<f64> {
        vec![
            self.mucnuoca,
            self.mucnuocb,
            self.luuluong,
            self.is_raining_now,
            self.b_rate_of_change,
            self.flow_rate_of_change,
            self.ab_diff,
            self.b_absolute_change,
            self.danger_index,
        ]
    }

    pub fn is_raining(&self) -> bool {
        self.is_raining_now > 0.0
    }
}

/// Primitive feature values supplied by a client for a single prediction.
///
/// Deltas come from the client instead of historical lookback; everything
/// else is derived server-side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureInput {
    pub mucnuoca: f64,
    pub mucnuocb: f64,
    pub luuluong: f64,
    pub is_raining_now: f64,
    pub b_rate_of_change: f64,
    pub flow_rate_of_change: f64,
    pub ab_diff: f64,
    pub b_absolute_change: f64,
}

impl From<&FeatureRow> for FeatureInput {
    fn from(row: &FeatureRow) -> Self {
        FeatureInput {
            mucnuoca: row.mucnuoca,
            mucnuocb: row.mucnuocb,
            luuluong: row.luuluong,
            is_raining_now: row.is_raining_now,
            b_rate_of_change: row.b_rate_of_change,
            flow_rate_of_change: row.flow_rate_of_change,
            ab_diff: row.ab_diff,
            b_absolute_change: row.b_absolute_change,
        }
    }
}

// ---------------------------------------------------------------------------
// Risk labels
// ---------------------------------------------------------------------------

/// Flood risk levels, in ascending order of severity.
///
/// Serialized with the strings the field deployment and mobile app expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLabel {
    #[serde(rename = "Bình thường")]
    Normal,
    #[serde(rename = "Cảnh báo!")]
    Warning,
    #[serde(rename = "Cảnh báo Cao!")]
    HighWarning,
    #[serde(rename = "Nguy hiểm!")]
    Danger,
}

impl RiskLabel {
    pub const ALL: [RiskLabel; 4] = [
        RiskLabel::Normal,
        RiskLabel::Warning,
        RiskLabel::HighWarning,
        RiskLabel::Danger,
    ];

    /// Wire string for this label.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Normal => "Bình thường",
            RiskLabel::Warning => "Cảnh báo!",
            RiskLabel::HighWarning => "Cảnh báo Cao!",
            RiskLabel::Danger => "Nguy hiểm!",
        }
    }

    /// Stable class index used by the classifier.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<RiskLabel> {
        RiskLabel::ALL.get(index).copied()
    }

    /// Display color for dashboards.
    pub fn color(&self) -> &'static str {
        match self {
            RiskLabel::Normal => "green",
            RiskLabel::Warning => "yellow",
            RiskLabel::HighWarning => "orange",
            RiskLabel::Danger => "red",
        }
    }
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Countdown text
// ---------------------------------------------------------------------------

const MINUTE_UNIT: &str = "phút";
const SECOND_UNIT: &str = "giây";

/// Parses a stored countdown value into seconds.
///
/// Accepts plain numbers (`"45"`, `"45.5"`) and the localized form written
/// by `format_countdown` (`"2 phút 5 giây"`, `"40 giây"`). Returns `None`
/// for empty, negative, non-finite or unrecognized text.
pub fn parse_countdown(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(seconds) = text.parse::<f64>() {
        return (seconds.is_finite() && seconds >= 0.0).then_some(seconds);
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() % 2 != 0 {
        return None;
    }

    let mut total = 0.0;
    for pair in tokens.chunks(2) {
        let value: f64 = pair[0].parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        match pair[1] {
            MINUTE_UNIT => total += value * 60.0,
            SECOND_UNIT => total += value,
            _ => return None,
        }
    }

    Some(total)
}

/// Formats seconds as `"M phút S giây"`, or `"S giây"` under a minute.
///
/// Returns `None` for negative or non-finite input.
pub fn format_countdown(seconds: f64) -> Option<String> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    let minutes = (seconds / 60.0).floor() as u64;
    let remaining = (seconds % 60.0).round() as u64;

    if minutes > 0 {
        Some(format!("{} {} {} {}", minutes, MINUTE_UNIT, remaining, SECOND_UNIT))
    } else {
        Some(format!("{} {}", remaining, SECOND_UNIT))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
