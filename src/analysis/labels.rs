/// Risk label derivation.
///
/// **Ordered priority list, first match wins.** Each rule pairs a predicate
/// over a `FeatureRow` with the label it assigns. Rules are evaluated in the
/// order they appear in `LABEL_RULES` and evaluation stops at the first
/// predicate that holds; rows matching nothing are `Normal`.
///
/// The list is deliberately NOT sorted by severity. A row that satisfies a
/// `Danger` rule and a later `Warning` rule is `Danger` only because the
/// `Danger` rule comes first. Do not reorder.

use crate::config::LabelThresholds;
use crate::model::{FeatureRow, RiskLabel};

/// One (predicate, label) entry of the ordered rule list.
pub struct LabelRule {
    pub name: &'static str,
    pub label: RiskLabel,
    predicate: fn(&FeatureRow, &LabelThresholds) -> bool,
}

impl LabelRule {
    pub const fn new(
        name: &'static str,
        label: RiskLabel,
        predicate: fn(&FeatureRow, &LabelThresholds) -> bool,
    ) -> Self {
        Self { name, label, predicate }
    }

    pub fn matches(&self, row: &FeatureRow, thresholds: &LabelThresholds) -> bool {
        (self.predicate)(row, thresholds)
    }
}

impl std::fmt::Debug for LabelRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelRule")
            .field("name", &self.name)
            .field("label", &self.label)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

fn sudden_rise(row: &FeatureRow, t: &LabelThresholds) -> bool {
    row.b_rate_of_change > t.sudden_rise_rate
}

fn countdown_imminent(row: &FeatureRow, t: &LabelThresholds) -> bool {
    row.countdown_seconds > 0.0 && row.countdown_seconds <= t.countdown_imminent_secs
}

fn countdown_near(row: &FeatureRow, t: &LabelThresholds) -> bool {
    row.countdown_seconds > 0.0 && row.countdown_seconds <= t.countdown_near_secs
}

fn countdown_active(row: &FeatureRow, t: &LabelThresholds) -> bool {
    row.countdown_seconds > t.countdown_near_secs
}

fn no_countdown(row: &FeatureRow) -> bool {
    row.countdown_seconds == 0.0
}

fn upstream_danger(row: &FeatureRow, t: &LabelThresholds) -> bool {
    no_countdown(row) && row.mucnuoca > t.upstream_danger_level
}

fn upstream_high(row: &FeatureRow, t: &LabelThresholds) -> bool {
    no_countdown(row) && row.mucnuoca > t.upstream_high_level
}

fn upstream_warning(row: &FeatureRow, t: &LabelThresholds) -> bool {
    no_countdown(row) && row.mucnuoca > t.upstream_warning_level
}

fn downstream_high(row: &FeatureRow, t: &LabelThresholds) -> bool {
    no_countdown(row) && row.mucnuocb > t.downstream_high_level
}

fn gap_widening(row: &FeatureRow, t: &LabelThresholds) -> bool {
    no_countdown(row) && row.ab_diff > t.gap_warning
}

// ---------------------------------------------------------------------------
// Rule list
// ---------------------------------------------------------------------------

/// The label rules, in evaluation order.
pub static LABEL_RULES: &[LabelRule] = &[
    LabelRule::new("sudden_rise", RiskLabel::Danger, sudden_rise),
    LabelRule::new("countdown_imminent", RiskLabel::Danger, countdown_imminent),
    LabelRule::new("countdown_near", RiskLabel::HighWarning, countdown_near),
    LabelRule::new("countdown_active", RiskLabel::Warning, countdown_active),
    LabelRule::new("upstream_danger", RiskLabel::Danger, upstream_danger),
    LabelRule::new("upstream_high", RiskLabel::HighWarning, upstream_high),
    LabelRule::new("upstream_warning", RiskLabel::Warning, upstream_warning),
    LabelRule::new("downstream_high", RiskLabel::Warning, downstream_high),
    LabelRule::new("gap_widening", RiskLabel::Warning, gap_widening),
];

/// First rule in `rules` whose predicate holds for `row`.
pub fn first_match<'a>(
    rules: &'a [LabelRule],
    row: &FeatureRow,
    thresholds: &LabelThresholds,
) -> Option<&'a LabelRule> {
    rules.iter().find(|rule| rule.matches(row, thresholds))
}

/// Label for `row` under an explicit rule list.
pub fn derive_label_with(
    rules: &[LabelRule],
    row: &FeatureRow,
    thresholds: &LabelThresholds,
) -> RiskLabel {
    first_match(rules, row, thresholds)
        .map(|rule| rule.label)
        .unwrap_or(RiskLabel::Normal)
}

/// Label for `row` under `LABEL_RULES`.
pub fn derive_label(row: &FeatureRow, thresholds: &LabelThresholds) -> RiskLabel {
    derive_label_with(LABEL_RULES, row, thresholds)
}

/// Labels a whole feature table, one label per row.
pub fn derive_labels(rows: &[FeatureRow], thresholds: &LabelThresholds) -> Vec<RiskLabel> {
    rows.iter().map(|row| derive_label(row, thresholds)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
