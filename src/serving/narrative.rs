/// Human-readable risk narrative returned alongside predictions.
///
/// Titles and bodies are the same notification texts the mobile app shows,
/// so a prediction can be forwarded to users unchanged.

use crate::config::{LabelThresholds, TimeLevelBuckets};
use crate::model::{FeatureRow, RiskLabel, format_countdown};

/// Below this many seconds to danger the body adds an evacuation order.
pub const EVACUATE_BELOW_SECS: f64 = 300.0;

pub fn title(label: RiskLabel) -> &'static str {
    match label {
        RiskLabel::Normal => "✅ Tình hình ổn định",
        RiskLabel::Warning => "⚠️ Cảnh báo Lũ",
        RiskLabel::HighWarning => "🔶 Cảnh báo Lũ Cao",
        RiskLabel::Danger => "🚨 BÁO ĐỘNG NGUY HIỂM",
    }
}

fn base_message(label: RiskLabel) -> &'static str {
    match label {
        RiskLabel::Normal => "Tình hình lũ hiện tại ổn định. Tiếp tục theo dõi.",
        RiskLabel::Warning => "Mực nước đang tăng. Chuẩn bị sẵn sàng các biện pháp phòng ngừa.",
        RiskLabel::HighWarning => "Mực nước đang tăng nhanh. Sẵn sàng sơ tán nếu cần thiết.",
        RiskLabel::Danger => "LŨ ĐANG Ở MỨC NGUY HIỂM! CẦN SƠ TÁN NGAY LẬP TỨC!",
    }
}

/// Notification body for `label`.
///
/// For any label above Normal with a pending countdown, the expected arrival
/// time at point A is appended, plus an evacuation order when it is under
/// five minutes away.
pub fn body(label: RiskLabel, countdown_secs: Option<f64>) -> String {
    let mut body = base_message(label).to_string();
    if label == RiskLabel::Normal {
        return body;
    }
    if let Some(seconds) = countdown_secs.filter(|s| *s > 0.0) {
        if let Some(formatted) = format_countdown(seconds) {
            body.push_str(&format!(" Lũ dự kiến đến Điểm A sau khoảng {}.", formatted));
            if seconds < EVACUATE_BELOW_SECS {
                body.push_str(" HÃY DI CHUYỂN ĐẾN NƠI AN TOÀN NGAY!");
            }
        }
    }
    body
}

pub fn rapid_rise(row: &FeatureRow, thresholds: &LabelThresholds) -> bool {
    row.b_rate_of_change > thresholds.sudden_rise_rate
}

/// Observations that contributed to the risk, most urgent first.
pub fn risk_factors(row: &FeatureRow, t: &LabelThresholds) -> Vec<String> {
    let mut factors = Vec::new();

    if rapid_rise(row, t) {
        factors.push(format!(
            "Phát hiện mực nước B đang dâng nhanh ({:.2} cm/s).",
            row.b_rate_of_change
        ));
    }

    if row.mucnuoca > t.upstream_danger_level {
        factors.push(format!("Mực nước A vượt ngưỡng {}cm!", t.upstream_danger_level));
    } else if row.mucnuoca > t.upstream_high_level {
        factors.push(format!("Mực nước A trên {}cm!", t.upstream_high_level));
    } else if row.mucnuoca > t.upstream_warning_level {
        factors.push(format!("Mực nước A trên {}cm!", t.upstream_warning_level));
    }

    if row.mucnuocb > t.downstream_high_level {
        factors.push(format!("Mực nước B trên {}cm!", t.downstream_high_level));
    }
    if row.ab_diff > t.gap_warning {
        factors.push(format!("Mực nước B cao hơn A {:.1}cm.", row.ab_diff));
    }
    if row.is_raining() {
        factors.push("Đang có mưa.".to_string());
    }

    factors
}

/// Warning level for a predicted time to danger.
///
/// Zero seconds means no countdown is pending (the regressor is trained with
/// 0 for rows without one), so it reads as Normal, matching the label rules
/// that only treat `0 < countdown <= 30` as imminent.
pub fn time_level(seconds: f64, buckets: &TimeLevelBuckets) -> RiskLabel {
    if !(seconds > 0.0) {
        RiskLabel::Normal
    } else if seconds <= buckets.danger_max_secs {
        RiskLabel::Danger
    } else if seconds <= buckets.high_warning_max_secs {
        RiskLabel::HighWarning
    } else if seconds <= buckets.warning_max_secs {
        RiskLabel::Warning
    } else {
        RiskLabel::Normal
    }
}
