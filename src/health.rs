/*!
 * Health scoring
 *
 * Every event carries a signed delta chosen by the caller to reflect its
 * actual impact (-87 for a catastrophe, -6 for a cosmetic glitch). Deltas are
 * stored exactly; nothing is rounded until the final percentage.
 *
 * normalized = clamp(round(raw * 100 / total), -100, 100) when a total is
 * declared, clamp(raw, -100, 100) otherwise.
 */

/// Lowest and highest normalized health
pub const HEALTH_MIN: i32 = -100;
pub const HEALTH_MAX: i32 = 100;

const BAR_WIDTH: usize = 40;

/// Running score for one logging session
///
/// Not synchronized: one scorer belongs to one logical unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthScore {
    raw: i64,
    total: Option<i64>,
    normalized: i32,
}

impl HealthScore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the normalization denominator
    ///
    /// Last call wins. A non-positive total clears the declaration.
    pub fn declare_total(&mut self, total: i64) {
        self.total = (total > 0).then_some(total);
        self.normalized = normalize(self.raw, self.total);
    }

    /// Add a delta and return the new normalized health
    pub fn apply(&mut self, delta: i32) -> i32 {
        self.raw += i64::from(delta);
        self.normalized = normalize(self.raw, self.total);
        self.normalized
    }

    pub fn raw(&self) -> i64 {
        self.raw
    }

    pub fn total(&self) -> Option<i64> {
        self.total
    }

    pub fn normalized(&self) -> i32 {
        self.normalized
    }
}

/// Percentage of `total` (rounded half away from zero), clamped to -100..=100
pub fn normalize(raw: i64, total: Option<i64>) -> i32 {
    match total {
        Some(total) if total > 0 => {
            let pct = (raw as f64 * 100.0 / total as f64).round();
            clamp_health(pct.clamp(i64::MIN as f64, i64::MAX as f64) as i64)
        }
        _ => clamp_health(raw),
    }
}

pub fn clamp_health(value: i64) -> i32 {
    value.clamp(i64::from(HEALTH_MIN), i64::from(HEALTH_MAX)) as i32
}

/// One band of the health range table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthRange {
    /// Lowest normalized health inside this band
    pub threshold: i32,
    pub symbol: &'static str,
    pub description: &'static str,
}

const fn band(threshold: i32, symbol: &'static str, description: &'static str) -> HealthRange {
    HealthRange {
        threshold,
        symbol,
        description,
    }
}

/// Bands from best to worst; the first threshold <= health wins
pub const HEALTH_RANGES: [HealthRange; 21] = [
    band(90, "💚", "Excellent - all systems healthy"),
    band(80, "💙", "Very Good - minor issues only"),
    band(70, "💛", "Good - some concerns"),
    band(60, "🧡", "Above Average - noticeable issues"),
    band(50, "❤️", "Average - mixed results"),
    band(40, "🤍", "Below Average - attention needed"),
    band(30, "💔", "Fair - significant problems"),
    band(20, "🩹", "Poor - major issues"),
    band(10, "⚠️", "Warning - critical attention needed"),
    band(1, "☠️", "Critical - near failure"),
    band(0, "⚫", "Neutral - balanced state"),
    band(-9, "🔴", "Slight Negative - minor damage"),
    band(-19, "🟠", "Negative - noticeable degradation"),
    band(-29, "🟡", "Declining - system weakening"),
    band(-39, "🟢", "Degraded - significant damage"),
    band(-49, "🔵", "Damaged - major problems"),
    band(-59, "🟣", "Severe - critical damage"),
    band(-69, "🟤", "Critical - near failure"),
    band(-79, "⚫", "Failing - barely functional"),
    band(-89, "⬛", "Near Death - almost gone"),
    band(-100, "💀", "Dead - complete failure"),
];

/// Band for a normalized health value
pub fn health_range(normalized: i32) -> &'static HealthRange {
    let clamped = clamp_health(i64::from(normalized));
    HEALTH_RANGES
        .iter()
        .find(|range| clamped >= range.threshold)
        .unwrap_or(&HEALTH_RANGES[HEALTH_RANGES.len() - 1])
}

/// `symbol description` of the band holding `normalized`
pub fn indicator(normalized: i32) -> String {
    let range = health_range(normalized);
    format!("{} {}", range.symbol, range.description)
}

/// Fixed-width bar mapping -100..=100 onto 0..=100
///
/// `[████████████████████░░░░░░░░░░░░░░░░░░░░] (50/100)` for a health of 0.
pub fn health_bar(normalized: i32) -> String {
    let shifted = (clamp_health(i64::from(normalized)) + 100) / 2;
    let filled = shifted as usize * BAR_WIDTH / 100;
    format!(
        "[{}{}] ({}/100)",
        "█".repeat(filled),
        "░".repeat(BAR_WIDTH - filled),
        shifted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_is_exact_sum() {
        let mut score = HealthScore::new();
        for delta in [17, -6, 42, -87, 3] {
            score.apply(delta);
        }
        assert_eq!(score.raw(), 17 - 6 + 42 - 87 + 3);
    }

    #[test]
    fn test_undeclared_total_clamps_raw() {
        let mut score = HealthScore::new();
        score.apply(73);
        assert_eq!(score.normalized(), 73);
        score.apply(73);
        assert_eq!(score.normalized(), 100);
        score.apply(-400);
        assert_eq!(score.raw(), -254);
        assert_eq!(score.normalized(), -100);
    }

    #[test]
    fn test_declared_total_normalizes() {
        let mut score = HealthScore::new();
        score.declare_total(300);
        score.apply(100);
        // 100 * 100 / 300 = 33.33
        assert_eq!(score.normalized(), 33);
        score.apply(1);
        // 101 * 100 / 300 = 33.67
        assert_eq!(score.normalized(), 34);
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        assert_eq!(normalize(1, Some(200)), 1);
        assert_eq!(normalize(-1, Some(200)), -1);
        assert_eq!(normalize(1, Some(300)), 0);
    }

    #[test]
    fn test_over_allocation_normalized_then_clamped() {
        let mut score = HealthScore::new();
        score.declare_total(50);
        score.apply(40);
        score.apply(35);
        assert_eq!(score.raw(), 75);
        assert_eq!(score.normalized(), 100);
    }

    #[test]
    fn test_declare_total_last_write_wins() {
        let mut score = HealthScore::new();
        score.apply(20);
        score.declare_total(40);
        assert_eq!(score.normalized(), 50);
        score.declare_total(80);
        assert_eq!(score.total(), Some(80));
        assert_eq!(score.normalized(), 25);
        score.declare_total(0);
        assert_eq!(score.total(), None);
        assert_eq!(score.normalized(), 20);
    }

    #[test]
    fn test_property_sequences() {
        // Deterministic pseudo-random sequences against the closed form
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        for total in [1_i64, 7, 100, 333, 1000] {
            let mut score = HealthScore::new();
            score.declare_total(total);
            let mut sum: i64 = 0;
            for _ in 0..200 {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                let delta = (seed % 181) as i32 - 90;
                sum += i64::from(delta);
                score.apply(delta);

                let expected = ((sum as f64) * 100.0 / total as f64).round() as i64;
                assert_eq!(score.raw(), sum);
                assert_eq!(score.normalized(), expected.clamp(-100, 100) as i32);
            }
        }
    }

    #[test]
    fn test_health_range_lookup() {
        assert_eq!(health_range(100).threshold, 90);
        assert_eq!(health_range(90).threshold, 90);
        assert_eq!(health_range(89).threshold, 80);
        assert_eq!(health_range(0).description, "Neutral - balanced state");
        assert_eq!(health_range(-5).threshold, -9);
        assert_eq!(health_range(-100).symbol, "💀");
        assert_eq!(health_range(-500).symbol, "💀");
    }

    #[test]
    fn test_indicator() {
        assert_eq!(indicator(95), "💚 Excellent - all systems healthy");
        assert_eq!(indicator(-95), "💀 Dead - complete failure");
    }

    #[test]
    fn test_health_bar() {
        let bar = health_bar(0);
        assert!(bar.ends_with("(50/100)"));
        assert_eq!(bar.matches('█').count(), 20);
        assert_eq!(bar.matches('░').count(), 20);

        assert_eq!(health_bar(100).matches('█').count(), 40);
        assert_eq!(health_bar(-100).matches('░').count(), 40);
    }
}
