//! Confidence model: source weight x freshness weight x oracle weight.
//!
//! The product gates execution. 0.85 is the floor for any trade; notionals
//! past the high-value threshold require 0.95.

/// Source weight by fabric layer (1 = protocol-native .. 4 = conservative
/// fallback).
pub fn source_weight(layer: u8) -> f64 {
    match layer {
        1 => 1.00,
        2 => 0.95,
        3 => 0.85,
        _ => 0.60,
    }
}

/// Piecewise freshness weight with breakpoints at 5s / 12s / 30s / 60s.
pub fn freshness_weight(staleness_s: f64) -> f64 {
    if staleness_s < 5.0 {
        1.0
    } else if staleness_s < 12.0 {
        0.95
    } else if staleness_s < 30.0 {
        0.85
    } else if staleness_s < 60.0 {
        0.70
    } else {
        0.50
    }
}

/// Oracle weight: verified 1.0, unverified 0.80, flagged 0.50.
pub fn oracle_weight(verified: bool, flagged: bool) -> f64 {
    if flagged {
        0.50
    } else if verified {
        1.00
    } else {
        0.80
    }
}

/// Cross-checking only exists for price and gas; other data types take a
/// neutral oracle weight instead of being permanently capped at 0.80.
pub fn confidence_with_applicability(
    layer: u8,
    staleness_s: f64,
    oracle_applicable: bool,
    verified: bool,
    flagged: bool,
) -> f64 {
    let oracle = if oracle_applicable { oracle_weight(verified, flagged) } else { 1.0 };
    source_weight(layer) * freshness_weight(staleness_s) * oracle
}

pub fn confidence(layer: u8, staleness_s: f64, verified: bool, flagged: bool) -> f64 {
    confidence_with_applicability(layer, staleness_s, true, verified, flagged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_weights_match_layers() {
        assert_eq!(source_weight(1), 1.00);
        assert_eq!(source_weight(2), 0.95);
        assert_eq!(source_weight(3), 0.85);
        assert_eq!(source_weight(4), 0.60);
    }

    #[test]
    fn freshness_breakpoints() {
        assert_eq!(freshness_weight(0.0), 1.0);
        assert_eq!(freshness_weight(4.9), 1.0);
        assert_eq!(freshness_weight(5.0), 0.95);
        assert_eq!(freshness_weight(12.0), 0.85);
        assert_eq!(freshness_weight(30.0), 0.70);
        assert_eq!(freshness_weight(60.0), 0.50);
        assert_eq!(freshness_weight(600.0), 0.50);
    }

    #[test]
    fn layer4_confidence_is_bounded() {
        // I6: a layer-4 point can never exceed 0.60 times the other weights.
        for staleness in [0.0, 10.0, 45.0, 120.0] {
            for (verified, flagged) in [(false, false), (true, false), (false, true)] {
                let c = confidence(4, staleness, verified, flagged);
                let bound = 0.60 * freshness_weight(staleness) * oracle_weight(verified, flagged);
                assert!(c <= bound + f64::EPSILON);
            }
        }
    }

    #[test]
    fn fresh_verified_layer1_hits_unity() {
        assert_eq!(confidence(1, 0.0, true, false), 1.0);
    }

    #[test]
    fn flag_halves_oracle_weight() {
        let clean = confidence(1, 0.0, false, false);
        let flagged = confidence(1, 0.0, false, true);
        assert_eq!(clean, 0.80);
        assert_eq!(flagged, 0.50);
    }
}
