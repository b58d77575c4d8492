//! Two-phase double validation.
//!
//! Phase 1 is whatever the fabric already produced. Phase 2 re-fetches the
//! same request through disjoint sources after a mandatory delay, which on
//! fast chains forces at least one block between the observations. The gate
//! passes when the phases agree within the configured tolerance.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use super::datapoint::{DataPoint, FetchRequest, ValidationResult};
use super::layers::FallbackLayers;
use super::ValidationError;

/// Strip the layer prefix off a provenance source so exclusion matches the
/// underlying adapter identity.
fn raw_source(source: &str) -> &str {
    source
        .rsplit(':')
        .next()
        .unwrap_or(source)
}

pub(super) async fn run(
    layers: &FallbackLayers,
    request: &FetchRequest,
    phase1: &DataPoint,
    delay_ms: u64,
    tolerance_pct: Decimal,
) -> Result<ValidationResult, ValidationError> {
    if delay_ms > 0 {
        sleep(Duration::from_millis(delay_ms)).await;
    }

    let phase2 = layers.fetch_disjoint(request, raw_source(&phase1.source)).await?;

    let p1 = phase1.scalar();
    let p2 = phase2.value.scalar();
    let (Some(a), Some(b)) = (p1, p2) else {
        return Ok(ValidationResult {
            passed: false,
            phase1_value: p1,
            phase2_value: p2,
            deviation: None,
            reason: Some("non-comparable phase values".to_string()),
        });
    };
    if a.is_zero() {
        return Ok(ValidationResult {
            passed: false,
            phase1_value: Some(a),
            phase2_value: Some(b),
            deviation: None,
            reason: Some("phase-1 value is zero".to_string()),
        });
    }

    let deviation = ((a - b) / a).abs();
    let passed = deviation * dec!(100) <= tolerance_pct;
    if passed {
        debug!(%deviation, "double validation passed");
    } else {
        warn!(%deviation, phase1 = %a, phase2 = %b, "double validation mismatch");
    }
    Ok(ValidationResult {
        passed,
        phase1_value: Some(a),
        phase2_value: Some(b),
        deviation: Some(deviation),
        reason: (!passed).then(|| format!("phase deviation {deviation} above tolerance")),
    })
}
