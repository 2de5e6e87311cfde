//! Validation of decision-service responses.
//!
//! The model's JSON is untrusted input: the shape, the action, and the
//! magnitude are all checked before anything becomes a typed `Decision`.
//! Anything that fails validation is coerced to HOLD with a rationale
//! containing `invalid-response` — coercion is local handling, never an
//! error, and never retried.

use auto_trade_core::config::MagnitudeMode;
use auto_trade_core::events::{Decision, DecisionSource, TradeAction};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Magnitude interpretation for validation.
#[derive(Debug, Clone, Copy)]
pub struct MagnitudeBounds {
    pub mode: MagnitudeMode,
    /// Upper bound in absolute mode; ignored in fraction mode.
    pub absolute_cap: Decimal,
}

impl MagnitudeBounds {
    fn contains(&self, magnitude: Decimal) -> bool {
        match self.mode {
            MagnitudeMode::PortfolioFraction => {
                magnitude >= Decimal::ZERO && magnitude <= Decimal::ONE
            }
            MagnitudeMode::Absolute => {
                magnitude >= Decimal::ZERO && magnitude <= self.absolute_cap
            }
        }
    }
}

/// Turns raw response content into a validated `Decision`. Accepts both the
/// canonical `{action, magnitude, rationale}` shape and the legacy
/// `{decision, percentage, reason}` shape (percentage 1-100 normalized to a
/// fraction).
#[must_use]
pub fn parse_decision(
    content: &str,
    asset_id: &str,
    cycle_ts: DateTime<Utc>,
    bounds: MagnitudeBounds,
) -> Decision {
    match try_parse(content, bounds) {
        Ok((action, magnitude, rationale)) => Decision {
            asset_id: asset_id.to_string(),
            cycle_ts,
            action,
            magnitude,
            rationale,
            original_rationale: None,
            source: DecisionSource::DecisionService,
        },
        Err(coercion) => {
            tracing::warn!(%asset_id, reason = %coercion.reason, "coercing decision to HOLD");
            Decision {
                asset_id: asset_id.to_string(),
                cycle_ts,
                action: TradeAction::Hold,
                magnitude: Decimal::ZERO,
                rationale: format!("invalid-response: {}", coercion.reason),
                original_rationale: coercion.original_rationale,
                source: DecisionSource::DecisionService,
            }
        }
    }
}

struct Coercion {
    reason: String,
    original_rationale: Option<String>,
}

fn try_parse(
    content: &str,
    bounds: MagnitudeBounds,
) -> Result<(TradeAction, Decimal, String), Coercion> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(|e| Coercion {
        reason: format!("not valid JSON ({e})"),
        original_rationale: None,
    })?;

    let rationale = value
        .get("rationale")
        .or_else(|| value.get("reason"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);

    let action = value
        .get("action")
        .or_else(|| value.get("decision"))
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| coercion("missing action", &rationale))?;
    let action = match action.to_ascii_lowercase().as_str() {
        "buy" => TradeAction::Buy,
        "sell" => TradeAction::Sell,
        "hold" => TradeAction::Hold,
        other => return Err(coercion(&format!("unknown action `{other}`"), &rationale)),
    };

    let magnitude = if let Some(raw) = value.get("magnitude") {
        decimal_from(raw).ok_or_else(|| coercion("magnitude is not a number", &rationale))?
    } else if let Some(raw) = value.get("percentage") {
        let pct =
            decimal_from(raw).ok_or_else(|| coercion("percentage is not a number", &rationale))?;
        pct / Decimal::ONE_HUNDRED
    } else {
        return Err(coercion("missing magnitude", &rationale));
    };

    if action != TradeAction::Hold && !bounds.contains(magnitude) {
        return Err(coercion(
            &format!("magnitude {magnitude} out of bounds"),
            &rationale,
        ));
    }

    let Some(rationale) = rationale else {
        return Err(coercion("missing rationale", &None));
    };

    // A hold carries no size; normalize so downstream math never sees the
    // model's filler value.
    if action == TradeAction::Hold {
        return Ok((action, Decimal::ZERO, rationale));
    }

    Ok((action, magnitude, rationale))
}

fn coercion(reason: &str, original_rationale: &Option<String>) -> Coercion {
    Coercion {
        reason: reason.to_string(),
        original_rationale: original_rationale.clone(),
    }
}

fn decimal_from(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                n.as_f64().and_then(Decimal::from_f64)
            }
        }
        serde_json::Value::String(s) => Decimal::from_str_exact(s).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bounds() -> MagnitudeBounds {
        MagnitudeBounds {
            mode: MagnitudeMode::PortfolioFraction,
            absolute_cap: dec!(1000000),
        }
    }

    fn parse(content: &str) -> Decision {
        parse_decision(content, "BTC", Utc::now(), bounds())
    }

    #[test]
    fn canonical_shape_parses() {
        let decision =
            parse(r#"{"action": "buy", "magnitude": 0.5, "rationale": "breakout above resistance"}"#);

        assert_eq!(decision.action, TradeAction::Buy);
        assert_eq!(decision.magnitude, dec!(0.5));
        assert_eq!(decision.rationale, "breakout above resistance");
        assert_eq!(decision.source, DecisionSource::DecisionService);
    }

    #[test]
    fn legacy_percentage_shape_normalizes_to_fraction() {
        let decision = parse(r#"{"decision": "sell", "percentage": 30, "reason": "overbought"}"#);

        assert_eq!(decision.action, TradeAction::Sell);
        assert_eq!(decision.magnitude, dec!(0.3));
        assert_eq!(decision.rationale, "overbought");
    }

    #[test]
    fn out_of_bounds_magnitude_coerces_to_hold() {
        let decision = parse(r#"{"action": "buy", "magnitude": 1.5, "rationale": "all in"}"#);

        assert_eq!(decision.action, TradeAction::Hold);
        assert_eq!(decision.magnitude, Decimal::ZERO);
        assert!(decision.rationale.contains("invalid-response"));
        assert_eq!(decision.original_rationale.as_deref(), Some("all in"));
    }

    #[test]
    fn negative_magnitude_coerces_to_hold() {
        let decision = parse(r#"{"action": "sell", "magnitude": -0.1, "rationale": "x"}"#);
        assert_eq!(decision.action, TradeAction::Hold);
        assert!(decision.rationale.contains("invalid-response"));
    }

    #[test]
    fn zero_magnitude_is_valid() {
        let decision = parse(r#"{"action": "buy", "magnitude": 0, "rationale": "wait and see"}"#);
        assert_eq!(decision.action, TradeAction::Buy);
        assert_eq!(decision.magnitude, Decimal::ZERO);
        assert!(decision.is_hold(), "zero magnitude behaves as HOLD");
    }

    #[test]
    fn unknown_action_coerces_to_hold() {
        let decision = parse(r#"{"action": "yolo", "magnitude": 0.2, "rationale": "x"}"#);
        assert_eq!(decision.action, TradeAction::Hold);
        assert!(decision.rationale.contains("unknown action"));
    }

    #[test]
    fn non_json_coerces_to_hold() {
        let decision = parse("I think you should buy some bitcoin");
        assert_eq!(decision.action, TradeAction::Hold);
        assert!(decision.rationale.contains("invalid-response"));
    }

    #[test]
    fn hold_ignores_model_filler_magnitude() {
        // The legacy prompt asked for percentage 100 on holds.
        let decision = parse(r#"{"decision": "hold", "percentage": 100, "reason": "sideways"}"#);
        assert_eq!(decision.action, TradeAction::Hold);
        assert_eq!(decision.magnitude, Decimal::ZERO);
        assert_eq!(decision.rationale, "sideways");
    }

    #[test]
    fn absolute_mode_respects_cap() {
        let bounds = MagnitudeBounds {
            mode: MagnitudeMode::Absolute,
            absolute_cap: dec!(100000),
        };

        let ok = parse_decision(
            r#"{"action": "buy", "magnitude": 50000, "rationale": "dip"}"#,
            "BTC",
            Utc::now(),
            bounds,
        );
        assert_eq!(ok.action, TradeAction::Buy);
        assert_eq!(ok.magnitude, dec!(50000));

        let too_big = parse_decision(
            r#"{"action": "buy", "magnitude": 500000, "rationale": "dip"}"#,
            "BTC",
            Utc::now(),
            bounds,
        );
        assert_eq!(too_big.action, TradeAction::Hold);
        assert!(too_big.rationale.contains("invalid-response"));
    }
}
