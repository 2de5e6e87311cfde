//! Risk/portfolio gate.
//!
//! A pure function of the decision, current balances, and configured limits.
//! Never fails: a decision that violates a limit is rewritten to a smaller
//! one or to HOLD, with the original rationale preserved for audit.

use auto_trade_core::config::{AssetConfig, EngineConfig, MagnitudeMode};
use auto_trade_core::events::{AccountBalances, Decision, DecisionSource, TradeAction};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Applies position limits to a validated decision.
///
/// Rules, in order: SELL is capped to current holdings (zero holdings
/// downgrades to HOLD); BUY spend is capped to `max_position_pct` of total
/// portfolio value; anything whose notional lands below `min_notional`
/// downgrades to HOLD.
#[must_use]
pub fn apply(
    decision: Decision,
    balances: AccountBalances,
    price: Decimal,
    asset: &AssetConfig,
    engine: &EngineConfig,
) -> Decision {
    if decision.is_hold() {
        return decision;
    }

    match decision.action {
        TradeAction::Sell => gate_sell(decision, balances, price, asset, engine),
        TradeAction::Buy => gate_buy(decision, balances, price, asset, engine),
        TradeAction::Hold => decision,
    }
}

/// Asset quantity a sell decision would move.
#[must_use]
pub fn sell_quantity(decision: &Decision, balances: AccountBalances, engine: &EngineConfig) -> Decimal {
    match engine.magnitude_mode {
        MagnitudeMode::PortfolioFraction => balances.holdings * decision.magnitude,
        MagnitudeMode::Absolute => decision.magnitude,
    }
}

/// Quote currency a buy decision would spend, after fee headroom.
#[must_use]
pub fn buy_spend(decision: &Decision, balances: AccountBalances, engine: &EngineConfig) -> Decimal {
    match engine.magnitude_mode {
        MagnitudeMode::PortfolioFraction => {
            balances.quote * engine.fee_headroom * decision.magnitude
        }
        MagnitudeMode::Absolute => decision.magnitude,
    }
}

fn gate_sell(
    decision: Decision,
    balances: AccountBalances,
    price: Decimal,
    asset: &AssetConfig,
    engine: &EngineConfig,
) -> Decision {
    if balances.holdings <= Decimal::ZERO {
        return downgrade(decision, "nothing held to sell");
    }

    let mut decision = decision;
    let quantity = sell_quantity(&decision, balances, engine);
    if quantity > balances.holdings {
        decision = cap(
            decision,
            match engine.magnitude_mode {
                MagnitudeMode::PortfolioFraction => Decimal::ONE,
                MagnitudeMode::Absolute => balances.holdings,
            },
            "sell capped to holdings",
        );
    }

    let notional = sell_quantity(&decision, balances, engine) * price;
    if notional < asset.min_notional {
        return downgrade(decision, "sell below minimum notional");
    }

    decision
}

fn gate_buy(
    decision: Decision,
    balances: AccountBalances,
    price: Decimal,
    asset: &AssetConfig,
    engine: &EngineConfig,
) -> Decision {
    let mut decision = decision;
    let portfolio_value = balances.portfolio_value(price);
    let max_spend =
        portfolio_value * Decimal::from_f64(asset.max_position_pct).unwrap_or(Decimal::ONE);

    let spend = buy_spend(&decision, balances, engine);
    if spend > max_spend {
        let capped = match engine.magnitude_mode {
            MagnitudeMode::PortfolioFraction => {
                let spendable = balances.quote * engine.fee_headroom;
                if spendable <= Decimal::ZERO {
                    return downgrade(decision, "no funds available to buy");
                }
                (max_spend / spendable).min(Decimal::ONE)
            }
            MagnitudeMode::Absolute => max_spend,
        };
        decision = cap(decision, capped, "buy capped to max position");
    }

    let spend = buy_spend(&decision, balances, engine);
    if spend > balances.quote {
        return downgrade(decision, "insufficient quote balance");
    }
    if spend < asset.min_notional {
        return downgrade(decision, "buy below minimum notional");
    }

    decision
}

fn cap(decision: Decision, magnitude: Decimal, reason: &str) -> Decision {
    let original = decision.rationale.clone();
    Decision {
        magnitude,
        rationale: format!("risk-gate: {reason}"),
        original_rationale: Some(
            decision
                .original_rationale
                .unwrap_or(original),
        ),
        source: DecisionSource::RiskGateOverride,
        ..decision
    }
}

fn downgrade(decision: Decision, reason: &str) -> Decision {
    let original = decision.rationale.clone();
    Decision {
        action: TradeAction::Hold,
        magnitude: Decimal::ZERO,
        rationale: format!("risk-gate: {reason}"),
        original_rationale: Some(
            decision
                .original_rationale
                .unwrap_or(original),
        ),
        source: DecisionSource::RiskGateOverride,
        ..decision
    }
}
