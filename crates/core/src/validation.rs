//! Startup validation of per-asset configuration.
//!
//! Invalid assets fail fast: they are reported once and never admitted into
//! the orchestrator's active set, instead of failing on every cycle.

use crate::config::AssetConfig;
use crate::error::ConfigError;
use rust_decimal::Decimal;

/// Checks one asset's configuration for admission.
///
/// # Errors
///
/// Returns `ConfigError::InvalidAsset` naming the first violated rule.
pub fn validate_asset(config: &AssetConfig) -> Result<(), ConfigError> {
    let fail = |reason: &str| ConfigError::InvalidAsset {
        asset: config.asset_id.clone(),
        reason: reason.to_string(),
    };

    if config.asset_id.trim().is_empty() {
        return Err(fail("asset_id must not be empty"));
    }
    if config.pair.trim().is_empty() {
        return Err(fail("pair must not be empty"));
    }
    if config.interval_secs == 0 {
        return Err(fail("interval_secs must be positive"));
    }
    if config.max_position_pct <= 0.0 || config.max_position_pct > 1.0 {
        return Err(fail("max_position_pct must be in (0, 1]"));
    }
    if config.min_notional < Decimal::ZERO {
        return Err(fail("min_notional must not be negative"));
    }

    Ok(())
}

/// Splits a configured asset list into admitted and rejected sets.
/// Disabled assets are silently skipped.
#[must_use]
pub fn partition_assets(assets: &[AssetConfig]) -> (Vec<AssetConfig>, Vec<ConfigError>) {
    let mut admitted = Vec::new();
    let mut rejected = Vec::new();

    for asset in assets.iter().filter(|a| a.enabled) {
        match validate_asset(asset) {
            Ok(()) => admitted.push(asset.clone()),
            Err(e) => rejected.push(e),
        }
    }

    (admitted, rejected)
}
