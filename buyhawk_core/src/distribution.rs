// Distribution calculator. Pure: for fixed inputs and configuration the
// plan is always identical, which is what makes executor retries safe.

use crate::models::{BuyerProfile, DistributionPlan};
use crate::settings::Settings;

/// Compute the distribution plan for a classified buy.
///
/// Below the minimum-buy gate the plan is empty (`qualifies = false`).
/// Otherwise the base amount is `sol_spent * tokens_per_sol *
/// distribution_ratio` clamped to `[min_distribution, max_distribution]`
/// and rounded to whole tokens. The airdrop applies unless the one-per-user
/// policy is active and this buyer already received one.
pub fn plan_distribution(
    sol_spent: f64,
    profile: &BuyerProfile,
    settings: &Settings,
) -> DistributionPlan {
    if sol_spent < settings.minimum_buy_sol {
        return DistributionPlan::empty();
    }

    let raw = sol_spent * settings.tokens_per_sol * settings.distribution_ratio;
    let clamped = raw.clamp(settings.min_distribution as f64, settings.max_distribution as f64);
    let base_amount = clamped.round() as u64;

    let airdrop_amount = if !settings.one_airdrop_per_user || !profile.airdrop_granted {
        settings.airdrop_amount
    } else {
        0
    };

    DistributionPlan {
        qualifies: true,
        base_amount,
        airdrop_amount,
    }
}
