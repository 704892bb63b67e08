use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Group-discount configuration, injected through `EngineConfig`.
///
/// Never read from the process environment; embedders own these knobs.
/// Defaults match the historical behavior: parties of five or more get
/// ten percent off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Party size at which the group discount starts applying.
    pub group_threshold: u32,
    /// Discount rate in `[0, 1)` once the threshold is met.
    pub group_discount: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            group_threshold: 5,
            group_discount: 0.10,
        }
    }
}

/// Priced preview of an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub tour_id: Ulid,
    pub party: u32,
    pub base_price_cents: i64,
    pub total_cents: i64,
    pub discounted: bool,
}

/// Total for `party` seats at `base_cents` each, rounded to the nearest cent.
pub fn price_order(base_cents: i64, party: u32, config: &PricingConfig) -> i64 {
    let gross = base_cents * party as i64;
    if party < config.group_threshold || config.group_discount <= 0.0 {
        return gross;
    }
    (gross as f64 * (1.0 - config.group_discount)).round() as i64
}

/// Whether the group discount applies to a party of this size.
pub fn discount_applies(party: u32, config: &PricingConfig) -> bool {
    party >= config.group_threshold && config.group_discount > 0.0
}
