//! Engine knobs shared by the allocation and lifecycle modules

use super::error::ValidationError;
use rust_decimal::{Decimal, RoundingStrategy};

/// Tolerances, rounding and naming used by [`crate::service::CashEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Amounts at or below this are treated as zero.
    pub epsilon: Decimal,
    /// Decimal places kept on tracking-currency amounts.
    pub base_scale: u32,
    /// Category given to exchange-loss lines when the caller names none.
    pub fee_category: String,
    pub source_prefix: String,
    pub allocation_prefix: String,
    pub fee_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            epsilon: Decimal::new(1, 6),
            base_scale: 2,
            fee_category: "Exchange fees".to_string(),
            source_prefix: "cash_".to_string(),
            allocation_prefix: "alloc_".to_string(),
            fee_prefix: "fee_".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_epsilon(mut self, epsilon: Decimal) -> Self {
        self.epsilon = epsilon;
        self
    }
    pub fn with_base_scale(mut self, scale: u32) -> Self {
        self.base_scale = scale;
        self
    }
    pub fn with_fee_category(mut self, category: &str) -> Self {
        self.fee_category = category.to_string();
        self
    }
    pub fn with_prefixes(mut self, source: &str, allocation: &str, fee: &str) -> Self {
        self.source_prefix = source.to_string();
        self.allocation_prefix = allocation.to_string();
        self.fee_prefix = fee.to_string();
        self
    }

    /// Rounds a tracking-currency amount, halves away from zero.
    pub fn round_base(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.base_scale, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Tracking-currency value of `local` units at `rate`, rounded. Fails instead
    /// of overflowing when the product does not fit.
    pub fn base_value(
        &self,
        field: &'static str,
        local: Decimal,
        rate: Decimal,
    ) -> Result<Decimal, ValidationError> {
        local
            .checked_mul(rate)
            .map(|value| self.round_base(value))
            .ok_or(ValidationError::AmountTooLarge(field))
    }

    pub fn is_negligible(&self, amount: Decimal) -> bool {
        amount.abs() <= self.epsilon
    }

    /// Snaps values within epsilon of zero to exactly zero.
    pub fn snap(&self, amount: Decimal) -> Decimal {
        if self.is_negligible(amount) {
            Decimal::ZERO
        } else {
            amount
        }
    }
}
