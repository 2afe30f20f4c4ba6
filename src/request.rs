//! Builder-style inputs for the engine operations
//!
//! Each request starts empty and is filled with chained setters. Missing or
//! malformed fields are reported when the request is executed by
//! [`crate::service::CashEngine`].
use super::error::ValidationError;
use super::types::{CurrencyCode, LedgerDate};
use rust_decimal::Decimal;

/// Cash bought with tracking-currency money.
#[derive(Debug, Default, Clone)]
pub struct ExchangeRequest {
    pub(crate) id: Option<String>,
    pub(crate) date: Option<LedgerDate>,
    pub(crate) base_amount: Decimal,
    pub(crate) local_amount: Decimal,
    pub(crate) local_currency: Option<String>,
    pub(crate) country: Option<String>,
    pub(crate) description: Option<String>,
}

/// Local cash received back at a known rate.
#[derive(Debug, Default, Clone)]
pub struct RefundSourceRequest {
    pub(crate) id: Option<String>,
    pub(crate) date: Option<LedgerDate>,
    pub(crate) local_amount: Decimal,
    pub(crate) local_currency: Option<String>,
    pub(crate) exchange_rate: Decimal,
    pub(crate) country: Option<String>,
    pub(crate) description: Option<String>,
}

/// Spending paid in local cash.
#[derive(Debug, Default, Clone)]
pub struct AllocationRequest {
    pub(crate) id: Option<String>,
    pub(crate) date: Option<LedgerDate>,
    pub(crate) local_amount: Decimal,
    pub(crate) local_currency: Option<String>,
    pub(crate) category: Option<String>,
    pub(crate) country: Option<String>,
    pub(crate) description: Option<String>,
}

/// Local cash swapped into another local currency.
#[derive(Debug, Default, Clone)]
pub struct ConversionRequest {
    pub(crate) id: Option<String>,
    pub(crate) date: Option<LedgerDate>,
    pub(crate) source_local_amount: Decimal,
    pub(crate) target_local_amount: Decimal,
    pub(crate) target_currency: Option<String>,
    pub(crate) country: Option<String>,
    pub(crate) description: Option<String>,
}

/// Local cash changed back into the tracking currency.
#[derive(Debug, Default, Clone)]
pub struct RefundRequest {
    pub(crate) id: Option<String>,
    pub(crate) fee_id: Option<String>,
    pub(crate) date: Option<LedgerDate>,
    pub(crate) local_amount: Decimal,
    pub(crate) exchange_rate: Decimal, // base per local, as observed today
    pub(crate) fee_category: Option<String>,
    pub(crate) country: Option<String>,
    pub(crate) description: Option<String>,
}

pub(crate) fn required_date(date: Option<LedgerDate>) -> Result<LedgerDate, ValidationError> {
    date.ok_or(ValidationError::MissingField("Date"))
}

pub(crate) fn required_currency(code: Option<&str>) -> Result<CurrencyCode, ValidationError> {
    CurrencyCode::parse(code.unwrap_or_default())
}

pub(crate) fn required_positive(
    name: &'static str,
    amount: Decimal,
) -> Result<Decimal, ValidationError> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount(name));
    }
    Ok(amount)
}

// blank strings count as absent
pub(crate) fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ExchangeRequest {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
    pub fn set_date(mut self, date: LedgerDate) -> Self {
        self.date = Some(date);
        self
    }
    pub fn set_base_amount(mut self, amount: Decimal) -> Self {
        self.base_amount = amount;
        self
    }
    pub fn set_local_amount(mut self, amount: Decimal) -> Self {
        self.local_amount = amount;
        self
    }
    pub fn set_local_currency(mut self, code: &str) -> Self {
        self.local_currency = Some(code.to_string());
        self
    }
    pub fn set_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

impl RefundSourceRequest {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
    pub fn set_date(mut self, date: LedgerDate) -> Self {
        self.date = Some(date);
        self
    }
    pub fn set_local_amount(mut self, amount: Decimal) -> Self {
        self.local_amount = amount;
        self
    }
    pub fn set_local_currency(mut self, code: &str) -> Self {
        self.local_currency = Some(code.to_string());
        self
    }
    pub fn set_exchange_rate(mut self, rate: Decimal) -> Self {
        self.exchange_rate = rate;
        self
    }
    pub fn set_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

impl AllocationRequest {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
    pub fn set_date(mut self, date: LedgerDate) -> Self {
        self.date = Some(date);
        self
    }
    pub fn set_local_amount(mut self, amount: Decimal) -> Self {
        self.local_amount = amount;
        self
    }
    /// Optional; when set, every source must be held in this currency.
    pub fn set_local_currency(mut self, code: &str) -> Self {
        self.local_currency = Some(code.to_string());
        self
    }
    pub fn set_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
    pub fn set_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

impl ConversionRequest {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
    pub fn set_date(mut self, date: LedgerDate) -> Self {
        self.date = Some(date);
        self
    }
    pub fn set_source_local_amount(mut self, amount: Decimal) -> Self {
        self.source_local_amount = amount;
        self
    }
    pub fn set_target_local_amount(mut self, amount: Decimal) -> Self {
        self.target_local_amount = amount;
        self
    }
    pub fn set_target_currency(mut self, code: &str) -> Self {
        self.target_currency = Some(code.to_string());
        self
    }
    pub fn set_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

impl RefundRequest {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
    pub fn set_fee_id(mut self, id: &str) -> Self {
        self.fee_id = Some(id.to_string());
        self
    }
    pub fn set_date(mut self, date: LedgerDate) -> Self {
        self.date = Some(date);
        self
    }
    pub fn set_local_amount(mut self, amount: Decimal) -> Self {
        self.local_amount = amount;
        self
    }
    pub fn set_exchange_rate(mut self, rate: Decimal) -> Self {
        self.exchange_rate = rate;
        self
    }
    pub fn set_fee_category(mut self, category: &str) -> Self {
        self.fee_category = Some(category.to_string());
        self
    }
    pub fn set_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_reported() {
        assert_eq!(required_date(None), Err(ValidationError::MissingField("Date")));
        assert_eq!(required_currency(None), Err(ValidationError::MissingCurrency));
        assert_eq!(
            required_positive("Local amount", Decimal::ZERO),
            Err(ValidationError::NonPositiveAmount("Local amount"))
        );
    }

    #[test]
    fn blank_text_is_dropped() {
        assert_eq!(non_blank(&Some("  ".into())), None);
        assert_eq!(non_blank(&Some(" Food ".into())), Some("Food".into()));
    }
}
