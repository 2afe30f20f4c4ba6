//! Ledger entry shapes: cash pools, the spending drawn from them and exchange losses
use super::config::EngineConfig;
use super::error::{LedgerError, ValidationError};
use super::types::{CurrencyCode, LedgerDate};
use rust_decimal::Decimal;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    #[n(0)]
    Exchange,
    #[n(1)]
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Source(SourceKind),
    Allocation,
    Fee,
}

/// The part of one allocation funded by one source.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct AllocationSegment {
    #[n(0)]
    pub source_id: String,
    #[n(1)]
    #[cbor(with = "crate::types::cbor_decimal")]
    pub local_amount: Decimal,
    #[n(2)]
    #[cbor(with = "crate::types::cbor_decimal")]
    pub base_amount: Decimal,
}

/// A pool of local cash with a tracked remaining balance.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct CashSource {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub kind: SourceKind,
    #[n(2)]
    pub date: LedgerDate,
    #[n(3)]
    pub local_currency: CurrencyCode,
    #[n(4)]
    #[cbor(with = "crate::types::cbor_decimal")]
    pub original_local_amount: Decimal,
    #[n(5)]
    #[cbor(with = "crate::types::cbor_decimal")]
    pub remaining_local_amount: Decimal,
    #[n(6)]
    #[cbor(with = "crate::types::cbor_decimal")]
    pub original_base_amount: Decimal,
    #[n(7)]
    #[cbor(with = "crate::types::cbor_decimal")]
    pub remaining_base_amount: Decimal,
    #[n(8)]
    #[cbor(with = "crate::types::cbor_decimal")]
    pub exchange_rate: Decimal, // base per local, fixed at acquisition
    #[n(9)]
    pub allocation_ids: Vec<String>, // back-references, kept free of duplicates
    #[n(10)]
    pub funding_segments: Vec<AllocationSegment>, // empty unless funded by other sources
    #[n(11)]
    pub country: Option<String>,
    #[n(12)]
    pub description: Option<String>,
}

/// Spending drawn from one or more sources of the same currency.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct CashAllocation {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub date: LedgerDate,
    #[n(2)]
    pub local_currency: CurrencyCode,
    #[n(3)]
    #[cbor(with = "crate::types::cbor_decimal")]
    pub local_amount: Decimal,
    #[n(4)]
    #[cbor(with = "crate::types::cbor_decimal")]
    pub base_amount: Decimal,
    #[n(5)]
    #[cbor(with = "crate::types::cbor_decimal")]
    pub effective_exchange_rate: Decimal,
    #[n(6)]
    pub segments: Vec<AllocationSegment>,
    #[n(7)]
    pub category: String,
    #[n(8)]
    pub country: Option<String>,
    #[n(9)]
    pub description: Option<String>,
}

/// Exchange loss split out of a refund to the tracking currency.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ExchangeFee {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub date: LedgerDate,
    #[n(2)]
    #[cbor(with = "crate::types::cbor_decimal")]
    pub base_amount: Decimal,
    #[n(3)]
    pub category: String,
    #[n(4)]
    pub refund_id: String,
    #[n(5)]
    pub description: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
    #[n(0)]
    Source(#[n(0)] CashSource),
    #[n(1)]
    Allocation(#[n(0)] CashAllocation),
    #[n(2)]
    Fee(#[n(0)] ExchangeFee),
}

impl CashSource {
    /// Builds a pool from money exchanged at `base_amount / local_amount`.
    pub fn exchange(
        id: String,
        date: LedgerDate,
        local_currency: CurrencyCode,
        base_amount: Decimal,
        local_amount: Decimal,
    ) -> Result<Self, ValidationError> {
        if base_amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount("Base amount"));
        }
        if local_amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount("Local amount"));
        }
        let exchange_rate = base_amount
            .checked_div(local_amount)
            .ok_or(ValidationError::AmountTooLarge("Base amount"))?;

        Ok(Self::pool(
            id,
            SourceKind::Exchange,
            date,
            local_currency,
            base_amount,
            local_amount,
            exchange_rate,
        ))
    }

    /// Builds a refund pool. The base amount is `local_amount * exchange_rate`, rounded,
    /// and the rate is kept as given.
    pub fn refund(
        id: String,
        date: LedgerDate,
        local_currency: CurrencyCode,
        local_amount: Decimal,
        exchange_rate: Decimal,
        config: &EngineConfig,
    ) -> Result<Self, ValidationError> {
        if local_amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount("Local amount"));
        }
        if exchange_rate <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount("Exchange rate"));
        }
        let base_amount = config.base_value("Local amount", local_amount, exchange_rate)?;
        if base_amount <= Decimal::ZERO {
            return Err(ValidationError::ZeroBaseAmount);
        }

        Ok(Self::pool(
            id,
            SourceKind::Refund,
            date,
            local_currency,
            base_amount,
            local_amount,
            exchange_rate,
        ))
    }

    /// Builds the refund line for cash changed back into the tracking currency.
    ///
    /// The cash has left the trip, so the pool starts with nothing to spend and
    /// `funding` records the pools it came out of.
    pub(crate) fn settled_refund(
        id: String,
        date: LedgerDate,
        local_currency: CurrencyCode,
        local_amount: Decimal,
        base_amount: Decimal,
        exchange_rate: Decimal,
        funding: Vec<AllocationSegment>,
    ) -> Result<Self, ValidationError> {
        if local_amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount("Local amount"));
        }
        if base_amount <= Decimal::ZERO {
            return Err(ValidationError::ZeroBaseAmount);
        }

        let mut source = Self::pool(
            id,
            SourceKind::Refund,
            date,
            local_currency,
            base_amount,
            local_amount,
            exchange_rate,
        )
        .with_funding(funding);
        source.remaining_local_amount = Decimal::ZERO;
        source.remaining_base_amount = Decimal::ZERO;
        Ok(source)
    }

    fn pool(
        id: String,
        kind: SourceKind,
        date: LedgerDate,
        local_currency: CurrencyCode,
        base_amount: Decimal,
        local_amount: Decimal,
        exchange_rate: Decimal,
    ) -> Self {
        Self {
            id,
            kind,
            date,
            local_currency,
            original_local_amount: local_amount,
            remaining_local_amount: local_amount,
            original_base_amount: base_amount,
            remaining_base_amount: base_amount,
            exchange_rate,
            allocation_ids: vec![],
            funding_segments: vec![],
            country: None,
            description: None,
        }
    }

    pub fn with_country(mut self, country: Option<String>) -> Self {
        self.country = country;
        self
    }
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
    pub fn with_funding(mut self, segments: Vec<AllocationSegment>) -> Self {
        self.funding_segments = segments;
        self
    }

    /// Money value shown to the traveller. Refunds are income recorded once, so they
    /// always show the full original amount, negated.
    pub fn display_amount(&self) -> Decimal {
        match self.kind {
            SourceKind::Exchange => self.remaining_base_amount,
            SourceKind::Refund => -self.original_base_amount,
        }
    }

    /// Base-per-local rate used to price partial draws.
    pub fn unit_rate(&self) -> Option<Decimal> {
        self.original_base_amount.checked_div(self.original_local_amount)
    }

    /// A refund to the tracking currency: its cash is gone and it cannot be drawn.
    pub fn is_settled(&self) -> bool {
        self.kind == SourceKind::Refund && !self.funding_segments.is_empty()
    }

    pub fn is_drawn_by(&self, allocation_id: &str) -> bool {
        self.allocation_ids.iter().any(|id| id == allocation_id)
    }
}

impl CashAllocation {
    pub(crate) fn from_segments(
        id: String,
        date: LedgerDate,
        local_currency: CurrencyCode,
        segments: Vec<AllocationSegment>,
        category: String,
    ) -> Self {
        let local_amount: Decimal = segments.iter().map(|s| s.local_amount).sum();
        let base_amount: Decimal = segments.iter().map(|s| s.base_amount).sum();
        let effective_exchange_rate = if local_amount.is_zero() {
            Decimal::ZERO
        } else {
            base_amount / local_amount
        };

        Self {
            id,
            date,
            local_currency,
            local_amount,
            base_amount,
            effective_exchange_rate,
            segments,
            category,
            country: None,
            description: None,
        }
    }

    pub fn draws_from(&self, source_id: &str) -> bool {
        self.segments.iter().any(|s| s.source_id == source_id)
    }
}

impl LedgerEntry {
    pub fn id(&self) -> &str {
        match self {
            LedgerEntry::Source(source) => &source.id,
            LedgerEntry::Allocation(allocation) => &allocation.id,
            LedgerEntry::Fee(fee) => &fee.id,
        }
    }
    pub fn kind(&self) -> EntryKind {
        match self {
            LedgerEntry::Source(source) => EntryKind::Source(source.kind),
            LedgerEntry::Allocation(_) => EntryKind::Allocation,
            LedgerEntry::Fee(_) => EntryKind::Fee,
        }
    }
    pub fn date(&self) -> LedgerDate {
        match self {
            LedgerEntry::Source(source) => source.date,
            LedgerEntry::Allocation(allocation) => allocation.date,
            LedgerEntry::Fee(fee) => fee.date,
        }
    }
    pub fn display_amount(&self) -> Decimal {
        match self {
            LedgerEntry::Source(source) => source.display_amount(),
            LedgerEntry::Allocation(allocation) => allocation.base_amount,
            LedgerEntry::Fee(fee) => fee.base_amount,
        }
    }
    pub fn as_source(&self) -> Option<&CashSource> {
        match self {
            LedgerEntry::Source(source) => Some(source),
            _ => None,
        }
    }
    pub fn as_allocation(&self) -> Option<&CashAllocation> {
        match self {
            LedgerEntry::Allocation(allocation) => Some(allocation),
            _ => None,
        }
    }
}

/// Fails with a currency mismatch unless every source is held in one currency.
pub fn ensure_single_currency<'a, I>(sources: I) -> Result<Option<CurrencyCode>, LedgerError>
where
    I: IntoIterator<Item = &'a CashSource>,
{
    let mut expected: Option<&CurrencyCode> = None;
    for source in sources {
        match expected {
            None => expected = Some(&source.local_currency),
            Some(currency) if *currency != source.local_currency => {
                tracing::warn!(
                    expected = %currency,
                    found = %source.local_currency,
                    source_id = %source.id,
                    "mixed currencies in one cash operation"
                );
                return Err(LedgerError::CurrencyMismatch {
                    expected: currency.to_string(),
                    found: source.local_currency.to_string(),
                });
            }
            Some(_) => {}
        }
    }

    Ok(expected.cloned())
}
