//! Service layer API for cash ledger operations
use super::config::EngineConfig;
use super::entry::{AllocationSegment, CashAllocation, CashSource, ensure_single_currency};
use super::error::{LedgerError, ValidationError};
use super::fifo::plan_segments;
use super::lifecycle;
use super::types::CurrencyCode;
use super::request::{
    AllocationRequest, ExchangeRequest, RefundSourceRequest, non_blank, required_currency,
    required_date, required_positive,
};
use super::utils::{Bech32Ids, IdGenerator};
use rust_decimal::Decimal;

/// Builds ledger entries for one trip's cash.
///
/// Every operation reads the snapshot it is handed and returns new values;
/// nothing passed in is changed. Persisting the results is left to the caller.
pub struct CashEngine<G: IdGenerator = Bech32Ids> {
    config: EngineConfig,
    ids: G,
}

impl CashEngine<Bech32Ids> {
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default(), Bech32Ids)
    }
}

impl<G: IdGenerator> CashEngine<G> {
    pub fn new(config: EngineConfig, ids: G) -> Self {
        Self { config, ids }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Uses the caller's id when given, otherwise asks the generator.
    pub(crate) fn entry_id(
        &mut self,
        supplied: &Option<String>,
        prefix: &str,
    ) -> Result<String, LedgerError> {
        match non_blank(supplied) {
            Some(id) => Ok(id),
            None => self.ids.next_id(prefix),
        }
    }

    pub(crate) fn source_id(&mut self, supplied: &Option<String>) -> Result<String, LedgerError> {
        let prefix = self.config.source_prefix.clone();
        self.entry_id(supplied, &prefix)
    }

    /// Record cash bought with tracking-currency money
    pub fn create_exchange_source(
        &mut self,
        request: ExchangeRequest,
    ) -> Result<CashSource, LedgerError> {
        let date = required_date(request.date)?;
        let currency = required_currency(request.local_currency.as_deref())?;
        let base_amount = required_positive("Base amount", request.base_amount)?;
        let local_amount = required_positive("Local amount", request.local_amount)?;

        let id = self.source_id(&request.id)?;
        let source = CashSource::exchange(id, date, currency, base_amount, local_amount)?
            .with_country(non_blank(&request.country))
            .with_description(non_blank(&request.description));

        tracing::debug!(
            source_id = %source.id,
            currency = %source.local_currency,
            local = %source.original_local_amount,
            base = %source.original_base_amount,
            "created exchange cash source"
        );

        Ok(source)
    }

    /// Record local cash received back at a given rate
    pub fn create_refund_source(
        &mut self,
        request: RefundSourceRequest,
    ) -> Result<CashSource, LedgerError> {
        let date = required_date(request.date)?;
        let currency = required_currency(request.local_currency.as_deref())?;
        let local_amount = required_positive("Local amount", request.local_amount)?;
        let exchange_rate = required_positive("Exchange rate", request.exchange_rate)?;

        let id = self.source_id(&request.id)?;
        let source =
            CashSource::refund(id, date, currency, local_amount, exchange_rate, &self.config)?
                .with_country(non_blank(&request.country))
                .with_description(non_blank(&request.description));

        tracing::debug!(
            source_id = %source.id,
            currency = %source.local_currency,
            base = %source.original_base_amount,
            "created refund cash source"
        );

        Ok(source)
    }

    /// Build a spend drawn from `sources`, oldest cash first.
    ///
    /// The sources are not drawn down here, so the result can serve as a
    /// preview. Commit it with [`CashEngine::apply_segments`] or
    /// [`crate::ledger::CashLedger::record_allocation`].
    pub fn create_allocation(
        &mut self,
        sources: &[CashSource],
        request: AllocationRequest,
    ) -> Result<CashAllocation, LedgerError> {
        let date = required_date(request.date)?;
        let local_amount = required_positive("Local amount", request.local_amount)?;
        let category =
            non_blank(&request.category).ok_or(ValidationError::MissingField("Category"))?;
        let currency = self.usable_currency(sources, request.local_currency.as_deref())?;

        let segments = plan_segments(sources, local_amount, &self.config)?;
        let prefix = self.config.allocation_prefix.clone();
        let id = self.entry_id(&request.id, &prefix)?;

        let mut allocation = CashAllocation::from_segments(id, date, currency, segments, category);
        allocation.country = non_blank(&request.country);
        allocation.description = non_blank(&request.description);

        tracing::debug!(
            allocation_id = %allocation.id,
            local = %allocation.local_amount,
            base = %allocation.base_amount,
            segments = allocation.segments.len(),
            "created cash allocation"
        );

        Ok(allocation)
    }

    /// Checks the sources share a currency, match the requested one when named,
    /// and hold some cash.
    pub(crate) fn usable_currency(
        &self,
        sources: &[CashSource],
        requested: Option<&str>,
    ) -> Result<CurrencyCode, LedgerError> {
        let held = ensure_single_currency(sources)?;
        let requested = match requested {
            Some(code) => Some(required_currency(Some(code))?),
            None => None,
        };

        let currency = match (held, requested) {
            (Some(held), Some(requested)) if held != requested => {
                tracing::warn!(%held, %requested, "cash sources held in another currency");
                return Err(LedgerError::CurrencyMismatch {
                    expected: requested.to_string(),
                    found: held.to_string(),
                });
            }
            (Some(held), _) => held,
            (None, Some(requested)) => return Err(LedgerError::NoUsableSource(requested.to_string())),
            (None, None) => return Err(LedgerError::NoUsableSource("local".to_string())),
        };

        if !sources.iter().any(|s| s.remaining_local_amount > Decimal::ZERO) {
            return Err(LedgerError::NoUsableSource(currency.to_string()));
        }

        Ok(currency)
    }

    pub fn apply_segments(
        &self,
        sources: &[CashSource],
        segments: &[AllocationSegment],
        allocation_id: &str,
    ) -> Result<Vec<CashSource>, LedgerError> {
        lifecycle::apply_segments(sources, segments, allocation_id, &self.config)
    }

    pub fn restore_segments(
        &self,
        sources: &[CashSource],
        segments: &[AllocationSegment],
        allocation_id: &str,
    ) -> Result<Vec<CashSource>, LedgerError> {
        lifecycle::restore_segments(sources, segments, allocation_id, &self.config)
    }
}
