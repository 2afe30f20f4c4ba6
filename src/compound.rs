//! Conversions between local currencies and refunds into the tracking currency
//!
//! Both operations draw from existing pools with the FIFO planner and create a
//! new entry funded by the draw: a spendable pool for a conversion, a settled
//! refund line for a refund. Neither commits the draw: the consumed pools come
//! back as a preview in `updated_sources`, and the caller applies the segments
//! under the new entry's id when persisting.
use super::entry::{AllocationSegment, CashSource, ExchangeFee};
use super::error::{LedgerError, ValidationError};
use super::fifo::plan_segments;
use super::lifecycle::apply_segments;
use super::request::{
    ConversionRequest, RefundRequest, non_blank, required_currency, required_date,
    required_positive,
};
use super::service::CashEngine;
use super::utils::IdGenerator;
use rust_decimal::Decimal;

/// Result of [`CashEngine::convert_cash`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    /// The new pool in the target currency.
    pub source: CashSource,
    pub segments: Vec<AllocationSegment>,
    /// The drawn pools as they will look once `segments` are applied.
    pub updated_sources: Vec<CashSource>,
}

/// Result of [`CashEngine::refund_to_base`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundToBase {
    pub refund: CashSource,
    /// Present only when the cash is now worth less than it cost.
    pub fee: Option<ExchangeFee>,
    pub segments: Vec<AllocationSegment>,
    pub cost_basis: Decimal,
    pub received: Decimal,
    pub updated_sources: Vec<CashSource>,
}

impl Conversion {
    /// Id under which the draw is recorded on the consumed pools.
    pub fn draw_id(&self) -> &str {
        &self.source.id
    }
}

impl RefundToBase {
    pub fn draw_id(&self) -> &str {
        &self.refund.id
    }
    pub fn loss(&self) -> Decimal {
        self.fee.as_ref().map_or(Decimal::ZERO, |fee| fee.base_amount)
    }
}

// The pools the draw touched, as they look once it is applied.
fn drawn_pools(applied: Vec<CashSource>, segments: &[AllocationSegment]) -> Vec<CashSource> {
    applied
        .into_iter()
        .filter(|s| segments.iter().any(|seg| seg.source_id == s.id))
        .collect()
}

impl<G: IdGenerator> CashEngine<G> {
    /// Swap local cash into another local currency.
    ///
    /// The new pool keeps the tracking-currency value of the cash it was funded
    /// with; only the local-to-local rate comes from the caller.
    pub fn convert_cash(
        &mut self,
        sources: &[CashSource],
        request: ConversionRequest,
    ) -> Result<Conversion, LedgerError> {
        let date = required_date(request.date)?;
        let source_local = required_positive("Amount to convert", request.source_local_amount)?;
        let target_local = required_positive("Amount received", request.target_local_amount)?;
        let target_currency = required_currency(request.target_currency.as_deref())?;

        let currency = self.usable_currency(sources, None)?;
        if currency == target_currency {
            return Err(ValidationError::SameCurrency(currency.to_string()).into());
        }

        let segments = plan_segments(sources, source_local, self.config())?;
        let funded_base: Decimal = segments.iter().map(|s| s.base_amount).sum();

        let id = self.source_id(&request.id)?;
        let source = CashSource::exchange(id, date, target_currency, funded_base, target_local)?
            .with_funding(segments.clone())
            .with_country(non_blank(&request.country))
            .with_description(non_blank(&request.description));

        let applied = apply_segments(sources, &segments, &source.id, self.config())?;
        let updated_sources = drawn_pools(applied, &segments);

        tracing::debug!(
            source_id = %source.id,
            from = %currency,
            to = %source.local_currency,
            %funded_base,
            "converted cash between currencies"
        );

        Ok(Conversion {
            source,
            segments,
            updated_sources,
        })
    }

    /// Change local cash back into the tracking currency.
    ///
    /// The refund line never shows less than the cash originally cost. A loss is
    /// split out as an [`ExchangeFee`]; a gain stays inside the refund amount.
    pub fn refund_to_base(
        &mut self,
        sources: &[CashSource],
        request: RefundRequest,
    ) -> Result<RefundToBase, LedgerError> {
        let date = required_date(request.date)?;
        let local_amount = required_positive("Amount to refund", request.local_amount)?;
        let exchange_rate = required_positive("Exchange rate", request.exchange_rate)?;

        let currency = self.usable_currency(sources, None)?;
        let segments = plan_segments(sources, local_amount, self.config())?;
        let cost_basis: Decimal = segments.iter().map(|s| s.base_amount).sum();
        let received = self
            .config()
            .base_value("Amount to refund", local_amount, exchange_rate)?;
        let refund_amount = received.max(cost_basis);

        let id = self.source_id(&request.id)?;
        let refund = CashSource::settled_refund(
            id,
            date,
            currency,
            local_amount,
            refund_amount,
            exchange_rate,
            segments.clone(),
        )?
        .with_country(non_blank(&request.country))
        .with_description(non_blank(&request.description));

        let fee = if cost_basis > received {
            let prefix = self.config().fee_prefix.clone();
            let category = non_blank(&request.fee_category)
                .unwrap_or_else(|| self.config().fee_category.clone());
            Some(ExchangeFee {
                id: self.entry_id(&request.fee_id, &prefix)?,
                date,
                base_amount: cost_basis - received,
                category,
                refund_id: refund.id.clone(),
                description: non_blank(&request.description),
            })
        } else {
            None
        };

        let applied = apply_segments(sources, &segments, &refund.id, self.config())?;
        let updated_sources = drawn_pools(applied, &segments);

        tracing::debug!(
            refund_id = %refund.id,
            %cost_basis,
            %received,
            loss = %fee.as_ref().map_or(Decimal::ZERO, |f| f.base_amount),
            "refunded cash to tracking currency"
        );

        Ok(RefundToBase {
            refund,
            fee,
            segments,
            cost_basis,
            received,
            updated_sources,
        })
    }
}
