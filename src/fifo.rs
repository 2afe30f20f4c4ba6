//! FIFO draw-down planning across cash pools of one currency
//!
//! Pools are spent oldest first, ordered by `(date, id)`. The walk prices each
//! segment at the pool's acquisition rate, except when a segment empties a pool,
//! in which case it takes the pool's remaining base amount exactly. After the
//! walk, the last segment absorbs any difference between the requested amount and
//! the sum of segment amounts, so the segments always add up to the request.
use super::config::EngineConfig;
use super::entry::{AllocationSegment, CashSource, ensure_single_currency};
use super::error::{LedgerError, ValidationError};
use rust_decimal::Decimal;

/// Plans which pools fund `requested` local units. Nothing is mutated.
pub fn plan_segments(
    sources: &[CashSource],
    requested: Decimal,
    config: &EngineConfig,
) -> Result<Vec<AllocationSegment>, LedgerError> {
    if requested <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount("Requested amount").into());
    }
    let currency = ensure_single_currency(sources)?;

    let mut ordered: Vec<&CashSource> = sources.iter().collect();
    ordered.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));

    let mut segments: Vec<AllocationSegment> = Vec::new();
    let mut drawn: Vec<&CashSource> = Vec::new();
    let mut remaining_to_allocate = requested;

    for source in ordered {
        if remaining_to_allocate <= config.epsilon {
            break;
        }
        let available = source.remaining_local_amount;
        if available <= Decimal::ZERO {
            continue;
        }

        let take = available.min(remaining_to_allocate);
        segments.push(AllocationSegment {
            source_id: source.id.clone(),
            local_amount: take,
            base_amount: segment_base(source, take, config)?,
        });
        drawn.push(source);
        remaining_to_allocate -= take;
    }

    if remaining_to_allocate > config.epsilon {
        let available = requested - remaining_to_allocate;
        tracing::warn!(
            currency = currency.as_ref().map(|c| c.as_str()).unwrap_or("?"),
            %requested,
            %available,
            "insufficient cash for allocation"
        );
        return Err(LedgerError::InsufficientFunds {
            currency: currency.map(|c| c.to_string()).unwrap_or_default(),
            requested,
            available,
        });
    }

    reconcile_tail(&mut segments, &drawn, requested, config)?;

    tracing::debug!(
        %requested,
        segments = segments.len(),
        "planned fifo cash draw"
    );

    Ok(segments)
}

/// Tracking-currency value of taking `take` local units from `source`.
///
/// Never more than the pool still holds, so rounding cannot drain the base
/// balance ahead of the local one.
pub fn segment_base(
    source: &CashSource,
    take: Decimal,
    config: &EngineConfig,
) -> Result<Decimal, LedgerError> {
    if take >= source.remaining_local_amount
        || config.is_negligible(source.remaining_local_amount - take)
    {
        return Ok(source.remaining_base_amount);
    }

    let rate = source
        .unit_rate()
        .ok_or(ValidationError::AmountTooLarge("Requested amount"))?;
    let base = config.base_value("Requested amount", take, rate)?;
    Ok(base.min(source.remaining_base_amount))
}

// Only the last segment moves, all others stay proportional to their pool.
fn reconcile_tail(
    segments: &mut [AllocationSegment],
    drawn: &[&CashSource],
    requested: Decimal,
    config: &EngineConfig,
) -> Result<(), LedgerError> {
    let allocated: Decimal = segments.iter().map(|s| s.local_amount).sum();
    let discrepancy = requested - allocated;
    if discrepancy.is_zero() {
        return Ok(());
    }

    if let (Some(last), Some(source)) = (segments.last_mut(), drawn.last()) {
        tracing::debug!(%discrepancy, source_id = %source.id, "reconciling last cash segment");
        last.local_amount += discrepancy;
        last.base_amount = segment_base(source, last.local_amount, config)?;
    }
    Ok(())
}

/// Sum of local cash still available across `sources`.
pub fn available_local(sources: &[CashSource]) -> Decimal {
    sources
        .iter()
        .map(|s| s.remaining_local_amount.max(Decimal::ZERO))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CurrencyCode, LedgerDate};
    use rust_decimal_macros::dec;

    fn source(id: &str, day: u32, base: Decimal, local: Decimal) -> CashSource {
        CashSource::exchange(
            id.into(),
            LedgerDate::new_with(2024, 1, day).unwrap(),
            CurrencyCode::parse("THB").unwrap(),
            base,
            local,
        )
        .unwrap()
    }

    #[test]
    fn oldest_pool_is_spent_first() {
        let config = EngineConfig::default();
        let newer = source("a", 5, dec!(5), dec!(50));
        let older = source("b", 1, dec!(10), dec!(100));

        let segments = plan_segments(&[newer, older], dec!(40), &config).unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].source_id, "b");
        assert_eq!(segments[0].base_amount, dec!(4));
    }

    #[test]
    fn same_day_pools_break_ties_by_id() {
        let config = EngineConfig::default();
        let second = source("z", 1, dec!(10), dec!(100));
        let first = source("m", 1, dec!(10), dec!(100));

        let segments = plan_segments(&[second, first], dec!(150), &config).unwrap();

        let ids: Vec<_> = segments.iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(ids, ["m", "z"]);
    }

    #[test]
    fn draining_a_pool_takes_its_exact_remaining_base() {
        let config = EngineConfig::default();
        // 3 local for 1 base leaves a repeating unit rate
        let mut pool = source("a", 1, dec!(1), dec!(3));
        pool.remaining_local_amount = dec!(2);
        pool.remaining_base_amount = dec!(0.67);

        let segments = plan_segments(&[pool], dec!(2), &config).unwrap();

        assert_eq!(segments[0].base_amount, dec!(0.67));
    }

    #[test]
    fn partial_draw_is_priced_at_acquisition_rate() {
        let config = EngineConfig::default();
        let pool = source("a", 1, dec!(1), dec!(3));

        let segments = plan_segments(&[pool], dec!(1), &config).unwrap();

        assert_eq!(segments[0].base_amount, dec!(0.33));
    }

    #[test]
    fn empty_pools_are_skipped() {
        let config = EngineConfig::default();
        let mut empty = source("a", 1, dec!(10), dec!(100));
        empty.remaining_local_amount = Decimal::ZERO;
        empty.remaining_base_amount = Decimal::ZERO;
        let full = source("b", 2, dec!(10), dec!(100));

        let segments = plan_segments(&[empty, full], dec!(10), &config).unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].source_id, "b");
    }

    #[test]
    fn shortfall_reports_what_is_available() {
        let config = EngineConfig::default();
        let pools = [source("a", 1, dec!(10), dec!(100)), source("b", 5, dec!(5), dec!(50))];

        let err = plan_segments(&pools, dec!(200), &config).unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                currency: "THB".into(),
                requested: dec!(200),
                available: dec!(150),
            }
        );
    }

    #[test]
    fn dust_shortfall_is_folded_into_the_last_segment() {
        let config = EngineConfig::default();
        let pool = source("a", 1, dec!(10), dec!(100));

        let segments = plan_segments(&[pool], dec!(100.0000005), &config).unwrap();

        assert_eq!(segments[0].local_amount, dec!(100.0000005));
        assert_eq!(segments[0].base_amount, dec!(10));
    }

    #[test]
    fn rounding_never_draws_more_base_than_is_left() {
        let config = EngineConfig::default();
        // 4 local for 0.03 base: each single unit rounds up to 0.01
        let mut pool = source("a", 1, dec!(0.03), dec!(4));
        for _ in 0..3 {
            let segments = plan_segments(std::slice::from_ref(&pool), dec!(1), &config).unwrap();
            pool.remaining_local_amount -= segments[0].local_amount;
            pool.remaining_base_amount -= segments[0].base_amount;
        }
        assert_eq!(pool.remaining_local_amount, dec!(1));
        assert_eq!(pool.remaining_base_amount, Decimal::ZERO);

        let segments = plan_segments(&[pool], dec!(0.9), &config).unwrap();

        assert_eq!(segments[0].base_amount, Decimal::ZERO);
    }

    #[test]
    fn non_positive_requests_are_rejected() {
        let config = EngineConfig::default();
        let pool = source("a", 1, dec!(10), dec!(100));

        assert!(matches!(
            plan_segments(&[pool], dec!(0), &config),
            Err(LedgerError::Validation(_))
        ));
    }
}
