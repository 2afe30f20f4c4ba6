//! Property-based tests for the FIFO allocation engine
//!
//! These use proptest to check the ledger invariants across randomly generated
//! pools and requests: money is conserved through apply and restore, pools are
//! spent oldest first, segments always add up to the request, and compound
//! operations keep the tracking-currency value of the cash they consume. A
//! sequence property replays random spends and reversals against one ledger
//! and audits it after every step.

use cash_ledger::{
    config::EngineConfig,
    entry::CashSource,
    error::LedgerError,
    fifo::{available_local, plan_segments},
    ledger::CashLedger,
    lifecycle::{apply_segments, restore_segments},
    request::{AllocationRequest, ConversionRequest, RefundRequest},
    service::CashEngine,
    types::{CurrencyCode, LedgerDate},
    utils::SequentialIds,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

// PROPERTY TEST STRATEGIES

/// Strategy for amounts with two decimals, 0.01 to 10_000.00
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for base-per-local rates with awkward fractions
fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=99_999i64).prop_map(|r| Decimal::new(r, 5))
}

/// Strategy for a set of THB pools acquired on random January days
fn pools_strategy() -> impl Strategy<Value = Vec<CashSource>> {
    prop::collection::vec((1u32..=28, amount_strategy(), rate_strategy()), 1..6).prop_map(
        |draws| {
            let config = EngineConfig::default();
            draws
                .into_iter()
                .enumerate()
                .filter_map(|(i, (day, local, rate))| {
                    let base = config.round_base(local * rate).max(Decimal::new(1, 2));
                    CashSource::exchange(
                        format!("pool-{i}"),
                        LedgerDate::new_with(2024, 1, day).ok()?,
                        CurrencyCode::parse("THB").ok()?,
                        base,
                        local,
                    )
                    .ok()
                })
                .collect()
        },
    )
}

/// Strategy for pools plus a request somewhere within what they hold
fn pools_and_request_strategy() -> impl Strategy<Value = (Vec<CashSource>, Decimal)> {
    pools_strategy().prop_flat_map(|pools| {
        let total_cents = (available_local(&pools) * Decimal::new(100, 0))
            .to_i64()
            .unwrap_or(1);
        (Just(pools), (1i64..=total_cents.max(1)).prop_map(|c| Decimal::new(c, 2)))
    })
}

fn day(source: &CashSource) -> LedgerDate {
    source.date
}

/// One step of a trip's spending history
#[derive(Debug, Clone)]
enum Step {
    Spend(Decimal),
    /// Reverse one of the live allocations, picked modulo their count
    Reverse(usize),
}

/// Strategy for a history of spends with the occasional reversal
fn steps_strategy() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(
        prop_oneof![
            3 => (1i64..=500_000i64).prop_map(|cents| Step::Spend(Decimal::new(cents, 2))),
            1 => (0usize..32).prop_map(Step::Reverse),
        ],
        1..25,
    )
}

// PROPERTY TESTS
proptest! {
    /// Property: the local amounts of the segments add up to exactly the request
    #[test]
    fn prop_segments_sum_to_request((pools, requested) in pools_and_request_strategy()) {
        let config = EngineConfig::default();
        let segments = plan_segments(&pools, requested, &config).unwrap();

        let total: Decimal = segments.iter().map(|s| s.local_amount).sum();
        prop_assert_eq!(total, requested);
    }

    /// Property: remaining + drawn == original for every pool, in both currencies,
    /// and restoring the draw gives back the snapshot that was there before
    #[test]
    fn prop_apply_and_restore_conserve_cash((pools, requested) in pools_and_request_strategy()) {
        let config = EngineConfig::default();
        let segments = plan_segments(&pools, requested, &config).unwrap();
        let applied = apply_segments(&pools, &segments, "spend", &config).unwrap();

        for (before, after) in pools.iter().zip(&applied) {
            let local: Decimal = segments.iter().filter(|s| s.source_id == before.id).map(|s| s.local_amount).sum();
            let base: Decimal = segments.iter().filter(|s| s.source_id == before.id).map(|s| s.base_amount).sum();
            prop_assert!(config.is_negligible(after.original_local_amount - after.remaining_local_amount - local));
            prop_assert!(config.is_negligible(after.original_base_amount - after.remaining_base_amount - base));
            prop_assert!(after.remaining_local_amount >= Decimal::ZERO);
            prop_assert!(after.remaining_base_amount >= Decimal::ZERO);
        }

        let restored = restore_segments(&applied, &segments, "spend", &config).unwrap();
        prop_assert_eq!(restored, pools);
    }

    /// Property: pools are used oldest first, so every pool drawn before the
    /// last one is emptied and no younger pool is touched while an older one
    /// still has cash
    #[test]
    fn prop_fifo_order((pools, requested) in pools_and_request_strategy()) {
        let config = EngineConfig::default();
        let segments = plan_segments(&pools, requested, &config).unwrap();
        let find = |id: &str| pools.iter().find(|p| p.id == id).unwrap();

        for pair in segments.windows(2) {
            let (older, younger) = (find(&pair[0].source_id), find(&pair[1].source_id));
            prop_assert!((day(older), &older.id) < (day(younger), &younger.id));
            prop_assert_eq!(pair[0].local_amount, older.remaining_local_amount);
        }

        let last = find(&segments[segments.len() - 1].source_id);
        let untouched_older = pools.iter().filter(|p| (day(p), &p.id) < (day(last), &last.id))
            .filter(|p| !segments.iter().any(|s| s.source_id == p.id));
        prop_assert_eq!(untouched_older.count(), 0);
    }

    /// Property: asking for more than the pools hold fails and returns nothing
    #[test]
    fn prop_overdraw_fails(pools in pools_strategy(), extra in amount_strategy()) {
        let config = EngineConfig::default();
        let requested = available_local(&pools) + extra;

        let result = plan_segments(&pools, requested, &config);
        let is_insufficient = matches!(result, Err(LedgerError::InsufficientFunds { .. }));
        prop_assert!(is_insufficient);
    }

    /// Property: a second currency in the pool set is always a mismatch
    #[test]
    fn prop_mixed_currencies_fail(pools in pools_strategy(), requested in amount_strategy()) {
        let config = EngineConfig::default();
        let mut mixed = pools.clone();
        let mut foreign = pools[0].clone();
        foreign.id = "foreign".into();
        foreign.local_currency = CurrencyCode::parse("VND").unwrap();
        mixed.push(foreign);

        let result = plan_segments(&mixed, requested, &config);
        let is_mismatch = matches!(result, Err(LedgerError::CurrencyMismatch { .. }));
        prop_assert!(is_mismatch);
    }

    /// Property: a conversion's new pool is worth exactly what it consumed,
    /// whatever the target amount
    #[test]
    fn prop_conversion_keeps_base_value(
        (pools, requested) in pools_and_request_strategy(),
        target in amount_strategy(),
    ) {
        let mut engine = CashEngine::new(EngineConfig::default(), SequentialIds::new());
        let result = engine.convert_cash(
            &pools,
            ConversionRequest::new()
                .set_date(LedgerDate::new_with(2024, 2, 1).unwrap())
                .set_source_local_amount(requested)
                .set_target_local_amount(target)
                .set_target_currency("LAK"),
        );

        // draws too small to be worth a cent cannot fund a pool
        if let Ok(conversion) = result {
            let consumed: Decimal = conversion.segments.iter().map(|s| s.base_amount).sum();
            prop_assert_eq!(conversion.source.original_base_amount, consumed);
            prop_assert_eq!(conversion.source.original_local_amount, target);
        }
    }

    /// Property: refund + loss always equals the greater of what the cash cost
    /// and what it fetched, and the loss is never negative
    #[test]
    fn prop_refund_reconciles_with_cost_basis(
        (pools, requested) in pools_and_request_strategy(),
        rate in rate_strategy(),
    ) {
        let mut engine = CashEngine::new(EngineConfig::default(), SequentialIds::new());
        let result = engine.refund_to_base(
            &pools,
            RefundRequest::new()
                .set_date(LedgerDate::new_with(2024, 2, 1).unwrap())
                .set_local_amount(requested)
                .set_exchange_rate(rate),
        );

        if let Ok(refund) = result {
            prop_assert_eq!(refund.refund.original_base_amount, refund.cost_basis.max(refund.received));
            prop_assert!(refund.loss() >= Decimal::ZERO);
            match &refund.fee {
                Some(fee) => prop_assert_eq!(refund.received + fee.base_amount, refund.cost_basis),
                None => prop_assert!(refund.received >= refund.cost_basis),
            }
        }
    }

    /// Property: any sequence of spends and reversals keeps every pool in
    /// balance, never trips an integrity error, and reversing everything
    /// gives back the pools as they were bought
    #[test]
    fn prop_spend_and_reverse_sequences_conserve_cash(
        pools in pools_strategy(),
        steps in steps_strategy(),
    ) {
        let mut engine = CashEngine::new(EngineConfig::default(), SequentialIds::new());
        let thb = CurrencyCode::parse("THB").unwrap();
        let spent_on = LedgerDate::new_with(2024, 2, 1).unwrap();
        let mut ledger = CashLedger::new();
        for pool in pools.clone() {
            ledger = ledger.record_source(pool).unwrap();
        }
        let mut live: Vec<String> = Vec::new();

        for step in steps {
            match step {
                Step::Spend(amount) => {
                    let result = engine.create_allocation(
                        &ledger.sources_in(&thb),
                        AllocationRequest::new()
                            .set_date(spent_on)
                            .set_local_amount(amount)
                            .set_category("Food"),
                    );
                    match result {
                        Ok(allocation) => {
                            live.push(allocation.id.clone());
                            let recorded = ledger.record_allocation(allocation, engine.config());
                            prop_assert!(recorded.is_ok(), "recording failed: {:?}", recorded);
                            ledger = recorded.unwrap();
                        }
                        Err(err) => {
                            let out_of_cash = matches!(
                                err,
                                LedgerError::InsufficientFunds { .. } | LedgerError::NoUsableSource(_)
                            );
                            prop_assert!(out_of_cash, "unexpected error: {}", err);
                        }
                    }
                }
                Step::Reverse(pick) => {
                    if live.is_empty() {
                        continue;
                    }
                    let id = live.remove(pick % live.len());
                    ledger = ledger.reverse_allocation(&id, engine.config()).unwrap();
                }
            }

            let audit = ledger.verify_conservation(engine.config());
            prop_assert!(audit.is_ok(), "audit failed: {:?}", audit);
            for source in ledger.sources() {
                prop_assert!(source.remaining_local_amount >= Decimal::ZERO);
                prop_assert!(source.remaining_base_amount >= Decimal::ZERO);
            }
        }

        for id in live {
            ledger = ledger.reverse_allocation(&id, engine.config()).unwrap();
        }
        let restored: Vec<CashSource> = ledger.sources().cloned().collect();
        prop_assert_eq!(restored, pools);
    }
}
