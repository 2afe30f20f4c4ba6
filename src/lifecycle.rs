//! Applying and undoing draws on cash pools
//!
//! Both directions take a snapshot of sources and hand back a new one. Every
//! segment is checked before any balance is computed, so a failure leaves the
//! caller's snapshot as it was.
use super::config::EngineConfig;
use super::entry::{AllocationSegment, CashSource};
use super::error::LedgerError;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Default, Clone, Copy)]
struct Draw {
    local: Decimal,
    base: Decimal,
}

// Segments of one allocation may hit the same pool more than once.
fn totals_by_source(segments: &[AllocationSegment]) -> HashMap<&str, Draw> {
    let mut totals: HashMap<&str, Draw> = HashMap::new();
    for segment in segments {
        let draw = totals.entry(segment.source_id.as_str()).or_default();
        draw.local += segment.local_amount;
        draw.base += segment.base_amount;
    }
    totals
}

fn ensure_sources_exist(
    sources: &[CashSource],
    totals: &HashMap<&str, Draw>,
) -> Result<(), LedgerError> {
    for source_id in totals.keys() {
        if !sources.iter().any(|s| s.id == *source_id) {
            tracing::warn!(source_id, "segment references an unknown cash source");
            return Err(LedgerError::integrity(format!(
                "cash source {source_id} is not part of this ledger"
            )));
        }
    }
    Ok(())
}

/// Draws `segments` from their pools and records `allocation_id` on each one.
pub fn apply_segments(
    sources: &[CashSource],
    segments: &[AllocationSegment],
    allocation_id: &str,
    config: &EngineConfig,
) -> Result<Vec<CashSource>, LedgerError> {
    let totals = totals_by_source(segments);
    ensure_sources_exist(sources, &totals)?;

    for source in sources {
        let Some(draw) = totals.get(source.id.as_str()) else {
            continue;
        };
        let local_after = source.remaining_local_amount - draw.local;
        let base_after = source.remaining_base_amount - draw.base;
        if local_after < -config.epsilon || base_after < -config.epsilon {
            tracing::warn!(
                source_id = %source.id,
                allocation_id,
                %local_after,
                %base_after,
                "segment exceeds remaining cash"
            );
            return Err(LedgerError::integrity(format!(
                "allocation {allocation_id} draws more than cash source {} holds",
                source.id
            )));
        }
    }

    let updated = sources
        .iter()
        .map(|source| match totals.get(source.id.as_str()) {
            None => source.clone(),
            Some(draw) => {
                let mut next = source.clone();
                next.remaining_local_amount =
                    config.snap(source.remaining_local_amount - draw.local).max(Decimal::ZERO);
                next.remaining_base_amount =
                    config.snap(source.remaining_base_amount - draw.base).max(Decimal::ZERO);
                if !next.is_drawn_by(allocation_id) {
                    next.allocation_ids.push(allocation_id.to_string());
                }
                next
            }
        })
        .collect();

    tracing::debug!(allocation_id, pools = totals.len(), "applied cash segments");

    Ok(updated)
}

/// Undoes [`apply_segments`]: gives the cash back and drops the back-reference.
pub fn restore_segments(
    sources: &[CashSource],
    segments: &[AllocationSegment],
    allocation_id: &str,
    config: &EngineConfig,
) -> Result<Vec<CashSource>, LedgerError> {
    let totals = totals_by_source(segments);
    ensure_sources_exist(sources, &totals)?;

    for source in sources {
        if totals.contains_key(source.id.as_str()) && !source.is_drawn_by(allocation_id) {
            tracing::warn!(source_id = %source.id, allocation_id, "restore of an unapplied draw");
            return Err(LedgerError::integrity(format!(
                "allocation {allocation_id} does not draw from cash source {}",
                source.id
            )));
        }
    }

    let updated = sources
        .iter()
        .map(|source| match totals.get(source.id.as_str()) {
            None => source.clone(),
            Some(draw) => {
                let mut next = source.clone();
                next.remaining_local_amount = (source.remaining_local_amount + draw.local)
                    .min(source.original_local_amount);
                next.remaining_base_amount = (source.remaining_base_amount + draw.base)
                    .min(source.original_base_amount);
                if config.is_negligible(next.original_local_amount - next.remaining_local_amount) {
                    next.remaining_local_amount = next.original_local_amount;
                }
                if config.is_negligible(next.original_base_amount - next.remaining_base_amount) {
                    next.remaining_base_amount = next.original_base_amount;
                }
                next.allocation_ids.retain(|id| id != allocation_id);
                next
            }
        })
        .collect();

    tracing::debug!(allocation_id, pools = totals.len(), "restored cash segments");

    Ok(updated)
}
