//! A trip's cash entries as one immutable snapshot
use super::compound::{Conversion, RefundToBase};
use super::config::EngineConfig;
use super::entry::{AllocationSegment, CashAllocation, CashSource, LedgerEntry};
use super::error::LedgerError;
use super::lifecycle::{apply_segments, restore_segments};
use super::types::CurrencyCode;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Every commit returns a new ledger and leaves `self` as it was.
#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct CashLedger {
    #[n(0)]
    entries: Vec<LedgerEntry>,
}

impl CashLedger {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        Self { entries }
    }
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }
    pub fn into_entries(self) -> Vec<LedgerEntry> {
        self.entries
    }

    pub fn sources(&self) -> impl Iterator<Item = &CashSource> {
        self.entries.iter().filter_map(LedgerEntry::as_source)
    }
    pub fn allocations(&self) -> impl Iterator<Item = &CashAllocation> {
        self.entries.iter().filter_map(LedgerEntry::as_allocation)
    }

    /// Pools held in `currency`, ready to hand to the engine.
    pub fn sources_in(&self, currency: &CurrencyCode) -> Vec<CashSource> {
        self.sources()
            .filter(|s| s.local_currency == *currency)
            .cloned()
            .collect()
    }

    pub fn available(&self, currency: &CurrencyCode) -> Decimal {
        self.sources()
            .filter(|s| s.local_currency == *currency)
            .map(|s| s.remaining_local_amount)
            .sum()
    }

    pub fn source(&self, id: &str) -> Option<&CashSource> {
        self.sources().find(|s| s.id == id)
    }
    pub fn allocation(&self, id: &str) -> Option<&CashAllocation> {
        self.allocations().find(|a| a.id == id)
    }

    /// Spending allocations drawing from the source `source_id`.
    ///
    /// Conversions and refunds also draw from pools but are sources, not
    /// allocations, so they are left out. Use [`CashLedger::entries_drawing_from`]
    /// to get every draw.
    pub fn allocations_referencing(&self, source_id: &str) -> Vec<&CashAllocation> {
        self.allocations().filter(|a| a.draws_from(source_id)).collect()
    }

    /// Every entry drawing from `source_id`: allocations, and the pools or
    /// refund lines funded by it.
    pub fn entries_drawing_from(&self, source_id: &str) -> Vec<&LedgerEntry> {
        self.entries
            .iter()
            .filter(|entry| match entry {
                LedgerEntry::Allocation(a) => a.draws_from(source_id),
                LedgerEntry::Source(s) => {
                    s.funding_segments.iter().any(|f| f.source_id == source_id)
                }
                LedgerEntry::Fee(_) => false,
            })
            .collect()
    }

    /// How an entry was funded: an allocation's segments, or the funding
    /// segments of a converted or refunded pool.
    pub fn segments_for(&self, entry_id: &str) -> Option<&[AllocationSegment]> {
        self.entries.iter().find_map(|entry| match entry {
            LedgerEntry::Allocation(a) if a.id == entry_id => Some(a.segments.as_slice()),
            LedgerEntry::Source(s) if s.id == entry_id && !s.funding_segments.is_empty() => {
                Some(s.funding_segments.as_slice())
            }
            _ => None,
        })
    }

    fn ensure_new_id(&self, id: &str) -> Result<(), LedgerError> {
        if self.entries.iter().any(|e| e.id() == id) {
            return Err(LedgerError::integrity(format!(
                "entry {id} is already in the ledger"
            )));
        }
        Ok(())
    }

    // Replaces the pools in `updated`, keeps entry order, then appends `added`.
    fn with_sources(&self, updated: Vec<CashSource>, added: Vec<LedgerEntry>) -> Self {
        let mut by_id: HashMap<String, CashSource> =
            updated.into_iter().map(|s| (s.id.clone(), s)).collect();
        let mut entries: Vec<LedgerEntry> = self
            .entries
            .iter()
            .map(|entry| match entry {
                LedgerEntry::Source(s) => {
                    LedgerEntry::Source(by_id.remove(&s.id).unwrap_or_else(|| s.clone()))
                }
                other => other.clone(),
            })
            .collect();
        entries.extend(added);
        Self { entries }
    }

    fn draw(
        &self,
        segments: &[AllocationSegment],
        draw_id: &str,
        config: &EngineConfig,
    ) -> Result<Vec<CashSource>, LedgerError> {
        let sources: Vec<CashSource> = self.sources().cloned().collect();
        apply_segments(&sources, segments, draw_id, config)
    }

    pub fn record_source(&self, source: CashSource) -> Result<Self, LedgerError> {
        self.ensure_new_id(&source.id)?;
        Ok(self.with_sources(vec![], vec![LedgerEntry::Source(source)]))
    }

    /// Draws the allocation's cash from its pools and adds it to the ledger.
    pub fn record_allocation(
        &self,
        allocation: CashAllocation,
        config: &EngineConfig,
    ) -> Result<Self, LedgerError> {
        self.ensure_new_id(&allocation.id)?;
        let updated = self.draw(&allocation.segments, &allocation.id, config)?;
        Ok(self.with_sources(updated, vec![LedgerEntry::Allocation(allocation)]))
    }

    /// Removes an allocation and gives its cash back to the pools it drew from.
    pub fn reverse_allocation(
        &self,
        allocation_id: &str,
        config: &EngineConfig,
    ) -> Result<Self, LedgerError> {
        let allocation = self.allocation(allocation_id).ok_or_else(|| {
            LedgerError::integrity(format!("allocation {allocation_id} is not in the ledger"))
        })?;
        let sources: Vec<CashSource> = self.sources().cloned().collect();
        let restored = restore_segments(&sources, &allocation.segments, allocation_id, config)?;

        let mut next = self.with_sources(restored, vec![]);
        next.entries.retain(|e| e.id() != allocation_id);

        tracing::debug!(allocation_id, "reversed cash allocation");

        Ok(next)
    }

    pub fn record_conversion(
        &self,
        conversion: Conversion,
        config: &EngineConfig,
    ) -> Result<Self, LedgerError> {
        self.ensure_new_id(conversion.draw_id())?;
        let updated = self.draw(&conversion.segments, conversion.draw_id(), config)?;
        Ok(self.with_sources(updated, vec![LedgerEntry::Source(conversion.source)]))
    }

    pub fn record_refund(
        &self,
        refund: RefundToBase,
        config: &EngineConfig,
    ) -> Result<Self, LedgerError> {
        self.ensure_new_id(refund.draw_id())?;
        if let Some(fee) = &refund.fee {
            self.ensure_new_id(&fee.id)?;
        }
        let updated = self.draw(&refund.segments, refund.draw_id(), config)?;

        let mut added = vec![LedgerEntry::Source(refund.refund)];
        if let Some(fee) = refund.fee {
            added.push(LedgerEntry::Fee(fee));
        }
        Ok(self.with_sources(updated, added))
    }

    /// Checks every pool against the draws recorded on it.
    ///
    /// For each source, `remaining + drawn == original` must hold in both
    /// currencies, and its back-references must name exactly the entries
    /// drawing from it. Settled refunds hold nothing and are never drawn.
    pub fn verify_conservation(&self, config: &EngineConfig) -> Result<(), LedgerError> {
        let mut drawn: HashMap<&str, (Decimal, Decimal)> = HashMap::new();
        let mut drawers: HashMap<&str, Vec<&str>> = HashMap::new();

        for entry in &self.entries {
            let segments = match entry {
                LedgerEntry::Allocation(a) => a.segments.as_slice(),
                LedgerEntry::Source(s) => s.funding_segments.as_slice(),
                LedgerEntry::Fee(_) => continue,
            };
            for segment in segments {
                let totals = drawn.entry(segment.source_id.as_str()).or_default();
                totals.0 += segment.local_amount;
                totals.1 += segment.base_amount;
                let ids = drawers.entry(segment.source_id.as_str()).or_default();
                if !ids.contains(&entry.id()) {
                    ids.push(entry.id());
                }
            }
        }

        for source in self.sources() {
            let (local, base) = drawn.remove(source.id.as_str()).unwrap_or_default();
            let (held_local, held_base) = if source.is_settled() {
                (Decimal::ZERO, Decimal::ZERO)
            } else {
                (source.original_local_amount, source.original_base_amount)
            };
            let local_gap = held_local - local - source.remaining_local_amount;
            let base_gap = held_base - base - source.remaining_base_amount;
            if !config.is_negligible(local_gap) || !config.is_negligible(base_gap) {
                tracing::warn!(source_id = %source.id, %local_gap, %base_gap, "cash not conserved");
                return Err(LedgerError::integrity(format!(
                    "cash source {} is out of balance by {local_gap} local, {base_gap} base",
                    source.id
                )));
            }

            let mut expected = drawers.remove(source.id.as_str()).unwrap_or_default();
            let mut recorded: Vec<&str> = source.allocation_ids.iter().map(String::as_str).collect();
            expected.sort_unstable();
            recorded.sort_unstable();
            if expected != recorded {
                return Err(LedgerError::integrity(format!(
                    "cash source {} lists draws {recorded:?} but is drawn by {expected:?}",
                    source.id
                )));
            }
        }

        if let Some(orphan) = drawn.keys().next() {
            return Err(LedgerError::integrity(format!(
                "segments reference missing cash source {orphan}"
            )));
        }

        Ok(())
    }

    /// Serialises the snapshot into CBOR and returns its sha256 digest with the bytes.
    pub fn encode(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }

    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        let ledger: CashLedger = minicbor::decode(bytes)?;
        Ok(ledger)
    }
}
