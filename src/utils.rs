//! Identifier generation for new ledger entries

use super::error::LedgerError;
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Source of identifiers for entries the engine creates.
///
/// Passed into [`crate::service::CashEngine`] so tests can pin ids down.
pub trait IdGenerator {
    fn next_id(&mut self, prefix: &str) -> Result<String, LedgerError>;
}

/// Time-ordered uuid7 ids, bech32m encoded with the prefix as the hrp.
#[derive(Debug, Default, Clone, Copy)]
pub struct Bech32Ids;

impl IdGenerator for Bech32Ids {
    fn next_id(&mut self, prefix: &str) -> Result<String, LedgerError> {
        new_uuid_to_bech32(prefix).map_err(|e| LedgerError::IdGeneration(e.to_string()))
    }
}

/// Deterministic `prefix-N` ids.
#[derive(Debug, Default, Clone)]
pub struct SequentialIds {
    next: u64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self, prefix: &str) -> Result<String, LedgerError> {
        self.next += 1;
        Ok(format!("{prefix}{}", self.next))
    }
}

impl<F> IdGenerator for F
where
    F: FnMut(&str) -> String,
{
    fn next_id(&mut self, prefix: &str) -> Result<String, LedgerError> {
        Ok(self(prefix))
    }
}
