//! Value types shared by every ledger record
use super::error::ValidationError;
use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;

/// Calendar day a ledger entry happened on.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct LedgerDate(NaiveDate);

impl LedgerDate {
    pub fn new_with(year: i32, month: u32, day: u32) -> Result<Self, ValidationError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(LedgerDate)
            .ok_or_else(|| ValidationError::InvalidDate(format!("{year:04}-{month:02}-{day:02}")))
    }
    pub fn to_naive_date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for LedgerDate {
    fn from(value: NaiveDate) -> Self {
        LedgerDate(value)
    }
}

impl FromStr for LedgerDate {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(LedgerDate)
            .map_err(|_| ValidationError::InvalidDate(s.to_string()))
    }
}

impl fmt::Display for LedgerDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl<C> minicbor::Encode<C> for LedgerDate {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i32(self.0.num_days_from_ce())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for LedgerDate {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let days = d.i32()?;

        NaiveDate::from_num_days_from_ce_opt(days)
            .map(LedgerDate)
            .ok_or(minicbor::decode::Error::message(
                "failed to convert day count to a calendar date",
            ))
    }
}

/// Upper-cased currency code such as `THB` or `EUR`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode)]
#[cbor(array)]
pub struct CurrencyCode(#[n(0)] String);

impl CurrencyCode {
    pub fn parse(code: &str) -> Result<Self, ValidationError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ValidationError::MissingCurrency);
        }
        let valid_len = (2..=8).contains(&code.len());
        if !valid_len || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidCurrency(code.to_string()));
        }

        Ok(CurrencyCode(code.to_ascii_uppercase()))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CurrencyCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CurrencyCode::parse(s)
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// CBOR codec for `Decimal` fields, stored in text form so no precision is lost.
pub(crate) mod cbor_decimal {
    use rust_decimal::Decimal;

    pub fn encode<C, W: minicbor::encode::Write>(
        value: &Decimal,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&value.to_string())?.ok()
    }

    pub fn decode<'b, C>(
        d: &mut minicbor::Decoder<'b>,
        _: &mut C,
    ) -> Result<Decimal, minicbor::decode::Error> {
        d.str()?
            .parse::<Decimal>()
            .map_err(|_| minicbor::decode::Error::message("failed to parse decimal amount"))
    }
}
