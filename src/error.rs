use rust_decimal::Decimal;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must be greater than zero")]
    NonPositiveAmount(&'static str),
    #[error("Currency code is missing")]
    MissingCurrency,
    #[error("'{0}' is not a valid currency code")]
    InvalidCurrency(String),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("'{0}' is not a valid date, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Amount rounds to zero in the tracking currency")]
    ZeroBaseAmount,
    #[error("Cannot convert {0} cash into {0}")]
    SameCurrency(String),
    #[error("{0} is too large to record")]
    AmountTooLarge(&'static str),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Cash sources must share one currency, found {expected} and {found}")]
    CurrencyMismatch { expected: String, found: String },
    #[error("Not enough {currency} cash: requested {requested}, only {available} available")]
    InsufficientFunds {
        currency: String,
        requested: Decimal,
        available: Decimal,
    },
    #[error("No {0} cash available to spend")]
    NoUsableSource(String),
    #[error("Ledger integrity violated: {0}")]
    Integrity(String),
    #[error("Failed to generate an identifier: {0}")]
    IdGeneration(String),
}

impl LedgerError {
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }
}
