use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValuationError {
    #[error("Exchange rate unavailable: {0}")]
    RateUnavailable(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Store error: {0}")]
    Store(String),
}
