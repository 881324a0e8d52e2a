//! Quote repositories.
//!
//! The watchers only see the [`PeginQuoteRepository`] and
//! [`PegoutQuoteRepository`] ports. [`DatabaseProcessor`](crate::framework::DatabaseProcessor)
//! implements both on top of Postgres, one `Processor` query per operation.

pub mod pegin;
pub mod pegout;
pub mod watched;

use async_trait::async_trait;
use lps_sdk::objects::{
    PeginQuote, PeginState, PegoutDeposit, PegoutQuote, PegoutState, QuoteCreationData,
    RetainedPeginQuote, RetainedPegoutQuote,
};
use thiserror::Error;

pub use watched::{WatchedPeginQuote, WatchedPegoutQuote};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("retained quote {0} not found")]
    NotFound(String),

    /// Only produced by test doubles.
    #[error("{0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PeginQuoteRepository: Send + Sync {
    async fn get_quote(&self, quote_hash: &str) -> Result<Option<PeginQuote>, RepositoryError>;

    async fn get_retained_quote(
        &self,
        quote_hash: &str,
    ) -> Result<Option<RetainedPeginQuote>, RepositoryError>;

    async fn get_retained_quotes_by_state(
        &self,
        states: &[PeginState],
    ) -> Result<Vec<RetainedPeginQuote>, RepositoryError>;

    async fn get_creation_data(
        &self,
        quote_hash: &str,
    ) -> Result<Option<QuoteCreationData>, RepositoryError>;

    async fn update_retained_quote(
        &self,
        retained: &RetainedPeginQuote,
    ) -> Result<(), RepositoryError>;

    /// Deletes agreements together with their retained records.
    /// Returns the number of agreements removed.
    async fn delete_quotes(&self, quote_hashes: &[String]) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait PegoutQuoteRepository: Send + Sync {
    async fn get_quote(&self, quote_hash: &str) -> Result<Option<PegoutQuote>, RepositoryError>;

    async fn get_retained_quote(
        &self,
        quote_hash: &str,
    ) -> Result<Option<RetainedPegoutQuote>, RepositoryError>;

    async fn get_retained_quotes_by_state(
        &self,
        states: &[PegoutState],
    ) -> Result<Vec<RetainedPegoutQuote>, RepositoryError>;

    async fn get_creation_data(
        &self,
        quote_hash: &str,
    ) -> Result<Option<QuoteCreationData>, RepositoryError>;

    async fn update_retained_quote(
        &self,
        retained: &RetainedPegoutQuote,
    ) -> Result<(), RepositoryError>;

    async fn delete_quotes(&self, quote_hashes: &[String]) -> Result<u64, RepositoryError>;

    async fn upsert_pegout_deposit(&self, deposit: &PegoutDeposit) -> Result<(), RepositoryError>;

    async fn upsert_pegout_deposits(
        &self,
        deposits: &[PegoutDeposit],
    ) -> Result<u64, RepositoryError>;
}
