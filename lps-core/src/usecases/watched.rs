//! Read-side projections used by the watchers to rehydrate their working sets.

use super::{UseCaseError, UseCaseId};
use crate::entities::{
    PeginQuoteRepository, PegoutQuoteRepository, WatchedPeginQuote, WatchedPegoutQuote,
};
use kanau::processor::Processor;
use lps_sdk::objects::{PeginState, PegoutState};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct WatchedPeginQuotesQuery {
    pub states: Vec<PeginState>,
}

pub struct GetWatchedPeginQuotesUseCase {
    repository: Arc<dyn PeginQuoteRepository>,
}

impl GetWatchedPeginQuotesUseCase {
    pub fn new(repository: Arc<dyn PeginQuoteRepository>) -> Self {
        Self { repository }
    }
}

impl Processor<WatchedPeginQuotesQuery> for GetWatchedPeginQuotesUseCase {
    type Output = Vec<WatchedPeginQuote>;
    type Error = UseCaseError;

    /// Retained records whose agreement is gone are skipped, not fatal.
    async fn process(
        &self,
        query: WatchedPeginQuotesQuery,
    ) -> Result<Vec<WatchedPeginQuote>, UseCaseError> {
        const ID: UseCaseId = UseCaseId::GetWatchedPeginQuotes;
        let retained_quotes = self
            .repository
            .get_retained_quotes_by_state(&query.states)
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;

        let mut watched = Vec::with_capacity(retained_quotes.len());
        for retained in retained_quotes {
            let quote_hash = retained.quote_hash.clone();
            let Some(quote) = self
                .repository
                .get_quote(&quote_hash)
                .await
                .map_err(|e| UseCaseError::recoverable(ID, e))?
            else {
                warn!(quote_hash = %quote_hash, "Retained peg-in quote without agreement, skipping");
                continue;
            };
            let creation_data = self
                .repository
                .get_creation_data(&quote_hash)
                .await
                .map_err(|e| UseCaseError::recoverable(ID, e))?;
            watched.push(WatchedPeginQuote::new(quote, retained, creation_data));
        }
        Ok(watched)
    }
}

#[derive(Debug, Clone)]
pub struct WatchedPegoutQuotesQuery {
    pub states: Vec<PegoutState>,
}

pub struct GetWatchedPegoutQuotesUseCase {
    repository: Arc<dyn PegoutQuoteRepository>,
}

impl GetWatchedPegoutQuotesUseCase {
    pub fn new(repository: Arc<dyn PegoutQuoteRepository>) -> Self {
        Self { repository }
    }
}

impl Processor<WatchedPegoutQuotesQuery> for GetWatchedPegoutQuotesUseCase {
    type Output = Vec<WatchedPegoutQuote>;
    type Error = UseCaseError;

    async fn process(
        &self,
        query: WatchedPegoutQuotesQuery,
    ) -> Result<Vec<WatchedPegoutQuote>, UseCaseError> {
        const ID: UseCaseId = UseCaseId::GetWatchedPegoutQuotes;
        let retained_quotes = self
            .repository
            .get_retained_quotes_by_state(&query.states)
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?;

        let mut watched = Vec::with_capacity(retained_quotes.len());
        for retained in retained_quotes {
            let quote_hash = retained.quote_hash.clone();
            let Some(quote) = self
                .repository
                .get_quote(&quote_hash)
                .await
                .map_err(|e| UseCaseError::recoverable(ID, e))?
            else {
                warn!(quote_hash = %quote_hash, "Retained peg-out quote without agreement, skipping");
                continue;
            };
            let creation_data = self
                .repository
                .get_creation_data(&quote_hash)
                .await
                .map_err(|e| UseCaseError::recoverable(ID, e))?;
            watched.push(WatchedPegoutQuote::new(quote, retained, creation_data));
        }
        Ok(watched)
    }
}
