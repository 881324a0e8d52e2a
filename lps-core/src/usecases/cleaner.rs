use super::{UseCaseError, UseCaseId};
use crate::entities::{PeginQuoteRepository, PegoutQuoteRepository};
use kanau::processor::Processor;
use lps_sdk::objects::{PeginState, PegoutState};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanExpiredQuotes;

/// Deletes every quote whose deposit window elapsed, peg-in first.
///
/// Either both flows are cleaned and the deleted hashes are returned, or the
/// call fails and nothing is reported.
pub struct CleanExpiredQuotesUseCase {
    pegin_repository: Arc<dyn PeginQuoteRepository>,
    pegout_repository: Arc<dyn PegoutQuoteRepository>,
}

impl CleanExpiredQuotesUseCase {
    pub fn new(
        pegin_repository: Arc<dyn PeginQuoteRepository>,
        pegout_repository: Arc<dyn PegoutQuoteRepository>,
    ) -> Self {
        Self {
            pegin_repository,
            pegout_repository,
        }
    }
}

impl Processor<CleanExpiredQuotes> for CleanExpiredQuotesUseCase {
    type Output = Vec<String>;
    type Error = UseCaseError;

    async fn process(&self, _: CleanExpiredQuotes) -> Result<Vec<String>, UseCaseError> {
        const ID: UseCaseId = UseCaseId::CleanExpiredQuotes;
        let pegin_hashes: Vec<String> = self
            .pegin_repository
            .get_retained_quotes_by_state(&[PeginState::TimeForDepositElapsed])
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?
            .into_iter()
            .map(|q| q.quote_hash)
            .collect();
        let pegout_hashes: Vec<String> = self
            .pegout_repository
            .get_retained_quotes_by_state(&[PegoutState::TimeForDepositElapsed])
            .await
            .map_err(|e| UseCaseError::recoverable(ID, e))?
            .into_iter()
            .map(|q| q.quote_hash)
            .collect();

        if !pegin_hashes.is_empty() {
            self.pegin_repository
                .delete_quotes(&pegin_hashes)
                .await
                .map_err(|e| UseCaseError::recoverable(ID, e))?;
        }
        if !pegout_hashes.is_empty() {
            self.pegout_repository
                .delete_quotes(&pegout_hashes)
                .await
                .map_err(|e| UseCaseError::recoverable(ID, e))?;
        }

        let mut deleted = pegin_hashes;
        deleted.extend(pegout_hashes);
        Ok(deleted)
    }
}
