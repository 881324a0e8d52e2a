use crate::entities::{PeginQuoteRepository, RepositoryError};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use lps_sdk::objects::{PeginQuote, PeginState, QuoteCreationData, RetainedPeginQuote};
use sqlx::types::Json;

#[derive(Debug, Clone)]
pub struct GetPeginQuote {
    pub quote_hash: String,
}

impl Processor<GetPeginQuote> for DatabaseProcessor {
    type Output = Option<PeginQuote>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPeginQuote")]
    async fn process(&self, query: GetPeginQuote) -> Result<Option<PeginQuote>, sqlx::Error> {
        let quote = sqlx::query_scalar::<_, Json<PeginQuote>>(
            "SELECT payload FROM pegin_quotes WHERE quote_hash = $1",
        )
        .bind(query.quote_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(quote.map(|q| q.0))
    }
}

#[derive(Debug, Clone)]
pub struct GetRetainedPeginQuote {
    pub quote_hash: String,
}

impl Processor<GetRetainedPeginQuote> for DatabaseProcessor {
    type Output = Option<RetainedPeginQuote>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetRetainedPeginQuote")]
    async fn process(
        &self,
        query: GetRetainedPeginQuote,
    ) -> Result<Option<RetainedPeginQuote>, sqlx::Error> {
        let retained = sqlx::query_scalar::<_, Json<RetainedPeginQuote>>(
            "SELECT payload FROM retained_pegin_quotes WHERE quote_hash = $1",
        )
        .bind(query.quote_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(retained.map(|r| r.0))
    }
}

#[derive(Debug, Clone)]
/// Retained records whose state column matches any of `states`.
pub struct GetRetainedPeginQuotesByState {
    pub states: Vec<PeginState>,
}

impl Processor<GetRetainedPeginQuotesByState> for DatabaseProcessor {
    type Output = Vec<RetainedPeginQuote>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetRetainedPeginQuotesByState")]
    async fn process(
        &self,
        query: GetRetainedPeginQuotesByState,
    ) -> Result<Vec<RetainedPeginQuote>, sqlx::Error> {
        let states: Vec<&'static str> = query.states.iter().map(PeginState::as_str).collect();
        let rows = sqlx::query_scalar::<_, Json<RetainedPeginQuote>>(
            "SELECT payload FROM retained_pegin_quotes WHERE state = ANY($1) ORDER BY quote_hash",
        )
        .bind(states)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

#[derive(Debug, Clone)]
pub struct GetPeginCreationData {
    pub quote_hash: String,
}

impl Processor<GetPeginCreationData> for DatabaseProcessor {
    type Output = Option<QuoteCreationData>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPeginCreationData")]
    async fn process(
        &self,
        query: GetPeginCreationData,
    ) -> Result<Option<QuoteCreationData>, sqlx::Error> {
        let data = sqlx::query_scalar::<_, Option<Json<QuoteCreationData>>>(
            "SELECT creation_data FROM pegin_quotes WHERE quote_hash = $1",
        )
        .bind(query.quote_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(data.flatten().map(|d| d.0))
    }
}

#[derive(Debug, Clone)]
/// Overwrites the retained record and its state column.
/// Returns the number of rows touched.
pub struct UpdateRetainedPeginQuote {
    pub retained: RetainedPeginQuote,
}

impl Processor<UpdateRetainedPeginQuote> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdateRetainedPeginQuote")]
    async fn process(&self, update: UpdateRetainedPeginQuote) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE retained_pegin_quotes SET state = $2, payload = $3, updated_at = NOW() \
             WHERE quote_hash = $1",
        )
        .bind(&update.retained.quote_hash)
        .bind(update.retained.state.as_str())
        .bind(Json(&update.retained))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
pub struct DeletePeginQuotes {
    pub quote_hashes: Vec<String>,
}

impl Processor<DeletePeginQuotes> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeletePeginQuotes")]
    async fn process(&self, delete: DeletePeginQuotes) -> Result<u64, sqlx::Error> {
        if delete.quote_hashes.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM pegin_quotes WHERE quote_hash = ANY($1)")
            .bind(delete.quote_hashes)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PeginQuoteRepository for DatabaseProcessor {
    async fn get_quote(&self, quote_hash: &str) -> Result<Option<PeginQuote>, RepositoryError> {
        let quote_hash = quote_hash.to_string();
        Ok(self.process(GetPeginQuote { quote_hash }).await?)
    }

    async fn get_retained_quote(
        &self,
        quote_hash: &str,
    ) -> Result<Option<RetainedPeginQuote>, RepositoryError> {
        let quote_hash = quote_hash.to_string();
        Ok(self.process(GetRetainedPeginQuote { quote_hash }).await?)
    }

    async fn get_retained_quotes_by_state(
        &self,
        states: &[PeginState],
    ) -> Result<Vec<RetainedPeginQuote>, RepositoryError> {
        let states = states.to_vec();
        Ok(self.process(GetRetainedPeginQuotesByState { states }).await?)
    }

    async fn get_creation_data(
        &self,
        quote_hash: &str,
    ) -> Result<Option<QuoteCreationData>, RepositoryError> {
        let quote_hash = quote_hash.to_string();
        Ok(self.process(GetPeginCreationData { quote_hash }).await?)
    }

    async fn update_retained_quote(
        &self,
        retained: &RetainedPeginQuote,
    ) -> Result<(), RepositoryError> {
        let retained = retained.clone();
        let quote_hash = retained.quote_hash.clone();
        match self.process(UpdateRetainedPeginQuote { retained }).await? {
            0 => Err(RepositoryError::NotFound(quote_hash)),
            _ => Ok(()),
        }
    }

    async fn delete_quotes(&self, quote_hashes: &[String]) -> Result<u64, RepositoryError> {
        let quote_hashes = quote_hashes.to_vec();
        Ok(self.process(DeletePeginQuotes { quote_hashes }).await?)
    }
}
