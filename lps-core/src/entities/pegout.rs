use crate::entities::{PegoutQuoteRepository, RepositoryError};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use lps_sdk::objects::{
    PegoutDeposit, PegoutQuote, PegoutState, QuoteCreationData, RetainedPegoutQuote,
};
use sqlx::types::Json;

#[derive(Debug, Clone)]
pub struct GetPegoutQuote {
    pub quote_hash: String,
}

impl Processor<GetPegoutQuote> for DatabaseProcessor {
    type Output = Option<PegoutQuote>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPegoutQuote")]
    async fn process(&self, query: GetPegoutQuote) -> Result<Option<PegoutQuote>, sqlx::Error> {
        let quote = sqlx::query_scalar::<_, Json<PegoutQuote>>(
            "SELECT payload FROM pegout_quotes WHERE quote_hash = $1",
        )
        .bind(query.quote_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(quote.map(|q| q.0))
    }
}

#[derive(Debug, Clone)]
pub struct GetRetainedPegoutQuote {
    pub quote_hash: String,
}

impl Processor<GetRetainedPegoutQuote> for DatabaseProcessor {
    type Output = Option<RetainedPegoutQuote>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetRetainedPegoutQuote")]
    async fn process(
        &self,
        query: GetRetainedPegoutQuote,
    ) -> Result<Option<RetainedPegoutQuote>, sqlx::Error> {
        let retained = sqlx::query_scalar::<_, Json<RetainedPegoutQuote>>(
            "SELECT payload FROM retained_pegout_quotes WHERE quote_hash = $1",
        )
        .bind(query.quote_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(retained.map(|r| r.0))
    }
}

#[derive(Debug, Clone)]
pub struct GetRetainedPegoutQuotesByState {
    pub states: Vec<PegoutState>,
}

impl Processor<GetRetainedPegoutQuotesByState> for DatabaseProcessor {
    type Output = Vec<RetainedPegoutQuote>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetRetainedPegoutQuotesByState")]
    async fn process(
        &self,
        query: GetRetainedPegoutQuotesByState,
    ) -> Result<Vec<RetainedPegoutQuote>, sqlx::Error> {
        let states: Vec<&'static str> = query.states.iter().map(PegoutState::as_str).collect();
        let rows = sqlx::query_scalar::<_, Json<RetainedPegoutQuote>>(
            "SELECT payload FROM retained_pegout_quotes WHERE state = ANY($1) ORDER BY quote_hash",
        )
        .bind(states)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

#[derive(Debug, Clone)]
pub struct GetPegoutCreationData {
    pub quote_hash: String,
}

impl Processor<GetPegoutCreationData> for DatabaseProcessor {
    type Output = Option<QuoteCreationData>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPegoutCreationData")]
    async fn process(
        &self,
        query: GetPegoutCreationData,
    ) -> Result<Option<QuoteCreationData>, sqlx::Error> {
        let data = sqlx::query_scalar::<_, Option<Json<QuoteCreationData>>>(
            "SELECT creation_data FROM pegout_quotes WHERE quote_hash = $1",
        )
        .bind(query.quote_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(data.flatten().map(|d| d.0))
    }
}

#[derive(Debug, Clone)]
pub struct UpdateRetainedPegoutQuote {
    pub retained: RetainedPegoutQuote,
}

impl Processor<UpdateRetainedPegoutQuote> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdateRetainedPegoutQuote")]
    async fn process(&self, update: UpdateRetainedPegoutQuote) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE retained_pegout_quotes SET state = $2, payload = $3, updated_at = NOW() \
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
pub struct DeletePegoutQuotes {
    pub quote_hashes: Vec<String>,
}

impl Processor<DeletePegoutQuotes> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeletePegoutQuotes")]
    async fn process(&self, delete: DeletePegoutQuotes) -> Result<u64, sqlx::Error> {
        if delete.quote_hashes.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM pegout_quotes WHERE quote_hash = ANY($1)")
            .bind(delete.quote_hashes)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// Insert or refresh deposits in a single query.
///
/// Uses QueryBuilder for the bulk insert, the tx hash is the conflict key.
pub struct UpsertPegoutDeposits {
    pub deposits: Vec<PegoutDeposit>,
}

impl Processor<UpsertPegoutDeposits> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertPegoutDeposits")]
    async fn process(&self, upsert: UpsertPegoutDeposits) -> Result<u64, sqlx::Error> {
        if upsert.deposits.is_empty() {
            return Ok(0);
        }

        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO pegout_deposits \
            (tx_hash, quote_hash, amount, block_timestamp, block_number, from_address) ",
        );

        query_builder.push_values(upsert.deposits, |mut b, deposit| {
            b.push_bind(deposit.tx_hash)
                .push_bind(deposit.quote_hash)
                .push_bind(deposit.amount)
                .push_bind(to_bigint(deposit.timestamp))
                .push_bind(to_bigint(deposit.block_number))
                .push_bind(deposit.from);
        });

        query_builder.push(
            " ON CONFLICT (tx_hash) DO UPDATE SET \
            quote_hash = EXCLUDED.quote_hash, amount = EXCLUDED.amount, \
            block_timestamp = EXCLUDED.block_timestamp, block_number = EXCLUDED.block_number, \
            from_address = EXCLUDED.from_address",
        );

        let result = query_builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl PegoutQuoteRepository for DatabaseProcessor {
    async fn get_quote(&self, quote_hash: &str) -> Result<Option<PegoutQuote>, RepositoryError> {
        let quote_hash = quote_hash.to_string();
        Ok(self.process(GetPegoutQuote { quote_hash }).await?)
    }

    async fn get_retained_quote(
        &self,
        quote_hash: &str,
    ) -> Result<Option<RetainedPegoutQuote>, RepositoryError> {
        let quote_hash = quote_hash.to_string();
        Ok(self.process(GetRetainedPegoutQuote { quote_hash }).await?)
    }

    async fn get_retained_quotes_by_state(
        &self,
        states: &[PegoutState],
    ) -> Result<Vec<RetainedPegoutQuote>, RepositoryError> {
        let states = states.to_vec();
        Ok(self
            .process(GetRetainedPegoutQuotesByState { states })
            .await?)
    }

    async fn get_creation_data(
        &self,
        quote_hash: &str,
    ) -> Result<Option<QuoteCreationData>, RepositoryError> {
        let quote_hash = quote_hash.to_string();
        Ok(self.process(GetPegoutCreationData { quote_hash }).await?)
    }

    async fn update_retained_quote(
        &self,
        retained: &RetainedPegoutQuote,
    ) -> Result<(), RepositoryError> {
        let retained = retained.clone();
        let quote_hash = retained.quote_hash.clone();
        match self.process(UpdateRetainedPegoutQuote { retained }).await? {
            0 => Err(RepositoryError::NotFound(quote_hash)),
            _ => Ok(()),
        }
    }

    async fn delete_quotes(&self, quote_hashes: &[String]) -> Result<u64, RepositoryError> {
        let quote_hashes = quote_hashes.to_vec();
        Ok(self.process(DeletePegoutQuotes { quote_hashes }).await?)
    }

    async fn upsert_pegout_deposit(&self, deposit: &PegoutDeposit) -> Result<(), RepositoryError> {
        let deposits = vec![deposit.clone()];
        self.process(UpsertPegoutDeposits { deposits }).await?;
        Ok(())
    }

    async fn upsert_pegout_deposits(
        &self,
        deposits: &[PegoutDeposit],
    ) -> Result<u64, RepositoryError> {
        let deposits = deposits.to_vec();
        Ok(self.process(UpsertPegoutDeposits { deposits }).await?)
    }
}
