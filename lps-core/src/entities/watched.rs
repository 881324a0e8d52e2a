use lps_sdk::objects::{
    PeginQuote, PegoutQuote, QuoteCreationData, RetainedPeginQuote, RetainedPegoutQuote,
};

/// Agreement plus tracking record, as held in a watcher's working set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedPeginQuote {
    pub quote: PeginQuote,
    pub retained: RetainedPeginQuote,
    pub creation_data: Option<QuoteCreationData>,
}

impl WatchedPeginQuote {
    pub fn new(
        quote: PeginQuote,
        retained: RetainedPeginQuote,
        creation_data: Option<QuoteCreationData>,
    ) -> Self {
        Self {
            quote,
            retained,
            creation_data,
        }
    }

    pub fn quote_hash(&self) -> &str {
        &self.retained.quote_hash
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedPegoutQuote {
    pub quote: PegoutQuote,
    pub retained: RetainedPegoutQuote,
    pub creation_data: Option<QuoteCreationData>,
}

impl WatchedPegoutQuote {
    pub fn new(
        quote: PegoutQuote,
        retained: RetainedPegoutQuote,
        creation_data: Option<QuoteCreationData>,
    ) -> Self {
        Self {
            quote,
            retained,
            creation_data,
        }
    }

    pub fn quote_hash(&self) -> &str {
        &self.retained.quote_hash
    }

    pub fn creation_block(&self) -> Option<u64> {
        self.creation_data.as_ref().and_then(|d| d.creation_block)
    }
}
