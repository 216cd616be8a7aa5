mod yahoo;

pub use yahoo::{flatten_quote_summary, YahooFetcher};

use crate::error::FetchError;
use crate::quote::Quote;
use crate::source::Source;

/// Trait for capabilities that retrieve one quote for one ticker
#[async_trait::async_trait]
pub trait QuoteFetcher: Send + Sync + 'static {
    /// Fetch the current quote for `ticker` on behalf of `source`.
    /// `Ok(None)` means the call succeeded but returned nothing usable.
    async fn fetch(&self, source: &Source, ticker: &str) -> Result<Option<Quote>, FetchError>;

    /// Get the fetcher name
    fn name(&self) -> &str;
}
