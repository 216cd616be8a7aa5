//! Yahoo Finance quote fetcher.
//!
//! Requests the quoteSummary endpoint and flattens its modules into a single
//! field map, so configured items can name fields such as
//! `regularMarketPrice`, `sector` or `currency` directly.

use log::{debug, warn};
use reqwest::{header, StatusCode};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use urlencoding::encode;

use super::QuoteFetcher;
use crate::error::FetchError;
use crate::quote::Quote;
use crate::source::Source;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query1.finance.yahoo.com/v1/test/getcrumb";
const QUOTE_SUMMARY_URL: &str = "https://query1.finance.yahoo.com/v10/finance/quoteSummary";
const QUOTE_MODULES: &str = "price,summaryDetail,summaryProfile,defaultKeyStatistics";

/// Cached Yahoo authentication data
#[derive(Debug, Clone)]
struct Crumb {
    cookie: String,
    crumb: String,
}

pub struct YahooFetcher {
    client: reqwest::Client,
    crumb: RwLock<Option<Crumb>>,
}

impl YahooFetcher {
    /// Create a fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            crumb: RwLock::new(None),
        })
    }

    async fn ensure_crumb(&self) -> Result<Crumb, FetchError> {
        if let Some(crumb) = self.crumb.read().await.as_ref() {
            return Ok(crumb.clone());
        }

        let crumb = self.fetch_crumb().await?;
        *self.crumb.write().await = Some(crumb.clone());
        Ok(crumb)
    }

    async fn fetch_crumb(&self) -> Result<Crumb, FetchError> {
        debug!("Requesting Yahoo cookie and crumb");
        let response = self.client.get(COOKIE_URL).send().await?;

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split_once(';').map(|(v, _)| v.to_string()))
            .ok_or_else(|| FetchError::Authentication("no cookie in Yahoo response".to_string()))?;

        let crumb = self
            .client
            .get(CRUMB_URL)
            .header(header::COOKIE, &cookie)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| FetchError::Authentication(e.to_string()))?
            .text()
            .await?;

        if crumb.trim().is_empty() {
            return Err(FetchError::Authentication("empty crumb".to_string()));
        }

        Ok(Crumb { cookie, crumb })
    }

    async fn clear_crumb(&self) {
        *self.crumb.write().await = None;
    }
}

#[async_trait::async_trait]
impl QuoteFetcher for YahooFetcher {
    async fn fetch(&self, source: &Source, ticker: &str) -> Result<Option<Quote>, FetchError> {
        let crumb = self.ensure_crumb().await?;
        let url = format!(
            "{}/{}?modules={}&crumb={}",
            QUOTE_SUMMARY_URL,
            encode(ticker),
            QUOTE_MODULES,
            encode(&crumb.crumb)
        );

        debug!("Requesting {} for source {}", ticker, source.name);
        let response = self
            .client
            .get(&url)
            .header(header::COOKIE, &crumb.cookie)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.clear_crumb().await;
                return Err(FetchError::Authentication(format!(
                    "Yahoo rejected credentials for {}",
                    ticker
                )));
            }
            StatusCode::NOT_FOUND => {
                warn!("Yahoo has no quote for {}", ticker);
                return Ok(None);
            }
            status if !status.is_success() => {
                return Err(FetchError::Status {
                    ticker: ticker.to_string(),
                    status: status.as_u16(),
                });
            }
            _ => {}
        }

        let body: Value = response.json().await?;
        Ok(flatten_quote_summary(&body))
    }

    fn name(&self) -> &str {
        "yahoo"
    }
}

/// Merge every module of the first quoteSummary result into one flat quote.
/// `{raw, fmt}` wrappers collapse to `raw`; empty objects, nested objects and
/// arrays are dropped. Modules merge in name order and the first one to carry
/// a field keeps it.
pub fn flatten_quote_summary(body: &Value) -> Option<Quote> {
    let result = body
        .get("quoteSummary")?
        .get("result")?
        .as_array()?
        .first()?
        .as_object()?;

    let mut fields = Map::new();
    for module in result.values() {
        let Some(module) = module.as_object() else {
            continue;
        };
        for (name, value) in module {
            if name == "maxAge" || fields.contains_key(name) {
                continue;
            }
            let value = match value {
                Value::Object(inner) => match inner.get("raw") {
                    Some(raw) => raw.clone(),
                    None => continue,
                },
                Value::Array(_) => continue,
                other => other.clone(),
            };
            fields.insert(name.clone(), value);
        }
    }

    if fields.is_empty() {
        None
    } else {
        Some(Quote::new(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_modules() {
        let body = json!({
            "quoteSummary": {
                "result": [{
                    "price": {
                        "maxAge": 1,
                        "regularMarketPrice": {"raw": 150.0, "fmt": "150.00"},
                        "currency": "USD",
                        "shortName": "Apple Inc.",
                        "postMarketChange": {}
                    },
                    "summaryProfile": {
                        "sector": "Technology",
                        "companyOfficers": [{"name": "Tim"}],
                        "fullTimeEmployees": 164000
                    },
                    "summaryDetail": {
                        "currency": "EUR",
                        "volume": {"raw": 1200, "fmt": "1.2k", "longFmt": "1,200"}
                    }
                }],
                "error": null
            }
        });

        let quote = flatten_quote_summary(&body).unwrap();
        assert_eq!(quote.number("regularMarketPrice"), Some(150.0));
        assert_eq!(quote.label_value("currency").as_deref(), Some("USD"));
        assert_eq!(quote.label_value("sector").as_deref(), Some("Technology"));
        assert_eq!(quote.number("fullTimeEmployees"), Some(164000.0));
        assert_eq!(quote.number("volume"), Some(1200.0));
        assert!(quote.field("postMarketChange").is_none());
        assert!(quote.field("companyOfficers").is_none());
        assert!(quote.field("maxAge").is_none());
    }

    #[test]
    fn test_flatten_empty_result() {
        let body = json!({"quoteSummary": {"result": [], "error": null}});
        assert!(flatten_quote_summary(&body).is_none());

        let body = json!({"quoteSummary": {"result": null, "error": {"code": "Not Found"}}});
        assert!(flatten_quote_summary(&body).is_none());

        let body = json!({"quoteSummary": {"result": [{"price": {"maxAge": 1}}]}});
        assert!(flatten_quote_summary(&body).is_none());
    }
}
