// Live retrieval: SerpAPI search plus page fetching, rate limited

use super::{RetrievalTools, SearchError, SerpApiClient, WebFetcher};
use crate::config::SearchConfig;
use crate::models::{FetchedPage, SearchHit};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;

pub struct WebRetrieval {
    search: Option<SerpApiClient>,
    fetcher: WebFetcher,
    limiter: DefaultDirectRateLimiter,
}

impl WebRetrieval {
    pub fn new(search: Option<SerpApiClient>, fetcher: WebFetcher, requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            search,
            fetcher,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        Ok(Self::new(
            SerpApiClient::from_config(config),
            WebFetcher::from_config(config)?,
            config.requests_per_second,
        ))
    }

    pub fn has_search(&self) -> bool {
        self.search.is_some()
    }
}

#[async_trait]
impl RetrievalTools for WebRetrieval {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        let client = self.search.as_ref().ok_or(SearchError::NoApiKey)?;
        // SerpAPI quotas are per second; page fetches hit many hosts and are not throttled
        self.limiter.until_ready().await;
        client.search_light(query).await
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage, SearchError> {
        self.fetcher.fetch(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_search_without_key() {
        let fetcher = WebFetcher::new(Duration::from_secs(1), 0).unwrap();
        let retrieval = WebRetrieval::new(None, fetcher, 0);
        assert!(!retrieval.has_search());
        assert_eq!(retrieval.search("acme").await, Err(SearchError::NoApiKey));
    }
}
