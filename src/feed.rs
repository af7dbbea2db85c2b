use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use url::Url;

use crate::domain::OriginPage;
use crate::error::MirrorError;
use crate::page::FeedPage;

/// Items requested per page.
pub const PAGE_SIZE: u32 = 25;

const FEED_PATH: &str = "doc/instantiesnapshot";

pub trait FeedClient: Send + Sync {
    /// Fetches one page. A single request, no retries.
    fn fetch_page(&self, page: OriginPage) -> Result<FeedPage, MirrorError>;
}

impl<T: FeedClient + ?Sized> FeedClient for Arc<T> {
    fn fetch_page(&self, page: OriginPage) -> Result<FeedPage, MirrorError> {
        (**self).fetch_page(page)
    }
}

#[derive(Clone, Debug)]
pub struct FeedHttpClient {
    client: Client,
    host: Url,
}

impl FeedHttpClient {
    pub fn new(host: Url, api_key: &str, timeout: Duration) -> Result<Self, MirrorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ldes-mirror/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MirrorError::InvalidConfig(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/ld+json"));
        let mut key = HeaderValue::from_str(api_key.trim())
            .map_err(|_| MirrorError::InvalidConfig("API key is not a valid header value".to_string()))?;
        key.set_sensitive(true);
        headers.insert("X-API-KEY", key);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| MirrorError::FeedHttp(err.to_string()))?;
        Ok(Self { client, host })
    }

    pub fn page_url(host: &Url, page: OriginPage) -> String {
        let host = host.as_str().trim_end_matches('/');
        format!("{host}/{FEED_PATH}?limit={PAGE_SIZE}&pageNumber={page}")
    }

    fn handle_status(response: Response, url: &str) -> Result<Response, MirrorError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response
            .text()
            .unwrap_or_else(|err| format!("<error body unreadable: {err}>"));
        Err(MirrorError::FeedStatus {
            status,
            url: url.to_string(),
            body,
        })
    }
}

impl FeedClient for FeedHttpClient {
    fn fetch_page(&self, page: OriginPage) -> Result<FeedPage, MirrorError> {
        let url = Self::page_url(&self.host, page);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| transport_error(err, &url))?;
        let response = Self::handle_status(response, &url)?;
        let body = response
            .text()
            .map_err(|err| transport_error(err, &url))?;
        serde_json::from_str(&body).map_err(|err| MirrorError::MalformedPage {
            url,
            message: err.to_string(),
        })
    }
}

fn transport_error(err: reqwest::Error, url: &str) -> MirrorError {
    if err.is_timeout() {
        MirrorError::FeedTimeout {
            url: url.to_string(),
        }
    } else {
        MirrorError::FeedHttp(format!("{url}: {err}"))
    }
}
