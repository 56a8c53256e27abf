use std::{collections::HashMap, sync::Arc};

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest_cookie_store::CookieStoreMutex;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Cookies are registered for the parent domain so that both the www and the
/// webcast hosts see them.
const COOKIE_DOMAIN: &str = "tiktok.com";
const COOKIE_URL: &str = "https://www.tiktok.com/";

pub struct HttpClient {
    pub client: ClientWithMiddleware,
    /// Same client, but with redirects disabled. Resolution needs to observe
    /// the 301/302 responses the platform uses for moved and blocked pages.
    pub client_noredirect: ClientWithMiddleware,
    pub cookies: Arc<CookieStoreMutex>,
}

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("reqwest middleware error: {0}")]
    ReqwestMiddlewareError(#[from] reqwest_middleware::Error),
    #[error("cookie store error: {0}")]
    CookieError(String),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

impl HttpClient {
    pub fn new(proxy: Option<&str>) -> reqwest::Result<HttpClient> {
        let cookies = Arc::new(CookieStoreMutex::default());

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));

        let mut builder = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .default_headers(headers.clone());
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let client = reqwest_middleware::ClientBuilder::new(builder.build()?)
            .with(RetryTransientMiddleware::new_with_policy(
                ExponentialBackoff::builder().build_with_max_retries(3),
            ))
            .build();

        let mut builder = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none());
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let client_noredirect = reqwest_middleware::ClientBuilder::new(builder.build()?)
            .with(RetryTransientMiddleware::new_with_policy(
                ExponentialBackoff::builder().build_with_max_retries(3),
            ))
            .build();

        Ok(HttpClient {
            client,
            client_noredirect,
            cookies,
        })
    }

    /// Inserts pre-baked cookies into the jar shared by both clients.
    pub fn set_cookies(&self, jar: &HashMap<String, String>) -> Result<(), DownloadError> {
        let url = reqwest::Url::parse(COOKIE_URL)
            .map_err(|e| DownloadError::CookieError(e.to_string()))?;

        let mut store = match self.cookies.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (name, value) in jar {
            let cookie = cookie_store::RawCookie::build(name.clone(), value.clone())
                .domain(COOKIE_DOMAIN)
                .path("/")
                .finish();
            store
                .insert_raw(&cookie, &url)
                .map_err(|e| DownloadError::CookieError(e.to_string()))?;
        }

        Ok(())
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String, DownloadError> {
        self.client
            .get(url)
            .send()
            .await?
            .text()
            .await
            .map_err(|e| e.into())
    }

    pub async fn fetch_json<T>(&self, url: &str) -> Result<T, DownloadError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.client
            .get(url)
            .send()
            .await?
            .json::<T>()
            .await
            .map_err(|e| e.into())
    }

    /// Fetches without following redirects, returning the status code along
    /// with the body.
    pub async fn fetch_noredirect(
        &self,
        url: &str,
    ) -> Result<(reqwest::StatusCode, String), DownloadError> {
        let resp = self.client_noredirect.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok((status, body))
    }

    /// Opens a streaming GET, leaving the body to be consumed chunk by chunk.
    pub async fn get_stream(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        Ok(self.client.get(url).send().await?)
    }
}

pub fn format_bytes(bytes: u64) -> String {
    let mut bytes = bytes as f64;
    let mut suffix = "B";

    if bytes > 1024.0 {
        bytes /= 1024.0;
        suffix = "KiB";
    }
    if bytes > 1024.0 {
        bytes /= 1024.0;
        suffix = "MiB";
    }
    if bytes > 1024.0 {
        bytes /= 1024.0;
        suffix = "GiB";
    }
    if bytes > 1024.0 {
        bytes /= 1024.0;
        suffix = "TiB";
    }

    format!("{:.2} {}", bytes, suffix)
}
