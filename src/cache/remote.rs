//! Networked cache backend over a plain HTTP key-value API.
//!
//! The backend is addressed by a base URL. Entries are read with
//! `GET <base>/<key>` (404 means absent), written with `PUT <base>/<key>` and
//! a JSON body, and the whole namespace is dropped with `DELETE <base>/`.
//! The server is expected to replace an entry in one step, which gives the
//! per-key atomicity the cache contract requires.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use crate::cache::backend::{CacheBackend, CacheEntry};
use crate::cache::key::CacheKey;
use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend talking to a remote key-value store.
#[derive(Debug)]
pub struct RemoteBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl RemoteBackend {
    /// Prepare a backend for `url`. No request is made until first use.
    pub fn open(url: &str) -> Result<Self> {
        let mut base_url = Url::parse(url)
            .map_err(|e| Error::InvalidConfig(format!("invalid cache URL `{}`: {}", url, e)))?;

        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::InvalidConfig(format!(
                "unsupported cache URL scheme `{}`",
                base_url.scheme()
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        log::debug!("using remote cache at {}", base_url);
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn entry_url(&self, key: &CacheKey) -> Result<Url> {
        self.base_url
            .join(key.as_str())
            .map_err(|e| Error::InvalidConfig(format!("invalid cache entry URL: {}", e)))
    }
}

#[async_trait]
impl CacheBackend for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let url = self.entry_url(key)?;
        let response = self.client.get(url.clone()).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = response.bytes().await?;
                CacheEntry::decode(key, &bytes).map(Some)
            }
            status => Err(Error::CacheBackend(format!(
                "GET {} returned {}",
                url, status
            ))),
        }
    }

    async fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        let url = self.entry_url(key)?;
        let response = self.client.put(url.clone()).json(entry).send().await?;

        if !response.status().is_success() {
            return Err(Error::CacheBackend(format!(
                "PUT {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let response = self.client.delete(self.base_url.clone()).send().await?;
        let status = response.status();

        if status.is_success() || status == StatusCode::NOT_FOUND {
            log::info!("cleared remote cache at {}", self.base_url);
            Ok(())
        } else {
            Err(Error::CacheBackend(format!(
                "DELETE {} returned {}",
                self.base_url, status
            )))
        }
    }

    async fn close(&mut self) -> Result<()> {
        log::debug!("closed remote cache at {}", self.base_url);
        Ok(())
    }
}
