//! Page fetching with an on-disk response cache.
//!
//! Banner is slow and rate sensitive, so every response is kept on disk keyed
//! by URL and form body. Re-running a harvest only touches the network for
//! pages it has never seen.

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// One GET, or one POST when `form` is set.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PageRequest {
    url: String,
    form: Option<Vec<(String, String)>>,
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> PageRequest {
        PageRequest {
            url: url.into(),
            form: None,
        }
    }

    pub fn post(url: impl Into<String>, form: Vec<(String, String)>) -> PageRequest {
        PageRequest {
            url: url.into(),
            form: Some(form),
        }
    }

    pub fn get_url(&self) -> &str {
        &self.url
    }

    pub fn get_form(&self) -> Option<&[(String, String)]> {
        self.form.as_deref()
    }

    /// Stable cache key over the URL and the form body.
    pub fn cache_key(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.url.as_bytes());

        if let Some(form) = &self.form {
            hasher.update(b"\nPOST");
            for (name, value) in form {
                hasher.update(b"\n");
                hasher.update(name.as_bytes());
                hasher.update(b"=");
                hasher.update(value.as_bytes());
            }
        }

        hasher.finalize().to_hex().to_string()
    }
}

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> Result<Vec<u8>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedPage {
    url: String,
    form: Option<Vec<(String, String)>>,
    fetched_at: i64,
    body: String,
}

/// Directory of JSON envelopes, one per request.
#[derive(Clone, Debug)]
pub struct WebCache {
    dir: PathBuf,
}

impl WebCache {
    pub fn new(dir: impl AsRef<Path>) -> WebCache {
        WebCache {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn get_dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, request: &PageRequest) -> PathBuf {
        self.dir.join(format!("{}.json", request.cache_key()))
    }

    pub async fn read(&self, request: &PageRequest) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(request);

        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let page: CachedPage = serde_json::from_slice(&data)
            .map_err(|e| Error::Cache(format!("{}: {}", path.display(), e)))?;

        // Two requests hashing alike would be a bug, not a hit
        if page.url != request.url || page.form != request.form {
            return Err(Error::Cache(format!(
                "{} belongs to {}, not {}",
                path.display(),
                page.url,
                request.url
            )));
        }

        Ok(Some(page.body.into_bytes()))
    }

    pub async fn write(&self, request: &PageRequest, body: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let page = CachedPage {
            url: request.url.clone(),
            form: request.form.clone(),
            fetched_at: chrono::Utc::now().timestamp(),
            body: String::from_utf8_lossy(body).into_owned(),
        };
        let serialized = serde_json::to_vec(&page).map_err(|e| Error::Cache(e.to_string()))?;

        tokio::fs::write(self.path_for(request), serialized).await?;
        Ok(())
    }
}

/// reqwest-backed fetcher used against the live site.
pub struct HttpFetcher {
    client: reqwest::Client,
    cache: Option<WebCache>,
    delay: Duration,
    jitter: Duration,
    has_fetched: AtomicBool,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<HttpFetcher> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|source| Error::Fetch {
                url: config.base_url.clone(),
                source,
            })?;

        Ok(HttpFetcher {
            client,
            cache: config.cache_dir.as_ref().map(WebCache::new),
            delay: config.request_delay,
            jitter: config.request_jitter,
            has_fetched: AtomicBool::new(false),
        })
    }

    pub fn get_cache(&self) -> Option<&WebCache> {
        self.cache.as_ref()
    }

    async fn pause(&self) {
        // No pause before the very first request of a run
        if !self.has_fetched.swap(true, Ordering::SeqCst) {
            return;
        }

        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };

        let wait = self.delay + Duration::from_millis(jitter);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    async fn fetch_network(&self, request: &PageRequest) -> Result<Vec<u8>> {
        let url = request.get_url();
        let fetch_error = |source| Error::Fetch {
            url: url.to_string(),
            source,
        };

        self.pause().await;
        info!("GET {}", url);

        let builder = match request.get_form() {
            Some(form) => self.client.post(url).form(form),
            None => self.client.get(url),
        };

        let response = builder.send().await.map_err(fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(fetch_error)?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<Vec<u8>> {
        if let Some(cache) = &self.cache {
            match cache.read(request).await {
                Ok(Some(body)) => {
                    debug!("Cache hit for {}", request.get_url());
                    return Ok(body);
                }
                Ok(None) => {}
                Err(e) => warn!("Ignoring unreadable cache entry: {}", e),
            }
        }

        let body = self.fetch_network(request).await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.write(request, &body).await {
                warn!("Could not cache {}: {}", request.get_url(), e);
            }
        }

        Ok(body)
    }
}
