use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinSet;

/// Raw bodies keyed by URL. Failed fetches map to an empty body.
pub type FetchedSources = HashMap<String, Vec<u8>>;

/// Downloads upstream lists. Local paths and `file://` URLs are read from
/// disk so a pipeline can run offline.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    base_dir: PathBuf,
}

impl Fetcher {
    pub fn new(timeout: Duration, user_agent: &str, base_dir: &Path) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// Fetch every URL concurrently. Each URL is fetched once; failures are
    /// logged and yield an empty body so the remaining sources still merge.
    pub async fn fetch_all<I>(&self, urls: I) -> FetchedSources
    where
        I: IntoIterator<Item = String>,
    {
        let unique: BTreeSet<String> = urls.into_iter().collect();
        let mut tasks = JoinSet::new();

        for url in unique {
            let fetcher = self.clone();
            tasks.spawn(async move {
                let body = fetcher.fetch(&url).await;
                (url, body)
            });
        }

        let mut fetched = FetchedSources::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((url, body)) => {
                    fetched.insert(url, body);
                }
                Err(e) => log::warn!("fetch task failed: {}", e),
            }
        }
        fetched
    }

    pub async fn fetch(&self, url: &str) -> Vec<u8> {
        match self.try_fetch(url).await {
            Ok(body) => {
                log::info!("fetched {} ({} bytes)", url, body.len());
                body
            }
            Err(e) => {
                log::warn!("fetch failed, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        if let Some(path) = self.local_path(url) {
            return tokio::fs::read(&path)
                .await
                .map_err(|e| format!("Failed to read '{}': {}", path.display(), e));
        }

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("{}: {}", url, e))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| format!("{}: {}", url, e))?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| format!("{}: {}", url, e))?;
        Ok(bytes.to_vec())
    }

    fn local_path(&self, url: &str) -> Option<PathBuf> {
        let path = match url.strip_prefix("file://") {
            Some(rest) => Path::new(rest),
            None if !url.contains("://") => Path::new(url),
            None => return None,
        };

        Some(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        })
    }
}
