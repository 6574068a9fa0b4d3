use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::{
    build_http_client, http_get_bytes, load_shard_directory_with, resolve_image_location,
    BasketError, BasketResult, FetchedImage, ItemId, ShardDirectory, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_IMAGE_INDEX, DEFAULT_SHARD_DIRECTORY_URL, IMAGE_SERVICE_DOMAIN,
};

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// `Err` is the absence-marker for an item whose image could not be fetched.
pub type ImageResult = BasketResult<FetchedImage>;
pub type ImageResults = HashMap<ItemId, ImageResult>;

#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> BasketResult<Vec<u8>>;

    async fn fetch_shard_directory(&self, url: &str, timeout: Duration) -> BasketResult<ShardDirectory> {
        let body = self.fetch_bytes(url, timeout).await?;
        ShardDirectory::from_json_bytes(&body)
    }
}

pub struct HttpImageSource {
    client: reqwest::Client,
}

impl HttpImageSource {
    pub fn new() -> BasketResult<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> BasketResult<Vec<u8>> {
        http_get_bytes(&self.client, url, timeout).await
    }

    async fn fetch_shard_directory(&self, url: &str, timeout: Duration) -> BasketResult<ShardDirectory> {
        load_shard_directory_with(&self.client, url, timeout).await
    }
}

#[derive(Clone, Debug)]
pub struct FetchOptions {
    /// Used only when `fetch_images` gets no directory.
    pub directory_url: String,
    pub image_domain: String,
    pub image_index: u32,
    pub timeout: Duration,
    pub max_concurrency: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            directory_url: DEFAULT_SHARD_DIRECTORY_URL.to_string(),
            image_domain: IMAGE_SERVICE_DOMAIN.to_string(),
            image_index: DEFAULT_IMAGE_INDEX,
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

pub struct BulkImageFetcher {
    source: Arc<dyn ImageSource>,
    options: FetchOptions,
}

impl BulkImageFetcher {
    pub fn new(source: Arc<dyn ImageSource>, options: FetchOptions) -> Self {
        Self { source, options }
    }

    pub fn with_http(options: FetchOptions) -> BasketResult<Self> {
        Ok(Self::new(Arc::new(HttpImageSource::new()?), options))
    }

    /// Resolve and fetch the image of every distinct id.
    ///
    /// Per-item failures end up as `Err` entries in the returned map; the call
    /// itself fails only when the shard directory has to be loaded and cannot be.
    pub async fn fetch_images<I>(
        &self,
        item_ids: I,
        shard_dir: Option<Arc<ShardDirectory>>,
    ) -> BasketResult<ImageResults>
    where
        I: IntoIterator<Item = ItemId>,
    {
        let shard_dir = match shard_dir {
            Some(dir) => dir,
            None => Arc::new(
                self.source
                    .fetch_shard_directory(&self.options.directory_url, self.options.timeout)
                    .await?,
            ),
        };

        let item_ids: BTreeSet<ItemId> = item_ids.into_iter().collect();
        let mut results = ImageResults::with_capacity(item_ids.len());
        if item_ids.is_empty() {
            return Ok(results);
        }

        let permits = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for item_id in item_ids.iter().copied() {
            let source = self.source.clone();
            let shard_dir = shard_dir.clone();
            let permits = permits.clone();
            let options = self.options.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = fetch_one(source.as_ref(), &shard_dir, &options, item_id).await;
                (item_id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((item_id, result)) => {
                    if let Err(err) = &result {
                        warn!("fetch image for {} failed: {}", item_id, err);
                    }
                    results.insert(item_id, result);
                }
                Err(err) => {
                    error!("image fetch task aborted: {}", err);
                }
            }
        }

        // a task that panicked never reported its id
        for item_id in item_ids {
            results.entry(item_id).or_insert_with(|| {
                Err(BasketError::Internal(format!(
                    "fetch task for {} did not complete",
                    item_id
                )))
            });
        }

        let failed = results.values().filter(|r| r.is_err()).count();
        info!(
            "fetched {} images, {} failed",
            results.len() - failed,
            failed
        );
        Ok(results)
    }
}

async fn fetch_one(
    source: &dyn ImageSource,
    shard_dir: &ShardDirectory,
    options: &FetchOptions,
    item_id: ItemId,
) -> ImageResult {
    let location = resolve_image_location(item_id, options.image_index, shard_dir)?;
    let url = location.to_url(&options.image_domain);
    debug!("fetch image for {} from {}", item_id, url);
    let data = source.fetch_bytes(&url, options.timeout).await?;
    FetchedImage::decode(data)
}
