use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{
    BasketError, BasketResult, FetchOptions, GridLayout, DEFAULT_COLUMNS, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_IMAGE_HEIGHT, DEFAULT_IMAGE_INDEX, DEFAULT_MAX_CONCURRENCY, DEFAULT_ROWS_PER_PAGE,
    DEFAULT_SHARD_DIRECTORY_URL, IMAGE_SERVICE_DOMAIN,
};

pub const DEFAULT_VIEWER_CONFIG_PATH: &str = "basket_viewer.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    #[serde(alias = "basket_url", alias = "shards_url")]
    pub directory_url: String,
    /// Local snapshot of the directory; used instead of `directory_url` when set.
    #[serde(alias = "basket_json", alias = "basket_file")]
    pub directory_file: Option<PathBuf>,
    pub image_domain: String,
    pub image_index: u32,
    #[serde(alias = "timeout")]
    pub timeout_secs: f64,
    #[serde(alias = "workers")]
    pub max_concurrency: usize,
    pub columns: usize,
    pub rows_per_page: usize,
    pub image_height: u32,
    /// 0 keeps loaded sources until the process exits.
    pub cache_ttl_secs: u64,
    #[serde(alias = "description_url", alias = "description")]
    pub items_source: String,
    #[serde(alias = "clusters_info_url", alias = "clusters_info")]
    pub clusters_source: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            directory_url: DEFAULT_SHARD_DIRECTORY_URL.to_string(),
            directory_file: None,
            image_domain: IMAGE_SERVICE_DOMAIN.to_string(),
            image_index: DEFAULT_IMAGE_INDEX,
            timeout_secs: 10.0,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            columns: DEFAULT_COLUMNS,
            rows_per_page: DEFAULT_ROWS_PER_PAGE,
            image_height: DEFAULT_IMAGE_HEIGHT,
            cache_ttl_secs: 0,
            items_source: "data/description.json".to_string(),
            clusters_source: "data/clusters_info.json".to_string(),
        }
    }
}

impl ViewerConfig {
    pub fn load(path: &Path) -> BasketResult<Self> {
        let config: ViewerConfig = read_json_config(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BasketResult<()> {
        if self.timeout_secs <= 0.0 || Duration::try_from_secs_f64(self.timeout_secs).is_err() {
            return Err(BasketError::InvalidParam(format!(
                "timeout_secs must be a positive number of seconds, got {}",
                self.timeout_secs
            )));
        }
        if self.max_concurrency == 0 {
            return Err(BasketError::InvalidParam(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.columns == 0 || self.rows_per_page == 0 || self.image_height == 0 {
            return Err(BasketError::InvalidParam(
                "columns, rows_per_page and image_height must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Out-of-range values that skipped `validate` fall back to the default.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(DEFAULT_FETCH_TIMEOUT)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        if self.cache_ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.cache_ttl_secs))
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            directory_url: self.directory_url.clone(),
            image_domain: self.image_domain.clone(),
            image_index: self.image_index,
            timeout: self.timeout(),
            max_concurrency: self.max_concurrency,
        }
    }

    pub fn grid_layout(&self) -> GridLayout {
        GridLayout {
            columns: self.columns,
            rows_per_page: self.rows_per_page,
            image_height: self.image_height,
        }
    }
}

pub fn read_json_config<T: DeserializeOwned>(path: &Path) -> BasketResult<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| BasketError::IoError(format!("read {} failed: {}", path.display(), e)))?;
    serde_json::from_str::<T>(&content)
        .map_err(|e| BasketError::InvalidData(format!("parse {} failed: {}", path.display(), e)))
}
