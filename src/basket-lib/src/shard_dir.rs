use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::{build_http_client, http_get_bytes, BasketError, BasketResult};

pub const DEFAULT_SHARD_DIRECTORY_URL: &str = "http://basket-10c.dp.wb.ru:8080/shardes_v3";

/// Inclusive volume range served by one basket.
/// Bounds may be negative; only volumes 0 and up are ever looked up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRange {
    #[serde(rename = "minVol")]
    pub min_vol: i64,
    #[serde(rename = "maxVol")]
    pub max_vol: i64,
}

impl ShardRange {
    pub fn new(min_vol: i64, max_vol: i64) -> Self {
        Self { min_vol, max_vol }
    }

    pub fn contains(&self, vol: u64) -> bool {
        match i64::try_from(vol) {
            Ok(vol) => self.min_vol <= vol && vol <= self.max_vol,
            Err(_) => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardEntry {
    pub key: String,
    pub range: ShardRange,
}

impl ShardEntry {
    pub fn new(key: &str, min_vol: i64, max_vol: i64) -> Self {
        Self {
            key: key.to_string(),
            range: ShardRange::new(min_vol, max_vol),
        }
    }

    pub fn host_name(&self) -> &str {
        crate::shard_host_name(&self.key)
    }
}

/// Basket name -> volume range, kept in document order.
///
/// Ranges are not checked for overlap; lookups return the first entry
/// containing the volume.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShardDirectory {
    entries: Vec<ShardEntry>,
}

impl ShardDirectory {
    pub fn new(entries: Vec<ShardEntry>) -> Self {
        Self { entries }
    }

    pub fn from_json_str(json_str: &str) -> BasketResult<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| BasketError::InvalidData(format!("parse shard directory failed: {}", e)))
    }

    pub fn from_json_bytes(data: &[u8]) -> BasketResult<Self> {
        serde_json::from_slice(data)
            .map_err(|e| BasketError::InvalidData(format!("parse shard directory failed: {}", e)))
    }

    /// Load a directory snapshot stored on disk (same JSON shape as the endpoint).
    pub async fn load_from_file(path: &Path) -> BasketResult<Self> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| BasketError::IoError(format!("read {} failed: {}", path.display(), e)))?;
        let dir = Self::from_json_bytes(&content)?;
        info!(
            "shard directory loaded from {}: {} baskets",
            path.display(),
            dir.len()
        );
        Ok(dir)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShardEntry> {
        self.entries.iter()
    }

    pub fn find_by_volume(&self, vol: u64) -> Option<&ShardEntry> {
        self.entries.iter().find(|entry| entry.range.contains(vol))
    }
}

struct ShardDirectoryVisitor;

impl<'de> Visitor<'de> for ShardDirectoryVisitor {
    type Value = ShardDirectory;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of basket name to {minVol, maxVol}")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, range)) = access.next_entry::<String, ShardRange>()? {
            entries.push(ShardEntry { key, range });
        }
        Ok(ShardDirectory { entries })
    }
}

impl<'de> Deserialize<'de> for ShardDirectory {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(ShardDirectoryVisitor)
    }
}

/// Fetch the basket directory with a single GET. No retry.
pub async fn load_shard_directory(url: &str, timeout: Duration) -> BasketResult<ShardDirectory> {
    let client = build_http_client()?;
    load_shard_directory_with(&client, url, timeout).await
}

pub(crate) async fn load_shard_directory_with(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> BasketResult<ShardDirectory> {
    let body = http_get_bytes(client, url, timeout).await.map_err(|e| {
        warn!("load shard directory from {} failed: {}", url, e);
        e
    })?;
    let dir = ShardDirectory::from_json_bytes(&body)?;
    info!("shard directory loaded from {}: {} baskets", url, dir.len());
    Ok(dir)
}
