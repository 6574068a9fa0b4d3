use std::fmt;
use std::time::Duration;

use crate::{load_shard_directory, BasketError, BasketResult, ItemId, ShardDirectory};

pub const IMAGE_SERVICE_DOMAIN: &str = "wbbasket.ru";
pub const DEFAULT_IMAGE_INDEX: u32 = 1;

const ITEMS_PER_VOLUME: u64 = 100_000;
const ITEMS_PER_PART: u64 = 1_000;

pub fn item_volume(item_id: ItemId) -> u64 {
    item_id / ITEMS_PER_VOLUME
}

pub fn item_part(item_id: ItemId) -> u64 {
    item_id / ITEMS_PER_PART
}

/// Basket key up to its first `.`; "basket-1.wb" -> "basket-1".
pub fn shard_host_name(shard_key: &str) -> &str {
    match shard_key.split_once('.') {
        Some((host, _)) => host,
        None => shard_key,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageLocation {
    pub item_id: ItemId,
    pub host_name: String,
    pub vol: u64,
    pub part_id: u64,
    pub image_index: u32,
}

impl ImageLocation {
    pub fn to_url(&self, domain: &str) -> String {
        format!(
            "http://{}.{}/vol{}/part{}/{}/images/big/{}.webp",
            self.host_name, domain, self.vol, self.part_id, self.item_id, self.image_index
        )
    }
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url(IMAGE_SERVICE_DOMAIN))
    }
}

pub fn resolve_image_location(
    item_id: ItemId,
    image_index: u32,
    shard_dir: &ShardDirectory,
) -> BasketResult<ImageLocation> {
    if shard_dir.is_empty() {
        return Err(BasketError::InvalidParam(
            "shard directory is empty".to_string(),
        ));
    }

    let vol = item_volume(item_id);
    let entry = shard_dir
        .find_by_volume(vol)
        .ok_or(BasketError::UnresolvedIdentifier { item_id, vol })?;

    Ok(ImageLocation {
        item_id,
        host_name: entry.host_name().to_string(),
        vol,
        part_id: item_part(item_id),
        image_index,
    })
}

pub fn resolve_image_url(
    item_id: ItemId,
    image_index: u32,
    shard_dir: &ShardDirectory,
) -> BasketResult<String> {
    resolve_image_location(item_id, image_index, shard_dir).map(|loc| loc.to_url(IMAGE_SERVICE_DOMAIN))
}

/// Resolve without a pre-loaded directory: fetches the directory first.
pub async fn resolve_image_url_remote(
    item_id: ItemId,
    image_index: u32,
    directory_url: &str,
    timeout: Duration,
) -> BasketResult<String> {
    let shard_dir = load_shard_directory(directory_url, timeout).await?;
    resolve_image_url(item_id, image_index, &shard_dir)
}
