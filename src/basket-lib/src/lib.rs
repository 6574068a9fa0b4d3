mod cache;
mod catalog;
mod config;
mod fetcher;
mod grid;
mod image;
mod resolver;
mod shard_dir;

pub use cache::*;
pub use catalog::*;
pub use config::*;
pub use fetcher::*;
pub use grid::*;
pub use image::*;
pub use resolver::*;
pub use shard_dir::*;

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

#[macro_use]
extern crate log;

/// Article id ("nm") of a product.
pub type ItemId = u64;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum BasketError {
    #[error("remote fetch failed: HTTP {status} for {url}")]
    RemoteFetch { status: u16, url: String },
    #[error("unresolved identifier: {item_id} (vol {vol}) matches no basket")]
    UnresolvedIdentifier { item_id: ItemId, vol: u64 },
    #[error("decode error: {0}")]
    DecodeError(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("invalid param: {0}")]
    InvalidParam(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl BasketError {
    pub fn from_http_status(code: StatusCode, url: &str) -> Self {
        BasketError::RemoteFetch {
            status: code.as_u16(),
            url: url.to_string(),
        }
    }

    pub(crate) fn from_transport(err: reqwest::Error, url: &str) -> Self {
        if err.is_timeout() {
            BasketError::Transport(format!("request to {} timed out", url))
        } else {
            BasketError::Transport(format!("request to {} failed: {}", url, err))
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, BasketError::UnresolvedIdentifier { .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            BasketError::RemoteFetch { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type BasketResult<T> = std::result::Result<T, BasketError>;

impl From<std::io::Error> for BasketError {
    fn from(err: std::io::Error) -> Self {
        BasketError::IoError(err.to_string())
    }
}

/// GET `url` and return the body, mapping non-2xx to `RemoteFetch`.
pub(crate) async fn http_get_bytes(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> BasketResult<Vec<u8>> {
    let res = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| BasketError::from_transport(e, url))?;

    if !res.status().is_success() {
        return Err(BasketError::from_http_status(res.status(), url));
    }

    let body = res
        .bytes()
        .await
        .map_err(|e| BasketError::from_transport(e, url))?;
    debug!("GET {} => {} bytes", url, body.len());
    Ok(body.to_vec())
}

pub(crate) fn build_http_client() -> BasketResult<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| BasketError::Internal(format!("Failed to create client: {}", e)))
}
