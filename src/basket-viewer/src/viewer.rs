use log::{debug, info, warn};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use basket_lib::{
    resolve_image_location, BasketError, BasketResult, BulkImageFetcher, Catalog, GridPage,
    ItemId, ShardDirectory, ShardDirectoryCache, ViewerConfig,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerCommand {
    Clusters,
    Resolve {
        item_id: ItemId,
        image_index: Option<u32>,
    },
    Show {
        cluster: String,
        /// 0-based
        page: usize,
        out_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone)]
pub struct ViewerRunOptions {
    pub config_path: PathBuf,
    pub command: ViewerCommand,
}

pub struct Viewer {
    config: ViewerConfig,
    directories: ShardDirectoryCache,
    fetcher: BulkImageFetcher,
}

impl Viewer {
    pub fn new(config: ViewerConfig) -> BasketResult<Self> {
        let directories = ShardDirectoryCache::new(config.cache_ttl(), config.timeout())?;
        let fetcher = BulkImageFetcher::with_http(config.fetch_options())?;
        Ok(Self {
            config,
            directories,
            fetcher,
        })
    }

    async fn shard_directory(&self) -> BasketResult<Arc<ShardDirectory>> {
        match self.config.directory_file.as_ref() {
            Some(path) => self.directories.get_or_load_file(path).await,
            None => self.directories.get_or_load(&self.config.directory_url).await,
        }
    }

    async fn catalog(&self) -> BasketResult<Catalog> {
        Catalog::load(
            &self.config.items_source,
            &self.config.clusters_source,
            self.config.timeout(),
        )
        .await
    }

    pub async fn list_clusters(&self) -> BasketResult<String> {
        let catalog = self.catalog().await?;
        let mut out = String::new();
        for option in catalog.cluster_options() {
            let _ = writeln!(
                out,
                "{} ({} items)",
                option.label,
                catalog.members(option.cluster_id).len()
            );
        }
        Ok(out)
    }

    pub async fn resolve(&self, item_id: ItemId, image_index: Option<u32>) -> BasketResult<String> {
        let shard_dir = self.shard_directory().await?;
        let index = image_index.unwrap_or(self.config.image_index);
        let location = resolve_image_location(item_id, index, &shard_dir)?;
        Ok(location.to_url(&self.config.image_domain))
    }

    pub async fn show(
        &self,
        cluster: &str,
        page: usize,
        out_dir: Option<&Path>,
    ) -> BasketResult<String> {
        let catalog = self.catalog().await?;
        let cluster_id = catalog
            .find_cluster(cluster)
            .ok_or_else(|| BasketError::InvalidParam(format!("unknown cluster: {}", cluster)))?;
        let label = catalog
            .cluster_options()
            .into_iter()
            .find(|o| o.cluster_id == cluster_id)
            .map(|o| o.label)
            .unwrap_or_else(|| cluster_id.to_string());

        let members = catalog.members(cluster_id);
        let layout = self.config.grid_layout();
        let page_count = layout.page_count(members.len());
        if page > 0 && page >= page_count {
            return Err(BasketError::InvalidParam(format!(
                "page {} out of range, cluster has {} pages",
                page + 1,
                page_count
            )));
        }

        let shard_dir = self.shard_directory().await?;
        let page_ids = layout.page_items(&members, page);
        info!(
            "show cluster {} page {}: {} items",
            cluster_id,
            page + 1,
            page_ids.len()
        );
        let images = self
            .fetcher
            .fetch_images(page_ids.iter().copied(), Some(shard_dir))
            .await?;

        if let Some(out_dir) = out_dir {
            let written = save_images(out_dir, page_ids, &images).await?;
            info!("{} images written to {}", written, out_dir.display());
        }

        let grid: GridPage = layout.build_page(&members, page, &catalog, &images);
        debug!(
            "page {}/{} of cluster {} has {} cells",
            grid.page + 1,
            grid.page_count,
            cluster_id,
            grid.cell_count()
        );
        let mut out = String::new();
        let _ = writeln!(out, "Images for cluster '{}'", label);
        out.push_str(&grid.render_text());
        Ok(out)
    }
}

async fn save_images(
    out_dir: &Path,
    item_ids: &[ItemId],
    images: &basket_lib::ImageResults,
) -> BasketResult<usize> {
    tokio::fs::create_dir_all(out_dir).await?;
    let mut written = 0usize;
    for item_id in item_ids {
        let Some(Ok(image)) = images.get(item_id) else {
            continue;
        };
        let path = out_dir.join(format!("{}.{}", item_id, image.format.extension()));
        if let Err(err) = tokio::fs::write(&path, &image.data).await {
            warn!("write {} failed: {}", path.display(), err);
            continue;
        }
        written += 1;
    }
    Ok(written)
}

pub async fn run_command(options: ViewerRunOptions) -> BasketResult<()> {
    let config = ViewerConfig::load(&options.config_path)?;
    let viewer = Viewer::new(config)?;
    let output = match options.command {
        ViewerCommand::Clusters => viewer.list_clusters().await?,
        ViewerCommand::Resolve {
            item_id,
            image_index,
        } => viewer.resolve(item_id, image_index).await?,
        ViewerCommand::Show {
            cluster,
            page,
            out_dir,
        } => viewer.show(&cluster, page, out_dir.as_deref()).await?,
    };
    println!("{}", output.trim_end());
    Ok(())
}
