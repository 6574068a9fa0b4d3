use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use crate::{build_http_client, http_get_bytes, BasketError, BasketResult, ItemId};

pub type ClusterId = i64;

pub const NO_TITLE: &str = "No title";
pub const NO_CATEGORY: &str = "No category";
pub const NO_DATA: &str = "No data";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(alias = "nmid", alias = "nm")]
    pub nm_id: ItemId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "subject_name")]
    pub subjectname: Option<String>,
    pub cluster_id: ClusterId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub cluster_id: ClusterId,
    pub cluster_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterOption {
    pub cluster_id: ClusterId,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caption {
    pub item_id: ItemId,
    pub title: String,
    pub category: String,
}

/// Product descriptions and cluster names used to pick and caption items.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    items: Vec<ItemRecord>,
    item_index: HashMap<ItemId, usize>,
    clusters: BTreeMap<ClusterId, String>,
}

impl Catalog {
    pub fn new(items: Vec<ItemRecord>, clusters: Vec<ClusterRecord>) -> Self {
        let mut item_index = HashMap::with_capacity(items.len());
        for (pos, item) in items.iter().enumerate() {
            // first record wins on duplicated ids
            item_index.entry(item.nm_id).or_insert(pos);
        }
        let clusters = clusters
            .into_iter()
            .map(|c| (c.cluster_id, c.cluster_name))
            .collect();
        Self {
            items,
            item_index,
            clusters,
        }
    }

    pub fn from_json(items_json: &[u8], clusters_json: &[u8]) -> BasketResult<Self> {
        let items: Vec<ItemRecord> = serde_json::from_slice(items_json)
            .map_err(|e| BasketError::InvalidData(format!("parse item descriptions failed: {}", e)))?;
        let clusters: Vec<ClusterRecord> = serde_json::from_slice(clusters_json)
            .map_err(|e| BasketError::InvalidData(format!("parse cluster info failed: {}", e)))?;
        Ok(Self::new(items, clusters))
    }

    /// Load both documents; each source is a local path or an http(s) URL.
    pub async fn load(items_src: &str, clusters_src: &str, timeout: Duration) -> BasketResult<Self> {
        let items_json = read_source(items_src, timeout).await?;
        let clusters_json = read_source(clusters_src, timeout).await?;
        let catalog = Self::from_json(&items_json, &clusters_json)?;
        info!(
            "catalog loaded: {} items, {} clusters",
            catalog.items.len(),
            catalog.clusters.len()
        );
        Ok(catalog)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Clusters ordered by id, labelled "{id}. {name}".
    pub fn cluster_options(&self) -> Vec<ClusterOption> {
        self.clusters
            .iter()
            .map(|(cluster_id, name)| ClusterOption {
                cluster_id: *cluster_id,
                label: format!("{}. {}", cluster_id, name),
            })
            .collect()
    }

    /// Accepts a full label ("3. Shoes") or a bare cluster id ("3").
    pub fn find_cluster(&self, label_or_id: &str) -> Option<ClusterId> {
        let label_or_id = label_or_id.trim();
        if let Some(option) = self
            .cluster_options()
            .into_iter()
            .find(|option| option.label == label_or_id)
        {
            return Some(option.cluster_id);
        }
        label_or_id
            .parse::<ClusterId>()
            .ok()
            .filter(|id| self.clusters.contains_key(id))
    }

    pub fn cluster_name(&self, cluster_id: ClusterId) -> Option<&str> {
        self.clusters.get(&cluster_id).map(|s| s.as_str())
    }

    pub fn members(&self, cluster_id: ClusterId) -> Vec<ItemId> {
        self.items
            .iter()
            .filter(|item| item.cluster_id == cluster_id)
            .map(|item| item.nm_id)
            .collect()
    }

    pub fn item(&self, item_id: ItemId) -> Option<&ItemRecord> {
        self.item_index.get(&item_id).map(|pos| &self.items[*pos])
    }

    pub fn caption(&self, item_id: ItemId) -> Caption {
        match self.item(item_id) {
            Some(item) => Caption {
                item_id,
                title: item.title.clone().unwrap_or_else(|| NO_TITLE.to_string()),
                category: item
                    .subjectname
                    .clone()
                    .unwrap_or_else(|| NO_CATEGORY.to_string()),
            },
            None => Caption {
                item_id,
                title: NO_DATA.to_string(),
                category: NO_DATA.to_string(),
            },
        }
    }
}

async fn read_source(src: &str, timeout: Duration) -> BasketResult<Vec<u8>> {
    if src.starts_with("http://") || src.starts_with("https://") {
        let client = build_http_client()?;
        return http_get_bytes(&client, src, timeout).await;
    }
    let path = Path::new(src);
    tokio::fs::read(path)
        .await
        .map_err(|e| BasketError::IoError(format!("read {} failed: {}", path.display(), e)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    pub(crate) fn sample_catalog() -> Catalog {
        let items = json!([
            {"nm_id": 1_050_000, "title": "Red dress", "subjectname": "Dresses", "cluster_id": 2},
            {"nm_id": 950_000, "title": null, "subjectname": "Dresses", "cluster_id": 2},
            {"nm_id": 1_200_000, "title": "Sneakers", "cluster_id": 1},
            {"nm_id": 1_300_000, "title": "Boots", "subjectname": "Shoes", "cluster_id": 2}
        ]);
        let clusters = json!([
            {"cluster_id": 2, "cluster_name": "Dresses"},
            {"cluster_id": 1, "cluster_name": "Shoes"},
            {"cluster_id": 10, "cluster_name": "Bags"}
        ]);
        Catalog::from_json(
            serde_json::to_string(&items).unwrap().as_bytes(),
            serde_json::to_string(&clusters).unwrap().as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_cluster_options_sorted_by_id() {
        let catalog = sample_catalog();
        let labels: Vec<String> = catalog
            .cluster_options()
            .into_iter()
            .map(|o| o.label)
            .collect();
        assert_eq!(labels, vec!["1. Shoes", "2. Dresses", "10. Bags"]);
    }

    #[test]
    fn test_find_cluster() {
        let catalog = sample_catalog();
        assert_eq!(catalog.find_cluster("2. Dresses"), Some(2));
        assert_eq!(catalog.find_cluster(" 10 "), Some(10));
        assert_eq!(catalog.find_cluster("7"), None);
        assert_eq!(catalog.find_cluster("Dresses"), None);
    }

    #[test]
    fn test_members_keep_source_order() {
        let catalog = sample_catalog();
        assert_eq!(catalog.members(2), vec![1_050_000, 950_000, 1_300_000]);
        assert_eq!(catalog.members(1), vec![1_200_000]);
        assert!(catalog.members(10).is_empty());
    }

    #[test]
    fn test_caption_fallbacks() {
        let catalog = sample_catalog();
        let c = catalog.caption(1_050_000);
        assert_eq!((c.title.as_str(), c.category.as_str()), ("Red dress", "Dresses"));

        let c = catalog.caption(950_000);
        assert_eq!(c.title, NO_TITLE);
        let c = catalog.caption(1_200_000);
        assert_eq!(c.category, NO_CATEGORY);

        let c = catalog.caption(42);
        assert_eq!((c.title.as_str(), c.category.as_str()), (NO_DATA, NO_DATA));
        assert_eq!(c.item_id, 42);
    }

    #[test]
    fn test_from_json_rejects_bad_documents() {
        assert!(matches!(
            Catalog::from_json(b"{}", b"[]"),
            Err(BasketError::InvalidData(_))
        ));
        assert!(matches!(
            Catalog::from_json(b"[]", b"[{\"cluster_id\": 1}]"),
            Err(BasketError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_load_from_files() {
        let tmp = TempDir::new().unwrap();
        let items = tmp.path().join("description.json");
        let clusters = tmp.path().join("clusters_info.json");
        std::fs::write(&items, r#"[{"nmid": 5, "title": "Cap", "subject_name": "Hats", "cluster_id": 3}]"#)
            .unwrap();
        std::fs::write(&clusters, r#"[{"cluster_id": 3, "cluster_name": "Hats"}]"#).unwrap();

        let catalog = Catalog::load(
            items.to_str().unwrap(),
            clusters.to_str().unwrap(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(catalog.item_count(), 1);
        assert_eq!(catalog.members(3), vec![5]);
        assert_eq!(catalog.caption(5).category, "Hats");
        assert_eq!(catalog.cluster_name(3), Some("Hats"));

        let missing = Catalog::load("/nonexistent/items.json", clusters.to_str().unwrap(), Duration::from_secs(1)).await;
        assert!(matches!(missing, Err(BasketError::IoError(_))));
    }
}
