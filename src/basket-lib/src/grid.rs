use std::fmt::Write;

use crate::{Caption, Catalog, ImageFormat, ImageResults, ItemId};

pub const DEFAULT_COLUMNS: usize = 5;
pub const DEFAULT_ROWS_PER_PAGE: usize = 4;
pub const DEFAULT_IMAGE_HEIGHT: u32 = 250;
pub const PLACEHOLDER_WIDTH: u32 = 150;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridLayout {
    pub columns: usize,
    pub rows_per_page: usize,
    pub image_height: u32,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            columns: DEFAULT_COLUMNS,
            rows_per_page: DEFAULT_ROWS_PER_PAGE,
            image_height: DEFAULT_IMAGE_HEIGHT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CellImage {
    Loaded {
        format: ImageFormat,
        width: u32,
        height: u32,
    },
    Placeholder {
        width: u32,
        height: u32,
        error: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridCell {
    pub caption: Caption,
    pub image: CellImage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridPage {
    pub page: usize,
    pub page_count: usize,
    pub rows: Vec<Vec<GridCell>>,
}

impl GridLayout {
    pub fn page_size(&self) -> usize {
        self.columns.max(1) * self.rows_per_page.max(1)
    }

    pub fn page_count(&self, item_count: usize) -> usize {
        (item_count + self.page_size() - 1) / self.page_size()
    }

    /// Ids shown on `page` (0-based); empty past the last page.
    pub fn page_items<'a>(&self, item_ids: &'a [ItemId], page: usize) -> &'a [ItemId] {
        let start = page.saturating_mul(self.page_size()).min(item_ids.len());
        let end = (start + self.page_size()).min(item_ids.len());
        &item_ids[start..end]
    }

    pub fn build_page(
        &self,
        item_ids: &[ItemId],
        page: usize,
        catalog: &Catalog,
        images: &ImageResults,
    ) -> GridPage {
        let cells: Vec<GridCell> = self
            .page_items(item_ids, page)
            .iter()
            .map(|item_id| GridCell {
                caption: catalog.caption(*item_id),
                image: self.cell_image(*item_id, images),
            })
            .collect();

        GridPage {
            page,
            page_count: self.page_count(item_ids.len()),
            rows: cells
                .chunks(self.columns.max(1))
                .map(|row| row.to_vec())
                .collect(),
        }
    }

    fn cell_image(&self, item_id: ItemId, images: &ImageResults) -> CellImage {
        match images.get(&item_id) {
            Some(Ok(image)) => CellImage::Loaded {
                format: image.format,
                width: image.scaled_width(self.image_height),
                height: self.image_height,
            },
            Some(Err(err)) => CellImage::Placeholder {
                width: PLACEHOLDER_WIDTH,
                height: self.image_height,
                error: err.to_string(),
            },
            None => CellImage::Placeholder {
                width: PLACEHOLDER_WIDTH,
                height: self.image_height,
                error: "image not requested".to_string(),
            },
        }
    }
}

impl GridPage {
    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(|row| row.len()).sum()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "page {}/{}", self.page + 1, self.page_count.max(1));
        for (row_idx, row) in self.rows.iter().enumerate() {
            let _ = writeln!(out, "-- row {}", row_idx + 1);
            for cell in row {
                let image = match &cell.image {
                    CellImage::Loaded {
                        format,
                        width,
                        height,
                    } => format!("[{} {}x{}]", format.extension(), width, height),
                    CellImage::Placeholder { error, .. } => format!("[image load error: {}]", error),
                };
                let _ = writeln!(
                    out,
                    "  {} | {} | Category: {} | ID: {}",
                    image, cell.caption.title, cell.caption.category, cell.caption.item_id
                );
            }
        }
        out
    }
}
