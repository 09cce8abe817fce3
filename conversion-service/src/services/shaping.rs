//! Maps a converted `DoclingDocument` onto the response schema.

use crate::converters::ConvertedDocument;
use crate::dtos::{DocumentBody, Element, PageInfo, PageSize, DEFAULT_PAGE_SIZE};
use crate::models::docling::{
    page_of, ImageRef, PictureItem, TableCell, TableData, FURNITURE_REF,
};
use crate::models::{DoclingDocument, ItemRef, PictureAnnotation, RefItem};
use crate::services::ImageStore;
use anyhow::{anyhow, bail};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Component, Path};

/// Running headers and footers repeat on every page and are left out.
const FURNITURE_LABELS: &[&str] = &["page_header", "page_footer"];

/// Upper bound on rows and on columns of a rebuilt table.
const MAX_TABLE_DIM: usize = 4096;
/// Upper bound on slots (rows × columns) of a rebuilt table.
const MAX_TABLE_SLOTS: usize = 1 << 20;

/// Build the response document, copying pictures into the image store.
pub async fn shape_document(
    converted: &ConvertedDocument,
    filename: &str,
    images: &ImageStore,
) -> DocumentBody {
    let doc = &converted.document;
    let mut elements = Vec::new();

    for item in reading_order(doc) {
        match item {
            ItemRef::Text(i) => {
                let Some(text) = doc.texts.get(i) else {
                    continue;
                };
                if FURNITURE_LABELS.contains(&text.label.as_str())
                    || text.text.trim().is_empty()
                {
                    continue;
                }
                elements.push(Element::Text {
                    content: text.text.clone(),
                    label: text.label.clone(),
                    page: page_of(&text.prov),
                });
            }
            ItemRef::Table(i) => {
                if let Some(table) = doc.tables.get(i) {
                    elements.push(Element::Table {
                        rows: table_rows(&table.data),
                        page: page_of(&table.prov),
                    });
                }
            }
            ItemRef::Picture(i) => {
                if let Some(picture) = doc.pictures.get(i) {
                    elements
                        .push(picture_element(doc, picture, converted.base_dir(), images).await);
                }
            }
            ItemRef::Group(_) | ItemRef::Body => {}
        }
    }

    let text = elements
        .iter()
        .filter_map(|e| match e {
            Element::Text { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    DocumentBody {
        filename: filename.to_string(),
        text,
        elements,
        pages: page_infos(doc),
    }
}

/// Content items in reading order.
///
/// Follows the body tree depth-first: groups, text children and the children
/// of tables and pictures (footnotes, text inside figures) are inlined. Items
/// the tree never reached are appended in `texts`, `tables`, `pictures`
/// order, leaving out furniture. Captions are never listed on their own and
/// refs seen twice are emitted once.
pub fn reading_order(doc: &DoclingDocument) -> Vec<ItemRef> {
    let captions = caption_indices(doc);
    let mut order = Vec::new();
    let mut visited = BTreeSet::new();
    let mut stack: Vec<ItemRef> = Vec::new();

    if let Some(body) = &doc.body {
        stack.extend(children_rev(&body.children));
    }

    while let Some(item) = stack.pop() {
        if !visited.insert(item) {
            continue;
        }
        match item {
            ItemRef::Group(i) => {
                if let Some(group) = doc.groups.get(i) {
                    stack.extend(children_rev(&group.children));
                }
            }
            ItemRef::Text(i) => {
                if let Some(text) = doc.texts.get(i) {
                    if !captions.contains(&i) {
                        order.push(item);
                    }
                    stack.extend(children_rev(&text.children));
                }
            }
            ItemRef::Table(i) => {
                if let Some(table) = doc.tables.get(i) {
                    order.push(item);
                    stack.extend(children_rev(&table.children));
                }
            }
            ItemRef::Picture(i) => {
                if let Some(picture) = doc.pictures.get(i) {
                    order.push(item);
                    stack.extend(children_rev(&picture.children));
                }
            }
            ItemRef::Body => {}
        }
    }

    let is_furniture =
        |parent: &Option<RefItem>| parent.as_ref().is_some_and(|p| p.cref == FURNITURE_REF);

    let unreached = doc
        .texts
        .iter()
        .enumerate()
        .filter(|(i, t)| !captions.contains(i) && !is_furniture(&t.parent))
        .map(|(i, _)| ItemRef::Text(i))
        .chain(
            doc.tables
                .iter()
                .enumerate()
                .filter(|(_, t)| !is_furniture(&t.parent))
                .map(|(i, _)| ItemRef::Table(i)),
        )
        .chain(
            doc.pictures
                .iter()
                .enumerate()
                .filter(|(_, p)| !is_furniture(&p.parent))
                .map(|(i, _)| ItemRef::Picture(i)),
        );

    for item in unreached {
        if !visited.contains(&item) {
            order.push(item);
        }
    }

    order
}

fn children_rev(children: &[RefItem]) -> impl Iterator<Item = ItemRef> + '_ {
    children.iter().rev().filter_map(RefItem::resolve)
}

fn caption_indices(doc: &DoclingDocument) -> HashSet<usize> {
    doc.tables
        .iter()
        .flat_map(|t| t.captions.iter())
        .chain(doc.pictures.iter().flat_map(|p| p.captions.iter()))
        .filter_map(|r| match r.resolve() {
            Some(ItemRef::Text(i)) => Some(i),
            _ => None,
        })
        .collect()
}

/// Table as rows of cell texts.
///
/// Uses Docling's `grid` when present; otherwise rebuilds it from
/// `table_cells`, repeating a spanning cell's text in every slot it covers.
pub fn table_rows(data: &TableData) -> Vec<Vec<String>> {
    if !data.grid.is_empty() {
        return data
            .grid
            .iter()
            .map(|row| row.iter().map(|cell| cell.text.clone()).collect())
            .collect();
    }

    let row_end = |c: &TableCell| {
        if c.end_row_offset_idx > c.start_row_offset_idx {
            c.end_row_offset_idx
        } else {
            c.start_row_offset_idx.saturating_add(c.row_span.max(1))
        }
    };
    let col_end = |c: &TableCell| {
        if c.end_col_offset_idx > c.start_col_offset_idx {
            c.end_col_offset_idx
        } else {
            c.start_col_offset_idx.saturating_add(c.col_span.max(1))
        }
    };

    let num_rows = table_extent(data.table_cells.iter().map(row_end), data.num_rows);
    let num_cols = table_extent(data.table_cells.iter().map(col_end), data.num_cols);
    if num_rows.saturating_mul(num_cols) > MAX_TABLE_SLOTS {
        tracing::warn!(
            num_rows,
            num_cols,
            "Table dimensions exceed the reconstruction limit, keeping cells only"
        );
        return cell_texts_by_row(data);
    }

    let mut rows = vec![vec![String::new(); num_cols]; num_rows];
    for cell in &data.table_cells {
        for row in rows
            .iter_mut()
            .take(row_end(cell))
            .skip(cell.start_row_offset_idx)
        {
            for slot in row
                .iter_mut()
                .take(col_end(cell))
                .skip(cell.start_col_offset_idx)
            {
                slot.clone_from(&cell.text);
            }
        }
    }
    rows
}

/// Rows or columns implied by the cells, widened to the declared count only
/// while that stays within [`MAX_TABLE_DIM`].
fn table_extent(cell_ends: impl Iterator<Item = usize>, declared: usize) -> usize {
    let from_cells = cell_ends.max().unwrap_or(0);
    let declared = if declared <= MAX_TABLE_DIM { declared } else { 0 };
    from_cells.max(declared).min(MAX_TABLE_DIM)
}

/// Fallback for tables too large to lay out: one row per distinct start row.
fn cell_texts_by_row(data: &TableData) -> Vec<Vec<String>> {
    let mut rows: BTreeMap<usize, Vec<(usize, String)>> = BTreeMap::new();
    for cell in &data.table_cells {
        rows.entry(cell.start_row_offset_idx)
            .or_default()
            .push((cell.start_col_offset_idx, cell.text.clone()));
    }
    rows.into_values()
        .map(|mut cells| {
            cells.sort_by_key(|(col, _)| *col);
            cells.into_iter().map(|(_, text)| text).collect()
        })
        .collect()
}

/// Page sizes sorted by page number, or one US Letter page when none are known.
pub fn page_infos(doc: &DoclingDocument) -> Vec<PageInfo> {
    let mut pages: Vec<PageInfo> = doc
        .pages
        .iter()
        .filter_map(|(key, page)| {
            let number = page.page_no.or_else(|| key.parse().ok())?;
            Some(PageInfo {
                page: number,
                size: PageSize {
                    width: page.size.width,
                    height: page.size.height,
                },
            })
        })
        .collect();

    pages.sort_by_key(|p| p.page);

    if pages.is_empty() {
        pages.push(PageInfo {
            page: 1,
            size: DEFAULT_PAGE_SIZE,
        });
    }
    pages
}

async fn picture_element(
    doc: &DoclingDocument,
    picture: &PictureItem,
    base_dir: Option<&Path>,
    images: &ImageStore,
) -> Element {
    let caption_parts: Vec<&str> = picture
        .captions
        .iter()
        .filter_map(|r| match r.resolve() {
            Some(ItemRef::Text(i)) => doc.texts.get(i),
            _ => None,
        })
        .map(|t| t.text.trim())
        .filter(|t| !t.is_empty())
        .collect();
    let caption = (!caption_parts.is_empty()).then(|| caption_parts.join(" "));

    let descriptions = picture
        .annotations
        .iter()
        .filter_map(|a| match a {
            PictureAnnotation::Description { text } if !text.trim().is_empty() => {
                Some(text.clone())
            }
            _ => None,
        })
        .collect();

    let url = match &picture.image {
        Some(image) => match store_image(image, base_dir, images).await {
            Ok(name) => Some(images.url_for(&name)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to store extracted image");
                None
            }
        },
        None => None,
    };

    Element::Image {
        url,
        caption,
        descriptions,
        page: page_of(&picture.prov),
    }
}

async fn store_image(
    image: &ImageRef,
    base_dir: Option<&Path>,
    images: &ImageStore,
) -> anyhow::Result<String> {
    if let Some(rest) = image.uri.strip_prefix("data:") {
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| anyhow!("malformed data URI"))?;
        let (mime, encoding) = meta.split_once(';').unwrap_or((meta, ""));
        if encoding != "base64" {
            bail!("unsupported data URI encoding '{}'", encoding);
        }
        let bytes = STANDARD.decode(payload.trim())?;
        let mime = if mime.is_empty() {
            image.mimetype.as_deref().unwrap_or_default()
        } else {
            mime
        };
        return Ok(images.save(&bytes, extension_for_mime(mime)).await?);
    }

    let raw = image.uri.strip_prefix("file://").unwrap_or(&image.uri);
    let base = base_dir
        .ok_or_else(|| anyhow!("image '{}' is not embedded and no converter output is kept", raw))?;
    let path = Path::new(raw);
    if path.components().any(|c| matches!(c, Component::ParentDir))
        || (path.is_absolute() && !path.starts_with(base))
    {
        bail!("image path '{}' is outside the converter output", raw);
    }
    let source = base.join(path);

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| {
            extension_for_mime(image.mimetype.as_deref().unwrap_or_default()).to_string()
        });

    Ok(images.copy_from(&source, &extension).await?)
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/tiff" => "tiff",
        "image/bmp" => "bmp",
        _ => "png",
    }
}
