//! Page-level operations.

use std::collections::BTreeSet;

use async_trait::async_trait;
use lopdf::{dictionary, Document, Object, ObjectId};

use crate::transform::options::{check_pages, PageSelection, Rotation, SplitMode};
use crate::transform::pdf::document::{self, corrupt, load, page_ids, save, set_page_order, subset};
use crate::transform::{NamedBuffer, Transform, TransformContext, TransformError, TransformResult};
use crate::validation::ValidatedPayload;

/// Concatenate documents in upload order.
pub fn merge(inputs: &[ValidatedPayload]) -> Result<Vec<u8>, TransformError> {
    let mut merged = Document::with_version("1.7");
    let mut pages = Vec::new();
    let mut next_id = 1;

    for input in inputs {
        let mut doc = load(input.bytes())?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let ids = page_ids(&doc);
        for &id in &ids {
            document::flatten_inherited(&mut doc, id)?;
        }
        pages.extend(ids);

        for (id, object) in doc.objects {
            let skip = matches!(
                object.type_name().ok(),
                Some(b"Catalog") | Some(b"Pages") | Some(b"Outlines") | Some(b"Outline")
            );
            if !skip {
                merged.objects.insert(id, object);
            }
        }
    }
    merged.max_id = next_id - 1;

    let root_id = merged.new_object_id();
    for &page_id in &pages {
        merged
            .get_dictionary_mut(page_id)
            .map_err(|_| corrupt())?
            .set("Parent", root_id);
    }
    let kids: Vec<Object> = pages.iter().map(|&id| Object::Reference(id)).collect();
    merged.objects.insert(
        root_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => root_id,
    });
    merged.trailer.set("Root", catalog_id);
    merged.prune_objects();
    merged.renumber_objects();

    save(&mut merged)
}

/// Split according to `mode`; every output is a standalone document.
pub fn split(bytes: &[u8], mode: &SplitMode) -> Result<Vec<NamedBuffer>, TransformError> {
    let doc = load(bytes)?;
    let ids = page_ids(&doc);
    let total = ids.len();

    match mode {
        SplitMode::Range { start, end } => {
            check_pages(&[*start, *end], total)?;
            let selected = &ids[(*start - 1) as usize..*end as usize];
            Ok(vec![NamedBuffer::pdf(
                format!("pages_{start}-{end}.pdf"),
                subset(&doc, selected)?,
            )])
        }
        SplitMode::EveryN(n) => ids
            .chunks(*n)
            .enumerate()
            .map(|(index, chunk)| {
                Ok(NamedBuffer::pdf(format!("chunk_{}.pdf", index + 1), subset(&doc, chunk)?))
            })
            .collect(),
        SplitMode::Specific(pages) => {
            check_pages(pages, total)?;
            let sorted: BTreeSet<i64> = pages.iter().copied().collect();
            let selected: Vec<ObjectId> = sorted.iter().map(|p| ids[(*p - 1) as usize]).collect();
            let name = match sorted.len() {
                1 => format!("page_{}.pdf", pages[0]),
                _ => {
                    let joined: Vec<String> = sorted.iter().map(i64::to_string).collect();
                    format!("pages_{}.pdf", joined.join("_"))
                }
            };
            Ok(vec![NamedBuffer::pdf(name, subset(&doc, &selected)?)])
        }
    }
}

/// Add `rotation` to the current rotation of the selected pages.
pub fn rotate(bytes: &[u8], pages: &PageSelection, rotation: Rotation) -> Result<Vec<u8>, TransformError> {
    let mut doc = load(bytes)?;
    let ids = page_ids(&doc);
    for page in pages.resolve(ids.len())? {
        let id = ids[page as usize - 1];
        document::flatten_inherited(&mut doc, id)?;
        let dict = doc.get_dictionary_mut(id).map_err(|_| corrupt())?;
        let current = dict.get(b"Rotate").and_then(Object::as_i64).unwrap_or(0);
        dict.set("Rotate", rotation.apply_to(current));
    }
    save(&mut doc)
}

/// Put pages in `order`, which must be a permutation of all pages.
pub fn reorder(bytes: &[u8], order: &[i64]) -> Result<Vec<u8>, TransformError> {
    let mut doc = load(bytes)?;
    let ids = page_ids(&doc);
    let total = ids.len();

    if order.len() != total {
        return Err(TransformError::invalid(format!(
            "Page order must include all {total} pages"
        )));
    }
    check_pages(order, total)?;
    if order.iter().collect::<BTreeSet<_>>().len() != order.len() {
        return Err(TransformError::invalid("Page order contains duplicates"));
    }

    let reordered: Vec<ObjectId> = order.iter().map(|p| ids[(*p - 1) as usize]).collect();
    set_page_order(&mut doc, &reordered)?;
    save(&mut doc)
}

/// Remove `pages`; at least one page must remain.
pub fn delete(bytes: &[u8], pages: &[i64]) -> Result<Vec<u8>, TransformError> {
    let mut doc = load(bytes)?;
    let ids = page_ids(&doc);
    let total = ids.len();

    check_pages(pages, total)?;
    let doomed: BTreeSet<i64> = pages.iter().copied().collect();
    if doomed.len() >= total {
        return Err(TransformError::EmptyResult("Cannot delete all pages from PDF".into()));
    }

    let kept: Vec<ObjectId> = ids
        .iter()
        .enumerate()
        .filter(|(index, _)| !doomed.contains(&(*index as i64 + 1)))
        .map(|(_, id)| *id)
        .collect();
    set_page_order(&mut doc, &kept)?;
    save(&mut doc)
}

/// One single-page document per requested page, in request order.
pub fn extract_pages(bytes: &[u8], pages: &[i64]) -> Result<Vec<NamedBuffer>, TransformError> {
    if pages.is_empty() {
        return Err(TransformError::invalid("At least one page is required"));
    }
    let doc = load(bytes)?;
    let ids = page_ids(&doc);
    check_pages(pages, ids.len())?;

    pages
        .iter()
        .map(|page| {
            let id = ids[(*page - 1) as usize];
            Ok(NamedBuffer::pdf(format!("page_{page:03}.pdf"), subset(&doc, &[id])?))
        })
        .collect()
}

pub struct Merge;

#[async_trait]
impl Transform for Merge {
    type Input = Vec<ValidatedPayload>;
    type Options = ();

    fn operation(&self) -> &'static str {
        "merge"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, _: ()) -> Result<TransformResult, TransformError> {
        if input.len() < 2 {
            return Err(TransformError::invalid("At least 2 PDF files are required for merging"));
        }
        let bytes = ctx.blocking(move || merge(&input)).await?;
        Ok(TransformResult::Single(NamedBuffer::pdf("merged.pdf", bytes)))
    }
}

pub struct Split;

#[async_trait]
impl Transform for Split {
    type Input = ValidatedPayload;
    type Options = SplitMode;

    fn operation(&self) -> &'static str {
        "split"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, mode: SplitMode) -> Result<TransformResult, TransformError> {
        let outputs = ctx.blocking(move || split(input.bytes(), &mode)).await?;
        Ok(TransformResult::Multiple(outputs))
    }
}

pub struct Rotate;

#[async_trait]
impl Transform for Rotate {
    type Input = ValidatedPayload;
    type Options = (PageSelection, Rotation);

    fn operation(&self) -> &'static str {
        "rotate"
    }

    async fn run(
        &self,
        ctx: &TransformContext<'_>,
        input: Self::Input,
        (pages, rotation): Self::Options,
    ) -> Result<TransformResult, TransformError> {
        let bytes = ctx.blocking(move || rotate(input.bytes(), &pages, rotation)).await?;
        Ok(TransformResult::Single(NamedBuffer::pdf("rotated.pdf", bytes)))
    }
}

pub struct Reorder;

#[async_trait]
impl Transform for Reorder {
    type Input = ValidatedPayload;
    type Options = Vec<i64>;

    fn operation(&self) -> &'static str {
        "reorder"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, order: Vec<i64>) -> Result<TransformResult, TransformError> {
        let bytes = ctx.blocking(move || reorder(input.bytes(), &order)).await?;
        Ok(TransformResult::Single(NamedBuffer::pdf("reordered.pdf", bytes)))
    }
}

pub struct DeletePages;

#[async_trait]
impl Transform for DeletePages {
    type Input = ValidatedPayload;
    type Options = Vec<i64>;

    fn operation(&self) -> &'static str {
        "delete_pages"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, pages: Vec<i64>) -> Result<TransformResult, TransformError> {
        let bytes = ctx.blocking(move || delete(input.bytes(), &pages)).await?;
        Ok(TransformResult::Single(NamedBuffer::pdf("pages_deleted.pdf", bytes)))
    }
}

pub struct ExtractPages;

#[async_trait]
impl Transform for ExtractPages {
    type Input = ValidatedPayload;
    type Options = Vec<i64>;

    fn operation(&self) -> &'static str {
        "extract_pages"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, pages: Vec<i64>) -> Result<TransformResult, TransformError> {
        let outputs = ctx.blocking(move || extract_pages(input.bytes(), &pages)).await?;
        Ok(TransformResult::Multiple(outputs))
    }
}
