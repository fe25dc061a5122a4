//! Loading, saving and page-tree surgery on lopdf documents.
//!
//! Page subsets are produced by rewriting the catalog's page tree rather than
//! copying pages into a new document: inherited attributes are pushed down
//! onto each kept page, the root `Pages` node gets the new `Kids`, and
//! everything no longer reachable from the trailer is pruned.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::transform::TransformError;

/// Attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Page-tree depth beyond which a document is treated as corrupt.
const MAX_TREE_DEPTH: usize = 64;

/// US Letter, used when a page carries no usable `MediaBox`.
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

pub(crate) const LOCKED_DETAIL: &str = "PDF is password protected. Remove the password first.";

pub(crate) fn corrupt() -> TransformError {
    TransformError::invalid("Invalid or corrupted PDF file.")
}

/// Parse an unencrypted document.
pub fn load(bytes: &[u8]) -> Result<Document, TransformError> {
    match Document::load_mem(bytes) {
        Ok(doc) if doc.is_encrypted() => Err(TransformError::invalid(LOCKED_DETAIL)),
        Ok(doc) => Ok(doc),
        Err(lopdf::Error::InvalidPassword) => Err(TransformError::invalid(LOCKED_DETAIL)),
        Err(_) => Err(corrupt()),
    }
}

/// Serialize `doc` into a fresh buffer.
pub fn save(doc: &mut Document) -> Result<Vec<u8>, TransformError> {
    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|_| TransformError::failure("Failed to write PDF"))?;
    Ok(out)
}

/// Page object ids in document order.
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// Number of pages in an unencrypted document.
pub fn page_count(bytes: &[u8]) -> Result<usize, TransformError> {
    Ok(load(bytes)?.get_pages().len())
}

pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

/// Inline copy of a dictionary that may be stored by reference.
pub(crate) fn resolved_dict(doc: &Document, object: Option<&Object>) -> Dictionary {
    match object {
        Some(Object::Reference(id)) => doc.get_dictionary(*id).cloned().unwrap_or_default(),
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    }
}

/// Copy inherited attributes from the ancestors of `page_id` onto the page.
pub fn flatten_inherited(doc: &mut Document, page_id: ObjectId) -> Result<(), TransformError> {
    let page = doc.get_dictionary(page_id).map_err(|_| corrupt())?;
    let mut missing: Vec<&[u8]> = INHERITABLE.iter().copied().filter(|key| !page.has(key)).collect();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    let mut found = Vec::new();
    let mut depth = 0;
    while let Some(node_id) = parent {
        if missing.is_empty() {
            break;
        }
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            return Err(corrupt());
        }
        let node = doc.get_dictionary(node_id).map_err(|_| corrupt())?;
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                found.push((key.to_vec(), value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    let page = doc.get_dictionary_mut(page_id).map_err(|_| corrupt())?;
    for (key, value) in found {
        page.set(key, value);
    }
    Ok(())
}

fn pages_root(doc: &Document) -> Result<ObjectId, TransformError> {
    doc.catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|_| corrupt())
}

/// Make `pages` (in this order) the document's only pages.
pub fn set_page_order(doc: &mut Document, pages: &[ObjectId]) -> Result<(), TransformError> {
    for &page_id in pages {
        flatten_inherited(doc, page_id)?;
    }

    let root_id = pages_root(doc)?;
    for &page_id in pages {
        doc.get_dictionary_mut(page_id)
            .map_err(|_| corrupt())?
            .set("Parent", root_id);
    }

    let kids: Vec<Object> = pages.iter().map(|&id| Object::Reference(id)).collect();
    let root = doc.get_dictionary_mut(root_id).map_err(|_| corrupt())?;
    root.set("Kids", kids);
    root.set("Count", pages.len() as i64);
    root.remove(b"Parent");

    doc.prune_objects();
    Ok(())
}

/// A new document holding only `pages` of `doc`.
pub fn subset(doc: &Document, pages: &[ObjectId]) -> Result<Vec<u8>, TransformError> {
    let mut copy = doc.clone();
    set_page_order(&mut copy, pages)?;
    save(&mut copy)
}

/// Width and height of the page's media box, in points.
pub fn page_size(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let media_box = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"MediaBox").ok())
        .and_then(|object| match object {
            Object::Reference(id) => doc.get_object(*id).ok(),
            other => Some(other),
        })
        .and_then(|object| object.as_array().ok())
        .map(|values| values.iter().filter_map(number).collect::<Vec<_>>());

    match media_box.as_deref() {
        Some([x0, y0, x1, y1]) if (x1 - x0).abs() > 0.0 && (y1 - y0).abs() > 0.0 => {
            ((x1 - x0).abs(), (y1 - y0).abs())
        }
        _ => DEFAULT_PAGE_SIZE,
    }
}

/// Latin-1 bytes of `text` escaped for a PDF literal string.
///
/// Characters outside Latin-1 become `?` and line breaks become spaces.
pub(crate) fn literal(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let byte = u8::try_from(u32::from(ch)).unwrap_or(b'?');
        if matches!(byte, b'(' | b')' | b'\\') {
            out.push(b'\\');
        }
        match byte {
            b'\n' | b'\r' => out.push(b' '),
            other => out.push(other),
        }
    }
    out
}
