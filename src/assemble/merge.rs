//! PDF merging

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::FetchedDocument;

/// Attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Page-tree depth beyond which a document is treated as malformed
const MAX_TREE_DEPTH: usize = 64;

/// Output of a merge
#[must_use]
#[derive(Debug, Clone)]
pub struct MergeOutput {
    /// Merged PDF bytes
    pub bytes: Vec<u8>,
    /// Pages in the merged document
    pub pages: usize,
    /// Positions (into the input slice) of documents that could not be read, with the reason
    pub rejected: Vec<(usize, String)>,
}

/// Concatenates PDF documents page by page
///
/// Documents that cannot be parsed are skipped and listed in
/// [`MergeOutput::rejected`]; only a failure to write the output is an error.
pub trait DocumentMerger: Send + Sync {
    /// Merge `documents` in slice order
    fn merge(&self, documents: &[FetchedDocument]) -> Result<MergeOutput>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// [`DocumentMerger`] built on lopdf
#[derive(Clone, Copy, Debug, Default)]
pub struct LopdfMerger;

impl DocumentMerger for LopdfMerger {
    fn merge(&self, documents: &[FetchedDocument]) -> Result<MergeOutput> {
        let mut output = Document::with_version("1.5");
        let pages_id = output.new_object_id();
        let mut kids: Vec<Object> = Vec::new();
        let mut rejected = Vec::new();

        for (position, document) in documents.iter().enumerate() {
            let appended = Document::load_mem(&document.bytes)
                .map_err(|e| e.to_string())
                .and_then(|source| append_document(&mut output, source, pages_id));

            match appended {
                Ok(page_ids) => {
                    debug!(
                        index = document.request.original_index,
                        pages = page_ids.len(),
                        "merged document"
                    );
                    kids.extend(page_ids.into_iter().map(Object::Reference));
                }
                Err(reason) => {
                    warn!(
                        index = document.request.original_index,
                        filename = %document.request.filename,
                        error = %reason,
                        "skipping unreadable document"
                    );
                    rejected.push((position, reason));
                }
            }
        }

        let pages = kids.len();
        let mut pages_dict = Dictionary::new();
        pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
        pages_dict.set("Kids", Object::Array(kids));
        pages_dict.set("Count", Object::Integer(pages as i64));
        output
            .objects
            .insert(pages_id, Object::Dictionary(pages_dict));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = output.add_object(Object::Dictionary(catalog));
        output.trailer.set("Root", Object::Reference(catalog_id));

        // Old catalogs and page-tree nodes of the sources are unreachable now
        output.prune_objects();

        let mut bytes = Vec::new();
        output.save_to(&mut bytes)?;
        Ok(MergeOutput {
            bytes,
            pages,
            rejected,
        })
    }

    fn name(&self) -> &'static str {
        "lopdf"
    }
}

/// Move every object of `source` into `output`, re-parenting its pages under `pages_id`
///
/// Returns the page ids in the source's page order. `output` is untouched on error.
fn append_document(
    output: &mut Document,
    mut source: Document,
    pages_id: ObjectId,
) -> std::result::Result<Vec<ObjectId>, String> {
    source.renumber_objects_with(output.max_id + 1);

    let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();
    if page_ids.is_empty() {
        return Err("document has no pages".to_string());
    }

    for page_id in &page_ids {
        let inherited = inherited_attributes(&source, *page_id);
        let page = source
            .get_object_mut(*page_id)
            .and_then(|object| object.as_dict_mut())
            .map_err(|e| format!("page {page_id:?} is not a dictionary: {e}"))?;
        for (key, value) in inherited {
            if !page.has(key) {
                page.set(key, value);
            }
        }
        page.set("Parent", Object::Reference(pages_id));
    }

    let source_max = source
        .objects
        .keys()
        .map(|(id, _)| *id)
        .max()
        .unwrap_or(source.max_id);
    output.max_id = output.max_id.max(source.max_id).max(source_max);
    output.objects.extend(source.objects);
    Ok(page_ids)
}

/// Inheritable attributes of a page's ancestors, nearest ancestor first
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(&'static [u8], Object)> {
    let mut found: Vec<(&'static [u8], Object)> = Vec::new();
    let mut current = parent_of(doc, page_id);
    let mut depth = 0;

    while let Some(node_id) = current {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };
        for key in INHERITABLE {
            if found.iter().any(|(k, _)| *k == key) {
                continue;
            }
            if let Ok(value) = node.get(key) {
                found.push((key, value.clone()));
            }
        }
        current = parent_of(doc, node_id);
    }

    found
}

fn parent_of(doc: &Document, id: ObjectId) -> Option<ObjectId> {
    doc.get_dictionary(id)
        .ok()?
        .get(b"Parent")
        .ok()?
        .as_reference()
        .ok()
}
