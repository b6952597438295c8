//! PDF concatenation with `lopdf`.
//!
//! Each input keeps its own page tree; the merged document gets a new root
//! `Pages` node whose kids are the inputs' page-tree roots, in input order.
//! Keeping the original trees preserves inherited page attributes
//! (resources, media box) that converters often put on the `Pages` node.

use async_trait::async_trait;
use lopdf::{dictionary, Document, Object, ObjectId};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::contract::{BoxError, Merger};
use crate::error::MergeError;

pub struct PdfMerger;

#[async_trait]
impl Merger for PdfMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), BoxError> {
        let inputs = inputs.to_vec();
        let output = output.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || merge_documents(&inputs, &output)).await??;
        debug!(pages, "Merged PDF written");
        Ok(())
    }
}

/// Concatenates `inputs` into `output`, returning the merged page count.
pub fn merge_documents(inputs: &[PathBuf], output: &Path) -> Result<usize, MergeError> {
    if inputs.is_empty() {
        return Err(MergeError::NoInputs);
    }

    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut kids: Vec<ObjectId> = Vec::with_capacity(inputs.len());
    let mut page_count = 0;

    for path in inputs {
        let mut doc = Document::load(path).map_err(|source| MergeError::Pdf {
            path: path.clone(),
            source,
        })?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let tree_root = doc
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .and_then(|root| doc.get_dictionary(root))
            .and_then(|catalog| catalog.get(b"Pages"))
            .and_then(Object::as_reference)
            .map_err(|_| MergeError::MissingPageTree(path.clone()))?;

        let pages = doc.get_pages().len();
        debug!(input = %path.display(), pages, "Appending document");
        page_count += pages;
        kids.push(tree_root);
        merged.objects.extend(doc.objects);
    }

    let pages_id: ObjectId = (next_id, 0);
    let catalog_id: ObjectId = (next_id + 1, 0);
    for kid in &kids {
        if let Ok(Object::Dictionary(node)) = merged.get_object_mut(*kid) {
            node.set("Parent", pages_id);
        }
    }
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.iter().copied().map(Object::Reference).collect::<Vec<_>>(),
            "Count" => page_count as i64,
        }),
    );
    merged.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        }),
    );
    merged.trailer.set("Root", catalog_id);
    merged.max_id = next_id + 1;

    merged.save(output)?;
    info!(output = %output.display(), inputs = inputs.len(), pages = page_count, "Merged PDFs");
    Ok(page_count)
}
