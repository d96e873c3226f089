//! Output document assembler.
//!
//! Takes an optional base PDF plus a queue snapshot and produces one PDF:
//! donor documents contribute all their pages in order, each image becomes
//! one page of exactly its pixel size.

use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, info, instrument};

use everythingpdf_shared::{EverythingPdfError, InputKind, Result};

use crate::queue::QueueSnapshot;
use crate::raster::{self, EmbeddedImage};

/// PDF version written for documents created from scratch.
const PDF_VERSION: &str = "1.7";

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_ATTRIBUTES: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic `Parent` chains in malformed files.
const MAX_TREE_DEPTH: usize = 64;

/// Item label used for failures in the base document.
const BASE_LABEL: &str = "base document";

/// A pre-existing PDF the build extends.
#[derive(Debug, Clone)]
pub struct BaseDocument {
    /// Display name.
    pub name: String,
    /// Raw PDF bytes.
    pub bytes: Arc<[u8]>,
}

impl BaseDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// A queue entry with its bytes loaded.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub name: String,
    pub kind: InputKind,
    pub bytes: Vec<u8>,
}

/// Output from a successful assembly.
#[derive(Debug, Clone)]
pub struct AssembleResult {
    /// The serialized PDF.
    pub bytes: Vec<u8>,
    /// Total number of pages in the output.
    pub page_count: usize,
    /// Pages that came from the base document.
    pub base_pages: usize,
    /// Pages copied from document inputs.
    pub document_pages: usize,
    /// Pages created for image inputs.
    pub image_pages: usize,
}

/// Read every payload of `snapshot` and assemble the output document.
///
/// Payloads are read up front; the CPU-bound merge runs on the blocking
/// thread pool. Any failure aborts the whole build.
#[instrument(skip_all, fields(inputs = snapshot.len(), has_base = base.is_some()))]
pub async fn assemble(
    base: Option<&BaseDocument>,
    snapshot: &QueueSnapshot,
) -> Result<AssembleResult> {
    let mut loaded = Vec::with_capacity(snapshot.len());
    for (i, item) in snapshot.iter().enumerate() {
        let bytes = item.payload.read().await.map_err(|e| {
            EverythingPdfError::assembly(item_label(i, &item.display_name), format!("could not read input: {e}"))
        })?;
        loaded.push(LoadedInput {
            name: item.display_name.clone(),
            kind: item.kind,
            bytes,
        });
    }

    let base_bytes = base.map(|b| Arc::clone(&b.bytes));
    tokio::task::spawn_blocking(move || assemble_loaded(base_bytes.as_deref(), &loaded))
        .await
        .map_err(|e| EverythingPdfError::assembly("build", format!("assembly task failed: {e}")))?
}

/// Assemble already-loaded inputs into one PDF.
pub fn assemble_loaded(base: Option<&[u8]>, inputs: &[LoadedInput]) -> Result<AssembleResult> {
    let mut output = match base {
        Some(bytes) => OutputDocument::load(bytes)
            .map_err(|e| EverythingPdfError::assembly(BASE_LABEL, e))?,
        None => OutputDocument::new(),
    };
    let base_pages = output.page_count();
    let mut document_pages = 0;
    let mut image_pages = 0;

    for (i, input) in inputs.iter().enumerate() {
        let label = || item_label(i, &input.name);
        match input.kind {
            InputKind::Document => {
                let donor = open_document(&input.bytes)
                    .map_err(|e| EverythingPdfError::assembly(label(), e))?;
                let copied = output
                    .append_document(donor)
                    .map_err(|e| EverythingPdfError::assembly(label(), format!("failed to copy pages: {e}")))?;
                debug!(name = %input.name, pages = copied, "copied donor pages");
                document_pages += copied;
            }
            InputKind::Image(subkind) => {
                let image = raster::decode(&input.bytes, subkind)
                    .map_err(|e| EverythingPdfError::assembly(label(), e))?;
                debug!(name = %input.name, width = image.width, height = image.height, "placed image page");
                output
                    .append_image(image)
                    .map_err(|e| EverythingPdfError::assembly(label(), format!("failed to add image page: {e}")))?;
                image_pages += 1;
            }
        }
    }

    let page_count = output.page_count();
    let bytes = output
        .finish()
        .map_err(|e| EverythingPdfError::assembly("output", format!("failed to serialize document: {e}")))?;

    info!(
        page_count,
        base_pages,
        document_pages,
        image_pages,
        size = bytes.len(),
        "assembly complete"
    );

    Ok(AssembleResult {
        bytes,
        page_count,
        base_pages,
        document_pages,
        image_pages,
    })
}

/// Count the pages of a PDF, failing the same way a build would.
pub fn page_count(bytes: &[u8]) -> Result<usize> {
    open_document(bytes)
        .map(|doc| doc.get_pages().len())
        .map_err(EverythingPdfError::validation)
}

// ---------------------------------------------------------------------------
// Output document
// ---------------------------------------------------------------------------

/// The document being built plus the id of its root page-tree node.
struct OutputDocument {
    doc: Document,
    pages_id: ObjectId,
}

impl OutputDocument {
    /// An empty document with a catalog and an empty page tree.
    fn new() -> Self {
        let mut doc = Document::with_version(PDF_VERSION);
        let pages_id = doc.new_object_id();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => Object::Integer(0),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        Self { doc, pages_id }
    }

    /// Start from an existing document, keeping its pages and order.
    fn load(bytes: &[u8]) -> std::result::Result<Self, String> {
        let doc = open_document(bytes)?;
        let pages_id = root_pages_id(&doc)
            .map_err(|e| format!("document has no page tree: {e}"))?;
        Ok(Self { doc, pages_id })
    }

    fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Copy every page of `donor`, in order, after the current last page.
    /// Returns the number of pages copied.
    fn append_document(&mut self, mut donor: Document) -> lopdf::Result<usize> {
        donor.renumber_objects_with(self.doc.max_id + 1);

        let page_ids: Vec<ObjectId> = donor.get_pages().into_values().collect();

        // Pages are re-parented directly under our root, so anything they
        // inherited from the donor's page tree must be copied onto them.
        for &page_id in &page_ids {
            let inherited = inherited_attributes(&donor, page_id);
            let page = donor.get_object_mut(page_id)?.as_dict_mut()?;
            for (key, value) in inherited {
                page.set(key, value);
            }
            pin_page_attributes(page);
        }

        let donor_max = donor
            .objects
            .keys()
            .map(|(id, _)| *id)
            .max()
            .unwrap_or(donor.max_id);

        for (id, object) in donor.objects {
            if matches!(
                type_name(&object),
                Some(b"Catalog" | b"Pages" | b"ObjStm" | b"XRef")
            ) {
                continue;
            }
            self.doc.objects.insert(id, object);
        }
        self.doc.max_id = self.doc.max_id.max(donor_max);

        for &page_id in &page_ids {
            self.doc
                .get_object_mut(page_id)?
                .as_dict_mut()?
                .set("Parent", self.pages_id);
            self.attach_page(page_id)?;
        }

        Ok(page_ids.len())
    }

    /// Add one page sized to the image, with the image filling it.
    fn append_image(&mut self, image: EmbeddedImage) -> lopdf::Result<()> {
        let width = i64::from(image.width);
        let height = i64::from(image.height);

        let mut xobject = image.xobject;
        if let Some(mask) = image.soft_mask {
            let mask_id = self.doc.add_object(mask);
            xobject.dict.set("SMask", mask_id);
        }
        let image_id = self.doc.add_object(xobject);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Integer(width),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(height),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), content.encode()?));

        let page_box = vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(width),
            Object::Integer(height),
        ];
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => page_box.clone(),
            "CropBox" => page_box,
            "Rotate" => Object::Integer(0),
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
            "Contents" => content_id,
        });

        self.attach_page(page_id)
    }

    /// Append `page_id` to the root `Kids` array and bump `Count`.
    fn attach_page(&mut self, page_id: ObjectId) -> lopdf::Result<()> {
        let pages = self.doc.get_object_mut(self.pages_id)?.as_dict_mut()?;
        let count = pages.get(b"Count").and_then(Object::as_i64)?;
        pages
            .get_mut(b"Kids")?
            .as_array_mut()?
            .push(Object::Reference(page_id));
        pages.set("Count", Object::Integer(count + 1));
        Ok(())
    }

    fn finish(mut self) -> lopdf::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.doc.save_to(&mut out)?;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a PDF, refusing encrypted files.
fn open_document(bytes: &[u8]) -> std::result::Result<Document, String> {
    let doc = Document::load_mem(bytes).map_err(|e| format!("could not open PDF: {e}"))?;
    if doc.is_encrypted() {
        return Err("PDF is encrypted".into());
    }
    Ok(doc)
}

fn root_pages_id(doc: &Document) -> lopdf::Result<ObjectId> {
    let root = doc.trailer.get(b"Root")?.as_reference()?;
    doc.get_dictionary(root)?.get(b"Pages")?.as_reference()
}

/// `/Type` of a dictionary or stream object.
fn type_name(object: &Object) -> Option<&[u8]> {
    let dict = match object {
        Object::Dictionary(d) => d,
        Object::Stream(s) => &s.dict,
        _ => return None,
    };
    match dict.get(b"Type") {
        Ok(Object::Name(name)) => Some(name.as_slice()),
        _ => None,
    }
}

/// Inheritable attributes a page lacks but one of its ancestors defines.
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, Object)> {
    let mut found = Vec::new();
    let Ok(page) = doc.get_dictionary(page_id) else {
        return found;
    };

    let mut missing: Vec<&[u8]> = INHERITABLE_ATTRIBUTES
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    let mut depth = 0;
    while let Some(parent_id) = parent {
        if missing.is_empty() || depth >= MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                found.push((key.to_vec(), value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    found
}

/// Give a re-parented page explicit defaults for the inheritable attributes
/// it still lacks, so the output root's own values never leak onto it.
fn pin_page_attributes(page: &mut Dictionary) {
    if !page.has(b"Rotate") {
        page.set("Rotate", Object::Integer(0));
    }
    if !page.has(b"CropBox") {
        if let Ok(media_box) = page.get(b"MediaBox").cloned() {
            page.set("CropBox", media_box);
        }
    }
    if !page.has(b"Resources") {
        page.set("Resources", Dictionary::new());
    }
}

/// Human-readable identity of a queue item for error messages.
fn item_label(index: usize, name: &str) -> String {
    format!("item {} '{name}'", index + 1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
