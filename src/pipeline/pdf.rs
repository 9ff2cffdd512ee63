//! Minimal PDF assembly on top of `lopdf`.
//!
//! Strategies describe pages as a media box, a resource dictionary, and a
//! list of content-stream operations; [`PdfBuilder`] wires those into a page
//! tree and serialises the document. Only integer geometry is emitted, which
//! is all the layouts in this crate need.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::io;

pub const PDF_VERSION: &str = "1.7";

/// Accumulates pages, then emits a complete document.
pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version(PDF_VERSION);
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Store an indirect object (font, image XObject, …) and return its id.
    pub fn add_object(&mut self, object: impl Into<Object>) -> ObjectId {
        self.doc.add_object(object)
    }

    /// Append a `width × height` page drawn by `operations`.
    pub fn add_page(
        &mut self,
        width: i64,
        height: i64,
        resources: Dictionary,
        operations: Vec<Operation>,
    ) -> io::Result<ObjectId> {
        let content = Content { operations }
            .encode()
            .map_err(|e| io::Error::other(format!("content stream: {e}")))?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), content));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(width),
                Object::Integer(height),
            ],
            "Resources" => resources,
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
        Ok(page_id)
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Close the page tree and serialise the document.
    pub fn finish(mut self) -> io::Result<Vec<u8>> {
        let count = Object::Integer(self.kids.len() as i64);
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| io::Error::other(format!("serialise PDF: {e}")))?;
        Ok(buf)
    }
}

/// Shorthand for an operation whose operands are all integers.
pub fn op_int(operator: &str, operands: &[i64]) -> Operation {
    Operation::new(
        operator,
        operands.iter().map(|&n| Object::Integer(n)).collect(),
    )
}
