use crate::formatter::Document;

/// Default ceiling for the summed document bytes of one batch.
pub const DEFAULT_MAX_BATCH_BYTES: usize = 50_000;

/// How a batch is rendered into a single sink payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadEncoding {
    /// One document per line, each followed by `\n`.
    #[default]
    Ndjson,
    /// A JSON array whose elements are the documents as JSON strings;
    /// the message body shape used for queues.
    StringArray,
}

impl PayloadEncoding {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ndjson" => Some(PayloadEncoding::Ndjson),
            "array" | "string_array" => Some(PayloadEncoding::StringArray),
            _ => None,
        }
    }
}

/// Ordered group of documents shipped to a sink in one call.
///
/// `byte_len` counts document bytes only, delimiters added by an encoding
/// are not part of the budget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    documents: Vec<Document>,
    byte_len: usize,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, doc: Document) {
        self.byte_len += doc.len();
        self.documents.push(doc);
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn payload(&self, encoding: PayloadEncoding) -> Vec<u8> {
        match encoding {
            PayloadEncoding::Ndjson => {
                let mut out = Vec::with_capacity(self.byte_len + self.documents.len());
                for doc in &self.documents {
                    out.extend_from_slice(doc.as_bytes());
                    out.push(b'\n');
                }
                out
            }
            PayloadEncoding::StringArray => {
                let items: Vec<String> = self
                    .documents
                    .iter()
                    .map(|d| String::from_utf8_lossy(d.as_bytes()).into_owned())
                    .collect();
                // Serializing a list of strings cannot fail.
                serde_json::to_vec(&items).unwrap_or_else(|_| b"[]".to_vec())
            }
        }
    }
}

/// Packs documents into batches under a byte ceiling.
///
/// A document that would push the open batch past the ceiling seals it
/// first. A document larger than the ceiling on its own still ships, as a
/// batch of one.
#[derive(Debug)]
pub struct Batcher {
    max_bytes: usize,
    current: Batch,
}

impl Batcher {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes: max_bytes.max(1),
            current: Batch::new(),
        }
    }

    /// Add `doc`, returning the batch it sealed, if any.
    pub fn push(&mut self, doc: Document) -> Option<Batch> {
        let sealed = if !self.current.is_empty()
            && self.current.byte_len() + doc.len() > self.max_bytes
        {
            Some(std::mem::take(&mut self.current))
        } else {
            None
        };
        self.current.push(doc);
        sealed
    }

    /// Seal whatever is pending. Never returns an empty batch.
    pub fn finish(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }

    pub fn pending(&self) -> &Batch {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_of(len: usize, tag: u8) -> Document {
        Document::new(vec![tag; len])
    }

    #[test]
    fn three_twenty_kb_docs_make_two_batches() {
        let mut batcher = Batcher::new(DEFAULT_MAX_BATCH_BYTES);
        let mut out = Vec::new();
        for tag in [b'a', b'b', b'c'] {
            out.extend(batcher.push(doc_of(20_000, tag)));
        }
        out.extend(batcher.finish());

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].documents(), &[doc_of(20_000, b'a'), doc_of(20_000, b'b')]);
        assert_eq!(out[0].byte_len(), 40_000);
        assert_eq!(out[1].documents(), &[doc_of(20_000, b'c')]);
    }

    #[test]
    fn exact_fit_stays_in_one_batch() {
        let mut batcher = Batcher::new(100);
        assert!(batcher.push(doc_of(60, b'a')).is_none());
        assert!(batcher.push(doc_of(40, b'b')).is_none());
        assert_eq!(batcher.finish().map(|b| b.byte_len()), Some(100));
    }

    #[test]
    fn oversized_doc_forms_its_own_batch() {
        let mut batcher = Batcher::new(100);
        let mut out = Vec::new();
        out.extend(batcher.push(doc_of(10, b'a')));
        out.extend(batcher.push(doc_of(500, b'b')));
        out.extend(batcher.push(doc_of(10, b'c')));
        out.extend(batcher.finish());

        let lens: Vec<usize> = out.iter().map(|b| b.byte_len()).collect();
        assert_eq!(lens, vec![10, 500, 10]);
    }

    #[test]
    fn finish_on_empty_batcher_yields_nothing() {
        let mut batcher = Batcher::new(100);
        assert!(batcher.finish().is_none());
    }

    #[test]
    fn ndjson_payload_terminates_every_line() {
        let mut batch = Batch::new();
        batch.push(Document::from(r#"{"a":1}"#.to_string()));
        batch.push(Document::from(r#"{"b":2}"#.to_string()));
        assert_eq!(batch.payload(PayloadEncoding::Ndjson), b"{\"a\":1}\n{\"b\":2}\n");
    }

    #[test]
    fn string_array_payload_quotes_documents() {
        let mut batch = Batch::new();
        batch.push(Document::from(r#"{"a":1}"#.to_string()));
        let body = String::from_utf8(batch.payload(PayloadEncoding::StringArray)).unwrap();
        assert_eq!(body, r#"["{\"a\":1}"]"#);
    }
}
