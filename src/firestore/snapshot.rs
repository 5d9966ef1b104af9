use super::models::Document;
use super::value::fields_to_json;
use super::FirestoreError;
use serde_json::map::Map;
use serde_json::Value as SerdeValue;
use tracing::warn;

/// A snapshot of a document returned by a query.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub(crate) id: String,
    pub(crate) document: Document,
}

impl DocumentSnapshot {
    pub(crate) fn from_document(document: Document) -> Self {
        let id = document
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self { id, document }
    }

    /// The ID of the document.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The full resource name, `projects/{p}/databases/{d}/documents/...`.
    pub fn path(&self) -> &str {
        &self.document.name
    }

    pub fn create_time(&self) -> Option<&str> {
        self.document.create_time.as_deref()
    }

    pub fn update_time(&self) -> Option<&str> {
        self.document.update_time.as_deref()
    }

    /// The document body decoded to plain JSON.
    pub fn data(&self) -> Result<SerdeValue, FirestoreError> {
        fields_to_json(self.document.fields.clone())
    }

    /// The body with the document ID injected as an `id` field, placed first.
    ///
    /// If the body already has an `id` field the injected identifier replaces
    /// it and the body value is lost.
    pub fn to_record(&self) -> Result<SerdeValue, FirestoreError> {
        let mut record = Map::new();
        record.insert("id".to_string(), SerdeValue::String(self.id.clone()));

        if let SerdeValue::Object(body) = self.data()? {
            for (key, value) in body {
                if key == "id" {
                    warn!(
                        document = %self.id,
                        "document has its own 'id' field; it is replaced by the document identifier"
                    );
                    continue;
                }
                record.insert(key, value);
            }
        }

        Ok(SerdeValue::Object(record))
    }
}

/// A `QuerySnapshot` contains zero or more `DocumentSnapshot` objects.
#[derive(Debug, Clone, Default)]
pub struct QuerySnapshot {
    pub(crate) documents: Vec<DocumentSnapshot>,
    pub(crate) read_time: Option<String>,
}

impl QuerySnapshot {
    pub fn documents(&self) -> &[DocumentSnapshot] {
        &self.documents
    }

    pub fn empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn size(&self) -> usize {
        self.documents.len()
    }

    pub fn read_time(&self) -> Option<&str> {
        self.read_time.as_deref()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DocumentSnapshot> {
        self.documents.iter()
    }

    /// Every document as an id-prefixed JSON record, in result order.
    pub fn to_records(&self) -> Result<Vec<SerdeValue>, FirestoreError> {
        self.documents.iter().map(DocumentSnapshot::to_record).collect()
    }
}

impl<'a> IntoIterator for &'a QuerySnapshot {
    type Item = &'a DocumentSnapshot;
    type IntoIter = std::slice::Iter<'a, DocumentSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}
