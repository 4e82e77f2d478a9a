//! In-memory collection state rebuilt from the log.

use crate::document::{Document, DocumentId};
use crate::error::StoreResult;
use mapsync_codec::{Record, Value};
use std::collections::{BTreeSet, HashMap};

/// Hash index over one field: encoded value to document positions.
type FieldIndex = HashMap<Vec<u8>, BTreeSet<usize>>;

/// Documents of one collection, in insertion order.
#[derive(Debug, Default)]
pub(crate) struct Collection {
    documents: Vec<Document>,
    positions: HashMap<DocumentId, usize>,
    indexes: HashMap<String, FieldIndex>,
}

fn index_key(value: &Value) -> StoreResult<Vec<u8>> {
    Ok(mapsync_codec::to_cbor(value)?)
}

impl Collection {
    pub(crate) fn len(&self) -> usize {
        self.documents.len()
    }

    pub(crate) fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub(crate) fn has_index(&self, field: &str) -> bool {
        self.indexes.contains_key(field)
    }

    /// Builds a hash index on `field`. Rebuilding an existing index is a no-op.
    pub(crate) fn create_index(&mut self, field: &str) -> StoreResult<()> {
        if self.has_index(field) {
            return Ok(());
        }
        let mut index = FieldIndex::new();
        for (pos, doc) in self.documents.iter().enumerate() {
            if let Some(value) = doc.record.get(field) {
                index.entry(index_key(value)?).or_default().insert(pos);
            }
        }
        self.indexes.insert(field.to_string(), index);
        Ok(())
    }

    /// Returns the earliest-inserted document whose `field` equals `value`.
    pub(crate) fn find_one(&self, field: &str, value: &Value) -> StoreResult<Option<&Document>> {
        if let Some(index) = self.indexes.get(field) {
            let pos = index
                .get(&index_key(value)?)
                .and_then(|positions| positions.first());
            return Ok(pos.map(|&p| &self.documents[p]));
        }
        Ok(self
            .documents
            .iter()
            .find(|doc| doc.record.get(field) == Some(value)))
    }

    /// Creates or replaces a document.
    pub(crate) fn put(&mut self, id: DocumentId, record: Record) -> StoreResult<()> {
        match self.positions.get(&id).copied() {
            Some(pos) => {
                for (field, index) in &mut self.indexes {
                    let old = self.documents[pos].record.get(field);
                    let new = record.get(field);
                    if old == new {
                        continue;
                    }
                    if let Some(old) = old {
                        let key = index_key(old)?;
                        if let Some(positions) = index.get_mut(&key) {
                            positions.remove(&pos);
                            if positions.is_empty() {
                                index.remove(&key);
                            }
                        }
                    }
                    if let Some(new) = new {
                        index.entry(index_key(new)?).or_default().insert(pos);
                    }
                }
                self.documents[pos].record = record;
            }
            None => {
                let pos = self.documents.len();
                for (field, index) in &mut self.indexes {
                    if let Some(value) = record.get(field) {
                        index.entry(index_key(value)?).or_default().insert(pos);
                    }
                }
                self.positions.insert(id, pos);
                self.documents.push(Document::new(id, record));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(url: &str, name: &str) -> Record {
        Record::new().with("profile_url", url).with("name", name)
    }

    #[test]
    fn find_with_and_without_index_agree() {
        let mut plain = Collection::default();
        let mut indexed = Collection::default();
        indexed.create_index("profile_url").unwrap();

        for (url, name) in [("a", "A"), ("b", "B"), ("a", "A2")] {
            let id = DocumentId::new();
            plain.put(id, profile(url, name)).unwrap();
            indexed.put(id, profile(url, name)).unwrap();
        }

        let key = Value::from("a");
        let from_scan = plain.find_one("profile_url", &key).unwrap().unwrap();
        let from_index = indexed.find_one("profile_url", &key).unwrap().unwrap();
        assert_eq!(from_scan, from_index);
        assert_eq!(from_index.record.get("name"), Some(&Value::from("A")));
        assert!(indexed
            .find_one("profile_url", &Value::from("z"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn replacing_moves_index_entry() {
        let mut coll = Collection::default();
        coll.create_index("profile_url").unwrap();
        let id = DocumentId::new();
        coll.put(id, profile("old", "X")).unwrap();
        coll.put(id, profile("new", "X")).unwrap();

        assert_eq!(coll.len(), 1);
        assert!(coll
            .find_one("profile_url", &Value::from("old"))
            .unwrap()
            .is_none());
        assert_eq!(
            coll.find_one("profile_url", &Value::from("new"))
                .unwrap()
                .map(|d| d.id),
            Some(id)
        );
    }

    #[test]
    fn index_built_over_existing_documents() {
        let mut coll = Collection::default();
        coll.put(DocumentId::new(), profile("a", "A")).unwrap();
        coll.put(DocumentId::new(), Record::new().with("name", "no url"))
            .unwrap();
        coll.create_index("profile_url").unwrap();

        assert!(coll.has_index("profile_url"));
        assert!(coll
            .find_one("profile_url", &Value::from("a"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn integer_and_float_keys_are_distinct() {
        let mut coll = Collection::default();
        coll.create_index("n").unwrap();
        coll.put(DocumentId::new(), Record::new().with("n", 1i64))
            .unwrap();

        assert!(coll.find_one("n", &Value::Integer(1)).unwrap().is_some());
        assert!(coll.find_one("n", &Value::Float(1.0)).unwrap().is_none());
    }
}
