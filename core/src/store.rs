use parking_lot::RwLock;
use sled::transaction::{TransactionError, Transactional};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use thiserror::Error;

/// Error type for posting store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport or IO level failure; candidates for caller-side retry with
    /// backoff. The engine itself never retries.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation failed: {0}")]
    Backend(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(e) => StoreError::Unavailable(e.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// A single write in an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Add `member` to the sorted set at `key`, ordered by `score`.
    SortedSetAdd {
        key: String,
        score: u32,
        member: String,
    },
    /// Set hash fields under `key`, overwriting existing values.
    HashFieldsSet {
        key: String,
        fields: Vec<(String, String)>,
    },
}

/// Storage collaborator holding postings (a sorted set keyed by numeric
/// score) and per-document hash records. Injected into the engine so tests
/// can substitute an in-memory double.
pub trait PostingStore: Send + Sync {
    /// Execute all operations atomically: a subsequent reader observes either
    /// all of them or none of them.
    fn atomic_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Members of the sorted set at `key` with `min <= score <= max`, in
    /// score-then-member order.
    fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: u32,
        max: u32,
    ) -> Result<Vec<String>, StoreError>;

    /// Batched exact-score lookup, one member list per requested score. This
    /// is the query hot path: remote backends should override it to resolve
    /// every score in a single round trip (pipelined), the default loops over
    /// [`Self::sorted_set_range_by_score`] which is only acceptable
    /// in-process.
    fn sorted_set_multi_range_by_score(
        &self,
        key: &str,
        scores: &[u32],
    ) -> Result<Vec<Vec<String>>, StoreError> {
        scores
            .iter()
            .map(|&s| self.sorted_set_range_by_score(key, s, s))
            .collect()
    }

    /// Convenience single-record write.
    fn hash_fields_set(&self, key: &str, fields: Vec<(String, String)>) -> Result<(), StoreError> {
        self.atomic_batch(vec![WriteOp::HashFieldsSet {
            key: key.to_string(),
            fields,
        }])
    }

    fn hash_field_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Destructive reset of everything this store holds.
    fn flush_all(&self) -> Result<(), StoreError>;
}

const POSTINGS_TREE: &str = "postings";
const DOCS_TREE: &str = "docs";
const KEY_SEP: u8 = 0;

/// Embedded sled-backed store.
///
/// Sorted set entries live in the `postings` tree under
/// `{set}\0{score:big-endian u32}\0{member}` with empty values; the
/// big-endian score makes range-by-score a plain key range scan, and
/// re-adding an identical (score, member) pair is a no-op, as in a real
/// sorted set. Hash fields live in the `docs` tree under `{key}\0{field}`.
pub struct SledStore {
    db: sled::Db,
    postings: sled::Tree,
    docs: sled::Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let postings = db.open_tree(POSTINGS_TREE)?;
        let docs = db.open_tree(DOCS_TREE)?;
        Ok(Self { db, postings, docs })
    }

    fn zset_prefix(key: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(key.len() + 1);
        buf.extend_from_slice(key.as_bytes());
        buf.push(KEY_SEP);
        buf
    }

    fn zset_entry_key(key: &str, score: u32, member: &str) -> Vec<u8> {
        let mut buf = Self::zset_prefix(key);
        buf.extend_from_slice(&score.to_be_bytes());
        buf.push(KEY_SEP);
        buf.extend_from_slice(member.as_bytes());
        buf
    }

    fn hash_entry_key(key: &str, field: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(key.len() + 1 + field.len());
        buf.extend_from_slice(key.as_bytes());
        buf.push(KEY_SEP);
        buf.extend_from_slice(field.as_bytes());
        buf
    }
}

impl PostingStore for SledStore {
    fn atomic_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let result: Result<(), TransactionError<()>> =
            (&self.postings, &self.docs).transaction(|(postings, docs)| {
                for op in &ops {
                    match op {
                        WriteOp::SortedSetAdd { key, score, member } => {
                            postings.insert(Self::zset_entry_key(key, *score, member), &[][..])?;
                        }
                        WriteOp::HashFieldsSet { key, fields } => {
                            for (field, value) in fields {
                                docs.insert(Self::hash_entry_key(key, field), value.as_bytes())?;
                            }
                        }
                    }
                }
                Ok(())
            });
        result.map_err(|err| match err {
            TransactionError::Storage(e) => StoreError::from(e),
            TransactionError::Abort(_) => StoreError::Backend("transaction aborted".to_string()),
        })
    }

    fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: u32,
        max: u32,
    ) -> Result<Vec<String>, StoreError> {
        let prefix = Self::zset_prefix(key);
        let mut lower = prefix.clone();
        lower.extend_from_slice(&min.to_be_bytes());
        let upper = match max.checked_add(1) {
            Some(next) => {
                let mut bound = prefix.clone();
                bound.extend_from_slice(&next.to_be_bytes());
                bound
            }
            None => {
                // max == u32::MAX: everything under this set's prefix
                let mut bound = prefix.clone();
                bound.pop();
                bound.push(KEY_SEP + 1);
                bound
            }
        };
        let member_start = prefix.len() + 4 + 1;
        let mut members = Vec::new();
        for entry in self.postings.range(lower..upper) {
            let (entry_key, _) = entry?;
            let member = entry_key
                .get(member_start..)
                .ok_or_else(|| StoreError::Backend("truncated sorted set key".to_string()))?;
            let member = std::str::from_utf8(member)
                .map_err(|_| StoreError::Backend("non-utf8 sorted set member".to_string()))?;
            members.push(member.to_string());
        }
        Ok(members)
    }

    fn hash_field_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        match self.docs.get(Self::hash_entry_key(key, field))? {
            Some(value) => {
                let value = String::from_utf8(value.to_vec())
                    .map_err(|_| StoreError::Backend("non-utf8 hash field".to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn flush_all(&self) -> Result<(), StoreError> {
        self.postings.clear()?;
        self.docs.clear()?;
        self.db.flush()?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryInner {
    zsets: HashMap<String, BTreeSet<(u32, String)>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

/// In-memory store with the same observable semantics as [`SledStore`].
/// Primarily a test double; also usable as an ephemeral embedded index.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a raw member directly into a sorted set, bypassing the engine.
    /// Lets tests construct exact posting layouts.
    pub fn seed_sorted_set(&self, key: &str, score: u32, member: &str) {
        self.inner
            .write()
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert((score, member.to_string()));
    }
}

impl PostingStore for MemoryStore {
    fn atomic_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        // One lock over the whole batch makes it atomic for readers.
        let mut inner = self.inner.write();
        for op in ops {
            match op {
                WriteOp::SortedSetAdd { key, score, member } => {
                    inner.zsets.entry(key).or_default().insert((score, member));
                }
                WriteOp::HashFieldsSet { key, fields } => {
                    let record = inner.hashes.entry(key).or_default();
                    for (field, value) in fields {
                        record.insert(field, value);
                    }
                }
            }
        }
        Ok(())
    }

    fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: u32,
        max: u32,
    ) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read();
        let Some(set) = inner.zsets.get(key) else {
            return Ok(Vec::new());
        };
        Ok(set
            .range((min, String::new())..)
            .take_while(|(score, _)| *score <= max)
            .map(|(_, member)| member.clone())
            .collect())
    }

    fn hash_field_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .hashes
            .get(key)
            .and_then(|record| record.get(field))
            .cloned())
    }

    fn flush_all(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.zsets.clear();
        inner.hashes.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_store<S: PostingStore>(store: &S) {
        store
            .atomic_batch(vec![
                WriteOp::SortedSetAdd {
                    key: "idx".into(),
                    score: 7,
                    member: "a-0-10".into(),
                },
                WriteOp::SortedSetAdd {
                    key: "idx".into(),
                    score: 7,
                    member: "b-5-10".into(),
                },
                WriteOp::SortedSetAdd {
                    key: "idx".into(),
                    score: 9,
                    member: "a-20-10".into(),
                },
                WriteOp::HashFieldsSet {
                    key: "doc_a".into(),
                    fields: vec![("text".into(), "hello".into()), ("url".into(), "u".into())],
                },
            ])
            .unwrap();

        assert_eq!(
            store.sorted_set_range_by_score("idx", 7, 7).unwrap(),
            vec!["a-0-10".to_string(), "b-5-10".to_string()]
        );
        assert_eq!(
            store.sorted_set_range_by_score("idx", 7, 9).unwrap().len(),
            3
        );
        assert!(store.sorted_set_range_by_score("idx", 8, 8).unwrap().is_empty());
        assert!(store.sorted_set_range_by_score("other", 7, 7).unwrap().is_empty());

        // re-adding an identical entry is a no-op
        store
            .atomic_batch(vec![WriteOp::SortedSetAdd {
                key: "idx".into(),
                score: 7,
                member: "a-0-10".into(),
            }])
            .unwrap();
        assert_eq!(store.sorted_set_range_by_score("idx", 7, 7).unwrap().len(), 2);

        let lists = store
            .sorted_set_multi_range_by_score("idx", &[9, 7, 1234])
            .unwrap();
        assert_eq!(lists.len(), 3);
        assert_eq!(lists[0], vec!["a-20-10".to_string()]);
        assert_eq!(lists[1].len(), 2);
        assert!(lists[2].is_empty());

        assert_eq!(
            store.hash_field_get("doc_a", "text").unwrap().as_deref(),
            Some("hello")
        );
        assert_eq!(store.hash_field_get("doc_a", "missing").unwrap(), None);
        assert_eq!(store.hash_field_get("doc_b", "text").unwrap(), None);

        store.flush_all().unwrap();
        assert!(store.sorted_set_range_by_score("idx", 7, 7).unwrap().is_empty());
        assert_eq!(store.hash_field_get("doc_a", "text").unwrap(), None);
    }

    #[test]
    fn memory_store_semantics() {
        exercise_store(&MemoryStore::new());
    }

    #[test]
    fn sled_store_semantics() {
        let dir = tempfile::tempdir().unwrap();
        exercise_store(&SledStore::open(dir.path()).unwrap());
    }

    #[test]
    fn sled_store_extreme_scores() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        for score in [0, 1, u32::MAX - 1, u32::MAX] {
            store
                .atomic_batch(vec![WriteOp::SortedSetAdd {
                    key: "idx".into(),
                    score,
                    member: format!("doc-{score}-3"),
                }])
                .unwrap();
        }
        assert_eq!(store.sorted_set_range_by_score("idx", 0, 0).unwrap().len(), 1);
        assert_eq!(
            store
                .sorted_set_range_by_score("idx", u32::MAX, u32::MAX)
                .unwrap(),
            vec![format!("doc-{}-3", u32::MAX)]
        );
        assert_eq!(
            store.sorted_set_range_by_score("idx", 0, u32::MAX).unwrap().len(),
            4
        );
    }
}
