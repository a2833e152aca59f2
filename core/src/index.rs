use crate::error::{Result, SearchError};
use crate::ngram::{ngrams, Fingerprint, NgramConfig};
use crate::store::{PostingStore, WriteOp};
use crate::tokenizer::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::HashSet;

/// Default number of context characters on each side of a snippet match.
pub const DEFAULT_CONTEXT_LENGTH: usize = 30;

/// Hash field holding a document's canonical indexed text.
const TEXT_FIELD: &str = "text";

/// A run of fingerprint matches in one document, merged under gap tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitSequence {
    pub doc_id: String,
    /// Percentage of query fingerprints this run satisfied, two decimals.
    pub score: f64,
    pub offset_start: usize,
    pub offset_end: usize,
}

/// Bounded excerpt of document text around a match. `match_start` and
/// `match_end` are character offsets into `text`, not the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    pub match_start: usize,
    pub match_end: usize,
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub ngram: NgramConfig,
    /// Maximum character distance between two hits in the same document
    /// still merged into one sequence.
    pub gap_threshold: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ngram: NgramConfig::default(),
            gap_threshold: 30,
        }
    }
}

/// One parsed posting hit.
#[derive(Debug, Clone)]
struct Hit {
    doc_id: String,
    offset_start: usize,
    offset_end: usize,
}

/// The phrase index: a stateless engine over an injected posting store.
/// All postings for one corpus share a single sorted-set key (the
/// collection name); documents live under `doc_{id}` hash records.
pub struct Index<S> {
    store: S,
    collection: String,
    config: IndexConfig,
}

impl<S: PostingStore> Index<S> {
    pub fn new(store: S, collection: impl Into<String>) -> Self {
        Self::with_config(store, collection, IndexConfig::default())
    }

    pub fn with_config(store: S, collection: impl Into<String>, config: IndexConfig) -> Self {
        Self {
            store,
            collection: collection.into(),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Index a document: one posting per fingerprint plus the document
    /// record, committed as a single atomic batch.
    ///
    /// Re-indexing an existing id overwrites the document record but does
    /// not retract postings from the previous indexing; stale postings
    /// accumulate in the posting lists.
    pub fn index_document(
        &self,
        id: &str,
        meta: &HashMap<String, String>,
        text: &str,
    ) -> Result<()> {
        let tokens = tokenize(text);
        let fingerprints = ngrams(&tokens, &self.config.ngram);

        let mut ops: Vec<WriteOp> = Vec::with_capacity(fingerprints.len() + 1);
        for fp in &fingerprints {
            ops.push(WriteOp::SortedSetAdd {
                key: self.collection.clone(),
                score: fp.id,
                member: encode_posting(id, fp.offset, fp.length),
            });
        }
        let mut fields = Vec::with_capacity(meta.len() + 1);
        fields.push((TEXT_FIELD.to_string(), text.to_string()));
        fields.extend(meta.iter().map(|(k, v)| (k.clone(), v.clone())));
        ops.push(WriteOp::HashFieldsSet {
            key: doc_key(id),
            fields,
        });

        self.store.atomic_batch(ops)?;
        tracing::debug!(doc_id = id, fingerprints = fingerprints.len(), "indexed document");
        Ok(())
    }

    /// Search for word runs resembling the query phrase.
    ///
    /// Returns one [`HitSequence`] per contiguous run of posting hits (same
    /// document, each hit overlapping the previous or within
    /// `gap_threshold` characters of it), scored by the fraction of query
    /// fingerprints the run satisfied and ordered by score descending.
    /// Queries too short to produce a fingerprint, or sharing none with the
    /// corpus, return an empty vector.
    pub fn search_phrase(&self, text: &str) -> Result<Vec<HitSequence>> {
        let tokens = tokenize(text);
        let fingerprints = ngrams(&tokens, &self.config.ngram);
        // Score denominator counts duplicates: a repeated query trigram must
        // be matched again to reach 100.
        let total = fingerprints.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        // One store lookup per distinct fingerprint id, first occurrence wins.
        let mut seen = HashSet::new();
        let unique: Vec<&Fingerprint> = fingerprints.iter().filter(|f| seen.insert(f.id)).collect();
        let ids: Vec<u32> = unique.iter().map(|f| f.id).collect();

        let lists = self
            .store
            .sorted_set_multi_range_by_score(&self.collection, &ids)?;

        let mut hits: Vec<Hit> = Vec::new();
        for (fp, members) in unique.iter().zip(&lists) {
            if !members.is_empty() {
                tracing::trace!(fingerprint = fp.id, ngram = %fp.text, matches = members.len(), "fingerprint matched");
            }
            for raw in members {
                let (doc_id, offset_start, length) = parse_posting(raw)?;
                hits.push(Hit {
                    doc_id,
                    offset_start,
                    offset_end: offset_start + length,
                });
            }
        }
        if hits.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(
            query_fingerprints = total,
            distinct = ids.len(),
            raw_hits = hits.len(),
            "resolved postings"
        );

        hits.sort_by(|a, b| {
            a.doc_id
                .cmp(&b.doc_id)
                .then(a.offset_start.cmp(&b.offset_start))
        });

        let mut sequences = Vec::new();
        let mut hits = hits.into_iter();
        let mut current = match hits.next() {
            Some(first) => vec![first],
            None => return Ok(Vec::new()),
        };
        for curr in hits {
            let last = &current[current.len() - 1];
            if self.extends(last, &curr) {
                current.push(curr);
            } else {
                sequences.push(close_sequence(&current, total));
                current = vec![curr];
            }
        }
        sequences.push(close_sequence(&current, total));

        // Stable sort keeps document order for equal scores.
        sequences.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(sequences)
    }

    /// Whether `curr` extends the sequence ending at `last`: same document,
    /// overlapping or within the gap threshold, and strictly growing the
    /// sequence's end boundary (a hit enclosed in the previous one never
    /// extends). The overlap test runs first so the gap subtraction cannot
    /// underflow.
    fn extends(&self, last: &Hit, curr: &Hit) -> bool {
        last.doc_id == curr.doc_id
            && (last.offset_end > curr.offset_start
                || curr.offset_start - last.offset_end < self.config.gap_threshold)
            && last.offset_end < curr.offset_end
    }

    /// Extract a bounded snippet of document text around a matched span.
    /// Offsets are character positions; the snippet is truncated gracefully
    /// at both ends of the document. Fails with
    /// [`SearchError::DocumentNotFound`] if the document record is absent.
    pub fn get_snippet(
        &self,
        doc_id: &str,
        offset_start: usize,
        offset_end: usize,
        context_length: usize,
    ) -> Result<Snippet> {
        let text = self
            .store
            .hash_field_get(&doc_key(doc_id), TEXT_FIELD)?
            .ok_or_else(|| SearchError::DocumentNotFound(doc_id.to_string()))?;

        // Left context is clamped at the document start; the right side is
        // not clamped, extraction just stops at end of text.
        let snippet_offset_start = offset_start.saturating_sub(context_length);
        let context_left = offset_start - snippet_offset_start;
        let match_length = offset_end.saturating_sub(offset_start);
        let snippet_length = match_length + context_left + context_length;

        let snippet_text: String = text
            .chars()
            .skip(snippet_offset_start)
            .take(snippet_length)
            .collect();

        Ok(Snippet {
            text: snippet_text,
            match_start: context_left,
            match_end: context_left + match_length,
        })
    }
}

fn close_sequence(group: &[Hit], total_fingerprints: usize) -> HitSequence {
    let first = &group[0];
    let last = &group[group.len() - 1];
    HitSequence {
        doc_id: first.doc_id.clone(),
        score: round2(group.len() as f64 / total_fingerprints as f64 * 100.0),
        offset_start: first.offset_start,
        offset_end: last.offset_end,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn doc_key(id: &str) -> String {
    format!("doc_{id}")
}

/// Wire format of one posting: `{doc_id}-{offset_start}-{length}`.
fn encode_posting(doc_id: &str, offset_start: usize, length: usize) -> String {
    format!("{doc_id}-{offset_start}-{length}")
}

/// Parse a posting string back into (doc_id, offset_start, length).
///
/// Splits from the right: the two numeric fields can never contain the
/// delimiter, so document ids that do still round-trip.
fn parse_posting(raw: &str) -> Result<(String, usize, usize)> {
    let malformed = || SearchError::MalformedPosting(raw.to_string());
    let mut parts = raw.rsplitn(3, '-');
    let length: usize = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(malformed)?;
    let offset_start: usize = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(malformed)?;
    let doc_id = parts.next().filter(|p| !p.is_empty()).ok_or_else(malformed)?;
    Ok((doc_id.to_string(), offset_start, length))
}
