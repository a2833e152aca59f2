pub mod error;
pub mod index;
pub mod ngram;
pub mod store;
pub mod tokenizer;

pub use error::{Result, SearchError};
pub use index::{HitSequence, Index, IndexConfig, Snippet, DEFAULT_CONTEXT_LENGTH};
pub use ngram::{ngrams, Fingerprint, NgramConfig, NGRAM_HASH_SEED};
pub use store::{MemoryStore, PostingStore, SledStore, StoreError, WriteOp};
pub use tokenizer::{tokenize, Token};
