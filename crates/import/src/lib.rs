//! Statement text to categorized transactions.
//!
//! Lines from the extractor flow through [`RecordTokenizer`] into blocks,
//! [`resolve_blocks`] assigns their amounts to columns, and [`Classifier`]
//! labels them.

pub mod classify;
pub mod config;
pub mod fields;
pub mod rules;
pub mod tokenizer;
pub(crate) mod util;

pub use classify::{Classified, Classifier};
pub use config::ParserConfig;
pub use fields::{resolve_blocks, resolve_fields, RawTransaction, ResolvedFields};
pub use rules::{default_subcategory_rules, CategoryOverride, MatchType, SubcategoryEngine, SubcategoryRule};
pub use tokenizer::{match_anchor, Anchor, RecordTokenizer, Tokenized, TransactionBlock};
