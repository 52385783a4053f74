pub mod backend;
pub mod extract;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixture;
pub mod hash;
mod layout;
pub mod password;

pub use backend::{LopdfBackend, MockPage, MockPdfBackend, OpenError, PageError, PdfBackend, StatementPages};
pub use extract::{ExtractError, Extraction, LineRecord, PageText, TextExtractor};
pub use hash::{document_id, sha256_bytes, to_hex};
pub use password::{
    DecryptError, FilenamePattern, PasswordCorpus, PasswordPolicy, PasswordResolver,
    PasswordSource, Unlocked,
};
