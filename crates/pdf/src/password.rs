use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{OpenError, PdfBackend, StatementPages};

/// Ordered candidate passwords plus per-statement exact matches.
/// Supplied by the credential store; the resolver only reads it.
#[derive(Debug, Clone, Default)]
pub struct PasswordCorpus {
    pub passwords: Vec<String>,
    /// Statement file stem → password.
    pub by_filename: HashMap<String, String>,
}

impl PasswordCorpus {
    pub fn new(passwords: Vec<String>) -> Self {
        Self { passwords, by_filename: HashMap::new() }
    }

    pub fn with_filename(mut self, stem: impl Into<String>, password: impl Into<String>) -> Self {
        self.by_filename.insert(stem.into(), password.into());
        self
    }

    pub fn len(&self) -> usize {
        self.passwords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passwords.is_empty() && self.by_filename.is_empty()
    }
}

/// A filename regex mapped to the password statements matching it use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilenamePattern {
    pub pattern: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    /// Stop after this many distinct attempts.
    pub max_attempts: Option<usize>,
    pub patterns: Vec<FilenamePattern>,
    /// Tried last, after the corpus.
    pub defaults: Vec<String>,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            patterns: vec![],
            defaults: ["0000", "1234", "12345", "123456", "password"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Where a candidate password came from, in trial order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordSource {
    Supplied,
    NoPassword,
    Filename,
    Pattern,
    Corpus,
    BuiltIn,
}

impl fmt::Display for PasswordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordSource::Supplied => write!(f, "supplied"),
            PasswordSource::NoPassword => write!(f, "no password"),
            PasswordSource::Filename => write!(f, "filename match"),
            PasswordSource::Pattern => write!(f, "filename pattern"),
            PasswordSource::Corpus => write!(f, "corpus"),
            PasswordSource::BuiltIn => write!(f, "built-in default"),
        }
    }
}

/// Result of a single open attempt.
enum Attempt {
    Unlocked(Box<dyn StatementPages>),
    WrongPassword,
    Failed(OpenError),
}

impl From<Result<Box<dyn StatementPages>, OpenError>> for Attempt {
    fn from(r: Result<Box<dyn StatementPages>, OpenError>) -> Self {
        match r {
            Ok(pages) => Attempt::Unlocked(pages),
            Err(OpenError::WrongPassword) => Attempt::WrongPassword,
            Err(e) => Attempt::Failed(e),
        }
    }
}

pub struct Unlocked {
    pub pages: Box<dyn StatementPages>,
    pub source: PasswordSource,
    /// Password that opened the document; `None` when it was not encrypted
    /// or opened with the empty password.
    pub password: Option<String>,
    pub attempts: usize,
}

impl fmt::Debug for Unlocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unlocked")
            .field("source", &self.source)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("No password unlocked the document ({attempts} attempts)")]
    Exhausted { attempts: usize },
    #[error("Document could not be opened: {0}")]
    Open(#[source] OpenError),
}

impl DecryptError {
    pub fn attempts(&self) -> Option<usize> {
        match self {
            DecryptError::Exhausted { attempts } => Some(*attempts),
            DecryptError::Open(_) => None,
        }
    }
}

pub struct PasswordResolver<'a, B: PdfBackend + ?Sized> {
    backend: &'a B,
    max_attempts: Option<usize>,
    patterns: Vec<(Regex, &'a str)>,
    defaults: &'a [String],
}

impl<'a, B: PdfBackend + ?Sized> PasswordResolver<'a, B> {
    pub fn new(backend: &'a B, policy: &'a PasswordPolicy) -> Self {
        let patterns = policy
            .patterns
            .iter()
            .filter_map(|p| match Regex::new(&p.pattern) {
                Ok(re) => Some((re, p.password.as_str())),
                Err(e) => {
                    tracing::warn!(pattern = %p.pattern, error = %e, "ignoring invalid filename pattern");
                    None
                }
            })
            .collect();
        Self {
            backend,
            max_attempts: policy.max_attempts,
            patterns,
            defaults: &policy.defaults,
        }
    }

    /// Try candidates in order and stop at the first one that opens the document.
    /// The same password is never tried twice.
    pub fn resolve(
        &self,
        bytes: &[u8],
        file_name: Option<&str>,
        supplied: Option<&str>,
        corpus: &PasswordCorpus,
    ) -> Result<Unlocked, DecryptError> {
        let stem = file_name.and_then(|n| Path::new(n).file_stem()).and_then(|s| s.to_str());

        let candidates = supplied
            .map(|p| (PasswordSource::Supplied, Some(p)))
            .into_iter()
            .chain(std::iter::once((PasswordSource::NoPassword, None)))
            .chain(
                stem.and_then(|s| corpus.by_filename.get(s))
                    .map(|p| (PasswordSource::Filename, Some(p.as_str()))),
            )
            .chain(
                self.patterns
                    .iter()
                    .filter(move |(re, _)| file_name.is_some_and(|n| re.is_match(n)))
                    .map(|(_, p)| (PasswordSource::Pattern, Some(*p))),
            )
            .chain(corpus.passwords.iter().map(|p| (PasswordSource::Corpus, Some(p.as_str()))))
            .chain(self.defaults.iter().map(|p| (PasswordSource::BuiltIn, Some(p.as_str()))));

        let mut seen: HashSet<Option<&str>> = HashSet::new();
        let mut attempts = 0usize;

        for (source, password) in candidates {
            if !seen.insert(password) {
                continue;
            }
            if self.max_attempts.is_some_and(|max| attempts >= max) {
                tracing::debug!(attempts, "password attempt bound reached");
                break;
            }
            attempts += 1;

            match Attempt::from(self.backend.open(bytes, password)) {
                Attempt::Unlocked(pages) => {
                    let password = password
                        .filter(|_| pages.is_encrypted())
                        .map(str::to_string);
                    tracing::debug!(%source, attempts, "document opened");
                    return Ok(Unlocked { pages, source, password, attempts });
                }
                Attempt::WrongPassword => {
                    tracing::trace!(%source, attempt = attempts, "password rejected");
                }
                Attempt::Failed(e) => return Err(DecryptError::Open(e)),
            }
        }

        Err(DecryptError::Exhausted { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockPage, MockPdfBackend};

    fn policy() -> PasswordPolicy {
        PasswordPolicy {
            max_attempts: None,
            patterns: vec![FilenamePattern {
                pattern: r"^MPESA_Statement_2024".to_string(),
                password: "pattern-pw".to_string(),
            }],
            defaults: vec!["0000".to_string()],
        }
    }

    fn corpus() -> PasswordCorpus {
        PasswordCorpus::new(vec!["alpha".into(), "beta".into(), "gamma".into()])
    }

    fn doc(password: &str) -> MockPdfBackend {
        MockPdfBackend::locked(vec![MockPage::text("x")], password)
    }

    #[test]
    fn supplied_password_wins_first() {
        let backend = doc("beta");
        let policy = policy();
        let r = PasswordResolver::new(&backend, &policy)
            .resolve(b"", None, Some("beta"), &corpus())
            .unwrap();
        assert_eq!(r.source, PasswordSource::Supplied);
        assert_eq!(r.attempts, 1);
        assert_eq!(r.password.as_deref(), Some("beta"));
    }

    #[test]
    fn unencrypted_document_opens_without_password() {
        let backend = MockPdfBackend::new(vec![MockPage::text("x")]);
        let policy = policy();
        let r = PasswordResolver::new(&backend, &policy)
            .resolve(b"", None, None, &corpus())
            .unwrap();
        assert_eq!(r.source, PasswordSource::NoPassword);
        assert_eq!(r.password, None);
    }

    #[test]
    fn filename_match_precedes_patterns_and_corpus() {
        let backend = doc("by-name");
        let policy = policy();
        let corpus = corpus().with_filename("MPESA_Statement_2024_Jan", "by-name");
        let r = PasswordResolver::new(&backend, &policy)
            .resolve(b"", Some("MPESA_Statement_2024_Jan.pdf"), None, &corpus)
            .unwrap();
        assert_eq!(r.source, PasswordSource::Filename);
        assert_eq!(r.attempts, 2);
    }

    #[test]
    fn pattern_table_matches_filename() {
        let backend = doc("pattern-pw");
        let policy = policy();
        let r = PasswordResolver::new(&backend, &policy)
            .resolve(b"", Some("MPESA_Statement_2024_Feb.pdf"), None, &corpus())
            .unwrap();
        assert_eq!(r.source, PasswordSource::Pattern);
    }

    #[test]
    fn corpus_scan_stops_on_first_success() {
        let backend = doc("beta");
        let policy = policy();
        let r = PasswordResolver::new(&backend, &policy)
            .resolve(b"", Some("other.pdf"), None, &corpus())
            .unwrap();
        assert_eq!(r.source, PasswordSource::Corpus);
        // no-password, alpha, beta
        assert_eq!(r.attempts, 3);
        assert_eq!(backend.opens(), 3);
    }

    #[test]
    fn built_in_defaults_are_last_resort() {
        let backend = doc("0000");
        let policy = policy();
        let r = PasswordResolver::new(&backend, &policy)
            .resolve(b"", None, None, &corpus())
            .unwrap();
        assert_eq!(r.source, PasswordSource::BuiltIn);
        assert_eq!(r.attempts, 5);
    }

    #[test]
    fn exhaustion_reports_attempt_count() {
        let backend = doc("not-in-corpus");
        let policy = policy();
        let err = PasswordResolver::new(&backend, &policy)
            .resolve(b"", None, Some("wrong"), &corpus())
            .unwrap_err();
        // wrong, no-password, alpha, beta, gamma, 0000
        assert_eq!(err.attempts(), Some(6));
    }

    #[test]
    fn duplicates_are_tried_once() {
        let backend = doc("missing");
        let policy = policy();
        let corpus = PasswordCorpus::new(vec!["alpha".into(), "alpha".into(), "0000".into()]);
        let err = PasswordResolver::new(&backend, &policy)
            .resolve(b"", None, Some("alpha"), &corpus)
            .unwrap_err();
        // alpha, no-password, 0000
        assert_eq!(err.attempts(), Some(3));
        assert_eq!(backend.opens(), 3);
    }

    #[test]
    fn max_attempts_bounds_the_scan() {
        let backend = doc("gamma");
        let policy = PasswordPolicy { max_attempts: Some(2), ..policy() };
        let err = PasswordResolver::new(&backend, &policy)
            .resolve(b"", None, None, &corpus())
            .unwrap_err();
        assert_eq!(err.attempts(), Some(2));
        assert_eq!(backend.opens(), 2);
    }

    #[test]
    fn malformed_document_is_not_a_wrong_password() {
        let backend = MockPdfBackend::malformed();
        let policy = policy();
        let err = PasswordResolver::new(&backend, &policy)
            .resolve(b"", None, None, &corpus())
            .unwrap_err();
        assert!(matches!(err, DecryptError::Open(OpenError::Malformed(_))));
        assert_eq!(backend.opens(), 1);
    }

    #[test]
    fn invalid_pattern_is_skipped() {
        let backend = doc("alpha");
        let policy = PasswordPolicy {
            patterns: vec![FilenamePattern { pattern: "([".into(), password: "x".into() }],
            ..policy()
        };
        let r = PasswordResolver::new(&backend, &policy)
            .resolve(b"", Some("a.pdf"), None, &corpus())
            .unwrap();
        assert_eq!(r.source, PasswordSource::Corpus);
    }
}
