use std::path::{Path, PathBuf};

use mledger_pdf::PasswordCorpus;

/// Build a corpus from a directory of `*.txt` files, one password per line.
///
/// Files are read in name order and contribute every non-empty trimmed line
/// to the ordered scan. `<stem>.txt` also pins its first password to the
/// statement whose file stem is `<stem>`.
pub fn load_corpus(dir: &Path) -> std::io::Result<PasswordCorpus> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|x| x.eq_ignore_ascii_case("txt")))
        .collect();
    files.sort();

    let mut corpus = PasswordCorpus::default();
    for path in files {
        let content = std::fs::read_to_string(&path)?;
        let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();
        if let (Some(stem), Some(first)) = (path.file_stem().and_then(|s| s.to_str()), lines.peek()) {
            corpus.by_filename.insert(stem.to_string(), first.to_string());
        }
        corpus.passwords.extend(lines.map(String::from));
    }

    tracing::debug!(
        dir = %dir.display(),
        passwords = corpus.passwords.len(),
        pinned = corpus.by_filename.len(),
        "password corpus loaded"
    );
    Ok(corpus)
}
