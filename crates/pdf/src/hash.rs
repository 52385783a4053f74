use sha2::{Digest, Sha256};

/// Compute SHA-256 of an in-memory byte slice.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Encode a raw 32-byte hash as a lowercase hex string (64 chars).
pub fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// Identifier carried by every per-document result and failure.
/// Layout: `<file name>@<first 12 hex chars>`, or the full digest when unnamed.
pub fn document_id(file_name: Option<&str>, bytes: &[u8]) -> String {
    let hex = to_hex(&sha256_bytes(bytes));
    match file_name {
        Some(name) => format!("{name}@{}", &hex[..12]),
        None => hex,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_bytes_known_vector() {
        let hex = to_hex(&sha256_bytes(b""));
        assert_eq!(
            hex,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn document_id_is_deterministic() {
        assert_eq!(document_id(None, b"pdf"), document_id(None, b"pdf"));
        assert_ne!(document_id(None, b"pdf"), document_id(None, b"other"));
        assert_eq!(document_id(None, b"pdf").len(), 64);
    }

    #[test]
    fn document_id_prefixes_file_name() {
        let id = document_id(Some("jan.pdf"), b"");
        assert_eq!(id, "jan.pdf@e3b0c44298fc");
    }
}
