//! Content fingerprints for query text
//!
//! A fingerprint identifies the content-bearing part of a query. Directive
//! lines (`-- @name: ...` and friends) and surrounding whitespace are
//! stripped before hashing, so cosmetic edits do not change the fingerprint.

/// Line prefixes recognized as metadata directives
pub const DIRECTIVE_PREFIXES: &[&str] = &["-- @", "--@"];

/// Digest algorithm tag
pub const ALGORITHM: &str = "blake3";

/// Number of hex characters kept from the digest
pub const DIGEST_LEN: usize = 16;

/// Strip directive lines and surrounding whitespace
pub fn normalize(content: &str, directive_prefixes: &[&str]) -> String {
    let body: Vec<&str> = content
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !directive_prefixes
                .iter()
                .any(|prefix| trimmed.starts_with(prefix))
        })
        .collect();
    body.join("\n").trim().to_string()
}

/// Fingerprint with a custom set of directive prefixes
pub fn fingerprint_with(content: &str, directive_prefixes: &[&str]) -> String {
    let normalized = normalize(content, directive_prefixes);
    let hash = blake3::hash(normalized.as_bytes()).to_hex();
    format!("{ALGORITHM}:{}", &hash.as_str()[..DIGEST_LEN])
}

/// Fingerprint using the default directive prefixes
pub fn fingerprint(content: &str) -> String {
    fingerprint_with(content, DIRECTIVE_PREFIXES)
}
