//! DOS-path -> host-path translation (spec.md §4.4, §9).
//!
//! A pure function from (DOS path, configured root, case-fold policy) to a
//! host path. No global state, no caching — spec.md §9 calls this out
//! explicitly as a design note, and the front end (out of scope) is the
//! thing that actually decides what the configured root is.

use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseFold {
    /// leave path components as the guest wrote them
    None,
    /// fold to lowercase before joining to the host root
    Lower,
    /// fold to uppercase before joining to the host root
    Upper,
}

/// Translates a DOS-form path (`C:\DIR\FILE.EXT` or `/DIR/FILE.EXT`) into a
/// host path rooted at `root`. The optional drive letter is stripped; `\`
/// and `/` are both treated as separators.
pub fn dos_to_host(dos_path: &str, root: &std::path::Path, fold: CaseFold) -> PathBuf {
    let mut rest = dos_path;
    if rest.len() >= 2 && rest.as_bytes()[1] == b':' {
        rest = &rest[2..];
    }

    let mut out = root.to_path_buf();
    for part in rest.split(|c| c == '\\' || c == '/') {
        if part.is_empty() || part == "." {
            continue;
        }
        let part = match fold {
            CaseFold::None => part.to_string(),
            CaseFold::Lower => part.to_lowercase(),
            CaseFold::Upper => part.to_uppercase(),
        };
        out.push(part);
    }
    out
}

#[cfg(test)]
#[path = "./path_test.rs"]
mod path_test;
