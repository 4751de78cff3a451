use crate::error::{OcflError, Result};

/// Maps a logical path to the partial content path stored under a
/// version's content directory. The mapping only transforms characters;
/// structure (the `/` separators) is preserved.
pub trait LogicalPathMapper: Send + Sync {
    fn to_content_path_part(&self, logical_path: &str) -> String;
}

/// Uses the logical path as-is. The default on POSIX filesystems.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectLogicalPathMapper;

impl LogicalPathMapper for DirectLogicalPathMapper {
    fn to_content_path_part(&self, logical_path: &str) -> String {
        logical_path.to_string()
    }
}

/// Percent-encodes characters that cannot appear in Windows filenames,
/// plus `%` itself so the mapping is unambiguous.
#[derive(Clone, Copy, Debug, Default)]
pub struct PercentEncodingPathMapper;

impl PercentEncodingPathMapper {
    fn must_encode(ch: char) -> bool {
        matches!(ch, '<' | '>' | ':' | '"' | '\\' | '|' | '?' | '*' | '%')
            || (ch as u32) < 0x20
    }
}

impl LogicalPathMapper for PercentEncodingPathMapper {
    fn to_content_path_part(&self, logical_path: &str) -> String {
        let mut out = String::with_capacity(logical_path.len());
        for ch in logical_path.chars() {
            if Self::must_encode(ch) {
                out.push_str(&format!("%{:02x}", ch as u32));
            } else {
                out.push(ch);
            }
        }
        out
    }
}

/// Rejects malformed logical paths before any bytes are written: empty
/// paths, leading/trailing separators, empty segments, and `.`/`..`.
pub fn validate_logical_path(path: &str) -> Result<()> {
    let fail = |reason: &str| {
        Err(OcflError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        })
    };
    if path.is_empty() {
        return fail("path is empty");
    }
    if path.starts_with('/') || path.ends_with('/') {
        return fail("path must not begin or end with /");
    }
    for segment in path.split('/') {
        if segment.is_empty() {
            return fail("path contains an empty segment");
        }
        if segment == "." || segment == ".." {
            return fail("path contains a relative segment");
        }
    }
    Ok(())
}

/// Windows filename rules, applied per segment.
const WINDOWS_RESERVED: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Content-path constraint profiles, applied to the full content path
/// before any bytes land in staging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContentPathConstraints {
    /// No constraints beyond structural well-formedness.
    #[default]
    None,
    /// Paths must also be legal on Windows filesystems.
    Windows,
}

impl ContentPathConstraints {
    pub fn apply(&self, content_path: &str) -> Result<()> {
        validate_logical_path(content_path)?;
        if *self == Self::None {
            return Ok(());
        }

        let fail = |reason: String| {
            Err(OcflError::InvalidPath {
                path: content_path.to_string(),
                reason,
            })
        };
        for segment in content_path.split('/') {
            if segment.len() > 255 {
                return fail(format!("segment exceeds 255 bytes: {segment}"));
            }
            if segment.ends_with('.') || segment.ends_with(' ') {
                return fail(format!("segment may not end with '.' or ' ': {segment}"));
            }
            for ch in segment.chars() {
                if matches!(ch, '<' | '>' | ':' | '"' | '\\' | '|' | '?' | '*')
                    || (ch as u32) < 0x20
                {
                    return fail(format!("illegal character {ch:?} in segment {segment}"));
                }
            }
            let stem = segment.split('.').next().unwrap_or(segment);
            if WINDOWS_RESERVED
                .iter()
                .any(|r| r.eq_ignore_ascii_case(stem))
            {
                return fail(format!("reserved name: {segment}"));
            }
        }
        Ok(())
    }
}
