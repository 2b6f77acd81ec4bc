use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental edit primitive: a byte-span replacement with verification.
///
/// Every matcher, rewriter and injector compiles down to a list of splices
/// computed against one immutable snapshot of the artifact. Intelligence lives
/// in span acquisition, not in application.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Splice does nothing until passed to apply_splices()"]
pub struct Splice {
    /// Starting byte offset (inclusive)
    pub start: usize,
    /// Ending byte offset (exclusive)
    pub end: usize,
    /// Text that replaces [start, end)
    pub replacement: String,
    /// What we expect to find at [start, end) before applying
    pub expected_before: Verification,
}

/// Verification strategy for splice safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (cheaper to carry for large spans)
    Hash(u64),
}

impl Verification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Verification::ExactMatch(expected) => text == expected,
            Verification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using a hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            Verification::Hash(xxh3_64(text.as_bytes()))
        } else {
            Verification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SpliceError {
    #[error("before-text verification failed at byte {start}")]
    BeforeTextMismatch { start: usize, end: usize },

    #[error("invalid byte range: [{start}, {end}) in text of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },

    #[error("overlapping splices: [{first_start}, {first_end}) and [{second_start}, {second_end})")]
    Overlap {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },

    #[error("splice boundary at byte {offset} is not a UTF-8 character boundary")]
    NotCharBoundary { offset: usize },
}

impl Splice {
    /// Replace [start, end) of `snapshot`, recording the current text for verification.
    pub fn replace(snapshot: &str, start: usize, end: usize, replacement: impl Into<String>) -> Self {
        let before = snapshot.get(start..end).unwrap_or_default();
        Self {
            start,
            end,
            replacement: replacement.into(),
            expected_before: Verification::from_text(before),
        }
    }

    /// Pure insertion at `offset`.
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self {
            start: offset,
            end: offset,
            replacement: text.into(),
            expected_before: Verification::ExactMatch(String::new()),
        }
    }

    fn validate(&self, text: &str) -> Result<(), SpliceError> {
        if self.start > self.end || self.end > text.len() {
            return Err(SpliceError::InvalidRange {
                start: self.start,
                end: self.end,
                len: text.len(),
            });
        }
        for offset in [self.start, self.end] {
            if !text.is_char_boundary(offset) {
                return Err(SpliceError::NotCharBoundary { offset });
            }
        }
        if !self.expected_before.matches(&text[self.start..self.end]) {
            return Err(SpliceError::BeforeTextMismatch {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

/// Apply splices computed against `text` in a single pass.
///
/// Splices are sorted by start descending and applied bottom-to-top, so an
/// edit never shifts the offsets of edits not yet applied. All splices are
/// validated before any is applied.
pub fn apply_splices(text: &str, mut splices: Vec<Splice>) -> Result<String, SpliceError> {
    if splices.is_empty() {
        return Ok(text.to_string());
    }

    splices.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));

    for splice in &splices {
        splice.validate(text)?;
    }

    // Sorted descending: the earlier splice must end at or before the later one starts.
    for window in splices.windows(2) {
        let (later, earlier) = (&window[0], &window[1]);
        if earlier.end > later.start {
            return Err(SpliceError::Overlap {
                first_start: earlier.start,
                first_end: earlier.end,
                second_start: later.start,
                second_end: later.end,
            });
        }
    }

    let growth: usize = splices.iter().map(|s| s.replacement.len()).sum();
    let mut out = text.to_string();
    out.reserve(growth);
    for splice in &splices {
        out.replace_range(splice.start..splice.end, &splice.replacement);
    }

    Ok(out)
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the file is left untouched. The original
/// file's permissions are carried over to the replacement.
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        )
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
