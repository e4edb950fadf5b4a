use std::path::{Path, PathBuf};

use ragdex_core::RagdexError;

/// Maximum document size to index (10 MB).
const MAX_FILE_SIZE: u64 = 10 * 1_048_576;

/// Number of bytes to check for binary detection.
const BINARY_CHECK_SIZE: usize = 8192;

/// File extensions treated as indexable text.
const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// A loaded text document, ready to be chunked.
///
/// # Examples
///
/// ```
/// use ragdex_chunker::Document;
///
/// let doc = Document::from_text("notes/todo.md", "# Todo\n\nBuy milk.");
/// assert_eq!(doc.doc_id, "todo");
/// assert_eq!(doc.section, "Todo");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File stem of the source path.
    pub doc_id: String,
    /// Path the document was read from.
    pub source_path: String,
    /// First-line heading (without leading `#`), or empty.
    pub section: String,
    /// Full document text.
    pub text: String,
}

impl Document {
    /// Build a document from its path and already-loaded text.
    pub fn from_text(path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        let path = path.as_ref();
        let text = text.into();
        let doc_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let section = heading(&text).unwrap_or_default().to_string();

        Self {
            doc_id,
            source_path: path.display().to_string(),
            section,
            text,
        }
    }
}

/// The first non-blank line, if it is a Markdown heading.
fn heading(text: &str) -> Option<&str> {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let title = first.strip_prefix('#')?.trim_start_matches('#').trim();
    (!title.is_empty()).then_some(title)
}

/// Read a single document from disk.
///
/// # Errors
///
/// Returns [`RagdexError::FileNotFound`] if the path does not exist,
/// [`RagdexError::InvalidInput`] for binary or non-UTF-8 content, and
/// [`RagdexError::Io`] for other read failures.
pub fn load_document(path: &Path) -> Result<Document, RagdexError> {
    if !path.exists() {
        return Err(RagdexError::FileNotFound(path.to_path_buf()));
    }

    let bytes = std::fs::read(path)?;
    let check_len = bytes.len().min(BINARY_CHECK_SIZE);
    if bytes[..check_len].contains(&0) {
        return Err(RagdexError::InvalidInput(format!(
            "{} looks like a binary file",
            path.display()
        )));
    }

    let text = String::from_utf8(bytes).map_err(|_| {
        RagdexError::InvalidInput(format!("{} is not valid UTF-8 text", path.display()))
    })?;

    Ok(Document::from_text(path, text))
}

/// Find indexable documents under `root`, respecting `.gitignore`.
///
/// A file path is returned as-is. For directories, `.md`, `.markdown` and
/// `.txt` files up to 10 MB are collected and returned in sorted order so that
/// builds are reproducible.
///
/// # Errors
///
/// Returns [`RagdexError::FileNotFound`] if `root` does not exist.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use ragdex_chunker::discover_documents;
///
/// for path in discover_documents(Path::new("docs")).unwrap() {
///     println!("{}", path.display());
/// }
/// ```
pub fn discover_documents(root: &Path) -> Result<Vec<PathBuf>, RagdexError> {
    if !root.exists() {
        return Err(RagdexError::FileNotFound(root.to_path_buf()));
    }
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let walker = ignore::WalkBuilder::new(root).build();
    let mut paths = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();
        let is_doc = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| DOC_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
        if !is_doc {
            continue;
        }

        match std::fs::metadata(path) {
            Ok(m) if m.len() <= MAX_FILE_SIZE => paths.push(path.to_path_buf()),
            Ok(_) => tracing::warn!(path = %path.display(), "skipping document larger than 10 MB"),
            Err(_) => continue,
        }
    }

    paths.sort();
    Ok(paths)
}
