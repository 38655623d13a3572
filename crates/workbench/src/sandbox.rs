//! Path validation for workbench files.
//!
//! Workbench areas are flat: every file lives directly under `published/`,
//! `draft/` or a staging area. A path that names anything else is rejected
//! before it reaches the filesystem.

use std::path::{Component, Path};

use workshop_core::error::StoreError;
use workshop_core::store::FileKind;

/// Validate a flat workbench file name.
///
/// Traversal and absolute paths are sandbox violations; empty names and
/// nested paths are plain invalid input.
pub fn validate_flat_path(path: &str) -> Result<&str, StoreError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidPath("path is empty".into()));
    }

    let normalized = trimmed.replace('\\', "/");
    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return Err(StoreError::SandboxViolation(format!(
            "absolute path not allowed: {path}"
        )));
    }
    if normalized.split('/').any(|segment| segment == "..") {
        return Err(StoreError::SandboxViolation(format!(
            "path traversal detected in '{path}'"
        )));
    }
    if normalized.contains('/') {
        return Err(StoreError::InvalidPath(format!(
            "nested paths are not supported: {path}"
        )));
    }
    if trimmed == "." {
        return Err(StoreError::InvalidPath(format!("invalid file name: {path}")));
    }

    // Belt check on what std thinks the path is.
    let mut components = Path::new(trimmed).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(trimmed),
        _ => Err(StoreError::InvalidPath(format!("invalid file name: {path}"))),
    }
}

/// Validate a path that will be written as text.
pub fn validate_text_write(path: &str) -> Result<&str, StoreError> {
    let name = validate_flat_path(path)?;
    if FileKind::for_path(name) != FileKind::Text {
        return Err(StoreError::Unsupported(format!(
            "{name} is not a writable text file"
        )));
    }
    Ok(name)
}

/// Reduce a model-supplied name to its final path segment.
pub fn base_name(path: &str) -> String {
    path.trim()
        .replace('\\', "/")
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_flat_names() {
        assert_eq!(validate_flat_path("report.docx").unwrap(), "report.docx");
        assert_eq!(validate_flat_path("  notes.md ").unwrap(), "notes.md");
    }

    #[test]
    fn rejects_traversal_as_sandbox_violation() {
        assert!(matches!(
            validate_flat_path("../secrets.txt"),
            Err(StoreError::SandboxViolation(_))
        ));
        assert!(matches!(
            validate_flat_path("a/../../b.txt"),
            Err(StoreError::SandboxViolation(_))
        ));
        assert!(matches!(
            validate_flat_path(".."),
            Err(StoreError::SandboxViolation(_))
        ));
    }

    #[test]
    fn rejects_absolute_paths() {
        assert!(matches!(
            validate_flat_path("/etc/passwd"),
            Err(StoreError::SandboxViolation(_))
        ));
        assert!(matches!(
            validate_flat_path("C:\\Windows\\win.ini"),
            Err(StoreError::SandboxViolation(_))
        ));
    }

    #[test]
    fn rejects_empty_and_nested() {
        assert!(matches!(validate_flat_path(""), Err(StoreError::InvalidPath(_))));
        assert!(matches!(
            validate_flat_path("dir/file.txt"),
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn text_write_rejects_office_kinds() {
        assert!(validate_text_write("data.csv").is_ok());
        assert!(matches!(
            validate_text_write("book.xlsx"),
            Err(StoreError::Unsupported(_))
        ));
    }

    #[test]
    fn base_name_strips_directories() {
        assert_eq!(base_name("out/sub/report.md"), "report.md");
        assert_eq!(base_name("C:\\tmp\\a.txt"), "a.txt");
        assert_eq!(base_name("plain.txt"), "plain.txt");
    }
}
