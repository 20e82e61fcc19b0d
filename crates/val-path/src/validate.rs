//! Validation functions for module and combined addresses.

use crate::{split_combined, PathError, SOURCE_PATH_SEPARATOR};

/// Maximum allowed module file path length.
const MAX_MODULE_FILE_PATH_LENGTH: usize = 1024;

/// Validate a module file path.
///
/// # Errors
///
/// Returns an error if:
/// - The path is empty
/// - The path does not start with `/`
/// - The path contains the `?p=` separator
/// - The path exceeds the maximum length (1024 characters)
///
/// # Example
///
/// ```
/// use val_path::validate_module_file_path;
///
/// validate_module_file_path("/content/blog.val.ts").unwrap();
/// validate_module_file_path("content/blog.val.ts").unwrap_err();
/// validate_module_file_path("").unwrap_err();
/// ```
pub fn validate_module_file_path(path: &str) -> Result<(), PathError> {
    if path.is_empty() {
        return Err(PathError::EmptyModulePath);
    }
    if !path.starts_with('/') {
        return Err(PathError::InvalidModulePath(path.to_string()));
    }
    if path.contains(SOURCE_PATH_SEPARATOR) {
        return Err(PathError::InvalidModulePath(path.to_string()));
    }
    if path.len() > MAX_MODULE_FILE_PATH_LENGTH {
        return Err(PathError::InvalidModulePath(path.to_string()));
    }
    Ok(())
}

/// Validate a combined address: both halves must be well formed.
///
/// # Example
///
/// ```
/// use val_path::validate_source_path;
///
/// validate_source_path(r#"/content/blog.val.ts?p="posts".0"#).unwrap();
/// validate_source_path(r#"?p="posts""#).unwrap_err();
/// validate_source_path(r#"/content/blog.val.ts?p=posts"#).unwrap_err();
/// ```
pub fn validate_source_path(path: &str) -> Result<(), PathError> {
    split_combined(path).map(|_| ())
}
