use crate::TransferError;

/// Validates a blob name before it is joined onto a local directory.
///
/// Blob names are `/`-separated. A name is rejected when it is empty, starts
/// with `/`, contains a backslash, has an empty, `.` or `..` segment, or
/// starts with a drive-like segment (`C:`), so that the joined path can never
/// leave the destination on any platform.
pub fn validate_relative_path(name: &str) -> Result<(), TransferError> {
    let reject = |reason: &str| Err(TransferError::InvalidPath(format!("{reason}: {name}")));

    if name.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }
    if name.starts_with('/') {
        return reject("absolute path not allowed");
    }
    if name.contains('\\') {
        return reject("backslash not allowed");
    }

    for (i, segment) in name.split('/').enumerate() {
        match segment {
            "" => return reject("empty path segment"),
            "." | ".." => return reject("relative segment not allowed"),
            s if i == 0 && s.ends_with(':') => return reject("path prefix not allowed"),
            _ => {}
        }
    }
    Ok(())
}
