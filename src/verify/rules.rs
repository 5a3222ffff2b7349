//! Validation rules for virtual paths and request arguments.
//!
//! Pure functions with no I/O or side effects.

use crate::error::{Result, TxfsError};

const MAX_COMPONENT_LENGTH: usize = 255;

/// Validates one component of a virtual path.
///
/// ## Rules
/// - Not `.` or `..` (no traversal out of the store)
/// - No NUL bytes or backslashes
/// - At most 255 bytes
/// - Windows: No reserved names (CON, PRN, etc.)
/// - Windows: No invalid chars (`<>:"|?*`)
pub fn validate_component(component: &str, full_path: &str) -> Result<()> {
    if component == "." || component == ".." {
        return Err(TxfsError::InvalidPath(
            full_path.to_string(),
            format!("cannot use '.' or '..' (found '{}')", component),
        ));
    }

    if component.contains('\0') || component.contains('\\') {
        return Err(TxfsError::InvalidPath(
            full_path.to_string(),
            format!("'{}' contains a NUL byte or backslash", component),
        ));
    }

    if component.len() > MAX_COMPONENT_LENGTH {
        return Err(TxfsError::InvalidPath(
            full_path.to_string(),
            format!(
                "component exceeds {} bytes (has {})",
                MAX_COMPONENT_LENGTH,
                component.len()
            ),
        ));
    }

    #[cfg(windows)]
    {
        validate_windows_component(component, full_path)?;
    }

    Ok(())
}

#[cfg(windows)]
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[cfg(windows)]
fn validate_windows_component(component: &str, full_path: &str) -> Result<()> {
    const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

    let base = component.split('.').next().unwrap_or(component).to_uppercase();
    if WINDOWS_RESERVED_NAMES.contains(&base.as_str()) {
        return Err(TxfsError::InvalidPath(
            full_path.to_string(),
            format!("'{}' is Windows reserved name", component),
        ));
    }

    if let Some(ch) = INVALID_CHARS.iter().find(|&&ch| component.contains(ch)) {
        return Err(TxfsError::InvalidPath(
            full_path.to_string(),
            format!("'{}' contains invalid char '{}'", component, ch),
        ));
    }

    Ok(())
}

/// Validates a caller-supplied byte offset.
///
/// Remote callers speak signed 64-bit offsets; the engine works in `u64`.
pub fn validate_offset(offset: i64) -> Result<u64> {
    u64::try_from(offset).map_err(|_| {
        TxfsError::IllegalOperation(format!("offset must not be negative (got {})", offset))
    })
}

/// Validates a read range and returns its exclusive end.
pub fn validate_range(offset: u64, length: u64) -> Result<u64> {
    offset.checked_add(length).ok_or_else(|| {
        TxfsError::IllegalOperation(format!(
            "range {}+{} overflows a 64-bit offset",
            offset, length
        ))
    })
}

/// Validates a write range against the largest offset a file can have.
///
/// Seeks take a signed 64-bit position, so the end of the write must fit in
/// `i64` for replay to place it.
pub fn validate_write_range(offset: u64, length: u64) -> Result<u64> {
    let end = validate_range(offset, length)?;
    if end > i64::MAX as u64 {
        return Err(TxfsError::IllegalOperation(format!(
            "write of {} bytes at offset {} ends past the largest file offset",
            length, offset
        )));
    }
    Ok(end)
}
