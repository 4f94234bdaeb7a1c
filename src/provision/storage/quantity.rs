//! Kubernetes resource quantity parsing
//!
//! Storage sizes arrive as quantity strings ("10Gi", "500M", "1073741824").
//! Comparing and summing them requires a byte value; formatting goes back to
//! the largest binary suffix that divides evenly so generated PVC specs stay
//! readable.

use crate::error::{Result, WorkspaceError};

const BINARY_SUFFIXES: &[(&str, u64)] = &[
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
    ("Ei", 1 << 60),
];

const DECIMAL_SUFFIXES: &[(&str, u64)] = &[
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
    ("E", 1_000_000_000_000_000_000),
];

/// Parse a quantity string into bytes. Fractional values round up, matching
/// apiserver semantics for storage requests.
pub fn parse_quantity(input: &str) -> Result<u64> {
    let input = input.trim();
    if input.is_empty() {
        return Err(WorkspaceError::fail("storage quantity must not be empty"));
    }

    let (number, multiplier) = split_suffix(input);
    let value: f64 = number.parse().map_err(|_| {
        WorkspaceError::fail(format!("invalid storage quantity '{input}'"))
    })?;
    if value < 0.0 {
        return Err(WorkspaceError::fail(format!(
            "storage quantity '{input}' must not be negative"
        )));
    }
    Ok((value * multiplier as f64).ceil() as u64)
}

fn split_suffix(input: &str) -> (&str, u64) {
    for (suffix, multiplier) in BINARY_SUFFIXES {
        if let Some(number) = input.strip_suffix(suffix) {
            return (number, *multiplier);
        }
    }
    for (suffix, multiplier) in DECIMAL_SUFFIXES {
        if let Some(number) = input.strip_suffix(suffix) {
            return (number, *multiplier);
        }
    }
    (input, 1)
}

/// Render bytes with the largest binary suffix that divides evenly
pub fn format_quantity(bytes: u64) -> String {
    for (suffix, multiplier) in BINARY_SUFFIXES.iter().rev() {
        if bytes >= *multiplier && bytes % multiplier == 0 {
            return format!("{}{suffix}", bytes / multiplier);
        }
    }
    bytes.to_string()
}
