//! Custom `format` checkers
//!
//! Unknown format names are accepted, matching JSON Schema's treatment of
//! formats a validator does not implement.

use serde_json::Value as JsonValue;

fn is_lowercase_hex(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn is_address_with(value: &str, prefixes: &[&str]) -> bool {
    value.len() == 42
        && prefixes.iter().any(|p| value.starts_with(p))
        && value.get(2..).is_some_and(is_lowercase_hex)
}

fn check_int_10(value: &str) -> bool {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix('-')
        .or_else(|| trimmed.strip_prefix('+'))
        .unwrap_or(trimmed);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn check_int_16(value: &str) -> bool {
    value.strip_prefix("0x").is_some_and(is_lowercase_hex)
}

fn check_hash(value: &str) -> bool {
    value.len() == 66 && check_int_16(value)
}

fn check_hash_v2(value: &str) -> bool {
    value.len() == 64 && is_lowercase_hex(value)
}

fn check_binary_data(value: &str) -> bool {
    value.len() % 2 == 0 && check_int_16(value)
}

/// Check `instance` against the named format
pub fn check_format(format: &str, instance: &JsonValue) -> bool {
    let Some(value) = instance.as_str() else {
        return !is_known(format);
    };

    match format {
        "address" => is_address_with(value, &["hx", "cx"]),
        "address_eoa" => is_address_with(value, &["hx"]),
        "address_score" => is_address_with(value, &["cx"]),
        "int_10" => check_int_10(value),
        "int_16" => check_int_16(value),
        "hash" | "hash_hex_0x" => check_hash(value),
        "hash_v2" | "hash_hex_without_0x" => check_hash_v2(value),
        "binary_data" => check_binary_data(value),
        _ => true,
    }
}

fn is_known(format: &str) -> bool {
    matches!(
        format,
        "address"
            | "address_eoa"
            | "address_score"
            | "int_10"
            | "int_16"
            | "hash"
            | "hash_hex_0x"
            | "hash_v2"
            | "hash_hex_without_0x"
            | "binary_data"
    )
}
