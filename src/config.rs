use crate::error::{NewlineError, Result};

/// Default in-memory line budget for a shuffle (64 MiB)
pub const DEFAULT_BUFFER_SIZE: u64 = 64 * 1024 * 1024;

/// How far a drained bucket may overshoot the budget before it is re-bucketed
pub const DEFAULT_SLACK: f64 = 1.5;

/// Maximum re-bucketing depth before giving up with `ResourceExhausted`
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Parse a byte size such as `4096`, `512K`, `64M`, `1G` or `2MiB`.
/// Suffixes are binary multiples and case-insensitive.
pub fn parse_byte_size(s: &str) -> Result<u64> {
    let trimmed = s.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| NewlineError::InvalidArgument(format!("byte size: {}", s)))?;

    let multiplier: u64 = match suffix.trim().to_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        _ => {
            return Err(NewlineError::InvalidArgument(format!(
                "byte size suffix: {}",
                s
            )))
        }
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| NewlineError::InvalidArgument(format!("byte size overflows: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_byte_size() {
        assert_eq!(parse_byte_size("4096").unwrap(), 4096);
        assert_eq!(parse_byte_size("512K").unwrap(), 512 * 1024);
        assert_eq!(parse_byte_size("64m").unwrap(), 64 * 1024 * 1024);
        assert_eq!(parse_byte_size("1GiB").unwrap(), 1 << 30);
        assert_eq!(parse_byte_size(" 2 MB ").unwrap(), 2 << 20);
        assert_eq!(parse_byte_size("0").unwrap(), 0);
    }

    #[test]
    fn test_parse_byte_size_rejects_garbage() {
        assert!(parse_byte_size("").is_err());
        assert!(parse_byte_size("M").is_err());
        assert!(parse_byte_size("12Q").is_err());
        assert!(parse_byte_size("99999999999T").is_err());
    }
}
