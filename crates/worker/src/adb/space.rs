//! Free-space reporting from a remote `df`.
//!
//! Toolbox `df` prints human-readable sizes with SI suffixes:
//!
//! ```text
//! Filesystem               Size     Used     Free   Blksize
//! /sdcard                 25.3G    10.1G    15.2G   4096
//! ```
//!
//! Toybox `df` prints the POSIX table in 1K blocks:
//!
//! ```text
//! Filesystem     1K-blocks    Used Available Use% Mounted on
//! /dev/fuse       26502256 9885184  16617072  38% /storage/emulated
//! ```

use std::sync::LazyLock;

use protocol::messages::FreeSpace;
use regex::Regex;

const SI_SUFFIXES: &str = "KMGTPEZY";

/// `[<filesystem>] <size> <used> <free> <blksize>`; some toolbox builds omit
/// the filesystem column.
static TOOLBOX_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?m)^(?:\S+[ \t]+)?",
        r"(?P<size>\d+(?:\.\d+)?[KMGTPEZY]?)[ \t]+",
        r"(?P<used>\d+(?:\.\d+)?[KMGTPEZY]?)[ \t]+",
        r"(?P<free>\d+(?:\.\d+)?[KMGTPEZY]?)[ \t]+",
        r"(?P<blksize>\d+)[ \t]*\r?$",
    ))
    .expect("toolbox df pattern is valid")
});

static POSIX_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?m)^\S+[ \t]+(?P<blocks>\d+)[ \t]+(?P<used>\d+)[ \t]+",
        r"(?P<available>\d+)[ \t]+\d+%[ \t]+\S",
    ))
    .expect("posix df pattern is valid")
});

/// Convert a `df` size such as `25.3G` to bytes. Suffixes are powers of
/// 1000; no suffix means bytes.
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let (number, multiplier) = match text.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => {
            let power = SI_SUFFIXES.find(c)? as u32 + 1;
            (&text[..text.len() - 1], 1000u64.checked_pow(power)?)
        }
        Some(_) => (text, 1),
        None => return None,
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole.checked_mul(multiplier);
    }

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let bytes = (value * multiplier as f64).round();
    if bytes > u64::MAX as f64 {
        return None;
    }
    Some(bytes as u64)
}

/// Find the first `df` row in either format and report its totals.
pub fn parse_free_space(output: &str) -> Option<FreeSpace> {
    if let Some(caps) = TOOLBOX_ROW.captures(output) {
        return Some(FreeSpace {
            total: parse_size(&caps["size"])?,
            available: parse_size(&caps["free"])?,
        });
    }

    let caps = POSIX_ROW.captures(output)?;
    let blocks: u64 = caps["blocks"].parse().ok()?;
    let available: u64 = caps["available"].parse().ok()?;
    Some(FreeSpace {
        total: blocks.checked_mul(1024)?,
        available: available.checked_mul(1024)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_suffixes() {
        assert_eq!(parse_size("1K"), Some(1000));
        assert_eq!(parse_size("2M"), Some(2_000_000));
        assert_eq!(parse_size("0"), Some(0));
        assert_eq!(parse_size("3G"), Some(3_000_000_000));
        assert_eq!(parse_size("1E"), Some(1_000_000_000_000_000_000));
    }

    #[test]
    fn test_parse_size_decimal() {
        assert_eq!(parse_size("25.3G"), Some(25_300_000_000));
        assert_eq!(parse_size("1.5K"), Some(1500));
    }

    #[test]
    fn test_parse_size_rejects_garbage_and_overflow() {
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("12Q"), None);
        assert_eq!(parse_size("abc"), None);
        assert_eq!(parse_size("1Z"), None);
        assert_eq!(parse_size("100000000Y"), None);
    }

    #[test]
    fn test_toolbox_df() {
        let output = "\
Filesystem               Size     Used     Free   Blksize
/sdcard                 25.3G    10.1G    15.2G   4096
";
        let space = parse_free_space(output).unwrap();
        assert_eq!(space.total, 25_300_000_000);
        assert_eq!(space.available, 15_200_000_000);
    }

    #[test]
    fn test_toolbox_df_plain_numbers() {
        let space = parse_free_space("/data 1000 400 600 4096\r\n").unwrap();
        assert_eq!(space.total, 1000);
        assert_eq!(space.available, 600);
    }

    #[test]
    fn test_toolbox_df_without_filesystem_column() {
        let space = parse_free_space("1K 0 2M 4096\n").unwrap();
        assert_eq!(space.total, 1000);
        assert_eq!(space.available, 2_000_000);
    }

    #[test]
    fn test_posix_df() {
        let output = "\
Filesystem     1K-blocks    Used Available Use% Mounted on
/dev/fuse       26502256 9885184  16617072  38% /storage/emulated
";
        let space = parse_free_space(output).unwrap();
        assert_eq!(space.total, 26_502_256 * 1024);
        assert_eq!(space.available, 16_617_072 * 1024);
    }

    #[test]
    fn test_no_matching_row() {
        assert!(parse_free_space("").is_none());
        assert!(parse_free_space("df: /nope: No such file or directory\n").is_none());
        assert!(parse_free_space("Filesystem Size Used Free Blksize\n").is_none());
    }
}
