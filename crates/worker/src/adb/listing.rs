//! Parsing of `ls -l -a` output into directory entries.
//!
//! Two `ls` implementations are in the wild on Android. The toolbox `ls` of
//! older releases prints no link count and omits the size of directories and
//! special files:
//!
//! ```text
//! drwxr-xr-x system   sdcard_rw          2023-01-01 00:00 Downloads
//! -rw-rw---- root     sdcard_rw     1024 2023-01-01 00:00 notes.txt
//! lrwxrwxrwx root     root               2023-01-01 00:00 sdcard -> /storage/self/primary
//! ```
//!
//! The toybox `ls` of Android 6+ adds a link count and always prints a size:
//!
//! ```text
//! drwxrwx--x 4 root sdcard_rw 4096 2023-01-01 00:00 Download
//! crw-rw-rw- 1 root root    1,   3 2023-01-01 00:00 null
//! ```
//!
//! The tokenizer finds the date column and reads the columns before it by
//! position, so both shapes parse. Anything else (`total` headers, error
//! text, blank lines) is rejected and skipped by the caller.

use std::sync::LazyLock;

use chrono::{Local, NaiveDateTime, TimeZone};
use protocol::{Entry, EntryKind};
use regex::Regex;
use url::Url;

use super::devices::DIRECTORY_MIME;
use super::permissions::{decode_permissions, entry_kind};
use crate::location;

static DATE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid"));

static TIME_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}$").expect("time pattern is valid"));

/// Separator between a symlink's name and its target.
const LINK_ARROW: &str = " -> ";

/// Most columns that can sit between the mode and the date:
/// links, owner, group, size.
const MAX_LEADING_COLUMNS: usize = 4;

/// One filesystem object on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Entry name, without any ` -> target` suffix.
    pub name: String,
    pub kind: EntryKind,
    /// Permission bits, including setuid/setgid/sticky.
    pub mode: u32,
    pub owner: String,
    pub group: String,
    /// Size in bytes; `None` for directories and special files.
    pub size: Option<u64>,
    /// Modification time in Unix epoch seconds, read as device-local time.
    pub modified: i64,
    /// Raw symlink target.
    pub link_target: Option<String>,
    /// Symlink target resolved on the same device.
    pub target_url: Option<Url>,
}

impl RemoteEntry {
    /// Convert to the wire entry, given the url of the listed directory.
    pub fn to_entry(&self, dir: &Url) -> Entry {
        Entry {
            mode: self.mode,
            owner: Some(self.owner.clone()),
            group: Some(self.group.clone()),
            size: self.size,
            modified: Some(self.modified),
            link_target: self.link_target.clone(),
            target_url: self.target_url.as_ref().map(Url::to_string),
            url: location::child_url(dir, &self.name).map(|u| u.to_string()),
            mime_type: self.kind.is_dir().then(|| DIRECTORY_MIME.to_string()),
            ..Entry::new(self.name.clone(), self.kind)
        }
    }

    /// `.` and `..` as printed by `ls -a`.
    pub fn is_self_or_parent(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// Whitespace tokenizer that can hand back the untouched rest of the line.
struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Tokens<'a> {
    fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    fn remainder(&self) -> &'a str {
        self.rest
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let trimmed = self.rest.trim_start();
        if trimmed.is_empty() {
            self.rest = trimmed;
            return None;
        }
        let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        let (token, rest) = trimmed.split_at(end);
        self.rest = rest;
        Some(token)
    }
}

/// Parse every line of `ls -l -a` output listed from `dir`.
pub fn parse_listing<'a>(output: &'a str, dir: &'a Url) -> impl Iterator<Item = RemoteEntry> + 'a {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(move |line| parse_line(line, dir))
}

/// Parse one long-listing line. `dir` is the url of the directory being
/// listed and is the base for relative symlink targets.
pub fn parse_line(line: &str, dir: &Url) -> Option<RemoteEntry> {
    let mut tokens = Tokens::new(line.trim_end());

    let mode_token = tokens.next()?;
    let mut mode_chars = mode_token.chars();
    let kind = entry_kind(mode_chars.next()?)?;
    let mode = decode_permissions(mode_chars.as_str());

    let mut leading: Vec<String> = Vec::with_capacity(MAX_LEADING_COLUMNS);
    let date = loop {
        let token = tokens.next()?;
        if DATE_TOKEN.is_match(token) {
            break token;
        }
        match leading.last_mut() {
            // `1, 3` device numbers are one column split by a space.
            Some(prev) if prev.ends_with(',') => prev.push_str(token),
            _ => leading.push(token.to_string()),
        }
        if leading.len() > MAX_LEADING_COLUMNS {
            return None;
        }
    };

    let time = tokens.next().filter(|t| TIME_TOKEN.is_match(t))?;
    let modified = local_timestamp(date, time)?;

    let (owner, group, size_column) = match leading.as_slice() {
        [owner, group] => (owner, group, None),
        [owner, group, size] => (owner, group, Some(size)),
        [links, owner, group, size] if links.parse::<u64>().is_ok() => (owner, group, Some(size)),
        _ => return None,
    };

    let size = match size_column {
        Some(column) if column.contains(',') => None,
        Some(column) => Some(column.parse::<u64>().ok()?),
        None => None,
    };
    let size = match kind {
        EntryKind::Regular | EntryKind::Symlink => size,
        _ => None,
    };

    let name_field = tokens.remainder().trim();
    if name_field.is_empty() {
        return None;
    }

    let (name, link_target) = match kind {
        EntryKind::Symlink => match name_field.rsplit_once(LINK_ARROW) {
            Some((name, target)) => (name.trim_end(), Some(target.trim())),
            None => (name_field, None),
        },
        _ => (name_field, None),
    };
    if name.is_empty() {
        return None;
    }

    let target_url = link_target.and_then(|target| location::resolve_link(dir, target));

    Some(RemoteEntry {
        name: name.to_string(),
        kind,
        mode,
        owner: owner.clone(),
        group: group.clone(),
        size,
        modified,
        link_target: link_target.map(str::to_string),
        target_url,
    })
}

/// Read `YYYY-MM-DD HH:MM` as device-local time.
///
/// Times that fall in a daylight-saving gap do not exist locally; they are
/// read as UTC rather than dropping the entry.
fn local_timestamp(date: &str, time: &str) -> Option<i64> {
    let stamp = format!("{} {}", date, time);
    let naive = NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M").ok()?;
    Some(match Local.from_local_datetime(&naive).earliest() {
        Some(local) => local.timestamp(),
        None => naive.and_utc().timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir() -> Url {
        Url::parse("adb://ABC123/sdcard").unwrap()
    }

    fn expected_time(stamp: &str) -> i64 {
        let naive = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M").unwrap();
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|t| t.timestamp())
            .unwrap_or_else(|| naive.and_utc().timestamp())
    }

    #[test]
    fn test_toolbox_directory_without_size() {
        let entry =
            parse_line("drwxr-xr-x system sdcard_rw 2023-01-01 00:00 Downloads ", &dir()).unwrap();

        assert_eq!(entry.kind, EntryKind::Directory);
        assert_eq!(entry.name, "Downloads");
        assert_eq!(entry.size, None);
        assert_eq!(entry.owner, "system");
        assert_eq!(entry.group, "sdcard_rw");
        assert_eq!(entry.mode, 0o755);
        assert_eq!(entry.modified, expected_time("2023-01-01 00:00"));
    }

    #[test]
    fn test_toolbox_regular_file_with_size() {
        let entry = parse_line(
            "-rw-rw---- root     sdcard_rw  1048576 2021-06-30 13:45 video.mp4",
            &dir(),
        )
        .unwrap();

        assert_eq!(entry.kind, EntryKind::Regular);
        assert_eq!(entry.size, Some(1_048_576));
        assert_eq!(entry.mode, 0o660);
        assert_eq!(entry.modified, expected_time("2021-06-30 13:45"));
    }

    #[test]
    fn test_toybox_line_with_link_count() {
        let entry = parse_line(
            "-rw-rw---- 1 u0_a123 media_rw 2048 2024-02-29 23:59 IMG_0001.jpg",
            &dir(),
        )
        .unwrap();

        assert_eq!(entry.name, "IMG_0001.jpg");
        assert_eq!(entry.owner, "u0_a123");
        assert_eq!(entry.group, "media_rw");
        assert_eq!(entry.size, Some(2048));
    }

    #[test]
    fn test_toybox_directory_size_is_dropped() {
        let entry =
            parse_line("drwxrwx--x 4 root sdcard_rw 4096 2023-01-01 00:00 Download", &dir())
                .unwrap();
        assert_eq!(entry.kind, EntryKind::Directory);
        assert_eq!(entry.size, None);
        assert_eq!(entry.mode, 0o771);
    }

    #[test]
    fn test_device_numbers_in_size_column() {
        let toybox =
            parse_line("crw-rw-rw- 1 root root 1,   3 2023-01-01 00:00 null", &dir()).unwrap();
        assert_eq!(toybox.kind, EntryKind::CharDevice);
        assert_eq!(toybox.owner, "root");
        assert_eq!(toybox.size, None);

        let toolbox =
            parse_line("brw------- root root 179,   0 2023-01-01 00:00 mmcblk0", &dir()).unwrap();
        assert_eq!(toolbox.kind, EntryKind::BlockDevice);
        assert_eq!(toolbox.name, "mmcblk0");
    }

    #[test]
    fn test_symlink_split() {
        let entry =
            parse_line("lrwxrwxrwx root root 2023-01-01 00:00 foo -> /sdcard/bar", &dir()).unwrap();

        assert_eq!(entry.kind, EntryKind::Symlink);
        assert_eq!(entry.name, "foo");
        assert_eq!(entry.link_target.as_deref(), Some("/sdcard/bar"));
        let target = entry.target_url.unwrap();
        assert_eq!(target.path(), "/sdcard/bar");
        assert_eq!(location::device_id(&target).as_deref(), Some("ABC123"));
    }

    #[test]
    fn test_symlink_splits_on_last_arrow() {
        let entry = parse_line(
            "lrwxrwxrwx root root 2023-01-01 00:00 a -> b -> /data/c",
            &dir(),
        )
        .unwrap();
        assert_eq!(entry.name, "a -> b");
        assert_eq!(entry.link_target.as_deref(), Some("/data/c"));
    }

    #[test]
    fn test_relative_symlink_resolves_against_listed_directory() {
        let entry = parse_line(
            "lrwxrwxrwx 1 root root 7 2023-01-01 00:00 latest -> ../DCIM",
            &dir(),
        )
        .unwrap();
        assert_eq!(entry.size, Some(7));
        assert_eq!(entry.target_url.unwrap().path(), "/DCIM");
    }

    #[test]
    fn test_arrow_in_regular_file_name_is_kept() {
        let entry = parse_line("-rw-r--r-- root root 3 2023-01-01 00:00 a -> b", &dir()).unwrap();
        assert_eq!(entry.name, "a -> b");
        assert_eq!(entry.link_target, None);
    }

    #[test]
    fn test_name_with_spaces() {
        let entry =
            parse_line("drwxrwx--x root sdcard_rw 2023-01-01 00:00 My Holiday Photos\r", &dir())
                .unwrap();
        assert_eq!(entry.name, "My Holiday Photos");
    }

    #[test]
    fn test_short_permission_string_decodes_to_zero() {
        let entry = parse_line("-rw-r root root 12 2023-01-01 00:00 odd", &dir()).unwrap();
        assert_eq!(entry.mode, 0);
        assert_eq!(entry.size, Some(12));
    }

    #[test]
    fn test_other_special_types() {
        let fifo = parse_line("prw-r--r-- root root 2023-01-01 00:00 pipe", &dir()).unwrap();
        assert_eq!(fifo.kind, EntryKind::Fifo);
        let socket = parse_line("srw-rw---- system system 2023-01-01 00:00 sock", &dir()).unwrap();
        assert_eq!(socket.kind, EntryKind::Socket);
    }

    #[test]
    fn test_noise_lines_rejected() {
        for line in [
            "total 48",
            "ls: /sdcard/nope: No such file or directory",
            "opendir failed, Permission denied",
            "error: device 'XYZ' not found",
            "",
            "-rw-r--r-- root root 2023-01-01 00:00",
            "xrw-r--r-- root root 2023-01-01 00:00 bad-type",
            "-rw-r--r-- root root 2023-13-45 00:00 bad-date",
            "-rw-r--r-- root root 2023-01-01 0000 bad-time",
            "-rw-r--r-- root root notanumber 2023-01-01 00:00 bad-size",
            "-rw-r--r-- a b c d e 2023-01-01 00:00 too-many-columns",
        ] {
            assert!(parse_line(line, &dir()).is_none(), "should reject {:?}", line);
        }
    }

    #[test]
    fn test_parse_listing_keeps_remote_order_and_skips_noise() {
        let output = "\
total 24
drwxrwx--x  2 root sdcard_rw 4096 2023-01-01 00:00 .
drwx--x--x  4 root sdcard_rw 4096 2023-01-01 00:00 ..
-rw-rw----  1 root sdcard_rw   10 2023-01-02 10:00 zeta.txt
garbage
drwxrwx--x  2 root sdcard_rw 4096 2023-01-03 11:00 Alpha
";
        let base = dir();
        let names: Vec<String> = parse_listing(output, &base).map(|e| e.name).collect();
        assert_eq!(names, [".", "..", "zeta.txt", "Alpha"]);
    }

    #[test]
    fn test_self_and_parent_detection() {
        let base = dir();
        let entries: Vec<_> = parse_listing(
            "drwxr-xr-x root root 2023-01-01 00:00 .\n\
             drwxr-xr-x root root 2023-01-01 00:00 ..\n\
             drwxr-xr-x root root 2023-01-01 00:00 ...\n",
            &base,
        )
        .collect();
        assert!(entries[0].is_self_or_parent());
        assert!(entries[1].is_self_or_parent());
        assert!(!entries[2].is_self_or_parent());
    }

    #[test]
    fn test_to_entry() {
        let base = dir();
        let remote =
            parse_line("drwxr-xr-x system sdcard_rw 2023-01-01 00:00 Downloads", &base).unwrap();
        let entry = remote.to_entry(&base);

        assert_eq!(entry.name, "Downloads");
        assert_eq!(entry.kind, EntryKind::Directory);
        assert_eq!(entry.url.as_deref(), Some("adb://ABC123/sdcard/Downloads"));
        assert_eq!(entry.mime_type.as_deref(), Some(DIRECTORY_MIME));
        assert_eq!(entry.owner.as_deref(), Some("system"));
        assert!(entry.size.is_none());
    }

    #[test]
    fn test_symlink_to_entry_carries_target() {
        let base = dir();
        let remote =
            parse_line("lrwxrwxrwx root root 2023-01-01 00:00 foo -> /sdcard/bar", &base).unwrap();
        let entry = remote.to_entry(&base);

        assert_eq!(entry.kind, EntryKind::Symlink);
        assert_eq!(entry.link_target.as_deref(), Some("/sdcard/bar"));
        assert_eq!(entry.target_url.as_deref(), Some("adb://ABC123/sdcard/bar"));
        assert!(entry.mime_type.is_none());
    }
}
