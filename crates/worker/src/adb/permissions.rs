//! Decoding of the type and permission columns of a long listing.
//!
//! `ls -l` renders a mode as one type character followed by nine permission
//! characters, three per class (owner, group, other). The execute column of
//! each class doubles as the slot for that class's special bit:
//!
//! | column | lowercase | uppercase |
//! |---|---|---|
//! | owner execute | `s` setuid + execute | `S` setuid only |
//! | group execute | `s` setgid + execute | `S` setgid only |
//! | other execute | `t` sticky + execute | `T` sticky only |

use protocol::EntryKind;

pub const S_ISUID: u32 = 0o4000;
pub const S_ISGID: u32 = 0o2000;
pub const S_ISVTX: u32 = 0o1000;

/// Read, write and execute bits for one class, plus the special bit that
/// class's execute column can carry.
struct ClassBits {
    read: u32,
    write: u32,
    exec: u32,
    special: u32,
    /// Lowercase letter meaning "special + execute".
    special_char: char,
}

const CLASSES: [ClassBits; 3] = [
    ClassBits {
        read: 0o400,
        write: 0o200,
        exec: 0o100,
        special: S_ISUID,
        special_char: 's',
    },
    ClassBits {
        read: 0o040,
        write: 0o020,
        exec: 0o010,
        special: S_ISGID,
        special_char: 's',
    },
    ClassBits {
        read: 0o004,
        write: 0o002,
        exec: 0o001,
        special: S_ISVTX,
        special_char: 't',
    },
];

/// Map the leading type character of a listing line to an entry kind.
pub fn entry_kind(flag: char) -> Option<EntryKind> {
    match flag {
        '-' => Some(EntryKind::Regular),
        'd' => Some(EntryKind::Directory),
        'l' => Some(EntryKind::Symlink),
        'c' => Some(EntryKind::CharDevice),
        'b' => Some(EntryKind::BlockDevice),
        'p' => Some(EntryKind::Fifo),
        's' => Some(EntryKind::Socket),
        _ => None,
    }
}

/// The type character `ls -l` prints for a kind.
pub fn kind_flag(kind: EntryKind) -> char {
    match kind {
        EntryKind::Regular => '-',
        EntryKind::Directory => 'd',
        EntryKind::Symlink => 'l',
        EntryKind::CharDevice => 'c',
        EntryKind::BlockDevice => 'b',
        EntryKind::Fifo => 'p',
        EntryKind::Socket => 's',
    }
}

/// Decode a nine-character permission string into mode bits.
///
/// Anything other than exactly nine characters decodes to `0`. Unknown
/// characters contribute no bits.
pub fn decode_permissions(perms: &str) -> u32 {
    let chars: Vec<char> = perms.chars().collect();
    if chars.len() != 9 {
        return 0;
    }

    chars
        .chunks(3)
        .zip(CLASSES.iter())
        .fold(0, |mode, (column, class)| {
            let mut bits = 0;
            if column[0] == 'r' {
                bits |= class.read;
            }
            if column[1] == 'w' {
                bits |= class.write;
            }
            match column[2] {
                'x' => bits |= class.exec,
                c if c == class.special_char => bits |= class.exec | class.special,
                c if c == class.special_char.to_ascii_uppercase() => bits |= class.special,
                _ => {}
            }
            mode | bits
        })
}

/// Render mode bits the way `ls -l` does (without the type character).
pub fn format_permissions(mode: u32) -> String {
    let mut out = String::with_capacity(9);
    for class in &CLASSES {
        out.push(if mode & class.read != 0 { 'r' } else { '-' });
        out.push(if mode & class.write != 0 { 'w' } else { '-' });
        let exec = mode & class.exec != 0;
        let special = mode & class.special != 0;
        out.push(match (special, exec) {
            (true, true) => class.special_char,
            (true, false) => class.special_char.to_ascii_uppercase(),
            (false, true) => 'x',
            (false, false) => '-',
        });
    }
    out
}
