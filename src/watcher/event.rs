use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::flags::EventFlags;

/// What kind of file-system item an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Directory,
}

/// What happened to the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Moved,
    Removed,
}

/// The `(item, change)` pair derived from an event's raw flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Classification {
    pub item: ItemKind,
    pub change: ChangeKind,
}

/// One decoded native notification.
///
/// Built once per native callback entry and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    /// Ordering token assigned by the native facility. Increases within one
    /// registration but is not guaranteed to be contiguous.
    pub id: u64,
    /// The untouched native bitmask, kept for diagnostics.
    pub raw_flags: u32,
    /// Absolute path the event refers to.
    pub path: PathBuf,
    /// `None` unless both the item kind and the change kind are recognized.
    pub classification: Option<Classification>,
}

impl ChangeEvent {
    pub fn item_kind(&self) -> Option<ItemKind> {
        self.classification.map(|c| c.item)
    }

    pub fn change_kind(&self) -> Option<ChangeKind> {
        self.classification.map(|c| c.change)
    }

    /// The raw mask as [`EventFlags`], unknown bits included.
    pub fn flags(&self) -> EventFlags {
        EventFlags::from_bits_retain(self.raw_flags)
    }
}

/// Decode a native callback entry into a [`ChangeEvent`].
///
/// Total and deterministic: unknown or conflicting bits never fail, they only
/// leave `classification` empty.
pub fn decode(id: u64, path: impl Into<PathBuf>, raw_flags: u32) -> ChangeEvent {
    ChangeEvent {
        id,
        raw_flags,
        path: absolutize(path.into()),
        classification: classify(raw_flags),
    }
}

/// Derive the classification from a raw bitmask.
///
/// The file bit wins over the directory bit. Change kinds are checked in the
/// order created, removed, modified, moved; the first set bit wins, since the
/// native facility routinely coalesces several of them into one entry.
pub fn classify(raw_flags: u32) -> Option<Classification> {
    let flags = EventFlags::from_bits_retain(raw_flags);
    let item = item_kind(flags)?;
    let change = change_kind(flags)?;
    Some(Classification { item, change })
}

fn item_kind(flags: EventFlags) -> Option<ItemKind> {
    if flags.contains(EventFlags::ITEM_IS_FILE) {
        Some(ItemKind::File)
    } else if flags.contains(EventFlags::ITEM_IS_DIR) {
        Some(ItemKind::Directory)
    } else {
        None
    }
}

fn change_kind(flags: EventFlags) -> Option<ChangeKind> {
    const PRIORITY: [(EventFlags, ChangeKind); 4] = [
        (EventFlags::ITEM_CREATED, ChangeKind::Created),
        (EventFlags::ITEM_REMOVED, ChangeKind::Removed),
        (EventFlags::ITEM_MODIFIED, ChangeKind::Modified),
        (EventFlags::ITEM_RENAMED, ChangeKind::Moved),
    ];
    PRIORITY
        .iter()
        .find(|(bit, _)| flags.contains(*bit))
        .map(|(_, kind)| *kind)
}

/// Make `path` absolute against the current directory without touching the
/// file system (no symlink resolution, no case folding).
pub(crate) fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::path::absolute(&path).unwrap_or(path)
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::File => "file",
            Self::Directory => "directory",
        })
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Moved => "moved",
            Self::Removed => "removed",
        })
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.item, self.change)
    }
}

/// `"<path>: file modified"`, or the raw flag names when unclassified.
impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.classification {
            Some(classification) => write!(f, "{}: {}", self.path.display(), classification),
            None => {
                let names: Vec<&str> = self.flags().iter_names().map(|(name, _)| name).collect();
                write!(
                    f,
                    "{}: unclassified [{}]",
                    self.path.display(),
                    names.join(" | ")
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: EventFlags = EventFlags::ITEM_IS_FILE;
    const DIR: EventFlags = EventFlags::ITEM_IS_DIR;
    const CREATED: EventFlags = EventFlags::ITEM_CREATED;
    const REMOVED: EventFlags = EventFlags::ITEM_REMOVED;
    const MODIFIED: EventFlags = EventFlags::ITEM_MODIFIED;
    const RENAMED: EventFlags = EventFlags::ITEM_RENAMED;

    fn classify_flags(flags: EventFlags) -> Option<Classification> {
        classify(flags.bits())
    }

    #[test]
    fn test_no_item_bit_is_unclassified() {
        let change_bits = [CREATED, REMOVED, MODIFIED, RENAMED];
        let extras = [
            EventFlags::empty(),
            EventFlags::ITEM_IS_SYMLINK,
            EventFlags::ITEM_XATTR_MOD | EventFlags::MUST_SCAN_SUB_DIRS,
        ];
        // every combination of change bits, with and without unrelated bits
        for mask in 0u32..16 {
            let mut flags = EventFlags::empty();
            for (i, bit) in change_bits.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    flags |= *bit;
                }
            }
            for extra in extras {
                assert_eq!(
                    classify_flags(flags | extra),
                    None,
                    "{:?} carries no item bit",
                    flags | extra
                );
            }
        }
    }

    #[test]
    fn test_created_wins_over_removed() {
        let extras = [EventFlags::empty(), MODIFIED, RENAMED, MODIFIED | RENAMED];
        for item in [FILE, DIR] {
            for extra in extras {
                let c = classify_flags(item | CREATED | REMOVED | extra).unwrap();
                assert_eq!(c.change, ChangeKind::Created);
            }
        }
    }

    #[test]
    fn test_change_priority_order() {
        let cases = [
            (REMOVED | MODIFIED | RENAMED, ChangeKind::Removed),
            (MODIFIED | RENAMED, ChangeKind::Modified),
            (RENAMED, ChangeKind::Moved),
            (CREATED | MODIFIED, ChangeKind::Created),
        ];
        for (flags, expected) in cases {
            let c = classify_flags(FILE | flags).unwrap();
            assert_eq!(c.change, expected, "{:?}", flags);
        }
    }

    #[test]
    fn test_file_bit_wins_over_directory_bit() {
        let c = classify_flags(FILE | DIR | MODIFIED).unwrap();
        assert_eq!(c.item, ItemKind::File);
        let c = classify_flags(DIR | MODIFIED).unwrap();
        assert_eq!(c.item, ItemKind::Directory);
    }

    #[test]
    fn test_item_without_change_is_unclassified() {
        assert_eq!(classify_flags(FILE), None);
        assert_eq!(classify_flags(DIR | EventFlags::ITEM_INODE_META_MOD), None);
    }

    #[test]
    fn test_decode_keeps_raw_flags_and_id() {
        let bits = (FILE | CREATED | EventFlags::ITEM_XATTR_MOD).bits() | 0x8000_0000;
        let event = decode(42, "/tmp/a.txt", bits);
        assert_eq!(event.id, 42);
        assert_eq!(event.raw_flags, bits, "unknown bits are kept");
        assert_eq!(event.path, PathBuf::from("/tmp/a.txt"));
        assert_eq!(
            event.classification,
            Some(Classification {
                item: ItemKind::File,
                change: ChangeKind::Created,
            })
        );
    }

    #[test]
    fn test_decode_makes_relative_path_absolute() {
        let event = decode(1, "some/relative.txt", (FILE | MODIFIED).bits());
        assert!(
            event.path.is_absolute(),
            "path should be absolute: {:?}",
            event.path
        );
        assert!(event.path.ends_with("some/relative.txt"));
    }

    #[test]
    fn test_display() {
        let event = decode(7, "/tmp/dir", (DIR | RENAMED).bits());
        assert_eq!(event.to_string(), "/tmp/dir: directory moved");

        let flags = EventFlags::ITEM_IS_SYMLINK | CREATED;
        let event = decode(8, "/tmp/link", flags.bits());
        assert_eq!(
            event.to_string(),
            "/tmp/link: unclassified [ITEM_CREATED | ITEM_IS_SYMLINK]"
        );
    }

    #[test]
    fn test_serialize_lowercase_kinds() {
        let event = decode(3, "/tmp/a", (FILE | REMOVED).bits());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["raw_flags"], (FILE | REMOVED).bits());
        assert_eq!(json["classification"]["item"], "file");
        assert_eq!(json["classification"]["change"], "removed");

        let unclassified = decode(4, "/tmp/b", 0);
        let json = serde_json::to_value(&unclassified).unwrap();
        assert!(json["classification"].is_null());
    }
}
