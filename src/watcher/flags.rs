//! Native event flag bits.
//!
//! The layout follows the macOS FSEvents `kFSEventStreamEventFlag*` constants.
//! Backends that sit on other OS facilities translate their own event kinds into
//! this layout so the decoder only ever deals with one bitmask format.

use bitflags::bitflags;

bitflags! {
    /// Flags attached to one native event entry.
    ///
    /// Events keep their mask as a plain `u32`; use
    /// [`EventFlags::from_bits_retain`] to inspect it without losing bits that
    /// have no name here.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventFlags: u32 {
        const MUST_SCAN_SUB_DIRS = 0x0000_0001;
        const USER_DROPPED = 0x0000_0002;
        const KERNEL_DROPPED = 0x0000_0004;
        const EVENT_IDS_WRAPPED = 0x0000_0008;
        const HISTORY_DONE = 0x0000_0010;
        const ROOT_CHANGED = 0x0000_0020;
        const MOUNT = 0x0000_0040;
        const UNMOUNT = 0x0000_0080;
        const ITEM_CREATED = 0x0000_0100;
        const ITEM_REMOVED = 0x0000_0200;
        const ITEM_INODE_META_MOD = 0x0000_0400;
        const ITEM_RENAMED = 0x0000_0800;
        const ITEM_MODIFIED = 0x0000_1000;
        const ITEM_FINDER_INFO_MOD = 0x0000_2000;
        const ITEM_CHANGE_OWNER = 0x0000_4000;
        const ITEM_XATTR_MOD = 0x0000_8000;
        const ITEM_IS_FILE = 0x0001_0000;
        const ITEM_IS_DIR = 0x0002_0000;
        const ITEM_IS_SYMLINK = 0x0004_0000;
        const OWN_EVENT = 0x0008_0000;
        const ITEM_IS_HARDLINK = 0x0010_0000;
        const ITEM_IS_LAST_HARDLINK = 0x0020_0000;
        const ITEM_CLONED = 0x0040_0000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(flags: EventFlags) -> Vec<&'static str> {
        flags.iter_names().map(|(name, _)| name).collect()
    }

    #[test]
    fn test_names_in_bit_order() {
        let flags = EventFlags::ITEM_IS_FILE | EventFlags::ITEM_CREATED | EventFlags::ITEM_MODIFIED;
        assert_eq!(
            names(flags),
            vec!["ITEM_CREATED", "ITEM_MODIFIED", "ITEM_IS_FILE"]
        );
    }

    #[test]
    fn test_retain_keeps_unknown_bits() {
        let flags = EventFlags::from_bits_retain(0x8000_0000 | EventFlags::MOUNT.bits());
        assert_eq!(flags.bits(), 0x8000_0040);
        assert_eq!(names(flags), vec!["MOUNT"]);
        assert!(names(EventFlags::empty()).is_empty());
    }
}
