//! Stream creation flags and per-event flag bits.
//!
//! Bit values match the platform's event stream constants so callers can
//! compare raw flags against the values they already know.

use bitflags::bitflags;

bitflags! {
    /// Options passed when an event stream is created.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CreateFlags: u32 {
        /// Deliver the first event of a burst immediately, then coalesce.
        const NO_DEFER = 0x0000_0002;
        const WATCH_ROOT = 0x0000_0004;
        const IGNORE_SELF = 0x0000_0008;
        const FILE_EVENTS = 0x0000_0010;
    }
}

bitflags! {
    /// Flags attached to each event of a batch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventFlags: u32 {
        const MUST_SCAN_SUBDIRS = 0x0000_0001;
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
    }
}

/// Read-readiness bit of the platform's file descriptor callbacks.
pub const POLLIN: i64 = 1;
/// Write-readiness bit of the platform's file descriptor callbacks.
pub const POLLOUT: i64 = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_bits_match_platform_values() {
        assert_eq!(CreateFlags::NO_DEFER.bits(), 2);
        assert_eq!(EventFlags::ITEM_CREATED.bits(), 0x100);
        assert_eq!(
            (EventFlags::ITEM_RENAMED | EventFlags::ITEM_IS_DIR).bits(),
            0x0002_0800
        );
        assert_eq!((POLLIN, POLLOUT), (1, 2));
    }
}
