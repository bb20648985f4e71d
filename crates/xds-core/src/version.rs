//! Resource version tracking for xDS.
//!
//! Versions are issued by the cache from a single store-wide sequence, so a
//! version is never reused for the same `(node, kind)` group, even after the
//! group is emptied and written again. Sequence `0` means "nothing written
//! yet" and doubles as the initial state of a proxy that has not
//! acknowledged anything.
//!
//! Every store also draws an epoch when it is created. The epoch travels in
//! the wire form, so a version acknowledged against one store instance never
//! matches a version of another, such as the store rebuilt after a restart.

use std::fmt;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use fnv::FnvHasher;

/// Version identifier for a group of xDS resources.
///
/// On the wire versions travel in `version_info` as `{epoch:x}-{sequence}`.
/// Versions built with [`ResourceVersion::new`] have no epoch and render as
/// the bare sequence.
///
/// Versions of one store are ordered by sequence. Comparing versions of
/// different stores is meaningless.
///
/// # Example
///
/// ```rust
/// use xds_core::ResourceVersion;
///
/// let v1 = ResourceVersion::with_epoch(0xbeef, 1);
/// let v2 = v1.next();
///
/// assert!(v2 > v1);
/// assert_eq!(v2.to_string(), "beef-2");
/// assert_eq!(ResourceVersion::parse("beef-2"), Some(v2));
/// assert_ne!(ResourceVersion::parse("cafe-2"), Some(v2));
/// assert!(ResourceVersion::empty().is_empty());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceVersion {
    epoch: u64,
    sequence: u64,
}

impl ResourceVersion {
    /// The initial version: nothing written, nothing acknowledged.
    pub const ZERO: Self = Self {
        epoch: 0,
        sequence: 0,
    };

    /// Create a version without an epoch.
    #[must_use]
    pub const fn new(sequence: u64) -> Self {
        Self { epoch: 0, sequence }
    }

    /// Create a version issued by the store with `epoch`.
    #[must_use]
    pub const fn with_epoch(epoch: u64, sequence: u64) -> Self {
        Self { epoch, sequence }
    }

    /// Create an empty version (initial state).
    #[must_use]
    pub const fn empty() -> Self {
        Self::ZERO
    }

    /// Check if the version is empty (initial state).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.sequence == 0
    }

    /// Get the sequence number.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.sequence
    }

    /// Get the epoch of the issuing store, `0` if none.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The version immediately after this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self {
            epoch: self.epoch,
            sequence: self.sequence + 1,
        }
    }

    /// Parse a `version_info` string received from a proxy.
    ///
    /// Returns `None` for strings in neither form, such as versions handed
    /// out by another control plane. A version from another store parses
    /// but carries that store's epoch, so it equals no version of this one.
    /// An empty string parses to [`ResourceVersion::ZERO`].
    #[must_use]
    pub fn parse(version_info: &str) -> Option<Self> {
        if version_info.is_empty() {
            return Some(Self::ZERO);
        }
        match version_info.split_once('-') {
            Some((epoch, sequence)) => {
                let epoch = u64::from_str_radix(epoch, 16).ok().filter(|e| *e != 0)?;
                let sequence = sequence.parse::<u64>().ok()?;
                Some(Self { epoch, sequence })
            }
            None => version_info.parse::<u64>().ok().map(Self::new),
        }
    }

    /// Draw a fresh store epoch.
    ///
    /// Mixes the wall clock, the process id and a process-wide counter, so
    /// stores created in one process differ from each other and from those
    /// of earlier runs. Never `0`.
    #[must_use]
    pub fn fresh_epoch() -> u64 {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64);
        let mut hasher = FnvHasher::default();
        hasher.write_u64(nanos);
        hasher.write_u32(std::process::id());
        hasher.write_u64(COUNTER.fetch_add(1, Ordering::Relaxed));
        hasher.finish().max(1)
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch == 0 {
            write!(f, "{}", self.sequence)
        } else {
            write!(f, "{:x}-{}", self.epoch, self.sequence)
        }
    }
}

impl From<u64> for ResourceVersion {
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<ResourceVersion> for String {
    fn from(v: ResourceVersion) -> Self {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_creation() {
        let v = ResourceVersion::new(7);
        assert_eq!(v.as_u64(), 7);
        assert_eq!(v.epoch(), 0);
        assert!(!v.is_empty());
    }

    #[test]
    fn test_empty_version() {
        let v = ResourceVersion::empty();
        assert!(v.is_empty());
        assert_eq!(v, ResourceVersion::ZERO);
        assert_eq!(v, ResourceVersion::default());
    }

    #[test]
    fn test_version_ordering() {
        let v1 = ResourceVersion::with_epoch(9, 1);
        let v2 = ResourceVersion::with_epoch(9, 2);
        assert!(v1 < v2);
        assert_eq!(v1.next(), v2);
        assert!(ResourceVersion::ZERO < v1);
    }

    #[test]
    fn test_version_parse() {
        assert_eq!(ResourceVersion::parse(""), Some(ResourceVersion::ZERO));
        assert_eq!(ResourceVersion::parse("42"), Some(ResourceVersion::new(42)));
        assert_eq!(
            ResourceVersion::parse("1f-42"),
            Some(ResourceVersion::with_epoch(0x1f, 42))
        );
        assert_eq!(ResourceVersion::parse("v1"), None);
        assert_eq!(ResourceVersion::parse("-3"), None);
        assert_eq!(ResourceVersion::parse("0-3"), None);
        assert_eq!(ResourceVersion::parse("1f-x"), None);
    }

    #[test]
    fn test_version_display() {
        let v = ResourceVersion::new(123);
        assert_eq!(format!("{v}"), "123");
        assert_eq!(String::from(v), "123");

        let v = ResourceVersion::with_epoch(0xabc, 5);
        assert_eq!(v.to_string(), "abc-5");
        assert_eq!(ResourceVersion::parse(&v.to_string()), Some(v));
    }

    #[test]
    fn test_same_sequence_other_epoch() {
        let old = ResourceVersion::with_epoch(ResourceVersion::fresh_epoch(), 1);
        let new = ResourceVersion::with_epoch(ResourceVersion::fresh_epoch(), 1);
        assert_ne!(old.epoch(), new.epoch());
        assert_ne!(ResourceVersion::parse(&old.to_string()), Some(new));
    }
}
