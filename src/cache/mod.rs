/// Cache-aside access on top of the cache-store pool
///
/// Reads consult the cache first and fall through to the relational store on
/// any miss. Writes to the relational store flush the whole cache namespace.
pub mod accessor;
pub mod key;

pub use accessor::CacheAsideAccessor;
pub use key::{CacheKeyStrategy, CacheType, WritePolicy};

/// Outcome of a cache read
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
    /// No connection, unmapped namespace or a failed command
    Unavailable,
}

impl<T> CacheLookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    /// Collapse miss and unavailable for callers that only want the value
    pub fn into_option(self) -> Option<T> {
        match self {
            CacheLookup::Hit(value) => Some(value),
            CacheLookup::Miss | CacheLookup::Unavailable => None,
        }
    }
}

/// Outcome of a cache write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWrite {
    Written,
    /// Skip-if-present slot already held a value
    AlreadyPresent,
    /// Value could not be serialized
    Rejected,
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_collapses_to_option() {
        assert_eq!(CacheLookup::Hit(3).into_option(), Some(3));
        assert_eq!(CacheLookup::<u8>::Miss.into_option(), None);
        assert_eq!(CacheLookup::<u8>::Unavailable.into_option(), None);
        assert!(CacheLookup::Hit("x").is_hit());
        assert!(!CacheLookup::<u8>::Unavailable.is_hit());
    }
}
