/// Physical key derivation for cache-aside entries
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

/// Declared kind of a cached value. Decides the physical key and write policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheType {
    /// Student search results, one slot per distinct query
    SearchResult,
    /// The current leaderboard; every raw key shares one slot
    TopRank,
    /// Full ranking listings, one slot per distinct query
    FullRank,
    /// Caller-supplied logical name
    Named(String),
}

/// How `set` treats an existing value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// First writer wins until the slot expires or is flushed
    SkipIfPresent,
    Overwrite,
}

impl CacheType {
    /// Parse a type tag as used by business queries
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "search" | "search-result" | "search_result" => CacheType::SearchResult,
            "top-rank" | "top_rank" => CacheType::TopRank,
            "full-rank" | "full_rank" => CacheType::FullRank,
            other => CacheType::Named(other.to_string()),
        }
    }

    /// Short name for logs and display
    pub fn tag(&self) -> &str {
        match self {
            CacheType::SearchResult => "search",
            CacheType::TopRank => "top_rank",
            CacheType::FullRank => "full_rank",
            CacheType::Named(name) => name,
        }
    }

    /// Segment used inside physical keys. Named types live under `named:` with
    /// `%` and `:` percent-encoded, so they cannot reach a built-in type's keys.
    pub fn key_segment(&self) -> Cow<'_, str> {
        match self {
            CacheType::Named(name) => {
                Cow::Owned(format!("named:{}", name.replace('%', "%25").replace(':', "%3A")))
            }
            other => Cow::Borrowed(other.tag()),
        }
    }

    pub fn write_policy(&self) -> WritePolicy {
        match self {
            CacheType::TopRank => WritePolicy::SkipIfPresent,
            _ => WritePolicy::Overwrite,
        }
    }

    /// TTL business queries use unless they have a reason to differ
    pub fn default_ttl(&self) -> Duration {
        match self {
            CacheType::TopRank => Duration::from_secs(300),
            CacheType::FullRank | CacheType::SearchResult => Duration::from_secs(600),
            CacheType::Named(_) => Duration::from_secs(300),
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl From<&str> for CacheType {
    fn from(tag: &str) -> Self {
        CacheType::from_tag(tag)
    }
}

/// Maps (raw key, type) to a versioned physical key
#[derive(Debug, Clone)]
pub struct CacheKeyStrategy {
    prefix: String,
    version: u32,
}

impl CacheKeyStrategy {
    pub fn new<S: Into<String>>(prefix: S, version: u32) -> Self {
        Self {
            prefix: prefix.into(),
            version,
        }
    }

    /// `{prefix}:v{version}:top_rank` for the leaderboard,
    /// `{prefix}:v{version}:{segment}:{md5(raw)}` otherwise
    pub fn physical_key(&self, raw_key: &str, cache_type: &CacheType) -> String {
        let segment = cache_type.key_segment();
        match cache_type {
            CacheType::TopRank => format!("{}:v{}:{}", self.prefix, self.version, segment),
            _ => format!(
                "{}:v{}:{}:{:x}",
                self.prefix,
                self.version,
                segment,
                md5::compute(raw_key.as_bytes())
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_rank_keys_collide() {
        let keys = CacheKeyStrategy::new("conduct", 1);
        let a = keys.physical_key("top10", &CacheType::TopRank);
        let b = keys.physical_key("top50 class 3", &CacheType::TopRank);

        assert_eq!(a, b);
        assert_eq!(a, "conduct:v1:top_rank");
    }

    #[test]
    fn test_hashed_keys_are_distinct_per_raw_key() {
        let keys = CacheKeyStrategy::new("conduct", 1);
        let alice = keys.physical_key("alice", &CacheType::SearchResult);
        let bob = keys.physical_key("bob", &CacheType::SearchResult);

        assert_ne!(alice, bob);
        assert_eq!(alice, keys.physical_key("alice", &CacheType::SearchResult));
        assert_eq!(alice, "conduct:v1:search:6384e2b2184bcbf58eccf10ca7a6563c");
    }

    #[test]
    fn test_types_partition_the_key_space() {
        let keys = CacheKeyStrategy::new("conduct", 1);
        let search = keys.physical_key("class-3", &CacheType::SearchResult);
        let full = keys.physical_key("class-3", &CacheType::FullRank);
        let named = keys.physical_key("class-3", &CacheType::Named("appeals".to_string()));

        assert_ne!(search, full);
        assert_ne!(full, named);
        assert!(named.starts_with("conduct:v1:named:appeals:"));
    }

    #[test]
    fn test_named_types_cannot_alias_builtin_keys() {
        let keys = CacheKeyStrategy::new("conduct", 1);

        let builtin = keys.physical_key("alice", &CacheType::SearchResult);
        let named = keys.physical_key("alice", &CacheType::Named("search".to_string()));
        assert_ne!(builtin, named);

        let top = keys.physical_key("alice", &CacheType::TopRank);
        let named_top = keys.physical_key("alice", &CacheType::Named("top_rank".to_string()));
        assert_ne!(top, named_top);

        let nested = CacheType::Named("search:6384e2b2184bcbf58eccf10ca7a6563c".to_string());
        assert_eq!(nested.key_segment(), "named:search%3A6384e2b2184bcbf58eccf10ca7a6563c");
        assert!(!keys.physical_key("x", &nested).starts_with(&builtin));

        // Encoding stays injective
        let literal = CacheType::Named("a%3Ab".to_string());
        let colon = CacheType::Named("a:b".to_string());
        assert_ne!(literal.key_segment(), colon.key_segment());
    }

    #[test]
    fn test_version_changes_every_key() {
        let v1 = CacheKeyStrategy::new("conduct", 1);
        let v2 = CacheKeyStrategy::new("conduct", 2);

        assert_ne!(
            v1.physical_key("alice", &CacheType::SearchResult),
            v2.physical_key("alice", &CacheType::SearchResult)
        );
        assert_ne!(
            v1.physical_key("any", &CacheType::TopRank),
            v2.physical_key("any", &CacheType::TopRank)
        );
    }

    #[test]
    fn test_tag_parsing_and_policy() {
        assert_eq!(CacheType::from("search"), CacheType::SearchResult);
        assert_eq!(CacheType::from("top-rank"), CacheType::TopRank);
        assert_eq!(CacheType::from("full-rank"), CacheType::FullRank);
        assert_eq!(CacheType::from("rules"), CacheType::Named("rules".to_string()));

        assert_eq!(CacheType::TopRank.write_policy(), WritePolicy::SkipIfPresent);
        assert_eq!(CacheType::SearchResult.write_policy(), WritePolicy::Overwrite);
        assert_eq!(CacheType::Named("x".to_string()).write_policy(), WritePolicy::Overwrite);
    }
}
