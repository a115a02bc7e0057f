//! Read outcome type

/// Result of a strategy read
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResult<T> {
    /// Served from the cache store
    Hit(T),
    /// Served from the system of record (or a pending deferred write)
    Loaded(T),
    /// Neither the cache nor the system of record had the key
    Miss,
}

impl<T> CacheResult<T> {
    /// Check if this is a cache hit
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheResult::Hit(_))
    }

    /// Check if the value came from the system of record
    pub fn is_loaded(&self) -> bool {
        matches!(self, CacheResult::Loaded(_))
    }

    /// Check if this is a miss
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheResult::Miss)
    }

    /// Borrow the value if present
    pub fn as_ref(&self) -> Option<&T> {
        match self {
            CacheResult::Hit(value) | CacheResult::Loaded(value) => Some(value),
            CacheResult::Miss => None,
        }
    }

    /// Extract the value, consuming the result
    pub fn value(self) -> Option<T> {
        match self {
            CacheResult::Hit(value) | CacheResult::Loaded(value) => Some(value),
            CacheResult::Miss => None,
        }
    }

    /// Map the value if present
    pub fn map<U, F>(self, f: F) -> CacheResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            CacheResult::Hit(value) => CacheResult::Hit(f(value)),
            CacheResult::Loaded(value) => CacheResult::Loaded(f(value)),
            CacheResult::Miss => CacheResult::Miss,
        }
    }

    /// Map the value through a fallible conversion
    pub fn try_map<U, E, F>(self, f: F) -> Result<CacheResult<U>, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        Ok(match self {
            CacheResult::Hit(value) => CacheResult::Hit(f(value)?),
            CacheResult::Loaded(value) => CacheResult::Loaded(f(value)?),
            CacheResult::Miss => CacheResult::Miss,
        })
    }
}
