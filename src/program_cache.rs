//! Program cache: content-addressed memo of compiled programs.
//!
//! The key is an FNV-1a hash of the synthesized source. Each entry keeps
//! its source text so a hash collision is detected rather than silently
//! returning the wrong program. The cache is owned by one run and is only
//! touched from the submission loop.

use std::collections::HashMap;
use std::sync::Arc;

use crate::gpu::DeviceError;

struct CachedProgram<P> {
    source: String,
    program: Arc<P>,
}

/// Programs compiled during one run, keyed by source hash.
pub struct ProgramCache<P> {
    entries: HashMap<u64, CachedProgram<P>>,
    hits: usize,
    misses: usize,
}

impl<P> ProgramCache<P> {
    pub fn new() -> Self {
        ProgramCache {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Return the program compiled from `source`, building it on a miss.
    ///
    /// Build failures are not cached.
    pub fn get_or_build(
        &mut self,
        source: &str,
        build: impl FnOnce(&str) -> Result<P, DeviceError>,
    ) -> Result<Arc<P>, DeviceError> {
        let hash = source_hash(source);
        if let Some(entry) = self.entries.get(&hash) {
            if entry.source == source {
                self.hits += 1;
                log::trace!("program cache hit {hash:016x}");
                return Ok(Arc::clone(&entry.program));
            }
            log::warn!("program cache collision on {hash:016x}; compiling uncached");
            self.misses += 1;
            return build(source).map(Arc::new);
        }

        self.misses += 1;
        log::debug!("program cache miss {hash:016x}, compiling {} bytes", source.len());
        let program = Arc::new(build(source)?);
        self.entries.insert(
            hash,
            CachedProgram {
                source: source.to_string(),
                program: Arc::clone(&program),
            },
        );
        Ok(program)
    }

    /// Look up a program by source without building.
    pub fn lookup(&self, source: &str) -> Option<Arc<P>> {
        self.entries
            .get(&source_hash(source))
            .filter(|entry| entry.source == source)
            .map(|entry| Arc::clone(&entry.program))
    }

    /// Number of cached programs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Number of compilations performed.
    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<P> Default for ProgramCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// FNV-1a hash of program source.
pub fn source_hash(source: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325; // FNV offset basis
    for &b in source.as_bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3); // FNV prime
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_after_miss() {
        let mut cache = ProgramCache::new();
        assert!(cache.is_empty());

        let mut builds = 0;
        for _ in 0..3 {
            let program = cache
                .get_or_build("fn main() {}", |s| {
                    builds += 1;
                    Ok(s.len())
                })
                .unwrap();
            assert_eq!(*program, 12);
        }
        assert_eq!(builds, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_failed_build_not_cached() {
        let mut cache: ProgramCache<()> = ProgramCache::new();
        let err = cache.get_or_build("bad", |_| Err(DeviceError::ProgramCreation("syntax".into())));
        assert!(err.is_err());
        assert!(cache.is_empty());
        assert!(cache.get_or_build("bad", |_| Ok(())).is_ok());
        assert_eq!(cache.misses(), 2);
    }

    #[test]
    fn test_lookup_and_clear() {
        let mut cache = ProgramCache::new();
        cache.get_or_build("a", |_| Ok(1u8)).unwrap();
        assert_eq!(cache.lookup("a").as_deref(), Some(&1));
        assert!(cache.lookup("b").is_none());
        cache.clear();
        assert!(cache.lookup("a").is_none());
    }

    #[test]
    fn test_source_hash_deterministic() {
        assert_eq!(source_hash("fn main() {}"), source_hash("fn main() {}"));
        assert_ne!(source_hash("fn main() {}"), source_hash("fn main() { }"));
        assert_eq!(source_hash(""), 0xcbf29ce484222325);
    }
}
