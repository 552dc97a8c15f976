//! String Interning for Dimension Names and Values
//!
//! Maps strings to dense u32 IDs and back. IDs are handed out in first-seen
//! order starting at 0 and are never reused or reassigned, so the reverse
//! map is a plain vector indexed by ID.
//!
//! # Thread Safety
//!
//! `StringInterner` itself is not synchronized. The dictionary encoder
//! owns all interners behind a single mutex, which is the only lock on the
//! ingestion path.

use std::collections::HashMap;

/// A bidirectional string <-> id table
#[derive(Debug, Default)]
pub struct StringInterner {
    /// Forward map: string -> ID
    string_to_id: HashMap<String, u32>,

    /// Reverse map: ID -> string
    id_to_string: Vec<String>,
}

impl StringInterner {
    /// Create an empty interner
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            string_to_id: HashMap::with_capacity(capacity),
            id_to_string: Vec::with_capacity(capacity),
        }
    }

    /// Intern a string, returning its ID
    ///
    /// Returns the existing ID when the string is known, otherwise assigns
    /// the next ID (the current number of interned strings).
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.string_to_id.get(s) {
            return id;
        }

        let id = self.id_to_string.len() as u32;
        self.string_to_id.insert(s.to_string(), id);
        self.id_to_string.push(s.to_string());
        id
    }

    /// Get the ID for a string if it exists (without interning)
    pub fn get_id(&self, s: &str) -> Option<u32> {
        self.string_to_id.get(s).copied()
    }

    /// Resolve an ID back to its string
    pub fn resolve(&self, id: u32) -> Option<&str> {
        self.id_to_string.get(id as usize).map(String::as_str)
    }

    /// Number of interned strings
    pub fn len(&self) -> usize {
        self.id_to_string.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.id_to_string.is_empty()
    }

    /// Iterate `(id, string)` in ID order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.id_to_string
            .iter()
            .enumerate()
            .map(|(id, s)| (id as u32, s.as_str()))
    }

    /// Estimate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        // Each string is stored twice (map key and reverse entry)
        let map_overhead = self.string_to_id.capacity()
            * (std::mem::size_of::<String>() + std::mem::size_of::<u32>());
        let string_bytes: usize = self.id_to_string.iter().map(|s| s.len() * 2).sum();

        map_overhead
            + string_bytes
            + self.id_to_string.capacity() * std::mem::size_of::<String>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_interner_basic() {
        let mut interner = StringInterner::new();

        let id1 = interner.intern("hello");
        let id2 = interner.intern("world");
        let id3 = interner.intern("hello");

        assert_eq!(id1, 0);
        assert_eq!(id2, 1);
        assert_eq!(id1, id3);
        assert_eq!(interner.len(), 2);

        assert_eq!(interner.resolve(id1), Some("hello"));
        assert_eq!(interner.resolve(id2), Some("world"));
        assert_eq!(interner.resolve(7), None);
    }

    #[test]
    fn test_get_id_does_not_intern() {
        let mut interner = StringInterner::with_capacity(4);
        assert_eq!(interner.get_id("host"), None);
        assert!(interner.is_empty());

        interner.intern("host");
        assert_eq!(interner.get_id("host"), Some(0));
    }

    #[test]
    fn test_empty_string_is_a_regular_entry() {
        let mut interner = StringInterner::new();
        assert_eq!(interner.intern(""), 0);
        assert_eq!(interner.intern("x"), 1);
        assert_eq!(interner.resolve(0), Some(""));
        assert_eq!(
            interner.iter().collect::<Vec<_>>(),
            vec![(0, ""), (1, "x")]
        );
    }

    #[test]
    fn test_memory_estimation() {
        let mut interner = StringInterner::new();
        for i in 0..100 {
            interner.intern(&format!("server-{}", i));
        }
        let mem = interner.memory_usage();
        assert!(mem > 0);
        assert!(mem < 1_000_000);
    }
}
