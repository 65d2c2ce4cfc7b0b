use rustc_hash::FxHashMap;
use std::fmt;

/// An interned identifier: an atom name, a functor name, or a foreign
/// function name. Two symbols compare equal iff they were interned from
/// equal strings in the same table.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(u32);

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

/// Process-wide (but explicitly owned, never a global) interning table.
///
/// Ids are never reused: the table only grows. That makes interning safe
/// to read concurrently once a symbol exists, and lets a test build an
/// isolated table whenever it wants a clean symbol space (see §4.A).
#[derive(Default)]
pub struct SymbolTable {
    strings: Vec<Box<str>>,
    index: FxHashMap<Box<str>, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            strings: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    /// Interns `s`, returning its existing id or allocating a fresh one.
    pub fn intern(&mut self, s: &str) -> SymbolId {
        if let Some(&id) = self.index.get(s) {
            return id;
        }
        let id = SymbolId(self.strings.len() as u32);
        let boxed: Box<str> = s.into();
        self.strings.push(boxed.clone());
        self.index.insert(boxed, id);
        id
    }

    /// Resolves a previously interned id back to its string.
    ///
    /// Panics if `id` was not produced by this table: ids are not
    /// meaningful across distinct `SymbolTable` instances.
    pub fn resolve(&self, id: SymbolId) -> &str {
        &self.strings[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
