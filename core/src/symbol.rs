//! Process-wide selector/symbol table.

use std::fmt;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::util::sync;

/// Interned selector or symbol. Equality is identity of the interned string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

struct Interner {
    ids: DashMap<Arc<str>, Symbol>,
    names: RwLock<Vec<Arc<str>>>,
}

static INTERNER: Lazy<Interner> = Lazy::new(|| Interner {
    ids: DashMap::new(),
    names: RwLock::new(Vec::new()),
});

impl Symbol {
    pub fn intern(name: &str) -> Symbol {
        if let Some(sym) = INTERNER.ids.get(name) {
            return *sym;
        }
        let key: Arc<str> = Arc::from(name);
        *INTERNER.ids.entry(key.clone()).or_insert_with(|| {
            let mut names = sync::write(&INTERNER.names);
            names.push(key);
            Symbol((names.len() - 1) as u32)
        })
    }

    pub fn as_str(&self) -> Arc<str> {
        sync::read(&INTERNER.names)
            .get(self.0 as usize)
            .cloned()
            .unwrap_or_else(|| Arc::from("<unknown>"))
    }

    pub fn id(&self) -> u32 {
        self.0
    }

    /// Number of arguments a message with this selector takes, receiver excluded.
    pub fn arity(&self) -> usize {
        selector_arity(&self.as_str())
    }
}

/// `foo` -> 0, `+` -> 1, `at:put:` -> 2.
pub fn selector_arity(name: &str) -> usize {
    match name.chars().next() {
        Some(c) if c.is_alphabetic() || c == '_' => name.matches(':').count(),
        Some(_) => 1,
        None => 0,
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}
