use std::sync::{Arc, RwLock};

use crate::symbol::Symbol;
use crate::util::sync;
use crate::util::{FastHashMap, fast_hash_map_new};
use crate::val::Val;

/// A global binding. Code that has resolved a global keeps the cell, so a
/// later write is seen without re-resolving the name.
#[derive(Debug)]
pub struct GlobalCell {
    name: Symbol,
    value: RwLock<Option<Val>>,
}

impl GlobalCell {
    pub fn name(&self) -> Symbol {
        self.name
    }

    #[inline]
    pub fn get(&self) -> Option<Val> {
        sync::read(&self.value).clone()
    }

    pub fn set(&self, value: Val) {
        *sync::write(&self.value) = Some(value);
    }
}

#[derive(Debug, Default)]
pub struct GlobalTable {
    cells: RwLock<FastHashMap<Symbol, Arc<GlobalCell>>>,
}

impl GlobalTable {
    pub fn new() -> Self {
        Self {
            cells: RwLock::new(fast_hash_map_new()),
        }
    }

    /// The binding for `name`, created undefined if absent.
    pub fn cell(&self, name: Symbol) -> Arc<GlobalCell> {
        if let Some(cell) = sync::read(&self.cells).get(&name) {
            return cell.clone();
        }
        sync::write(&self.cells)
            .entry(name)
            .or_insert_with(|| {
                Arc::new(GlobalCell {
                    name,
                    value: RwLock::new(None),
                })
            })
            .clone()
    }

    pub fn read(&self, name: Symbol) -> Option<Val> {
        sync::read(&self.cells).get(&name).and_then(|c| c.get())
    }

    pub fn write(&self, name: Symbol, value: Val) {
        self.cell(name).set(value);
    }

    pub fn contains(&self, name: Symbol) -> bool {
        self.read(name).is_some()
    }
}
