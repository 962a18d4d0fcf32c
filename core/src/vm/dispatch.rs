//! Dispatch chains: the inline cache attached to one call site.
//!
//! A chain is a list of guarded entries that only grows at its end. A miss
//! looks the selector up, appends an entry keyed on the receiver's class (or,
//! for instances, on their layout) and calls the target. Once the list holds
//! `inline_cache_size` entries the next miss collapses the site to a
//! megamorphic state that looks up every call; that state is final. An entry
//! made stale by a later method definition is replaced where it sits, so
//! redefinitions alone never grow a chain.
//!
//! The list is immutable once published. Growing it builds a new list and
//! swaps the head under the write lock, so concurrent readers keep walking
//! the snapshot they loaded.

use std::sync::{Arc, RwLock};

use crate::symbol::Symbol;
use crate::universe::{Class, ClassTable, Condition, ObjectLayout};
use crate::util::sync;
use crate::val::Val;

use super::control::Completion;
use super::method::Invokable;
use super::vm::Vm;

#[derive(Clone)]
enum Guard {
    /// Receiver's class is this class. Used for every non-instance value.
    Class(Arc<Class>),
    /// Receiver is an instance allocated under (or migrated to) this layout.
    Layout(Arc<ObjectLayout>),
}

impl Guard {
    fn for_receiver(classes: &ClassTable, receiver: &Val) -> Guard {
        match receiver {
            Val::Object(inst) => Guard::Layout(inst.layout()),
            other => Guard::Class(classes.class_of(other).clone()),
        }
    }

    #[inline]
    fn matches(&self, classes: &ClassTable, receiver: &Val) -> bool {
        match (self, receiver) {
            (Guard::Layout(layout), Val::Object(inst)) => inst.has_layout(layout),
            (Guard::Layout(_), _) | (Guard::Class(_), Val::Object(_)) => false,
            (Guard::Class(class), other) => Arc::ptr_eq(classes.class_of(other), class),
        }
    }
}

#[derive(Clone)]
enum Target {
    Invoke(Invokable),
    /// Lookup failed for this receiver shape; report instead of re-looking up.
    DoesNotUnderstand,
}

#[derive(Clone)]
struct CacheEntry {
    guard: Guard,
    /// Method epoch the lookup was made under.
    epoch: u64,
    target: Target,
}

impl CacheEntry {
    #[inline]
    fn matches(&self, classes: &ClassTable, receiver: &Val, epoch: u64) -> bool {
        self.epoch == epoch && self.guard.matches(classes, receiver)
    }
}

enum ChainState {
    /// Guarded entries in installation order. Empty = uninitialized.
    Cached(Vec<CacheEntry>),
    Megamorphic,
}

pub struct DispatchChain {
    selector: Symbol,
    head: RwLock<Arc<ChainState>>,
}

impl DispatchChain {
    pub fn new(selector: Symbol) -> Self {
        Self {
            selector,
            head: RwLock::new(Arc::new(ChainState::Cached(Vec::new()))),
        }
    }

    pub fn selector(&self) -> Symbol {
        self.selector
    }

    /// Number of guarded entries.
    pub fn depth(&self) -> usize {
        match &**sync::read(&self.head) {
            ChainState::Cached(entries) => entries.len(),
            ChainState::Megamorphic => 0,
        }
    }

    pub fn is_megamorphic(&self) -> bool {
        matches!(&**sync::read(&self.head), ChainState::Megamorphic)
    }

    /// Sends the chain's selector to `args[0]`.
    pub fn dispatch(&self, vm: &mut Vm, args: Vec<Val>) -> Completion<Val> {
        let snapshot = sync::read(&self.head).clone();
        let epoch = vm.classes().epoch();
        match &*snapshot {
            ChainState::Megamorphic => {
                vm.stats.megamorphic_sends += 1;
                return vm.send_uncached(self.selector, args);
            }
            ChainState::Cached(entries) => {
                let hit = entries
                    .iter()
                    .find(|e| e.matches(vm.classes(), &args[0], epoch))
                    .map(|e| e.target.clone());
                if let Some(target) = hit {
                    vm.stats.cache_hits += 1;
                    return self.call(vm, target, args);
                }
                if !entries.is_empty()
                    && let Val::Object(inst) = &args[0]
                    && inst.update_layout()
                {
                    // The receiver was on an outdated layout; after migrating
                    // it, an existing entry may cover it.
                    return self.dispatch(vm, args);
                }
            }
        }
        self.specialize(vm, args, epoch)
    }

    fn specialize(&self, vm: &mut Vm, args: Vec<Val>, epoch: u64) -> Completion<Val> {
        vm.stats.cache_misses += 1;
        let bound = vm.config().inline_cache_size;
        let target = {
            let mut head = sync::write(&self.head);
            let current = head.clone();
            let entries = match &*current {
                ChainState::Megamorphic => None,
                ChainState::Cached(entries) => Some(entries),
            };
            match entries {
                None => None,
                Some(entries) => {
                    let live = entries.iter().find(|e| e.matches(vm.classes(), &args[0], epoch));
                    if let Some(e) = live {
                        // Installed by a racing activation since our snapshot.
                        Some(e.target.clone())
                    } else if let Some(stale) =
                        entries.iter().position(|e| e.guard.matches(vm.classes(), &args[0]))
                    {
                        // Same receiver shape, older epoch: replace in place.
                        let entry = self.lookup_entry(vm.classes(), &args[0], epoch);
                        let target = entry.target.clone();
                        let mut refreshed = entries.clone();
                        refreshed[stale] = entry;
                        tracing::trace!(
                            target: "sprig::vm::dispatch",
                            selector = %self.selector,
                            slot = stale,
                            "stale dispatch entry refreshed"
                        );
                        *head = Arc::new(ChainState::Cached(refreshed));
                        Some(target)
                    } else if entries.len() >= bound {
                        tracing::debug!(
                            target: "sprig::vm::dispatch",
                            selector = %self.selector,
                            depth = entries.len(),
                            "call site went megamorphic"
                        );
                        *head = Arc::new(ChainState::Megamorphic);
                        None
                    } else {
                        let entry = self.lookup_entry(vm.classes(), &args[0], epoch);
                        let target = entry.target.clone();
                        let mut grown = Vec::with_capacity(entries.len() + 1);
                        grown.extend(entries.iter().cloned());
                        grown.push(entry);
                        tracing::trace!(
                            target: "sprig::vm::dispatch",
                            selector = %self.selector,
                            depth = grown.len(),
                            "dispatch chain grew"
                        );
                        *head = Arc::new(ChainState::Cached(grown));
                        Some(target)
                    }
                }
            }
        };
        match target {
            Some(target) => self.call(vm, target, args),
            None => {
                vm.stats.megamorphic_sends += 1;
                vm.send_uncached(self.selector, args)
            }
        }
    }

    fn lookup_entry(&self, classes: &ClassTable, receiver: &Val, epoch: u64) -> CacheEntry {
        let class = classes.class_of(receiver);
        let target = match classes.lookup(class, self.selector) {
            Some(invokable) => Target::Invoke(invokable),
            None => {
                tracing::debug!(
                    target: "sprig::vm::dispatch",
                    selector = %self.selector,
                    class = %class.name(),
                    "installing does-not-understand entry"
                );
                Target::DoesNotUnderstand
            }
        };
        CacheEntry {
            guard: Guard::for_receiver(classes, receiver),
            epoch,
            target,
        }
    }

    #[inline]
    fn call(&self, vm: &mut Vm, target: Target, args: Vec<Val>) -> Completion<Val> {
        match target {
            Target::Invoke(invokable) => vm.invoke(&invokable, args),
            Target::DoesNotUnderstand => {
                let mut args = args;
                let receiver = args.remove(0);
                vm.report(
                    receiver,
                    Condition::DoesNotUnderstand {
                        selector: self.selector,
                        arguments: args,
                    },
                )
            }
        }
    }
}

impl std::fmt::Debug for DispatchChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchChain")
            .field("selector", &self.selector)
            .field("depth", &self.depth())
            .field("megamorphic", &self.is_megamorphic())
            .finish()
    }
}
