use std::sync::{Arc, RwLock};

use anyhow::{Result, anyhow};

use super::Val;
use crate::universe::{Class, ObjectLayout};
use crate::util::sync;
use crate::vm::{CompiledMethod, FrameRef};

/// A closure: a compiled block body plus the frame it was created in.
///
/// `context` is `None` for blocks compiled with `PUSH_BLOCK_NO_CTX`, which
/// never reach outside their own activation.
pub struct BlockValue {
    method: Arc<CompiledMethod>,
    context: Option<FrameRef>,
}

impl BlockValue {
    pub fn new(method: Arc<CompiledMethod>, context: Option<FrameRef>) -> Self {
        Self { method, context }
    }

    pub fn method(&self) -> &Arc<CompiledMethod> {
        &self.method
    }

    pub fn context(&self) -> Option<&FrameRef> {
        self.context.as_ref()
    }

    /// Parameters declared by the block, the implicit block receiver excluded.
    pub fn num_args(&self) -> usize {
        self.method.num_args().saturating_sub(1)
    }
}

/// An instance of a user-defined class. The layout it was allocated under is
/// kept next to the fields so a class-side layout change can be detected and
/// migrated lazily.
pub struct Instance {
    class: Arc<Class>,
    state: RwLock<InstanceState>,
}

struct InstanceState {
    layout: Arc<ObjectLayout>,
    fields: Vec<Val>,
}

impl Instance {
    pub fn new(class: &Arc<Class>) -> Self {
        let layout = class.layout();
        let fields = vec![Val::Nil; layout.field_count()];
        Self {
            class: class.clone(),
            state: RwLock::new(InstanceState { layout, fields }),
        }
    }

    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    pub fn layout(&self) -> Arc<ObjectLayout> {
        sync::read(&self.state).layout.clone()
    }

    #[inline]
    pub fn has_layout(&self, layout: &Arc<ObjectLayout>) -> bool {
        Arc::ptr_eq(&sync::read(&self.state).layout, layout)
    }

    /// Migrates the instance to its class's current layout. Returns `true`
    /// when a migration happened.
    pub fn update_layout(&self) -> bool {
        let current = self.class.layout();
        let mut state = sync::write(&self.state);
        if Arc::ptr_eq(&state.layout, &current) {
            return false;
        }
        state.fields.resize(current.field_count(), Val::Nil);
        state.layout = current;
        true
    }

    pub fn field(&self, idx: usize) -> Result<Val> {
        if let Some(v) = sync::read(&self.state).fields.get(idx) {
            return Ok(v.clone());
        }
        if self.update_layout() {
            return self.field(idx);
        }
        Err(anyhow!("field index {} out of range for {}", idx, self.class.name()))
    }

    pub fn set_field(&self, idx: usize, value: Val) -> Result<()> {
        {
            let mut state = sync::write(&self.state);
            if let Some(slot) = state.fields.get_mut(idx) {
                *slot = value;
                return Ok(());
            }
        }
        if self.update_layout() {
            return self.set_field(idx, value);
        }
        Err(anyhow!("field index {} out of range for {}", idx, self.class.name()))
    }
}
