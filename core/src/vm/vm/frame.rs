use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};

use crate::util::sync;
use crate::val::Val;

/// Identity of one activation. Non-local returns carry it to find their target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivationId(pub(crate) u64);

/// Frames are shared between the running activation and every closure created
/// in it, so they are reference counted. A closure holding a frame keeps it
/// alive after the activation has returned.
pub type FrameRef = Arc<Frame>;

/// Lifecycle of an activation as seen by non-local returns.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    OnStack = 0,
    ReturnedNormally = 1,
    UnwoundByNonLocalReturn = 2,
    /// Left through an error or an escaped-block condition.
    Aborted = 3,
}

impl MarkerState {
    fn from_u8(v: u8) -> MarkerState {
        match v {
            0 => MarkerState::OnStack,
            1 => MarkerState::ReturnedNormally,
            2 => MarkerState::UnwoundByNonLocalReturn,
            _ => MarkerState::Aborted,
        }
    }
}

/// Frame-on-stack marker. Set once on entry and flipped exactly once on exit.
#[derive(Debug)]
pub struct FrameMarker(AtomicU8);

impl FrameMarker {
    fn new() -> Self {
        FrameMarker(AtomicU8::new(MarkerState::OnStack as u8))
    }

    #[inline]
    pub fn state(&self) -> MarkerState {
        MarkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_on_stack(&self) -> bool {
        self.state() == MarkerState::OnStack
    }

    /// Leaves the on-stack state. Returns `false` if the frame had already left.
    pub(crate) fn leave(&self, exit: MarkerState) -> bool {
        debug_assert_ne!(exit, MarkerState::OnStack);
        self.0
            .compare_exchange(
                MarkerState::OnStack as u8,
                exit as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Activation record: arguments (index 0 is the receiver), locals, and for
/// block activations the frame the block was created in.
pub struct Frame {
    id: ActivationId,
    arguments: Mutex<Vec<Val>>,
    locals: Mutex<Vec<Val>>,
    context: Option<FrameRef>,
    marker: FrameMarker,
}

impl Frame {
    pub(crate) fn new(id: ActivationId, arguments: Vec<Val>, locals: usize, context: Option<FrameRef>) -> FrameRef {
        Arc::new(Frame {
            id,
            arguments: Mutex::new(arguments),
            locals: Mutex::new(vec![Val::Nil; locals]),
            context,
            marker: FrameMarker::new(),
        })
    }

    #[inline]
    pub fn id(&self) -> ActivationId {
        self.id
    }

    #[inline]
    pub fn marker(&self) -> &FrameMarker {
        &self.marker
    }

    pub fn context(&self) -> Option<&FrameRef> {
        self.context.as_ref()
    }

    #[inline]
    pub fn argument(&self, idx: usize) -> Result<Val> {
        sync::lock(&self.arguments)
            .get(idx)
            .cloned()
            .ok_or_else(|| anyhow!("argument index {} out of range", idx))
    }

    pub fn set_argument(&self, idx: usize, value: Val) -> Result<()> {
        let mut args = sync::lock(&self.arguments);
        let slot = args
            .get_mut(idx)
            .ok_or_else(|| anyhow!("argument index {} out of range", idx))?;
        *slot = value;
        Ok(())
    }

    #[inline]
    pub fn local(&self, idx: usize) -> Result<Val> {
        sync::lock(&self.locals)
            .get(idx)
            .cloned()
            .ok_or_else(|| anyhow!("local index {} out of range", idx))
    }

    #[inline]
    pub fn set_local(&self, idx: usize, value: Val) -> Result<()> {
        let mut locals = sync::lock(&self.locals);
        let slot = locals
            .get_mut(idx)
            .ok_or_else(|| anyhow!("local index {} out of range", idx))?;
        *slot = value;
        Ok(())
    }

    pub fn receiver(&self) -> Val {
        self.argument(0).unwrap_or_default()
    }

    /// Walks `level` context links outwards. Level 0 is this frame.
    #[inline]
    pub fn enclosing(&self, level: u8) -> Result<&Frame> {
        let mut frame = self;
        for _ in 0..level {
            frame = frame
                .context
                .as_deref()
                .ok_or_else(|| anyhow!("context level {} exceeds lexical nesting", level))?;
        }
        Ok(frame)
    }

    /// The outermost frame of the context chain: the method activation a
    /// block was (transitively) created in.
    pub fn home(&self) -> &Frame {
        let mut frame = self;
        while let Some(outer) = frame.context.as_deref() {
            frame = outer;
        }
        frame
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("marker", &self.marker.state())
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

/// Operand stack sized at compile time. `sp` starts at -1 (empty); push is
/// increment-then-store and pop is read-then-decrement.
pub(crate) struct OperandStack {
    slots: Box<[Val]>,
    sp: isize,
}

impl OperandStack {
    pub(crate) fn with_depth(depth: usize) -> Self {
        Self {
            slots: vec![Val::Nil; depth].into_boxed_slice(),
            sp: -1,
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, v: Val) {
        self.sp += 1;
        debug_assert!((self.sp as usize) < self.slots.len(), "operand stack overflow");
        self.slots[self.sp as usize] = v;
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Val {
        debug_assert!(self.sp >= 0, "operand stack underflow");
        let v = std::mem::take(&mut self.slots[self.sp as usize]);
        self.sp -= 1;
        v
    }

    #[inline]
    pub(crate) fn top(&self) -> &Val {
        &self.slots[self.sp as usize]
    }

    #[inline]
    pub(crate) fn top_mut(&mut self) -> &mut Val {
        &mut self.slots[self.sp as usize]
    }

    /// `n`-th entry below the top (0 = top).
    #[inline]
    pub(crate) fn peek(&self, n: usize) -> &Val {
        &self.slots[self.sp as usize - n]
    }

    #[inline]
    pub(crate) fn drop_n(&mut self, n: usize) {
        for _ in 0..n {
            self.pop();
        }
    }

    /// Pops the top `n` values, deepest first.
    pub(crate) fn pop_n(&mut self, n: usize) -> Vec<Val> {
        let start = (self.sp + 1) as usize - n;
        let end = (self.sp + 1) as usize;
        let out = self.slots[start..end].iter_mut().map(std::mem::take).collect();
        self.sp -= n as isize;
        out
    }

    pub(crate) fn clear(&mut self) {
        while self.sp >= 0 {
            self.pop();
        }
    }

    #[inline]
    pub(crate) fn depth(&self) -> usize {
        (self.sp + 1) as usize
    }
}
