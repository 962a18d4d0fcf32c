use super::frame::{Frame, MarkerState};

/// Flips an activation's on-stack marker when the activation is left, on
/// every exit path. The exit state defaults to `Aborted` and is refined by
/// the caller once it knows how the activation completed.
pub(super) struct OnStackGuard<'f> {
    frame: &'f Frame,
    exit: MarkerState,
}

impl<'f> OnStackGuard<'f> {
    pub(super) fn enter(frame: &'f Frame) -> Self {
        debug_assert!(frame.marker().is_on_stack());
        Self {
            frame,
            exit: MarkerState::Aborted,
        }
    }

    pub(super) fn exit_as(&mut self, state: MarkerState) {
        self.exit = state;
    }
}

impl Drop for OnStackGuard<'_> {
    fn drop(&mut self) {
        let flipped = self.frame.marker().leave(self.exit);
        debug_assert!(flipped, "activation {:?} left the stack twice", self.frame.id());
    }
}
