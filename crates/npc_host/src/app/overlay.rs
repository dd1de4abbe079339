use tracing::debug;

/// Modal UI gate (menus, dialogue, inventory screens).
///
/// While visible it swallows player input. It has no say over the
/// simulation tick, which the loop runs unconditionally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct OverlayGate {
    visible: bool,
}

impl OverlayGate {
    /// Returns whether the gate changed. Showing a visible gate is a no-op.
    pub(crate) fn show(&mut self) -> bool {
        if self.visible {
            return false;
        }
        self.visible = true;
        debug!("overlay_shown");
        true
    }

    /// Returns whether the gate changed. Hiding a hidden gate is a no-op.
    pub(crate) fn hide(&mut self) -> bool {
        if !self.visible {
            return false;
        }
        self.visible = false;
        debug!("overlay_hidden");
        true
    }

    pub(crate) fn is_visible(&self) -> bool {
        self.visible
    }

    pub(crate) fn blocks_player_input(&self) -> bool {
        self.visible
    }
}
