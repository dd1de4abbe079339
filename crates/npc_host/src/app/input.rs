use npc_engine::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum InputAction {
    MoveNorth,
    MoveSouth,
    MoveEast,
    MoveWest,
    Dodge,
    Quit,
}

const ACTION_COUNT: usize = 6;

impl InputAction {
    const fn index(self) -> usize {
        match self {
            InputAction::MoveNorth => 0,
            InputAction::MoveSouth => 1,
            InputAction::MoveEast => 2,
            InputAction::MoveWest => 3,
            InputAction::Dodge => 4,
            InputAction::Quit => 5,
        }
    }
}

/// Held actions for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct InputSnapshot {
    down: [bool; ACTION_COUNT],
}

impl InputSnapshot {
    pub(crate) fn set(&mut self, action: InputAction, is_down: bool) {
        self.down[action.index()] = is_down;
    }

    pub(crate) fn with(mut self, action: InputAction) -> Self {
        self.set(action, true);
        self
    }

    pub(crate) fn is_down(&self, action: InputAction) -> bool {
        self.down[action.index()]
    }

    /// Unit horizontal direction from the held movement keys, `+z` north.
    /// Opposing keys cancel out.
    pub(crate) fn movement_direction(&self) -> Option<Vec3> {
        let axis = |positive: InputAction, negative: InputAction| -> f32 {
            match (self.is_down(positive), self.is_down(negative)) {
                (true, false) => 1.0,
                (false, true) => -1.0,
                _ => 0.0,
            }
        };
        let x = axis(InputAction::MoveEast, InputAction::MoveWest);
        let z = axis(InputAction::MoveNorth, InputAction::MoveSouth);
        Vec3::horizontal_direction(Vec3::ZERO, Vec3::new(x, 0.0, z))
    }
}
