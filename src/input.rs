use std::collections::HashSet;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const RIGHT: Self = Self(1);
    pub const MIDDLE: Self = Self(2);

    pub fn new(index: u8) -> Self {
        Self(index)
    }
}

/// Pointer input in logical pixels, with the browser's wheel convention
/// (negative `delta_y` scrolls away from the user).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Pressed(MouseButton),
    Released(MouseButton),
    Moved(Vec2),
    Wheel { delta_y: f32 },
    Left,
}

/// Tracks held buttons and the last pointer position.
#[derive(Debug, Default)]
pub struct PointerState {
    buttons: HashSet<MouseButton>,
    position: Option<Vec2>,
}

impl PointerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an event and returns the pointer travel it caused while
    /// `button` is held.
    pub fn apply(&mut self, event: &PointerEvent, button: MouseButton) -> Option<Vec2> {
        match *event {
            PointerEvent::Pressed(pressed) => {
                self.buttons.insert(pressed);
                None
            }
            PointerEvent::Released(released) => {
                self.buttons.remove(&released);
                None
            }
            PointerEvent::Moved(position) => {
                let previous = self.position.replace(position);
                if self.is_down(button) {
                    previous.map(|previous| position - previous)
                } else {
                    None
                }
            }
            PointerEvent::Left => {
                self.buttons.clear();
                self.position = None;
                None
            }
            PointerEvent::Wheel { .. } => None,
        }
    }

    pub fn is_down(&self, button: MouseButton) -> bool {
        self.buttons.contains(&button)
    }

    pub fn position(&self) -> Option<Vec2> {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_reports_travel_only_while_held() {
        let mut state = PointerState::new();
        assert_eq!(
            state.apply(&PointerEvent::Moved(Vec2::new(10.0, 10.0)), MouseButton::LEFT),
            None
        );
        state.apply(&PointerEvent::Pressed(MouseButton::LEFT), MouseButton::LEFT);
        assert_eq!(
            state.apply(&PointerEvent::Moved(Vec2::new(15.0, 8.0)), MouseButton::LEFT),
            Some(Vec2::new(5.0, -2.0))
        );
        state.apply(&PointerEvent::Released(MouseButton::LEFT), MouseButton::LEFT);
        assert_eq!(
            state.apply(&PointerEvent::Moved(Vec2::new(20.0, 8.0)), MouseButton::LEFT),
            None
        );
    }

    #[test]
    fn other_buttons_do_not_drag() {
        let mut state = PointerState::new();
        state.apply(&PointerEvent::Moved(Vec2::ZERO), MouseButton::LEFT);
        state.apply(&PointerEvent::Pressed(MouseButton::RIGHT), MouseButton::LEFT);
        assert!(state.is_down(MouseButton::RIGHT));
        assert_eq!(
            state.apply(&PointerEvent::Moved(Vec2::ONE), MouseButton::LEFT),
            None
        );
    }

    #[test]
    fn leaving_the_window_releases_everything() {
        let mut state = PointerState::new();
        state.apply(&PointerEvent::Pressed(MouseButton::LEFT), MouseButton::LEFT);
        state.apply(&PointerEvent::Left, MouseButton::LEFT);
        assert!(!state.is_down(MouseButton::LEFT));
        assert_eq!(state.position(), None);
    }
}
