use std::collections::HashSet;

use crate::geometry::{Geometry, Insets};
use crate::host::{KeyCode, KeyHeld, Pointer, PointerState};

#[derive(Debug, Default)]
pub struct HeldKeySet {
    keys: HashSet<KeyCode>,
}

impl HeldKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false for auto-repeat presses of a key already held.
    pub fn press(&mut self, key: KeyCode) -> bool {
        self.keys.insert(key)
    }

    /// Releasing the last held key gives the set's storage back.
    pub fn release(&mut self, key: KeyCode) -> bool {
        let removed = self.keys.remove(&key);
        if removed && self.keys.is_empty() {
            self.keys = HashSet::new();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.keys.capacity()
    }
}

impl KeyHeld for HeldKeySet {
    fn key_held(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }
}

/// Tracks the pointer in viewport units from raw client-area events.
#[derive(Debug, Default)]
pub struct PointerTracker {
    pointer: Pointer,
    position: Option<(f64, f64)>,
    primary_down: bool,
    insets: Insets,
}

impl PointerTracker {
    /// `insets` is subtracted from every position, for windows whose reported
    /// cursor coordinates include a non-client frame.
    pub fn new(insets: Insets) -> Self {
        Self { insets, ..Self::default() }
    }

    pub fn current(&self) -> Pointer {
        self.pointer
    }

    pub fn moved(&mut self, x: f64, y: f64, geometry: &Geometry, rows: usize, columns: usize) {
        self.position = Some((x, y));
        self.update(geometry, rows, columns);
    }

    pub fn primary_button(&mut self, pressed: bool, geometry: &Geometry, rows: usize, columns: usize) {
        self.primary_down = pressed;
        if self.position.is_some() {
            self.update(geometry, rows, columns);
        }
    }

    pub fn left(&mut self) {
        self.position = None;
        self.pointer.state = PointerState::None;
    }

    /// Re-maps the last known position, e.g. after the geometry changed.
    pub fn refresh(&mut self, geometry: &Geometry, rows: usize, columns: usize) {
        if self.position.is_some() {
            self.update(geometry, rows, columns);
        }
    }

    fn update(&mut self, geometry: &Geometry, rows: usize, columns: usize) {
        let Some((x, y)) = self.position else {
            return;
        };
        let (row, column) = geometry.pointer_to_viewport(
            x - self.insets.left as f64,
            y - self.insets.top as f64,
            rows,
            columns,
        );
        self.pointer = Pointer {
            state: if self.primary_down { PointerState::Select } else { PointerState::Hover },
            row,
            column,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_press_is_idempotent() {
        let mut keys = HeldKeySet::new();
        assert!(keys.press(KeyCode::KeyW));
        assert!(!keys.press(KeyCode::KeyW));
        assert_eq!(keys.len(), 1);
        assert!(keys.key_held(KeyCode::KeyW));
        assert!(!keys.key_held(KeyCode::KeyS));
    }

    #[test]
    fn releasing_absent_key_is_a_no_op() {
        let mut keys = HeldKeySet::new();
        keys.press(KeyCode::Space);
        assert!(!keys.release(KeyCode::KeyS));
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn releasing_last_key_frees_storage() {
        let mut keys = HeldKeySet::new();
        keys.press(KeyCode::KeyW);
        keys.press(KeyCode::KeyS);
        assert!(keys.capacity() > 0);
        keys.release(KeyCode::KeyW);
        assert!(keys.capacity() > 0);
        keys.release(KeyCode::KeyS);
        assert!(keys.is_empty());
        assert_eq!(keys.capacity(), 0);
    }

    #[test]
    fn pointer_follows_button_and_leave() {
        let geometry = Geometry::letterbox(512, 384, 192, 256);
        let mut tracker = PointerTracker::default();
        assert_eq!(tracker.current().state, PointerState::None);

        tracker.moved(256.0, 192.0, &geometry, 192, 256);
        let p = tracker.current();
        assert_eq!(p.state, PointerState::Hover);
        assert_eq!((p.row, p.column), (96.0, 128.0));

        tracker.primary_button(true, &geometry, 192, 256);
        assert_eq!(tracker.current().state, PointerState::Select);

        tracker.primary_button(false, &geometry, 192, 256);
        assert_eq!(tracker.current().state, PointerState::Hover);

        tracker.left();
        assert_eq!(tracker.current().state, PointerState::None);
    }

    #[test]
    fn insets_are_subtracted() {
        let geometry = Geometry::stretched(256, 192);
        let mut tracker = PointerTracker::new(Insets { left: 4, top: 10, right: 4, bottom: 4 });
        tracker.moved(4.0, 10.0, &geometry, 192, 256);
        let p = tracker.current();
        assert_eq!((p.row, p.column), (0.0, 0.0));
    }
}
