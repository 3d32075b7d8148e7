pub use winit::keyboard::KeyCode;

// --- Pointer ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerState {
    /// Outside the window.
    #[default]
    None,
    Hover,
    /// Primary button held.
    Select,
}

/// Pointer position in viewport units. Row and column may fall outside the viewport
/// when the pointer is over a letterbox border.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pointer {
    pub state: PointerState,
    pub row: f32,
    pub column: f32,
}

/// Membership query over the keys currently held down.
pub trait KeyHeld {
    fn key_held(&self, key: KeyCode) -> bool;
}

// --- FrameBuffer ---
// Planar f32 channels in [0, 1], row-major, top-left origin.
pub struct ViewportFramebuffer {
    rows: usize,
    columns: usize,
    pub reds: Vec<f32>,
    pub greens: Vec<f32>,
    pub blues: Vec<f32>,
    /// Present only for hosts that want a per-pixel alpha window.
    pub opacities: Option<Vec<f32>>,
}

impl ViewportFramebuffer {
    pub fn opaque(rows: usize, columns: usize) -> Self {
        let len = rows * columns;
        Self {
            rows,
            columns,
            reds: vec![0.0; len],
            greens: vec![0.0; len],
            blues: vec![0.0; len],
            opacities: None,
        }
    }

    pub fn layered(rows: usize, columns: usize) -> Self {
        let mut framebuffer = Self::opaque(rows, columns);
        framebuffer.opacities = Some(vec![0.0; rows * columns]);
        framebuffer
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn is_layered(&self) -> bool {
        self.opacities.is_some()
    }

    pub fn index(&self, row: usize, column: usize) -> usize {
        row * self.columns + column
    }

    pub fn set(&mut self, row: usize, column: usize, red: f32, green: f32, blue: f32) {
        if row < self.rows && column < self.columns {
            let i = self.index(row, column);
            self.reds[i] = red;
            self.greens[i] = green;
            self.blues[i] = blue;
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.rows == 0 {
            return Err("rows must be at least 1".into());
        }
        if self.columns == 0 {
            return Err("columns must be at least 1".into());
        }
        let len = self.rows * self.columns;
        let planes = [
            ("red", self.reds.len()),
            ("green", self.greens.len()),
            ("blue", self.blues.len()),
        ];
        for (name, actual) in planes
            .into_iter()
            .chain(self.opacities.as_ref().map(|o| ("opacity", o.len())))
        {
            if actual != len {
                return Err(format!(
                    "{name} plane holds {actual} values, expected {len} ({} x {})",
                    self.rows, self.columns
                ));
            }
        }
        Ok(())
    }
}

// --- Audio ---
/// One tick's worth of stereo samples in [-1, 1].
pub struct AudioFrame {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl AudioFrame {
    pub fn new(samples_per_tick: usize) -> Self {
        Self {
            left: vec![0.0; samples_per_tick],
            right: vec![0.0; samples_per_tick],
        }
    }

    pub fn samples_per_tick(&self) -> usize {
        self.left.len()
    }

    /// Writes `L R L R ...` into `dest`, which must hold exactly two samples per pair.
    pub fn interleave_into(&self, dest: &mut [f32]) {
        for ((pair, l), r) in dest.chunks_exact_mut(2).zip(&self.left).zip(&self.right) {
            pair[0] = *l;
            pair[1] = *r;
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.left.is_empty() {
            return Err("samples per tick must be at least 1".into());
        }
        if self.left.len() != self.right.len() {
            return Err(format!(
                "left channel holds {} samples but right holds {}",
                self.left.len(),
                self.right.len()
            ));
        }
        Ok(())
    }
}

// --- Host ---
/// The application driven by the loop. Both callbacks run on the UI thread and must
/// not block.
pub trait Host {
    /// Advance the simulation by one tick and refill [`Host::audio`].
    fn tick(&mut self, pointer: Pointer, keys: &dyn KeyHeld);

    /// Refill [`Host::framebuffer`]. `progress` is how far playback is through the
    /// most recent tick, 0.0 until playback has started.
    fn video(&mut self, pointer: Pointer, keys: &dyn KeyHeld, progress: f32);

    fn framebuffer(&self) -> &ViewportFramebuffer;

    fn audio(&self) -> &AudioFrame;
}
