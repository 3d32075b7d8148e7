use cadence_runner::{AudioFrame, Host, KeyCode, KeyHeld, Pointer, PointerState, ViewportFramebuffer};

pub const ROWS: usize = 192;
pub const COLUMNS: usize = 256;
pub const SAMPLES_PER_TICK: usize = 441;

// 441 Hz at 44.1 kHz, in radians per sample.
const TONE_STEP: f64 = 0.0313487528344671;
const NUDGE: f32 = 50.0;

fn dot_x(ticks: u32) -> f32 {
    ((ticks as f64 * 0.1).sin() * 0.4 + 0.5) as f32 * COLUMNS as f32
}

fn dot_y(ticks: u32) -> f32 {
    ((ticks as f64 * 0.12).sin() * 0.1 + 0.5) as f32 * ROWS as f32
}

type Colour = (f32, f32, f32);

/// A dot wandering across a gradient, with a tone panned to follow it.
pub struct DemoHost {
    framebuffer: ViewportFramebuffer,
    audio: AudioFrame,
    ticks: u32,
    samples: u64,
    previous: (f32, f32),
    next: (f32, f32),
    tick_pointer: Pointer,
    video_calls: usize,
}

impl DemoHost {
    pub fn new(transparent: bool) -> Self {
        let framebuffer = if transparent {
            ViewportFramebuffer::layered(ROWS, COLUMNS)
        } else {
            ViewportFramebuffer::opaque(ROWS, COLUMNS)
        };
        Self {
            framebuffer,
            audio: AudioFrame::new(SAMPLES_PER_TICK),
            ticks: 2,
            samples: 0,
            previous: (dot_x(0), dot_y(0)),
            next: (dot_x(1), dot_y(1)),
            tick_pointer: Pointer::default(),
            video_calls: 0,
        }
    }

    pub fn dot(&self, progress: f32) -> (f32, f32) {
        let inverse = 1.0 - progress;
        (
            self.previous.0 * inverse + self.next.0 * progress,
            self.previous.1 * inverse + self.next.1 * progress,
        )
    }

    fn paint(&mut self, row: i64, column: i64, opacity: f32, (red, green, blue): Colour) {
        if row < 0 || column < 0 || row >= ROWS as i64 || column >= COLUMNS as i64 {
            return;
        }
        let i = self.framebuffer.index(row as usize, column as usize);
        self.framebuffer.reds[i] = red;
        self.framebuffer.greens[i] = green;
        self.framebuffer.blues[i] = blue;
        if let Some(opacities) = self.framebuffer.opacities.as_mut() {
            opacities[i] = opacity;
        }
    }

    fn mark_pointer(&mut self, pointer: Pointer, none: Colour, hover: Colour, select: Colour) {
        if pointer.row < 0.0 || pointer.column < 0.0 {
            return;
        }
        let colour = match pointer.state {
            PointerState::None => none,
            PointerState::Hover => hover,
            PointerState::Select => select,
        };
        self.paint(pointer.row as i64, pointer.column as i64, 1.0, colour);
    }
}

impl Host for DemoHost {
    fn tick(&mut self, pointer: Pointer, keys: &dyn KeyHeld) {
        let mut y = dot_y(self.ticks);
        if keys.key_held(KeyCode::KeyW) {
            y += NUDGE;
        }
        if keys.key_held(KeyCode::KeyS) {
            y -= NUDGE;
        }
        self.previous = self.next;
        self.next = (dot_x(self.ticks), y);
        self.tick_pointer = pointer;
        self.ticks += 1;

        let span = SAMPLES_PER_TICK as f32;
        for sample in 0..SAMPLES_PER_TICK {
            let t = sample as f32 / span;
            let x = (self.next.0 * t + self.previous.0 * (1.0 - t) - COLUMNS as f32 / 2.0) / COLUMNS as f32;
            let unmixed = (self.samples as f64 * TONE_STEP).sin() as f32;
            self.audio.left[sample] = (-x).max(0.0) * unmixed;
            self.audio.right[sample] = x.max(0.0) * unmixed;
            self.samples += 1;
        }
    }

    fn video(&mut self, pointer: Pointer, keys: &dyn KeyHeld, progress: f32) {
        for row in 0..ROWS {
            for column in 0..COLUMNS {
                let i = self.framebuffer.index(row, column);
                self.framebuffer.reds[i] = if (row + column) % 2 == 1 { 0.2 } else { 0.7 };
                self.framebuffer.greens[i] = row as f32 * 0.3 / ROWS as f32;
                self.framebuffer.blues[i] = row as f32 * 0.9 / ROWS as f32;
                if let Some(opacities) = self.framebuffer.opacities.as_mut() {
                    opacities[i] = 0.25;
                }
            }
        }

        let (x, y) = self.dot(progress);
        let (x, y) = (x as i64, y as i64);
        let green = if keys.key_held(KeyCode::Space) { 1.0 } else { 0.0 };
        for row in y - 2..y + 2 {
            for column in x - 2..x + 2 {
                self.paint(row, column, 1.0, (1.0, green, 1.0));
            }
        }

        self.framebuffer.greens[self.video_calls % 64] = 1.0;

        self.mark_pointer(self.tick_pointer, (1.0, 0.0, 0.0), (0.0, 1.0, 0.0), (0.0, 0.0, 1.0));
        self.mark_pointer(pointer, (0.0, 1.0, 1.0), (1.0, 0.0, 1.0), (1.0, 1.0, 0.0));

        self.video_calls += 1;
    }

    fn framebuffer(&self) -> &ViewportFramebuffer {
        &self.framebuffer
    }

    fn audio(&self) -> &AudioFrame {
        &self.audio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Held(HashSet<KeyCode>);

    impl KeyHeld for Held {
        fn key_held(&self, key: KeyCode) -> bool {
            self.0.contains(&key)
        }
    }

    #[test]
    fn w_key_moves_the_dot_down() {
        let mut plain = DemoHost::new(false);
        let mut nudged = DemoHost::new(false);
        plain.tick(Pointer::default(), &Held(HashSet::new()));
        nudged.tick(Pointer::default(), &Held([KeyCode::KeyW].into()));
        assert!((nudged.dot(1.0).1 - plain.dot(1.0).1 - NUDGE).abs() < 1e-3);
    }

    #[test]
    fn tone_pans_with_the_dot() {
        let mut host = DemoHost::new(false);
        let keys = Held(HashSet::new());
        host.tick(Pointer::default(), &keys);
        let audio = host.audio();
        // only one side carries the tone at a time
        assert!(audio.left.iter().zip(&audio.right).all(|(l, r)| *l == 0.0 || *r == 0.0));
        assert!(audio.left.iter().chain(&audio.right).all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn video_draws_counter_stripe_and_pointer() {
        let mut host = DemoHost::new(true);
        let keys = Held(HashSet::new());
        let pointer = Pointer { state: PointerState::Select, row: 100.0, column: 10.0 };
        host.video(pointer, &keys, 0.5);
        host.video(pointer, &keys, 0.5);

        let fb = host.framebuffer();
        assert_eq!(fb.greens[1], 1.0);
        let i = fb.index(100, 10);
        assert_eq!((fb.reds[i], fb.greens[i], fb.blues[i]), (1.0, 1.0, 0.0));
        assert_eq!(fb.opacities.as_ref().unwrap()[i], 1.0);
    }
}
