use thiserror::Error;

use crate::config::{FilteringMode, LoopConfig, RowOrder};
use crate::geometry::Geometry;
use crate::host::{Host, KeyHeld, Pointer, ViewportFramebuffer};

#[derive(Debug, Error)]
pub enum PresentError {
    #[error("framebuffer changed from {expected_rows}x{expected_columns} to {rows}x{columns}")]
    FramebufferSize {
        expected_rows: usize,
        expected_columns: usize,
        rows: usize,
        columns: usize,
    },

    #[error("framebuffer has no opacity plane")]
    MissingOpacity,

    #[error("surface resize failed: {0}")]
    Resize(String),

    #[error("surface buffer unavailable: {0}")]
    Buffer(String),

    #[error("{0}")]
    Present(String),
}

fn channel(value: f32) -> u8 {
    (value * 255.0) as u8
}

// --- Opaque path ---

/// 24-bit image in `B G R` byte order with every row padded to a multiple of four
/// bytes.
pub struct PackedImage {
    rows: usize,
    columns: usize,
    stride: usize,
    row_order: RowOrder,
    bytes: Vec<u8>,
}

impl PackedImage {
    pub fn new(rows: usize, columns: usize, row_order: RowOrder) -> Self {
        let stride = (columns * 3 + 3) & !3;
        Self {
            rows,
            columns,
            stride,
            row_order,
            bytes: vec![0; stride * rows],
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn row_start(&self, row: usize) -> usize {
        match self.row_order {
            RowOrder::TopDown => row * self.stride,
            RowOrder::BottomUp => (self.rows - 1 - row) * self.stride,
        }
    }

    pub fn pack(&mut self, framebuffer: &ViewportFramebuffer) -> Result<(), PresentError> {
        check_size(self.rows, self.columns, framebuffer)?;
        for row in 0..self.rows {
            let start = self.row_start(row);
            let line = &mut self.bytes[start..start + self.columns * 3];
            for (column, bgr) in line.chunks_exact_mut(3).enumerate() {
                let i = framebuffer.index(row, column);
                bgr[0] = channel(framebuffer.blues[i]);
                bgr[1] = channel(framebuffer.greens[i]);
                bgr[2] = channel(framebuffer.reds[i]);
            }
        }
        Ok(())
    }

    /// Pixel at `(row, column)` from the top-left, as `0x00RRGGBB`.
    pub fn pixel(&self, row: usize, column: usize) -> u32 {
        let offset = self.row_start(row) + column * 3;
        let bgr = &self.bytes[offset..offset + 3];
        (bgr[2] as u32) << 16 | (bgr[1] as u32) << 8 | bgr[0] as u32
    }

    fn release(&mut self) {
        self.bytes = Vec::new();
    }
}

fn check_size(rows: usize, columns: usize, framebuffer: &ViewportFramebuffer) -> Result<(), PresentError> {
    if framebuffer.rows() == rows && framebuffer.columns() == columns {
        Ok(())
    } else {
        Err(PresentError::FramebufferSize {
            expected_rows: rows,
            expected_columns: columns,
            rows: framebuffer.rows(),
            columns: framebuffer.columns(),
        })
    }
}

fn lerp_pixel(a: u32, b: u32, t: f32) -> u32 {
    let mut out = 0;
    for shift in [0, 8, 16] {
        let ca = ((a >> shift) & 0xFF) as f32;
        let cb = ((b >> shift) & 0xFF) as f32;
        out |= ((ca + (cb - ca) * t).round() as u32) << shift;
    }
    out
}

/// Source coordinate and blend weight for destination index `d` of `scaled`
/// covering `source` texels, sampling at pixel centres.
fn smooth_coordinate(d: u32, scaled: u32, source: usize) -> (usize, usize, f32) {
    let u = ((d as f32 + 0.5) * source as f32 / scaled as f32 - 0.5).max(0.0);
    let i0 = (u as usize).min(source - 1);
    let i1 = (i0 + 1).min(source - 1);
    (i0, i1, u - i0 as f32)
}

/// Stretches `image` into the letterboxed area of a `0x00RRGGBB` client buffer and
/// fills the borders with `background`.
pub fn blit(image: &PackedImage, geometry: &Geometry, filtering: FilteringMode, background: u32, dest: &mut [u32]) {
    let cw = geometry.client_width as usize;
    if cw == 0 {
        return;
    }
    let (x0, y0) = (geometry.x_offset as usize, geometry.y_offset as usize);
    let (sw, sh) = (geometry.scaled_width, geometry.scaled_height);

    for (y, line) in dest.chunks_exact_mut(cw).enumerate() {
        if y < y0 || y >= y0 + sh as usize {
            line.fill(background);
            continue;
        }
        line[..x0].fill(background);
        line[x0 + sw as usize..].fill(background);

        let dy = (y - y0) as u32;
        let target = &mut line[x0..x0 + sw as usize];
        match filtering {
            FilteringMode::Nearest => {
                let sy = (dy as u64 * image.rows as u64 / sh as u64) as usize;
                for (dx, pixel) in target.iter_mut().enumerate() {
                    let sx = (dx as u64 * image.columns as u64 / sw as u64) as usize;
                    *pixel = image.pixel(sy, sx);
                }
            }
            FilteringMode::Smooth => {
                let (r0, r1, fy) = smooth_coordinate(dy, sh, image.rows);
                for (dx, pixel) in target.iter_mut().enumerate() {
                    let (c0, c1, fx) = smooth_coordinate(dx as u32, sw, image.columns);
                    let top = lerp_pixel(image.pixel(r0, c0), image.pixel(r0, c1), fx);
                    let bottom = lerp_pixel(image.pixel(r1, c0), image.pixel(r1, c1), fx);
                    *pixel = lerp_pixel(top, bottom, fy);
                }
            }
        }
    }
}

// --- Layered path ---

/// Premultiplied `0xAARRGGBB` pixels, i.e. `B G R A` in memory.
pub struct LayeredBitmap {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl LayeredBitmap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.resize(width as usize * height as usize, 0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    SourceOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendFunction {
    pub op: BlendOp,
    pub constant_alpha: u8,
    pub per_pixel_alpha: bool,
}

impl BlendFunction {
    pub const PREMULTIPLIED_OVER: Self = Self {
        op: BlendOp::SourceOver,
        constant_alpha: 255,
        per_pixel_alpha: true,
    };
}

pub fn premultiply(framebuffer: &ViewportFramebuffer, dest: &mut Vec<u32>) -> Result<(), PresentError> {
    let opacities = framebuffer.opacities.as_ref().ok_or(PresentError::MissingOpacity)?;
    dest.clear();
    dest.extend(
        framebuffer
            .reds
            .iter()
            .zip(&framebuffer.greens)
            .zip(&framebuffer.blues)
            .zip(opacities)
            .map(|(((r, g), b), a)| {
                (channel(*a) as u32) << 24
                    | (channel(r * a) as u32) << 16
                    | (channel(g * a) as u32) << 8
                    | channel(b * a) as u32
            }),
    );
    Ok(())
}

/// Nearest-neighbour resample of a `rows` x `columns` image to fill `dest`.
pub fn resample_nearest(source: &[u32], rows: usize, columns: usize, dest: &mut LayeredBitmap) {
    let (width, height) = (dest.width as u64, dest.height as u64);
    if width == 0 || height == 0 {
        return;
    }
    for (y, line) in dest.pixels.chunks_exact_mut(width as usize).enumerate() {
        let sy = (y as u64 * rows as u64 / height) as usize;
        let source_line = &source[sy * columns..(sy + 1) * columns];
        for (x, pixel) in line.iter_mut().enumerate() {
            *pixel = source_line[(x as u64 * columns as u64 / width) as usize];
        }
    }
}

// --- Presentation ---

pub trait Presenter {
    /// `pixels` is `width * height` `0x00RRGGBB` values covering the client area.
    fn present_opaque(&mut self, pixels: &[u32], width: u32, height: u32) -> Result<(), PresentError>;

    /// Replaces the whole window with `bitmap`, placed at `position` on screen.
    fn present_layered(
        &mut self,
        bitmap: &LayeredBitmap,
        blend: BlendFunction,
        position: (i32, i32),
    ) -> Result<(), PresentError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositorMode {
    Opaque,
    Layered,
}

/// Owns the scratch images for whichever path the framebuffer selects.
pub struct Compositor {
    mode: CompositorMode,
    rows: usize,
    columns: usize,
    filtering: FilteringMode,
    background: u32,
    packed: PackedImage,
    client: Vec<u32>,
    premultiplied: Vec<u32>,
    layered: LayeredBitmap,
}

impl Compositor {
    pub fn new(framebuffer: &ViewportFramebuffer, config: &LoopConfig) -> Self {
        let (rows, columns) = (framebuffer.rows(), framebuffer.columns());
        let mode = if framebuffer.is_layered() { CompositorMode::Layered } else { CompositorMode::Opaque };

        let packed = match mode {
            CompositorMode::Opaque => PackedImage::new(rows, columns, config.row_order),
            CompositorMode::Layered => PackedImage::new(0, 0, config.row_order),
        };

        Self {
            mode,
            rows,
            columns,
            filtering: config.filtering,
            background: config.background_pixel(),
            packed,
            client: Vec::new(),
            premultiplied: Vec::new(),
            layered: LayeredBitmap::new(0, 0),
        }
    }

    pub fn mode(&self) -> CompositorMode {
        self.mode
    }

    /// Asks the host for a frame and presents it over `geometry`'s client area.
    /// A zero-sized client skips presentation but still runs `video`.
    #[allow(clippy::too_many_arguments)]
    pub fn redraw<H, P>(
        &mut self,
        host: &mut H,
        pointer: Pointer,
        keys: &dyn KeyHeld,
        progress: f32,
        geometry: &Geometry,
        position: (i32, i32),
        presenter: &mut P,
    ) -> Result<(), PresentError>
    where
        H: Host + ?Sized,
        P: Presenter + ?Sized,
    {
        host.video(pointer, keys, progress);
        let framebuffer = host.framebuffer();
        check_size(self.rows, self.columns, framebuffer)?;

        let (width, height) = (geometry.client_width, geometry.client_height);
        if width == 0 || height == 0 {
            return Ok(());
        }

        match self.mode {
            CompositorMode::Opaque => {
                self.packed.pack(framebuffer)?;
                self.client.resize(width as usize * height as usize, 0);
                blit(&self.packed, geometry, self.filtering, self.background, &mut self.client);
                presenter.present_opaque(&self.client, width, height)
            }
            CompositorMode::Layered => {
                premultiply(framebuffer, &mut self.premultiplied)?;
                self.layered.resize(width, height);
                resample_nearest(&self.premultiplied, self.rows, self.columns, &mut self.layered);
                presenter.present_layered(&self.layered, BlendFunction::PREMULTIPLIED_OVER, position)
            }
        }
    }

    pub fn release(&mut self) {
        self.packed.release();
        self.client = Vec::new();
        self.premultiplied = Vec::new();
        self.layered = LayeredBitmap::new(0, 0);
    }
}
