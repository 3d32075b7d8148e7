//! Letterbox placement of the viewport inside the client area, the inverse used for
//! pointer mapping, and the aspect-locked resize rules.

/// Placement of the scaled viewport inside a client area. For each axis,
/// `offset + scaled + inverse_offset` equals the client extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub client_width: u32,
    pub client_height: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub inverse_x_offset: u32,
    pub inverse_y_offset: u32,
}

impl Geometry {
    /// Viewport drawn at its native size filling the whole client area.
    pub fn stretched(client_width: u32, client_height: u32) -> Self {
        Self {
            client_width,
            client_height,
            scaled_width: client_width,
            scaled_height: client_height,
            x_offset: 0,
            y_offset: 0,
            inverse_x_offset: 0,
            inverse_y_offset: 0,
        }
    }

    /// Largest aspect-preserving fit of `rows` x `columns` inside the client area,
    /// centred, with any odd leftover pixel going to the right or bottom border.
    pub fn letterbox(client_width: u32, client_height: u32, rows: usize, columns: usize) -> Self {
        let (cw, ch) = (client_width as u64, client_height as u64);
        let (rows, columns) = (rows.max(1) as u64, columns.max(1) as u64);

        // scale = min(cw / columns, ch / rows), kept in integers so exact fits stay exact
        let (scaled_width, scaled_height) = if cw * rows <= ch * columns {
            (cw, rows * cw / columns)
        } else {
            (columns * ch / rows, ch)
        };

        let x_offset = (cw - scaled_width) / 2;
        let y_offset = (ch - scaled_height) / 2;

        Self {
            client_width,
            client_height,
            scaled_width: scaled_width as u32,
            scaled_height: scaled_height as u32,
            x_offset: x_offset as u32,
            y_offset: y_offset as u32,
            inverse_x_offset: (cw - scaled_width - x_offset) as u32,
            inverse_y_offset: (ch - scaled_height - y_offset) as u32,
        }
    }

    /// Maps a client-area pixel to `(row, column)` in viewport units.
    pub fn pointer_to_viewport(&self, x: f64, y: f64, rows: usize, columns: usize) -> (f32, f32) {
        if self.scaled_width == 0 || self.scaled_height == 0 {
            return (0.0, 0.0);
        }
        let column = (x - self.x_offset as f64) * columns as f64 / self.scaled_width as f64;
        let row = (y - self.y_offset as f64) * rows as f64 / self.scaled_height as f64;
        (row as f32, column as f32)
    }
}

/// Non-client thickness on each side, all non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Insets {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Insets {
    pub fn horizontal(&self) -> i32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> i32 {
        self.top + self.bottom
    }
}

/// Window rectangle in screen pixels, right and bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    fn inner(&self, insets: Insets) -> Rect {
        Rect {
            left: self.left + insets.left,
            top: self.top + insets.top,
            right: self.right - insets.right,
            bottom: self.bottom - insets.bottom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingEdge {
    Left,
    Right,
    Top,
    Bottom,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl SizingEdge {
    /// Best guess at the dragged edge when only the old and new client sizes are
    /// known. Growth is attributed to the right and bottom edges.
    pub fn infer(previous: (u32, u32), current: (u32, u32)) -> Option<Self> {
        match (previous.0 != current.0, previous.1 != current.1) {
            (true, true) => Some(SizingEdge::BottomRight),
            (true, false) => Some(SizingEdge::Right),
            (false, true) => Some(SizingEdge::Bottom),
            (false, false) => None,
        }
    }
}

/// Adjusts a window rectangle being dragged by `edge` so its client area keeps the
/// `rows` x `columns` aspect.
pub fn constrain_sizing(edge: SizingEdge, outer: Rect, insets: Insets, rows: usize, columns: usize) -> Rect {
    let inner = outer.inner(insets);
    let (inner_width, inner_height) = (inner.width(), inner.height());
    let (rows, columns) = (rows.max(1) as i32, columns.max(1) as i32);
    let mut outer = outer;

    match edge {
        SizingEdge::Top | SizingEdge::Bottom => {
            let width_change = inner_height * columns / rows - inner_width;
            outer.left -= width_change / 2;
            outer.right += width_change / 2;
        }
        SizingEdge::Left | SizingEdge::Right => {
            let height_change = inner_width * rows / columns - inner_height;
            outer.bottom += height_change;
        }
        corner => {
            let scale = (inner_width as f32 / columns as f32).max(inner_height as f32 / rows as f32);
            let width_change = (scale * columns as f32) as i32 - inner_width;
            let height_change = (scale * rows as f32) as i32 - inner_height;

            match corner {
                SizingEdge::TopLeft | SizingEdge::TopRight => outer.top -= height_change,
                _ => outer.bottom += height_change,
            }
            match corner {
                SizingEdge::TopLeft | SizingEdge::BottomLeft => outer.left -= width_change,
                _ => outer.right += width_change,
            }
        }
    }

    outer
}

/// Snaps a resized client area back to the viewport aspect, remembering the size it
/// asked for so the resize that request causes is left alone.
#[derive(Debug, Default)]
pub struct ResizeSnap {
    pending: Option<(u32, u32)>,
}

impl ResizeSnap {
    /// Client size to request after a resize from `previous` to `current`, if any.
    /// `locked` is false while the window may take any size, e.g. maximized.
    pub fn on_resize(
        &mut self,
        previous: (u32, u32),
        current: (u32, u32),
        locked: bool,
        rows: usize,
        columns: usize,
    ) -> Option<(u32, u32)> {
        if self.pending.take() == Some(current) || !locked {
            return None;
        }
        let edge = SizingEdge::infer(previous, current)?;
        let outer = Rect {
            left: 0,
            top: 0,
            right: current.0 as i32,
            bottom: current.1 as i32,
        };
        let fixed = constrain_sizing(edge, outer, Insets::default(), rows, columns);
        let target = (fixed.width().max(1) as u32, fixed.height().max(1) as u32);
        if target == current {
            return None;
        }
        self.pending = Some(target);
        Some(target)
    }
}

/// Minimum and maximum outer window size, as `(width, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackLimits {
    pub min: (i32, i32),
    pub max: (i32, i32),
}

/// `None` when the system maximum is unknown or smaller than the insets.
pub fn track_limits(rows: usize, columns: usize, insets: Insets, system_max: (i32, i32)) -> Option<TrackLimits> {
    let available_width = system_max.0 - insets.horizontal();
    let available_height = system_max.1 - insets.vertical();
    if available_width <= 0 || available_height <= 0 {
        return None;
    }

    let (rows, columns) = (rows.max(1) as i32, columns.max(1) as i32);
    let scale = (available_width as f32 / columns as f32).min(available_height as f32 / rows as f32);

    Some(TrackLimits {
        min: (columns + insets.horizontal(), rows + insets.vertical()),
        max: (
            (scale * columns as f32) as i32 + insets.horizontal(),
            (scale * rows as f32) as i32 + insets.vertical(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_client_is_pillarboxed() {
        let g = Geometry::letterbox(400, 100, 192, 256);
        assert_eq!(g.scaled_width, 133);
        assert_eq!(g.scaled_height, 100);
        assert_eq!(g.x_offset, 133);
        assert_eq!(g.inverse_x_offset, 134);
        assert_eq!(g.y_offset, 0);
        assert_eq!(g.inverse_y_offset, 0);
    }

    #[test]
    fn offsets_always_cover_the_client() {
        for cw in (256..700).step_by(7) {
            for ch in (192..600).step_by(11) {
                let g = Geometry::letterbox(cw, ch, 192, 256);
                assert_eq!(g.x_offset + g.scaled_width + g.inverse_x_offset, cw);
                assert_eq!(g.y_offset + g.scaled_height + g.inverse_y_offset, ch);
                assert!(g.scaled_width == cw || g.scaled_height == ch);
                assert!(g.inverse_x_offset >= g.x_offset && g.inverse_x_offset - g.x_offset <= 1);
            }
        }
    }

    #[test]
    fn exact_multiple_fills_client() {
        let g = Geometry::letterbox(768, 576, 192, 256);
        assert_eq!((g.scaled_width, g.scaled_height), (768, 576));
        assert_eq!((g.x_offset, g.y_offset), (0, 0));
    }

    #[test]
    fn pointer_maps_through_letterbox() {
        let g = Geometry::letterbox(400, 100, 192, 256);
        let (row, column) = g.pointer_to_viewport(133.0, 50.0, 192, 256);
        assert_eq!(column, 0.0);
        assert_eq!(row, 96.0);

        // left border maps to negative columns
        let (_, column) = g.pointer_to_viewport(0.0, 0.0, 192, 256);
        assert!(column < 0.0);
    }

    #[test]
    fn zero_sized_client_maps_to_origin() {
        let g = Geometry::letterbox(0, 0, 192, 256);
        assert_eq!(g.pointer_to_viewport(10.0, 10.0, 192, 256), (0.0, 0.0));
    }

    fn rect(width: i32, height: i32) -> Rect {
        Rect { left: 100, top: 100, right: 100 + width, bottom: 100 + height }
    }

    #[test]
    fn vertical_drag_adjusts_width_symmetrically() {
        let insets = Insets { left: 8, top: 31, right: 8, bottom: 8 };
        // inner 256 x 384 wants width 512
        let outer = rect(256 + 16, 384 + 39);
        let fixed = constrain_sizing(SizingEdge::Bottom, outer, insets, 192, 256);
        assert_eq!(fixed.left, 100 - 128);
        assert_eq!(fixed.right, 100 + 272 + 128);
        assert_eq!(fixed.top, outer.top);
        assert_eq!(fixed.bottom, outer.bottom);
    }

    #[test]
    fn horizontal_drag_adjusts_bottom() {
        let outer = rect(512, 192);
        let fixed = constrain_sizing(SizingEdge::Left, outer, Insets::default(), 192, 256);
        assert_eq!(fixed.height(), 384);
        assert_eq!(fixed.top, outer.top);
        assert_eq!(fixed.width(), 512);
    }

    #[test]
    fn corner_drag_uses_larger_scale() {
        let outer = rect(300, 200);
        let fixed = constrain_sizing(SizingEdge::TopLeft, outer, Insets::default(), 192, 256);
        assert_eq!(fixed.width(), 300);
        assert_eq!(fixed.height(), 225);
        assert_eq!(fixed.top, 100 - 25);
        assert_eq!(fixed.bottom, outer.bottom);
        assert_eq!(fixed.right, outer.right);
    }

    #[test]
    fn limits_include_insets() {
        let insets = Insets { left: 8, top: 31, right: 8, bottom: 8 };
        let limits = track_limits(192, 256, insets, (1936, 1119)).unwrap();
        assert_eq!(limits.min, (272, 231));
        // available 1920 x 1080, height bound: scale 5.625
        assert_eq!(limits.max, (1440 + 16, 1080 + 39));
    }

    #[test]
    fn limits_need_a_system_maximum() {
        assert_eq!(track_limits(192, 256, Insets::default(), (0, 0)), None);
    }

    #[test]
    fn snap_request_is_not_snapped_again() {
        let mut snap = ResizeSnap::default();
        assert_eq!(snap.on_resize((256, 192), (512, 192), true, 192, 256), Some((512, 384)));
        // the resize caused by the request above
        assert_eq!(snap.on_resize((512, 192), (512, 384), true, 192, 256), None);
        // a later drag snaps as usual
        assert_eq!(snap.on_resize((512, 384), (512, 400), true, 192, 256), Some((532, 400)));
    }

    #[test]
    fn unlocked_window_is_never_snapped() {
        let mut snap = ResizeSnap::default();
        assert_eq!(snap.on_resize((256, 192), (1920, 1017), false, 192, 256), None);
        assert_eq!(snap.on_resize((256, 192), (300, 192), true, 192, 256), Some((300, 225)));
        assert_eq!(snap.on_resize((300, 192), (300, 225), false, 192, 256), None);
    }

    #[test]
    fn infers_dragged_edge() {
        assert_eq!(SizingEdge::infer((10, 10), (12, 10)), Some(SizingEdge::Right));
        assert_eq!(SizingEdge::infer((10, 10), (10, 8)), Some(SizingEdge::Bottom));
        assert_eq!(SizingEdge::infer((10, 10), (12, 8)), Some(SizingEdge::BottomRight));
        assert_eq!(SizingEdge::infer((10, 10), (10, 10)), None);
    }
}
