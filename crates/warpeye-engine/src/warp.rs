//! Texture warp calculator.
//!
//! Coordinates are normalized screen space: (0,0) bottom left, (1,1) top right.
//! The texture coordinate of a vertex is fixed by its grid position; only the
//! destination (screen) coordinate is warped.

use std::f32::consts::PI;
use std::str::FromStr;

use crate::controller::KnobSource;
use crate::error::EngineError;

pub const WARP_PARAMETER_STEPS: usize = 20;
pub const Y_FAN_SCALE: f32 = 3.0;

pub const KNOB_X_POS: usize = 0;
pub const KNOB_X_FAN: usize = 1;
pub const KNOB_ASPECT: usize = 2;
pub const KNOB_Y_POS: usize = 4;
pub const KNOB_Y_FAN: usize = 5;

/// Half-size of a point's pick box along x. The y half-size is scaled by the display
/// aspect so the box is square on screen.
pub const POINT_OFFSET: f32 = 0.002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpMode {
    /// Knob-driven curved mesh.
    Parameter,
    /// Identity: the texture fills the display.
    None,
}

impl WarpMode {
    pub const ALL: [WarpMode; 2] = [WarpMode::Parameter, WarpMode::None];

    /// Next mode in display order, wrapping.
    pub fn next(self) -> Self {
        match self {
            WarpMode::Parameter => WarpMode::None,
            WarpMode::None => WarpMode::Parameter,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WarpMode::Parameter => "parameter",
            WarpMode::None => "none",
        }
    }
}

impl Default for WarpMode {
    fn default() -> Self {
        WarpMode::ALL[0]
    }
}

impl FromStr for WarpMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WarpMode::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EngineError::UnknownWarp(s.to_string()))
    }
}

/// Grid of destination coordinates, row-major, row 0 at the bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    cols: usize,
    rows: usize,
    points: Vec<[f32; 2]>,
}

impl Mesh {
    /// Build a `cols x rows` grid (both at least 2) from `f(col, row)`.
    pub fn from_fn(cols: usize, rows: usize, mut f: impl FnMut(usize, usize) -> [f32; 2]) -> Self {
        let cols = cols.max(2);
        let rows = rows.max(2);
        let mut points = Vec::with_capacity(cols * rows);
        for row in 0..rows {
            for col in 0..cols {
                points.push(f(col, row));
            }
        }
        Self { cols, rows, points }
    }

    /// Unwarped grid with `steps + 1` vertices per side.
    pub fn identity(steps: usize) -> Self {
        let n = steps.max(1) + 1;
        let d = (n - 1) as f32;
        Self::from_fn(n, n, |col, row| [col as f32 / d, row as f32 / d])
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn points(&self) -> &[[f32; 2]] {
        &self.points
    }

    pub fn get(&self, col: usize, row: usize) -> [f32; 2] {
        self.points[row * self.cols + col]
    }

    /// Overwrite one vertex (interactive point editing). Out-of-range indices are ignored.
    pub fn set(&mut self, col: usize, row: usize, pos: [f32; 2]) {
        if col < self.cols && row < self.rows {
            self.points[row * self.cols + col] = pos;
        }
    }

    /// Parametric (s,t) of a grid position, uniform in [0,1].
    pub fn tex_coord(&self, col: usize, row: usize) -> [f32; 2] {
        [
            col as f32 / (self.cols - 1) as f32,
            row as f32 / (self.rows - 1) as f32,
        ]
    }

    /// Bilinear sample of the destination at parametric (s,t).
    pub fn sample(&self, s: f32, t: f32) -> [f32; 2] {
        let fx = s.clamp(0.0, 1.0) * (self.cols - 1) as f32;
        let fy = t.clamp(0.0, 1.0) * (self.rows - 1) as f32;
        let c0 = (fx.floor() as usize).min(self.cols - 2);
        let r0 = (fy.floor() as usize).min(self.rows - 2);
        let (ax, ay) = (fx - c0 as f32, fy - r0 as f32);

        let lerp = |a: [f32; 2], b: [f32; 2], k: f32| [a[0] + (b[0] - a[0]) * k, a[1] + (b[1] - a[1]) * k];
        let bottom = lerp(self.get(c0, r0), self.get(c0 + 1, r0), ax);
        let top = lerp(self.get(c0, r0 + 1), self.get(c0 + 1, r0 + 1), ax);
        lerp(bottom, top, ay)
    }

    /// Same surface at a different density.
    pub fn resample(&self, steps: usize) -> Mesh {
        let n = steps.max(1) + 1;
        let d = (n - 1) as f32;
        Mesh::from_fn(n, n, |col, row| self.sample(col as f32 / d, row as f32 / d))
    }
}

/// Build the destination mesh for `mode`.
///
/// `display_aspect` is width / height.
pub fn compute_mesh<K: KnobSource + ?Sized>(mode: WarpMode, display_aspect: f32, ctrl: &K) -> Mesh {
    match mode {
        WarpMode::None => Mesh::identity(1),
        WarpMode::Parameter => parameter_mesh(display_aspect, ctrl),
    }
}

fn parameter_mesh<K: KnobSource + ?Sized>(display_aspect: f32, ctrl: &K) -> Mesh {
    // Linear ramp at knob 0, cosine ease at knob 1.
    let cos_curve = |v: f32, knob: usize, invert: bool| {
        let c = (1.0 - (v * PI).cos()) / 2.0;
        ctrl.interpolate(c, v, knob, invert)
    };
    // Flat 1.0 at knob 0, half-sine bump at knob 1.
    let sin_curve = |v: f32, knob: usize, invert: bool| ctrl.interpolate((v * PI).sin(), 1.0, knob, invert);

    let display_scale = ctrl.interpolate(display_aspect, 1.0, KNOB_ASPECT, true);
    let steps = WARP_PARAMETER_STEPS as f32;

    Mesh::from_fn(WARP_PARAMETER_STEPS + 1, WARP_PARAMETER_STEPS + 1, |col, row| {
        let x = col as f32 / steps;
        let y = row as f32 / steps;

        let x_fan = sin_curve(y, KNOB_X_FAN, true);
        let x_pos = (cos_curve(x, KNOB_X_POS, true) - 0.5) * x_fan / display_scale + 0.5;

        let y_fan = 1.0 + Y_FAN_SCALE * (1.0 - sin_curve(x, KNOB_Y_FAN, true));
        let y_pos = (cos_curve(y, KNOB_Y_POS, true) - 0.5) * y_fan + 0.5;

        [x_pos, y_pos]
    })
}

/// A vertex under the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickedVertex {
    pub pos: [f32; 2],
    pub col: usize,
    pub row: usize,
}

/// Find the vertex whose pick box contains `pointer`.
///
/// Boxes are half-open (`[p - r, p + r)`). When boxes overlap, the first vertex in
/// row-major order wins.
pub fn pick_vertex(mesh: &Mesh, pointer: [f32; 2], display_aspect: f32) -> Option<PickedVertex> {
    let rx = POINT_OFFSET;
    let ry = POINT_OFFSET * display_aspect;
    let [mx, my] = pointer;

    mesh.points()
        .iter()
        .enumerate()
        .find(|(_, p)| p[0] - rx <= mx && mx < p[0] + rx && p[1] - ry <= my && my < p[1] + ry)
        .map(|(i, p)| PickedVertex {
            pos: *p,
            col: i % mesh.cols(),
            row: i / mesh.cols(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::KNOB_COUNT;

    const ASPECT: f32 = 16.0 / 9.0;

    fn close(a: [f32; 2], b: [f32; 2]) -> bool {
        (a[0] - b[0]).abs() < 1e-5 && (a[1] - b[1]).abs() < 1e-5
    }

    #[test]
    fn none_is_unit_square() {
        let m = compute_mesh(WarpMode::None, ASPECT, &[0.7; KNOB_COUNT]);
        assert_eq!((m.cols(), m.rows()), (2, 2));
        assert_eq!(m.points(), &[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
    }

    #[test]
    fn zero_knobs_reproduce_identity() {
        let knobs = [0.0; KNOB_COUNT];
        let warped = compute_mesh(WarpMode::Parameter, ASPECT, &knobs);
        let identity = compute_mesh(WarpMode::None, ASPECT, &knobs).resample(WARP_PARAMETER_STEPS);

        assert_eq!(warped.cols(), WARP_PARAMETER_STEPS + 1);
        assert_eq!(warped.rows(), WARP_PARAMETER_STEPS + 1);
        for (a, b) in warped.points().iter().zip(identity.points()) {
            assert!(close(*a, *b), "{a:?} != {b:?}");
        }
    }

    #[test]
    fn aspect_knob_compresses_x_around_centre() {
        let mut knobs = [0.0; KNOB_COUNT];
        knobs[KNOB_ASPECT] = 1.0;
        let m = compute_mesh(WarpMode::Parameter, 2.0, &knobs);
        // divided by the full display aspect
        assert!(close(m.get(0, 0), [0.25, 0.0]));
        assert!(close(m.get(WARP_PARAMETER_STEPS, 0), [0.75, 0.0]));
    }

    #[test]
    fn x_fan_pinches_top_and_bottom_rows() {
        let mut knobs = [0.0; KNOB_COUNT];
        knobs[KNOB_X_FAN] = 1.0;
        let m = compute_mesh(WarpMode::Parameter, 1.0, &knobs);
        let last = WARP_PARAMETER_STEPS;
        // sin(0) = 0: bottom and top rows collapse to the centre line
        assert!(close(m.get(0, 0), [0.5, 0.0]));
        assert!(close(m.get(last, last), [0.5, 1.0]));
        // middle row is untouched (sin(pi/2) = 1)
        assert!(close(m.get(0, last / 2), [0.0, 0.5]));
    }

    #[test]
    fn y_fan_spreads_edge_columns() {
        let mut knobs = [0.0; KNOB_COUNT];
        knobs[KNOB_Y_FAN] = 1.0;
        let m = compute_mesh(WarpMode::Parameter, 1.0, &knobs);
        let last = WARP_PARAMETER_STEPS;
        // edge columns are scaled by 1 + Y_FAN_SCALE around y = 0.5
        assert!(close(m.get(0, last), [0.0, 0.5 + 0.5 * (1.0 + Y_FAN_SCALE)]));
        // centre column keeps its height
        assert!(close(m.get(last / 2, last), [0.5, 1.0]));
    }

    #[test]
    fn position_knob_eases_columns() {
        let mut knobs = [0.0; KNOB_COUNT];
        knobs[KNOB_X_POS] = 1.0;
        let m = compute_mesh(WarpMode::Parameter, 1.0, &knobs);
        let quarter = m.get(WARP_PARAMETER_STEPS / 4, 0)[0];
        let expected = (1.0 - (0.25 * PI).cos()) / 2.0;
        assert!((quarter - expected).abs() < 1e-5);
        // end points are fixed by the cosine ease
        assert!(close(m.get(0, 0), [0.0, 0.0]));
    }

    #[test]
    fn pick_finds_vertex_and_respects_aspect() {
        let m = Mesh::identity(4);
        let hit = pick_vertex(&m, [0.251, 0.5], 1.0).unwrap();
        assert_eq!((hit.col, hit.row), (1, 2));
        assert_eq!(hit.pos, [0.25, 0.5]);

        // y box is POINT_OFFSET * aspect tall
        assert!(pick_vertex(&m, [0.25, 0.503], 1.0).is_none());
        assert!(pick_vertex(&m, [0.25, 0.503], 2.0).is_some());

        // half-open on the upper side
        assert!(pick_vertex(&m, [0.25 + POINT_OFFSET, 0.5], 1.0).is_none());
        assert!(pick_vertex(&m, [0.25 - POINT_OFFSET, 0.5], 1.0).is_some());
    }

    #[test]
    fn pick_tie_breaks_on_row_major_order() {
        // collapse a column so several vertices share a pick box
        let mut m = Mesh::identity(2);
        m.set(1, 0, [0.5, 0.5]);
        m.set(0, 1, [0.5, 0.5]);
        let hit = pick_vertex(&m, [0.5, 0.5], 1.0).unwrap();
        assert_eq!((hit.col, hit.row), (1, 0));
    }

    #[test]
    fn set_overwrites_single_vertex() {
        let mut m = Mesh::identity(2);
        m.set(1, 1, [0.9, 0.1]);
        assert_eq!(m.get(1, 1), [0.9, 0.1]);
        assert_eq!(m.get(0, 0), [0.0, 0.0]);
        m.set(7, 7, [1.0, 1.0]);
        assert_eq!(m.points().len(), 9);
        assert_eq!(m.tex_coord(1, 1), [0.5, 0.5]);
    }

    #[test]
    fn warp_modes_cycle_and_parse() {
        assert_eq!(WarpMode::default(), WarpMode::Parameter);
        assert_eq!(WarpMode::Parameter.next().next(), WarpMode::Parameter);
        assert_eq!("NONE".parse::<WarpMode>().unwrap(), WarpMode::None);
        assert!(matches!(
            "spiral".parse::<WarpMode>(),
            Err(EngineError::UnknownWarp(_))
        ));
    }
}
