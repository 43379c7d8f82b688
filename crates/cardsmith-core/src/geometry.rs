//! Placement math for card layers.
//!
//! Everything here is a pure function over canvas-pixel coordinates.
//! Image layers are anchored at their center and text layers at their
//! top-left corner; [`Anchoring`] converts between the two conventions and
//! bounding rectangles.

use crate::preset::CardPreset;
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Geometry errors.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Target area has no usable size: {0}x{1}")]
    DegenerateArea(f64, f64),
    #[error("Source size must be positive: {0}x{1}")]
    InvalidSourceSize(f64, f64),
}

/// Result type for geometry operations.
pub type GeometryResult<T> = Result<T, GeometryError>;

/// A center-anchored placement of a scaled image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Center x.
    pub x: f64,
    /// Center y.
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Placement {
    pub fn bounds(&self) -> Rect {
        Rect::from_center_size((self.x, self.y), (self.width, self.height))
    }

    pub fn scale_of(&self, natural_w: f64) -> f64 {
        self.width / natural_w
    }
}

fn check_inputs(natural_w: f64, natural_h: f64, area: Rect) -> GeometryResult<()> {
    let (aw, ah) = (area.width(), area.height());
    if !(aw.is_finite() && ah.is_finite() && aw > 0.0 && ah > 0.0) {
        return Err(GeometryError::DegenerateArea(aw, ah));
    }
    if !(natural_w.is_finite() && natural_h.is_finite() && natural_w > 0.0 && natural_h > 0.0) {
        return Err(GeometryError::InvalidSourceSize(natural_w, natural_h));
    }
    Ok(())
}

fn centered(natural_w: f64, natural_h: f64, area: Rect, scale: f64) -> Placement {
    let center = area.center();
    Placement {
        x: center.x,
        y: center.y,
        width: natural_w * scale,
        height: natural_h * scale,
    }
}

/// Scale uniformly so the image is fully contained in `area`, centered.
///
/// May leave empty space along one axis.
pub fn fit_to_area(natural_w: f64, natural_h: f64, area: Rect) -> GeometryResult<Placement> {
    check_inputs(natural_w, natural_h, area)?;
    let scale = (area.width() / natural_w).min(area.height() / natural_h);
    Ok(centered(natural_w, natural_h, area, scale))
}

/// Scale uniformly so the image covers all of `area`, centered.
///
/// The overflow is cropped by the canvas clip.
pub fn fill_area(natural_w: f64, natural_h: f64, area: Rect) -> GeometryResult<Placement> {
    check_inputs(natural_w, natural_h, area)?;
    let scale = (area.width() / natural_w).max(area.height() / natural_h);
    Ok(centered(natural_w, natural_h, area, scale))
}

/// [`fill_area`] against the whole canvas, bleed included.
pub fn fill_canvas(natural_w: f64, natural_h: f64, preset: &CardPreset) -> GeometryResult<Placement> {
    fill_area(natural_w, natural_h, preset.canvas_rect())
}

/// How a layer's `(x, y)` relates to its bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchoring {
    /// `(x, y)` is the center (image layers).
    Center,
    /// `(x, y)` is the top-left corner (text layers).
    TopLeft,
}

impl Anchoring {
    /// Bounding box of a layer at `(x, y)` with the given size.
    pub fn bounds(self, x: f64, y: f64, width: f64, height: f64) -> Rect {
        match self {
            Anchoring::Center => Rect::from_center_size((x, y), (width, height)),
            Anchoring::TopLeft => Rect::new(x, y, x + width, y + height),
        }
    }

    /// The `(x, y)` a layer must take to occupy `rect`.
    pub fn position(self, rect: Rect) -> Point {
        match self {
            Anchoring::Center => rect.center(),
            Anchoring::TopLeft => rect.origin(),
        }
    }
}

/// Corner resize handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleId {
    Nw,
    Ne,
    Sw,
    Se,
}

impl HandleId {
    pub const ALL: [HandleId; 4] = [HandleId::Nw, HandleId::Ne, HandleId::Sw, HandleId::Se];

    /// The corner held fixed while this one is dragged.
    pub fn opposite(self) -> Self {
        match self {
            HandleId::Nw => HandleId::Se,
            HandleId::Se => HandleId::Nw,
            HandleId::Ne => HandleId::Sw,
            HandleId::Sw => HandleId::Ne,
        }
    }

    /// Position of this corner on `bounds`.
    pub fn corner_of(self, bounds: Rect) -> Point {
        match self {
            HandleId::Nw => Point::new(bounds.x0, bounds.y0),
            HandleId::Ne => Point::new(bounds.x1, bounds.y0),
            HandleId::Sw => Point::new(bounds.x0, bounds.y1),
            HandleId::Se => Point::new(bounds.x1, bounds.y1),
        }
    }

    /// Unit direction from the anchor towards this corner.
    fn direction(self) -> (f64, f64) {
        match self {
            HandleId::Nw => (-1.0, -1.0),
            HandleId::Ne => (1.0, -1.0),
            HandleId::Sw => (-1.0, 1.0),
            HandleId::Se => (1.0, 1.0),
        }
    }
}

/// The four corner handles of a layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeHandles {
    pub nw: Point,
    pub ne: Point,
    pub sw: Point,
    pub se: Point,
}

impl ResizeHandles {
    pub fn get(&self, handle: HandleId) -> Point {
        match handle {
            HandleId::Nw => self.nw,
            HandleId::Ne => self.ne,
            HandleId::Sw => self.sw,
            HandleId::Se => self.se,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (HandleId, Point)> + '_ {
        HandleId::ALL.into_iter().map(|h| (h, self.get(h)))
    }

    /// Closest handle within `tolerance` of `point`.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> Option<HandleId> {
        self.iter()
            .map(|(h, p)| (h, p.distance(point)))
            .filter(|(_, d)| *d <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(h, _)| h)
    }
}

/// Corner handle coordinates, exactly on the corners of `bounds`.
pub fn resize_handle_positions(bounds: Rect) -> ResizeHandles {
    ResizeHandles {
        nw: HandleId::Nw.corner_of(bounds),
        ne: HandleId::Ne.corner_of(bounds),
        sw: HandleId::Sw.corner_of(bounds),
        se: HandleId::Se.corner_of(bounds),
    }
}

/// Position of the rotate control: above the top-center of `bounds`.
pub fn rotate_handle_position(bounds: Rect, offset: f64) -> Point {
    Point::new(bounds.center().x, bounds.y0 - offset)
}

/// Limits applied while resizing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeConstraints {
    pub min_width: f64,
    pub min_height: f64,
    /// Scale both axes by the same factor.
    pub keep_aspect: bool,
}

impl ResizeConstraints {
    pub fn with_min_size(min: f64) -> Self {
        Self {
            min_width: min,
            min_height: min,
            keep_aspect: false,
        }
    }
}

impl Default for ResizeConstraints {
    fn default() -> Self {
        Self::with_min_size(crate::config::DEFAULT_MIN_LAYER_SIZE)
    }
}

/// Move corner `handle` of `bounds` by `delta`, holding the opposite corner.
///
/// Each dimension is clamped to the constraint floor; past the floor the
/// dragged corner stops instead of crossing the anchor.
pub fn apply_resize(
    bounds: Rect,
    handle: HandleId,
    delta: Vec2,
    constraints: &ResizeConstraints,
) -> Rect {
    let delta = if delta.is_finite() { delta } else { Vec2::ZERO };
    let anchor = handle.opposite().corner_of(bounds);
    let dragged = handle.corner_of(bounds) + delta;
    let (dir_x, dir_y) = handle.direction();

    let mut width = ((dragged.x - anchor.x) * dir_x).max(constraints.min_width);
    let mut height = ((dragged.y - anchor.y) * dir_y).max(constraints.min_height);

    if constraints.keep_aspect && bounds.width() > 0.0 && bounds.height() > 0.0 {
        let scale = (width / bounds.width())
            .max(height / bounds.height())
            .max(constraints.min_width / bounds.width())
            .max(constraints.min_height / bounds.height());
        width = bounds.width() * scale;
        height = bounds.height() * scale;
    }

    let x0 = if dir_x > 0.0 { anchor.x } else { anchor.x - width };
    let y0 = if dir_y > 0.0 { anchor.y } else { anchor.y - height };
    Rect::new(x0, y0, x0 + width, y0 + height)
}

/// Map any angle in degrees into `[0, 360)`. Non-finite input maps to 0.
pub fn normalize_degrees(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let d = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if d >= 360.0 { 0.0 } else { d }
}

/// Angle from `center` to `pointer` in degrees, clockwise, 0 = straight up.
pub fn apply_rotation(center: Point, pointer: Point) -> f64 {
    let dx = pointer.x - center.x;
    let dy = pointer.y - center.y;
    normalize_degrees(dy.atan2(dx).to_degrees() + 90.0)
}

/// Rotate `point` about `center` by `-degrees`, i.e. into the layer's own frame.
pub fn to_layer_space(point: Point, center: Point, degrees: f64) -> Point {
    if degrees == 0.0 {
        return point;
    }
    let (sin, cos) = (-degrees.to_radians()).sin_cos();
    let d = point - center;
    center + Vec2::new(d.x * cos - d.y * sin, d.x * sin + d.y * cos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_fill_area_reference_card() {
        let preset = CardPreset::default();
        let area = preset.safe_area();
        let placed = fill_area(1200.0, 600.0, area).unwrap();
        assert!(approx(placed.width, 1000.0));
        assert!(approx(placed.height, 500.0));
        assert!(approx(placed.x, 470.0));
        assert!(approx(placed.y, 290.0));
        assert!(approx(placed.scale_of(1200.0), 1000.0 / 1200.0));
    }

    #[test]
    fn test_fit_to_area_leaves_space() {
        let area = Rect::new(20.0, 20.0, 880.0, 520.0);
        let placed = fit_to_area(1200.0, 600.0, area).unwrap();
        assert!(approx(placed.width, 860.0));
        assert!(approx(placed.height, 430.0));
        assert!(approx(placed.x, 450.0));
        assert!(approx(placed.y, 270.0));
    }

    #[test]
    fn test_fill_canvas_uses_full_canvas() {
        let preset = CardPreset::default();
        let placed = fill_canvas(100.0, 100.0, &preset).unwrap();
        assert!(approx(placed.width, 900.0));
        assert!(approx(placed.height, 900.0));
        assert!(approx(placed.x, 450.0));
        assert!(approx(placed.y, 270.0));
    }

    #[test]
    fn test_degenerate_inputs_are_errors() {
        let empty = Rect::new(10.0, 10.0, 10.0, 50.0);
        assert!(matches!(
            fit_to_area(10.0, 10.0, empty),
            Err(GeometryError::DegenerateArea(..))
        ));
        let area = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(matches!(
            fill_area(0.0, 10.0, area),
            Err(GeometryError::InvalidSourceSize(..))
        ));
        assert!(fill_area(f64::NAN, 10.0, area).is_err());
    }

    #[test]
    fn test_handles_sit_on_corners() {
        let bounds = Rect::new(10.0, 20.0, 110.0, 70.0);
        let handles = resize_handle_positions(bounds);
        assert_eq!(handles.nw, Point::new(10.0, 20.0));
        assert_eq!(handles.ne, Point::new(110.0, 20.0));
        assert_eq!(handles.sw, Point::new(10.0, 70.0));
        assert_eq!(handles.se, Point::new(110.0, 70.0));
        assert_eq!(handles.hit_test(Point::new(108.0, 68.0), 5.0), Some(HandleId::Se));
        assert_eq!(handles.hit_test(Point::new(60.0, 45.0), 5.0), None);
    }

    #[test]
    fn test_opposite_corners() {
        assert_eq!(HandleId::Nw.opposite(), HandleId::Se);
        assert_eq!(HandleId::Se.opposite(), HandleId::Nw);
        assert_eq!(HandleId::Ne.opposite(), HandleId::Sw);
        assert_eq!(HandleId::Sw.opposite(), HandleId::Ne);
    }

    #[test]
    fn test_resize_se_grows_from_nw() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 100.0);
        let out = apply_resize(bounds, HandleId::Se, Vec2::new(50.0, 25.0), &ResizeConstraints::default());
        assert_eq!(out, Rect::new(0.0, 0.0, 150.0, 125.0));
    }

    #[test]
    fn test_resize_nw_holds_se() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 100.0);
        let out = apply_resize(bounds, HandleId::Nw, Vec2::new(30.0, -10.0), &ResizeConstraints::default());
        assert_eq!(out, Rect::new(30.0, -10.0, 100.0, 100.0));
    }

    #[test]
    fn test_resize_clamps_at_floor_without_flipping() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 100.0);
        let out = apply_resize(bounds, HandleId::Ne, Vec2::new(-500.0, 500.0), &ResizeConstraints::default());
        assert!(approx(out.width(), 20.0));
        assert!(approx(out.height(), 20.0));
        // anchor (sw) stays put
        assert!(approx(out.x0, 0.0));
        assert!(approx(out.y1, 100.0));
    }

    #[test]
    fn test_resize_keep_aspect() {
        let bounds = Rect::new(0.0, 0.0, 200.0, 100.0);
        let constraints = ResizeConstraints {
            keep_aspect: true,
            ..Default::default()
        };
        let out = apply_resize(bounds, HandleId::Se, Vec2::new(200.0, 0.0), &constraints);
        assert!(approx(out.width(), 400.0));
        assert!(approx(out.height(), 200.0));
    }

    #[test]
    fn test_resize_ignores_non_finite_delta() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 100.0);
        let out = apply_resize(bounds, HandleId::Se, Vec2::new(f64::NAN, 1.0), &ResizeConstraints::default());
        assert_eq!(out, bounds);
    }

    #[test]
    fn test_anchoring_asymmetry() {
        // Same numbers, different boxes: image (center) vs text (top-left).
        let image = Anchoring::Center.bounds(100.0, 100.0, 40.0, 20.0);
        let text = Anchoring::TopLeft.bounds(100.0, 100.0, 40.0, 20.0);
        assert_eq!(image, Rect::new(80.0, 90.0, 120.0, 110.0));
        assert_eq!(text, Rect::new(100.0, 100.0, 140.0, 120.0));
        assert_ne!(image, text);
        assert_eq!(Anchoring::Center.position(image), Point::new(100.0, 100.0));
        assert_eq!(Anchoring::TopLeft.position(text), Point::new(100.0, 100.0));
    }

    #[test]
    fn test_rotation_compass() {
        let c = Point::new(0.0, 0.0);
        assert!(approx(apply_rotation(c, Point::new(0.0, -10.0)), 0.0));
        assert!(approx(apply_rotation(c, Point::new(10.0, 0.0)), 90.0));
        assert!(approx(apply_rotation(c, Point::new(0.0, 10.0)), 180.0));
        assert!(approx(apply_rotation(c, Point::new(-10.0, 0.0)), 270.0));
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(720.0), 0.0);
        assert_eq!(normalize_degrees(361.5), 1.5);
        assert_eq!(normalize_degrees(f64::NAN), 0.0);
        assert_eq!(normalize_degrees(f64::INFINITY), 0.0);
        assert!(normalize_degrees(-1e-20) < 360.0);
    }

    #[test]
    fn test_to_layer_space() {
        let center = Point::new(0.0, 0.0);
        let p = to_layer_space(Point::new(10.0, 0.0), center, 90.0);
        assert!(approx(p.x, 0.0));
        assert!(approx(p.y, -10.0));
        assert_eq!(to_layer_space(Point::new(3.0, 4.0), center, 0.0), Point::new(3.0, 4.0));
    }

    proptest! {
        #[test]
        fn test_fit_invariant(
            nw in 1.0f64..5000.0,
            nh in 1.0f64..5000.0,
            aw in 1.0f64..2000.0,
            ah in 1.0f64..2000.0,
        ) {
            let area = Rect::new(0.0, 0.0, aw, ah);
            let p = fit_to_area(nw, nh, area).unwrap();
            prop_assert!(p.width <= aw * (1.0 + EPS));
            prop_assert!(p.height <= ah * (1.0 + EPS));
            prop_assert!(((p.width / p.height) - (nw / nh)).abs() <= 1e-9 * (nw / nh).max(1.0));
        }

        #[test]
        fn test_fill_invariant(
            nw in 1.0f64..5000.0,
            nh in 1.0f64..5000.0,
            aw in 1.0f64..2000.0,
            ah in 1.0f64..2000.0,
        ) {
            let area = Rect::new(0.0, 0.0, aw, ah);
            let p = fill_area(nw, nh, area).unwrap();
            prop_assert!(p.width >= aw * (1.0 - EPS));
            prop_assert!(p.height >= ah * (1.0 - EPS));
            prop_assert!(((p.width / p.height) - (nw / nh)).abs() <= 1e-9 * (nw / nh).max(1.0));
        }

        #[test]
        fn test_resize_anchor_invariant(
            dx in -1000.0f64..1000.0,
            dy in -1000.0f64..1000.0,
        ) {
            let bounds = Rect::new(40.0, 60.0, 240.0, 160.0);
            let out = apply_resize(bounds, HandleId::Se, Vec2::new(dx, dy), &ResizeConstraints::default());
            prop_assert!((out.x0 - 40.0).abs() < 1e-9);
            prop_assert!((out.y0 - 60.0).abs() < 1e-9);
            prop_assert!(out.width() >= 20.0 - 1e-9);
            prop_assert!(out.height() >= 20.0 - 1e-9);
        }

        #[test]
        fn test_rotation_range(px in -1e6f64..1e6, py in -1e6f64..1e6, raw in -1e9f64..1e9) {
            let angle = apply_rotation(Point::new(0.0, 0.0), Point::new(px, py));
            prop_assert!((0.0..360.0).contains(&angle));
            let n = normalize_degrees(raw);
            prop_assert!((0.0..360.0).contains(&n));
        }
    }
}
