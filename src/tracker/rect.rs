/// Bounding box in image coordinates, stored as TLWH.
///
/// Supports the formats the tracker exchanges with detectors and the
/// correlation trackers:
/// - TLWH: Top-Left X, Top-Left Y, Width, Height
/// - TLBR: Top-Left X, Top-Left Y, Bottom-Right X, Bottom-Right Y
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Rect {
    /// Top-left x coordinate
    pub x: f32,
    /// Top-left y coordinate
    pub y: f32,
    /// Width of the bounding box
    pub width: f32,
    /// Height of the bounding box
    pub height: f32,
}

impl Rect {
    /// Create a new Rect from top-left coordinates and dimensions (TLWH format).
    #[inline]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a Rect from TLBR format (top-left x, top-left y, bottom-right x, bottom-right y).
    #[inline]
    pub fn from_tlbr(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    /// Convert to TLBR format: (x1, y1, x2, y2).
    #[inline]
    pub fn to_tlbr(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    /// Convert to TLWH format: (x, y, width, height).
    #[inline]
    pub fn to_tlwh(&self) -> [f32; 4] {
        [self.x, self.y, self.width, self.height]
    }

    /// Get the center point of the bounding box.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Get the area of the bounding box. Degenerate boxes have zero area.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    #[inline]
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }

    /// Intersection of two boxes. Disjoint boxes yield an empty rect.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x2 <= x1 || y2 <= y1 {
            return Rect::default();
        }
        Rect::from_tlbr(x1, y1, x2, y2)
    }

    /// Clip to `bounds` (usually the frame rectangle).
    #[inline]
    pub fn clip(&self, bounds: &Rect) -> Rect {
        self.intersect(bounds)
    }

    /// Grow by `padding` pixels on every side, then clip to `bounds`.
    pub fn padded(&self, padding: f32, bounds: &Rect) -> Rect {
        Rect::new(
            self.x - padding,
            self.y - padding,
            self.width + 2.0 * padding,
            self.height + 2.0 * padding,
        )
        .clip(bounds)
    }

    /// Intersection area relative to the smaller of the two boxes.
    ///
    /// Computed as `max(inter / area(self), inter / area(other))`, so the
    /// result is symmetric in its arguments.
    pub fn overlap_ratio(&self, other: &Rect) -> f32 {
        let inter = self.intersect(other).area();
        if inter <= 0.0 {
            return 0.0;
        }
        let a = if self.area() > 0.0 { inter / self.area() } else { 0.0 };
        let b = if other.area() > 0.0 { inter / other.area() } else { 0.0 };
        a.max(b)
    }

    /// Distance between the top-left corners.
    #[inline]
    pub fn distance(&self, other: &Rect) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Euclidean difference of the (width, height) pairs.
    #[inline]
    pub fn size_diff(&self, other: &Rect) -> f32 {
        ((self.width - other.width).powi(2) + (self.height - other.height).powi(2)).sqrt()
    }

    /// Euclidean distance over `[x, y, w, h]`.
    #[inline]
    pub fn match_score(&self, other: &Rect) -> f32 {
        ((self.x - other.x).powi(2)
            + (self.y - other.y).powi(2)
            + (self.width - other.width).powi(2)
            + (self.height - other.height).powi(2))
        .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_rect_conversions() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(rect.to_tlwh(), [10.0, 20.0, 30.0, 40.0]);
        assert_eq!(rect.to_tlbr(), [10.0, 20.0, 40.0, 60.0]);
        assert_eq!(rect.center(), (25.0, 40.0));
    }

    #[test]
    fn test_from_tlbr() {
        let rect = Rect::from_tlbr(10.0, 20.0, 40.0, 60.0);
        assert_eq!(rect.to_tlwh(), [10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_intersect_no_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 10.0, 10.0);
        assert!(a.intersect(&b).is_empty());
        assert_eq!(a.overlap_ratio(&b), 0.0);
    }

    #[test]
    fn test_overlap_ratio_uses_smaller_box() {
        // 5x5 intersection inside a 10x10 and a 100x100 box
        let small = Rect::new(0.0, 0.0, 10.0, 10.0);
        let big = Rect::new(5.0, 5.0, 100.0, 100.0);
        assert_abs_diff_eq!(small.overlap_ratio(&big), 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(big.overlap_ratio(&small), 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_padding_is_clipped() {
        let frame = Rect::new(0.0, 0.0, 640.0, 480.0);
        let b = Rect::new(5.0, 5.0, 50.0, 100.0).padded(10.0, &frame);
        assert_eq!(b.to_tlwh(), [0.0, 0.0, 65.0, 115.0]);
    }

    #[test]
    fn test_scores() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(3.0, 4.0, 10.0, 10.0);
        assert_abs_diff_eq!(a.distance(&b), 5.0);
        assert_abs_diff_eq!(a.size_diff(&b), 0.0);
        let c = Rect::new(3.0, 4.0, 13.0, 14.0);
        assert_abs_diff_eq!(a.match_score(&c), 50.0_f32.sqrt(), epsilon = 1e-5);
    }

    fn any_rect() -> impl Strategy<Value = Rect> {
        (-200.0f32..800.0, -200.0f32..800.0, 0.0f32..400.0, 0.0f32..400.0)
            .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
    }

    proptest! {
        #[test]
        fn overlap_ratio_is_symmetric(a in any_rect(), b in any_rect()) {
            prop_assert_eq!(a.overlap_ratio(&b), b.overlap_ratio(&a));
        }

        #[test]
        fn padded_box_stays_inside_frame(r in any_rect(), pad in 0.0f32..50.0) {
            let frame = Rect::new(0.0, 0.0, 640.0, 480.0);
            let p = r.padded(pad, &frame);
            if !p.is_empty() {
                prop_assert!(p.x >= frame.x && p.y >= frame.y);
                prop_assert!(p.x + p.width <= frame.x + frame.width + 1e-3);
                prop_assert!(p.y + p.height <= frame.y + frame.height + 1e-3);
            }
        }
    }
}
