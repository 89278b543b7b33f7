//! Volume geometry: size, spacing, orientation and per-slice origins

use std::fmt;

/// Column/row/slice counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    columns: u32,
    rows: u32,
    slices: u32,
}

impl Size {
    #[must_use]
    pub fn new(columns: u32, rows: u32, slices: u32) -> Self {
        Self {
            columns,
            rows,
            slices,
        }
    }

    #[inline]
    #[must_use]
    pub fn columns(&self) -> u32 {
        self.columns
    }

    #[inline]
    #[must_use]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[inline]
    #[must_use]
    pub fn slices(&self) -> u32 {
        self.slices
    }

    /// Samples per component plane of one slice.
    #[inline]
    #[must_use]
    pub fn slice_size(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    #[inline]
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.slice_size() * self.slices as usize
    }

    #[inline]
    #[must_use]
    pub fn is_in_bounds(&self, i: u32, j: u32, k: u32) -> bool {
        i < self.columns && j < self.rows && k < self.slices
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{cols}x{rows}x{slices}",
            cols = self.columns,
            rows = self.rows,
            slices = self.slices
        )
    }
}

/// Physical spacing in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spacing {
    pub column: f64,
    pub row: f64,
    pub slice: f64,
}

impl Spacing {
    #[must_use]
    pub fn new(column: f64, row: f64, slice: f64) -> Self {
        Self { column, row, slice }
    }
}

impl Default for Spacing {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

/// Slice plane orientation as the six direction cosines
/// (row axis then column axis).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    cosines: [f64; 6],
}

impl Orientation {
    #[must_use]
    pub fn new(cosines: [f64; 6]) -> Self {
        Self { cosines }
    }

    /// Normal of the slice plane (row axis x column axis).
    #[must_use]
    pub fn normal(&self) -> [f64; 3] {
        let [rx, ry, rz, cx, cy, cz] = self.cosines;
        [
            ry * cz - rz * cy,
            rz * cx - rx * cz,
            rx * cy - ry * cx,
        ]
    }

    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.cosines
            .iter()
            .zip(other.cosines.iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

impl Default for Orientation {
    /// Axial identity orientation.
    fn default() -> Self {
        Self::new([1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
    }
}

/// Image geometry. The slice count is the origin count: appending a slice
/// appends its origin, kept ordered along the slice normal.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    origins: Vec<[f64; 3]>,
    orientation: Orientation,
    spacing: Spacing,
    columns: u32,
    rows: u32,
}

impl Geometry {
    #[must_use]
    pub fn new(
        origin: [f64; 3],
        orientation: Orientation,
        spacing: Spacing,
        columns: u32,
        rows: u32,
    ) -> Self {
        Self {
            origins: vec![origin],
            orientation,
            spacing,
            columns,
            rows,
        }
    }

    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(self.columns, self.rows, self.origins.len() as u32)
    }

    #[must_use]
    pub fn spacing(&self) -> Spacing {
        self.spacing
    }

    #[must_use]
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    #[must_use]
    pub fn origin(&self, k: usize) -> [f64; 3] {
        self.origins[k]
    }

    /// Position of an origin along the slice normal.
    #[must_use]
    fn normal_position(&self, origin: [f64; 3]) -> f64 {
        let n = self.orientation.normal();
        n[0] * origin[0] + n[1] * origin[1] + n[2] * origin[2]
    }

    /// Insertion index keeping origins ordered along the slice normal.
    #[must_use]
    pub fn slice_index(&self, origin: [f64; 3]) -> usize {
        let position = self.normal_position(origin);
        self.origins
            .iter()
            .filter(|&&o| self.normal_position(o) < position)
            .count()
    }

    /// Record the origin of a newly inserted slice.
    pub fn append_origin(&mut self, origin: [f64; 3], index: usize) {
        self.origins.insert(index, origin);
    }

    /// Buffer offset of an (i, j) position inside one slice plane.
    #[inline]
    #[must_use]
    pub fn index_to_slice_offset(&self, i: u32, j: u32) -> usize {
        j as usize * self.columns as usize + i as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_bounds_and_sizes() {
        let size = Size::new(4, 3, 2);
        assert_eq!(size.slice_size(), 12);
        assert_eq!(size.total_size(), 24);
        assert!(size.is_in_bounds(3, 2, 1));
        assert!(!size.is_in_bounds(4, 0, 0));
        assert!(!size.is_in_bounds(0, 3, 0));
        assert!(!size.is_in_bounds(0, 0, 2));
    }

    #[test]
    fn test_axial_normal() {
        let normal = Orientation::default().normal();
        assert_eq!(normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_tilted_normal_stays_unit_length() {
        use approx::assert_relative_eq;
        let tilt = 30.0_f64.to_radians();
        let orientation =
            Orientation::new([1.0, 0.0, 0.0, 0.0, tilt.cos(), tilt.sin()]);
        let normal = orientation.normal();
        let length = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();
        assert_relative_eq!(length, 1.0, epsilon = 1e-12);
        assert_relative_eq!(normal[1], -tilt.sin(), epsilon = 1e-12);
        assert_relative_eq!(normal[2], tilt.cos(), epsilon = 1e-12);
    }

    #[test]
    fn test_orientation_tolerant_equality() {
        let a = Orientation::default();
        let b = Orientation::new([1.0, 0.00005, 0.0, 0.0, 1.0, 0.0]);
        assert!(a.approx_eq(&b, 0.0001));
        assert!(!a.approx_eq(&b, 0.00001));
    }

    #[test]
    fn test_slice_index_orders_by_normal() {
        let mut geometry = Geometry::new(
            [0.0, 0.0, 10.0],
            Orientation::default(),
            Spacing::default(),
            2,
            2,
        );
        // before the existing slice
        assert_eq!(geometry.slice_index([0.0, 0.0, 5.0]), 0);
        geometry.append_origin([0.0, 0.0, 5.0], 0);
        // between the two
        assert_eq!(geometry.slice_index([0.0, 0.0, 7.5]), 1);
        // after all
        assert_eq!(geometry.slice_index([0.0, 0.0, 20.0]), 2);
        assert_eq!(geometry.size().slices(), 2);
    }

    #[test]
    fn test_index_to_slice_offset() {
        let geometry = Geometry::new(
            [0.0; 3],
            Orientation::default(),
            Spacing::default(),
            4,
            3,
        );
        assert_eq!(geometry.index_to_slice_offset(0, 0), 0);
        assert_eq!(geometry.index_to_slice_offset(3, 2), 11);
    }
}
