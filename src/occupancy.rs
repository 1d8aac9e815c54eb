//! Marching-squares area occupancy for sub-cell solid coverage.
//!
//! Given the signed distances at the four corners of a grid cell (negative =
//! inside a solid), [`occupancy`] returns the fraction of the cell covered by
//! solid, assuming the boundary runs straight between the linear zero
//! crossings on the edges. The complement is the fractional fluid volume used
//! to weight fluxes and the pressure matrix.

/// Area of the corner triangle cut off when a single corner is inside.
///
/// `inside` is the negative corner distance, `out1`/`out2` the distances at
/// the two adjacent corners. All formulas assume opposite signs, so the
/// denominators never vanish.
#[inline]
fn triangle_occupancy(out1: f64, inside: f64, out2: f64) -> f64 {
    0.5 * inside * inside / ((out1 - inside) * (out2 - inside))
}

/// Area of the trapezoid cut off when two adjacent corners are inside.
#[inline]
fn trapezoid_occupancy(out1: f64, out2: f64, in1: f64, in2: f64) -> f64 {
    0.5 * (-in1 / (out1 - in1) - in2 / (out2 - in2))
}

/// Fraction of the unit square covered by solid, from the four corner
/// distances: `bl` bottom-left, `br` bottom-right, `tl` top-left, `tr`
/// top-right ("bottom" is the smaller y index).
///
/// The 16 sign cases are enumerated exhaustively: one corner inside cuts a
/// triangle, two adjacent corners cut a trapezoid, three corners are the
/// complement of one, and the two diagonal saddle cases are complements of
/// each other (two opposing corner triangles, or everything but them).
pub fn occupancy(bl: f64, br: f64, tl: f64, tr: f64) -> f64 {
    let corners = [bl, br, tr, tl];

    let mut case = 0u8;
    for i in (0..4).rev() {
        case = (case << 1) | u8::from(corners[i] < 0.0);
    }

    match case {
        0x0 => 0.0,

        0x1 => triangle_occupancy(tl, bl, br),
        0x2 => triangle_occupancy(bl, br, tr),
        0x4 => triangle_occupancy(br, tr, tl),
        0x8 => triangle_occupancy(tr, tl, bl),

        0xE => 1.0 - triangle_occupancy(-tl, -bl, -br),
        0xD => 1.0 - triangle_occupancy(-bl, -br, -tr),
        0xB => 1.0 - triangle_occupancy(-br, -tr, -tl),
        0x7 => 1.0 - triangle_occupancy(-tr, -tl, -bl),

        0x3 => trapezoid_occupancy(tl, tr, bl, br),
        0x6 => trapezoid_occupancy(bl, tl, br, tr),
        0x9 => trapezoid_occupancy(br, tr, bl, tl),
        0xC => trapezoid_occupancy(bl, br, tl, tr),

        // The diagonal saddles are geometrically ambiguous. Resolve 0x5 as
        // two solid corner triangles and 0xA as the exact complement, so
        // occupancy(d) + occupancy(-d) = 1 holds for every sign pattern.
        0x5 => triangle_occupancy(br, bl, tl) + triangle_occupancy(br, tr, tl),
        0xA => 1.0 - triangle_occupancy(-br, -bl, -tl) - triangle_occupancy(-br, -tr, -tl),

        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_outside_and_all_inside() {
        assert_eq!(occupancy(1.0, 1.0, 1.0, 1.0), 0.0);
        assert_eq!(occupancy(-1.0, -1.0, -1.0, -1.0), 1.0);
    }

    #[test]
    fn test_single_corner_triangle() {
        // Zero crossings at the edge midpoints: a right triangle with both
        // legs 0.5, area 1/8.
        let area = occupancy(-0.5, 0.5, 0.5, 0.5);
        assert!((area - 0.125).abs() < 1e-9, "got {}", area);

        // The same area regardless of which corner is inside.
        for area in [
            occupancy(0.5, -0.5, 0.5, 0.5),
            occupancy(0.5, 0.5, -0.5, 0.5),
            occupancy(0.5, 0.5, 0.5, -0.5),
        ] {
            assert!((area - 0.125).abs() < 1e-9, "got {}", area);
        }
    }

    #[test]
    fn test_half_plane_trapezoid() {
        // Bottom half covered: crossings halfway up both vertical edges.
        let area = occupancy(-0.5, -0.5, 0.5, 0.5);
        assert!((area - 0.5).abs() < 1e-9, "got {}", area);

        // Slanted interface: crossings at 1/4 and 3/4 of the vertical edges
        // enclose a trapezoid of mean height 1/2.
        let area = occupancy(-0.25, -0.75, 0.75, 0.25);
        assert!((area - 0.5).abs() < 1e-9, "got {}", area);
    }

    #[test]
    fn test_three_corners_complement() {
        let single = occupancy(-0.5, 0.5, 0.5, 0.5);
        let triple = occupancy(0.5, -0.5, -0.5, -0.5);
        assert!((single + triple - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_saddle_sums_two_triangles() {
        let area = occupancy(-0.5, 0.5, 0.5, -0.5);
        assert!((area - 0.25).abs() < 1e-9, "got {}", area);
    }

    #[test]
    fn test_complement_law() {
        // occupancy(d) + occupancy(-d) = 1 for arbitrary sign mixes.
        let quartets = [
            [0.3, 0.7, -0.2, 0.9],
            [-0.3, -0.7, 0.2, -0.9],
            [0.05, -0.4, -0.6, 0.8],
            [-0.3, 0.7, 0.9, -0.2],
            [-1.0, 2.0, -3.0, 4.0],
            [0.11, 0.22, 0.33, -0.44],
        ];
        for [bl, br, tl, tr] in quartets {
            let total = occupancy(bl, br, tl, tr) + occupancy(-bl, -br, -tl, -tr);
            assert!(
                (total - 1.0).abs() < 1e-9,
                "complement law broken for ({}, {}, {}, {}): {}",
                bl,
                br,
                tl,
                tr,
                total
            );
        }
    }

    #[test]
    fn test_bounded() {
        let quartets = [
            [0.01, -0.01, 0.01, -0.01],
            [-5.0, 0.1, 0.1, -5.0],
            [1e-6, -1.0, -1.0, -1.0],
        ];
        for [bl, br, tl, tr] in quartets {
            let area = occupancy(bl, br, tl, tr);
            assert!((0.0..=1.0).contains(&area), "area {} out of range", area);
        }
    }
}
