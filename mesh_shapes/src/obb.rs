/*!
Box fitting over small point sets (one bone's vertices).

- [`fit_aligned_box`]: min/max box along the coordinate axes of the input.
- [`fit_oriented_box`]: box along principal axes (covariance eigenvectors) or along a
  fallback frame, whichever encloses less volume.

Both return `None` only for an empty input. Degenerate inputs (single point,
collinear, coplanar) still produce finite boxes: extents are clamped from below
and the fallback frame is used whenever the principal axes are unusable.
*/

use nalgebra as na;

use crate::types::{Mat3, Point3, Quat, Vec3};

/// Axis-aligned box in the frame of the fitted points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignedBox {
    pub half_extents: Vec3,
    pub center: Vec3,
}

/// Box with its own orthonormal, right-handed frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientedBox {
    pub half_extents: Vec3,
    /// Box axes; `axes[2] == axes[0].cross(&axes[1])`.
    pub axes: [Vec3; 3],
    pub center: Vec3,
}

impl OrientedBox {
    #[inline]
    pub fn volume(&self) -> f32 {
        8.0 * self.half_extents.x * self.half_extents.y * self.half_extents.z
    }

    /// Rotation taking the unit axes onto the box axes.
    pub fn rotation(&self) -> Quat {
        let basis = na::Rotation3::from_basis_unchecked(&self.axes);
        Quat::from_rotation_matrix(&basis)
    }

    /// Whether `p` lies inside the box grown by `eps`.
    pub fn contains(&self, p: &Point3, eps: f32) -> bool {
        let d = p.coords - self.center;
        self.axes
            .iter()
            .zip(self.half_extents.iter())
            .all(|(axis, &h)| d.dot(axis).abs() <= h + eps)
    }
}

/// The three unit axes of a rotation.
#[inline]
pub fn axes_of(rotation: &Quat) -> [Vec3; 3] {
    [
        rotation * Vec3::x(),
        rotation * Vec3::y(),
        rotation * Vec3::z(),
    ]
}

/// Min/max box of `points` along the coordinate axes.
pub fn fit_aligned_box(points: &[Point3]) -> Option<AlignedBox> {
    let (first, rest) = points.split_first()?;
    let (min, max) = rest
        .iter()
        .fold((*first, *first), |(lo, hi), p| (lo.inf(p), hi.sup(p)));

    Some(AlignedBox {
        half_extents: (max - min) * 0.5,
        center: na::center(&min, &max).coords,
    })
}

/// Tightest box of `points` along the given frame.
///
/// Every point is written as `C + y0*U0 + y1*U1 + y2*U2` around the mean `C`; the
/// center is then shifted to the middle of each `[min(yi), max(yi)]` range.
pub fn fit_along_axes(points: &[Point3], axes: [Vec3; 3]) -> Option<OrientedBox> {
    let mean = centroid(points)?;

    let mut lo = Vec3::repeat(f32::INFINITY);
    let mut hi = Vec3::repeat(f32::NEG_INFINITY);
    for p in points {
        let d = p.coords - mean;
        for (k, axis) in axes.iter().enumerate() {
            let y = d.dot(axis);
            lo[k] = lo[k].min(y);
            hi[k] = hi[k].max(y);
        }
    }

    let mid = (lo + hi) * 0.5;
    let center = mean + axes[0] * mid.x + axes[1] * mid.y + axes[2] * mid.z;

    Some(OrientedBox {
        half_extents: (hi - lo) * 0.5,
        axes,
        center,
    })
}

/// Principal axes of `points`, sorted by decreasing variance.
///
/// Returns `None` for fewer than three points or when the decomposition does not
/// yield a usable frame.
pub fn principal_axes(points: &[Point3]) -> Option<[Vec3; 3]> {
    if points.len() < 3 {
        return None;
    }
    let mean = centroid(points)?;

    let mut cov = Mat3::zeros();
    for p in points {
        let d = p.coords - mean;
        cov += d * d.transpose();
    }
    cov /= points.len() as f32;

    let eigen = cov.symmetric_eigen();
    if eigen.eigenvalues.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let u0 = eigen.eigenvectors.column(order[0]).into_owned();
    let u1 = eigen.eigenvectors.column(order[1]).into_owned();

    let u0 = u0.try_normalize(f32::EPSILON)?;
    // Re-orthogonalize; the eigen solver only guarantees this up to rounding.
    let u1 = (u1 - u0 * u0.dot(&u1)).try_normalize(f32::EPSILON)?;
    let u2 = u0.cross(&u1);

    [u0, u1, u2]
        .iter()
        .all(|a| a.iter().all(|c| c.is_finite()))
        .then_some([u0, u1, u2])
}

/// Near-minimal oriented box of `points`.
///
/// Candidates are the principal axes and `fallback_axes`; the one with the smaller
/// (clamped) volume wins, ties going to `fallback_axes`. Half extents are never below
/// `min_half_extent`.
pub fn fit_oriented_box(
    points: &[Point3],
    fallback_axes: [Vec3; 3],
    min_half_extent: f32,
) -> Option<OrientedBox> {
    let clamp = |mut b: OrientedBox| {
        b.half_extents = b.half_extents.map(|h| h.max(min_half_extent));
        b
    };

    let fallback = clamp(fit_along_axes(points, fallback_axes)?);

    let Some(pca) = principal_axes(points).and_then(|axes| fit_along_axes(points, axes)) else {
        log::trace!("principal axes unavailable for {} points", points.len());
        return Some(fallback);
    };
    let pca = clamp(pca);

    if pca.volume() < fallback.volume() * (1.0 - 1.0e-6) {
        Some(pca)
    } else {
        Some(fallback)
    }
}

fn centroid(points: &[Point3]) -> Option<Vec3> {
    if points.is_empty() {
        return None;
    }
    let sum = points.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords);
    Some(sum / points.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_axes() -> [Vec3; 3] {
        axes_of(&Quat::identity())
    }

    fn slab_corners(rotation: &Quat) -> Vec<Point3> {
        let h = Vec3::new(2.0, 0.5, 0.1);
        let mut out = Vec::new();
        for sx in [-1.0, 1.0] {
            for sy in [-1.0, 1.0] {
                for sz in [-1.0, 1.0] {
                    let local = Vec3::new(sx * h.x, sy * h.y, sz * h.z);
                    out.push(Point3::from(rotation * local + Vec3::new(1.0, 2.0, 3.0)));
                }
            }
        }
        out
    }

    #[test]
    fn aligned_box_of_unit_tetrahedron() {
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let b = fit_aligned_box(&pts).unwrap();

        assert_eq!(b.half_extents, Vec3::new(0.5, 0.5, 0.5));
        assert_eq!(b.center, Vec3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn aligned_box_of_nothing_is_none() {
        assert!(fit_aligned_box(&[]).is_none());
        assert!(fit_oriented_box(&[], identity_axes(), 1.0e-3).is_none());
    }

    #[test]
    fn principal_axes_recover_rotated_slab() {
        let rot = Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_4);
        let pts = slab_corners(&rot);

        let obb = fit_oriented_box(&pts, identity_axes(), 1.0e-3).unwrap();
        let axis_box = fit_along_axes(&pts, identity_axes()).unwrap();

        assert!(obb.volume() < axis_box.volume());
        assert!((obb.volume() - 0.8).abs() < 1.0e-3);
        assert!((obb.center - Vec3::new(1.0, 2.0, 3.0)).norm() < 1.0e-4);
        for p in &pts {
            assert!(obb.contains(p, 1.0e-4));
        }
    }

    #[test]
    fn oriented_axes_are_orthonormal_and_right_handed() {
        let rot = Quat::from_euler_angles(0.3, -0.7, 1.1);
        let obb = fit_oriented_box(&slab_corners(&rot), identity_axes(), 1.0e-3).unwrap();

        for a in &obb.axes {
            assert!((a.norm() - 1.0).abs() < 1.0e-5);
        }
        assert!(obb.axes[0].dot(&obb.axes[1]).abs() < 1.0e-5);
        assert!((obb.axes[0].cross(&obb.axes[1]) - obb.axes[2]).norm() < 1.0e-5);
    }

    #[test]
    fn collinear_points_give_finite_clamped_box() {
        let pts: Vec<Point3> = (0..5)
            .map(|i| Point3::new(i as f32, i as f32, i as f32))
            .collect();
        let obb = fit_oriented_box(&pts, identity_axes(), 1.0e-3).unwrap();

        assert!(obb.half_extents.iter().all(|h| h.is_finite() && *h >= 1.0e-3));
        assert!(obb.center.iter().all(|c| c.is_finite()));
        // The diagonal line is tighter along its own direction than along the bone axes.
        assert!(obb.volume() < 8.0 * 2.0 * 2.0 * 2.0);
        for p in &pts {
            assert!(obb.contains(p, 1.0e-4));
        }
    }

    fn assert_well_formed(obb: &OrientedBox, pts: &[Point3], min_half_extent: f32) {
        assert!(obb
            .half_extents
            .iter()
            .all(|h| h.is_finite() && *h >= min_half_extent));
        for a in &obb.axes {
            assert!((a.norm() - 1.0).abs() < 1.0e-5);
        }
        assert!(obb.axes[0].dot(&obb.axes[1]).abs() < 1.0e-5);
        assert!((obb.axes[0].cross(&obb.axes[1]) - obb.axes[2]).norm() < 1.0e-5);
        for p in pts {
            assert!(obb.contains(p, 1.0e-4));
        }
    }

    #[test]
    fn coplanar_points_give_flat_clamped_box() {
        let rot = Quat::from_axis_angle(&Vec3::x_axis(), 0.5);
        let pts: Vec<Point3> = [[0.0, 0.0], [3.0, 0.0], [3.0, 1.0], [0.0, 1.0], [1.5, 0.5]]
            .iter()
            .map(|[x, z]| Point3::from(rot * Vec3::new(*x, 0.0, *z)))
            .collect();

        let obb = fit_oriented_box(&pts, identity_axes(), 1.0e-3).unwrap();

        assert_well_formed(&obb, &pts, 1.0e-3);
        // Thickness collapses onto the clamp.
        assert!(obb.half_extents.min() < 2.0e-3);
    }

    #[test]
    fn two_points_give_finite_box_on_given_axes() {
        let pts = [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 2.0, 0.0)];

        let obb = fit_oriented_box(&pts, identity_axes(), 1.0e-3).unwrap();

        assert_well_formed(&obb, &pts, 1.0e-3);
        assert_eq!(obb.axes, identity_axes());
        assert_eq!(obb.half_extents, Vec3::new(0.5, 1.0, 1.0e-3));
    }

    #[test]
    fn single_point_falls_back_to_given_axes() {
        let obb = fit_oriented_box(&[Point3::new(4.0, 5.0, 6.0)], identity_axes(), 0.01).unwrap();

        assert_eq!(obb.axes, identity_axes());
        assert_eq!(obb.half_extents, Vec3::repeat(0.01));
        assert_eq!(obb.center, Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn rotation_maps_unit_axes_onto_box_axes() {
        let rot = Quat::from_euler_angles(0.2, 0.4, -0.9);
        let obb = OrientedBox {
            half_extents: Vec3::repeat(1.0),
            axes: axes_of(&rot),
            center: Vec3::zeros(),
        };
        assert!(obb.rotation().angle_to(&rot) < 1.0e-4);
    }
}
