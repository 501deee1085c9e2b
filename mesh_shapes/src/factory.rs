//! Shape derivation from an accumulated [`GeometryBuffer`].
//!
//! [`ShapeFactory`] is what both extractors fill. Once filled, any number of shapes can
//! be derived from it; derivation never mutates the buffer, so a stable factory can be
//! shared across threads by reference.
//!
//! # Frames
//! All shapes are expressed around the local origin of the extracted geometry (the space
//! produced by the extraction transforms), with the factory scale applied per axis.
//! Cylinder and capsule are always Y-up and are approximations fitted from the
//! axis-aligned extents, not exact fits.

use std::collections::HashMap;

use num_traits::AsPrimitive;

use crate::{
    buffer::{Bounds, GeometryBuffer},
    error::{ShapeError, ShapeResult},
    settings::{ConverterSettings, SphereCenter},
    shape_def::ShapeDef,
    types::{Mat4, Point3, Vec3},
};

/// Owns the extracted geometry and derives collision shapes from it.
#[derive(Clone, Debug)]
pub struct ShapeFactory {
    buffer: GeometryBuffer,
    transform: Mat4,
    scale: Vec3,
    settings: ConverterSettings,
}

impl Default for ShapeFactory {
    fn default() -> Self {
        Self::new(Mat4::identity())
    }
}

impl ShapeFactory {
    /// Empty factory whose default extraction transform is `transform`.
    pub fn new(transform: Mat4) -> Self {
        Self::with_settings(transform, ConverterSettings::default())
    }

    pub fn with_settings(transform: Mat4, settings: ConverterSettings) -> Self {
        Self {
            buffer: GeometryBuffer::new(),
            transform,
            scale: Vec3::repeat(1.0),
            settings,
        }
    }

    // --- Accessors ---

    #[inline]
    pub fn buffer(&self) -> &GeometryBuffer {
        &self.buffer
    }

    /// Mutable access for extractors. Shapes derived afterwards see the new contents.
    #[inline]
    pub fn buffer_mut(&mut self) -> &mut GeometryBuffer {
        &mut self.buffer
    }

    #[inline]
    pub fn vertices(&self) -> &[Point3] {
        self.buffer.vertices()
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.buffer.vertex_count()
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        self.buffer.indices()
    }

    #[inline]
    pub fn index_count(&self) -> usize {
        self.buffer.index_count()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.buffer.triangle_count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    #[inline]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
    }

    #[inline]
    pub fn settings(&self) -> &ConverterSettings {
        &self.settings
    }

    /// Drop all extracted geometry. Transform, scale and settings are kept.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    // --- Raw appends ---

    /// Append positions with the factory's own transform and return their base offset.
    pub fn append_vertices<I>(&mut self, positions: I) -> ShapeResult<u32>
    where
        I: IntoIterator<Item = Point3>,
    {
        let transform = self.transform;
        self.buffer.append_vertices(positions, &transform)
    }

    /// Append a triangle list (16- or 32-bit) addressing the `stream_len` vertices at `base`.
    pub fn append_indices<T>(&mut self, indices: &[T], base: u32, stream_len: usize) -> ShapeResult<()>
    where
        T: AsPrimitive<u32>,
    {
        self.buffer.append_indices(indices, base, stream_len)
    }

    // --- Bounds ---

    fn bounds(&self) -> ShapeResult<&Bounds> {
        self.buffer.bounds().ok_or(ShapeError::EmptyGeometry)
    }

    #[inline]
    fn scale_abs(&self) -> Vec3 {
        self.scale.abs()
    }

    fn is_uniform_scale(&self) -> bool {
        let s = self.scale_abs();
        s.x == s.y && s.y == s.z
    }

    fn scaled(&self, p: &Point3) -> Point3 {
        Point3::from(p.coords.component_mul(&self.scale))
    }

    /// Distance of the farthest scaled vertex from the local origin.
    pub fn radius(&self) -> ShapeResult<f32> {
        let bounds = self.bounds()?;
        if self.is_uniform_scale() {
            return Ok(bounds.radius() * self.scale_abs().x);
        }
        Ok(self
            .vertices()
            .iter()
            .map(|p| self.scaled(p).coords.norm())
            .fold(0.0, f32::max))
    }

    /// Per-axis half extents around the local origin (max |coordinate|, scaled).
    pub fn half_extents(&self) -> ShapeResult<Vec3> {
        Ok(self.bounds()?.max_abs.component_mul(&self.scale_abs()))
    }

    /// Full size of the scaled axis-aligned bounding box.
    pub fn size(&self) -> ShapeResult<Vec3> {
        Ok(self.bounds()?.size().component_mul(&self.scale_abs()))
    }

    /// Mean of the scaled vertices.
    pub fn centroid(&self) -> ShapeResult<Vec3> {
        if self.is_empty() {
            return Err(ShapeError::EmptyGeometry);
        }
        let sum = self
            .vertices()
            .iter()
            .fold(Vec3::zeros(), |acc, p| acc + self.scaled(p).coords);
        Ok(sum / self.vertex_count() as f32)
    }

    // --- Shapes ---

    /// Bounding sphere around the configured reference center.
    pub fn sphere(&self) -> ShapeResult<ShapeDef> {
        match self.settings.sphere_center {
            SphereCenter::Origin => Ok(ShapeDef::Sphere {
                radius: self.radius()?,
                center: Vec3::zeros(),
            }),
            SphereCenter::Centroid => {
                let center = self.centroid()?;
                let radius = self
                    .vertices()
                    .iter()
                    .map(|p| (self.scaled(p).coords - center).norm())
                    .fold(0.0, f32::max);
                Ok(ShapeDef::Sphere { radius, center })
            }
        }
    }

    /// Axis-aligned box around the local origin.
    pub fn cuboid(&self) -> ShapeResult<ShapeDef> {
        Ok(ShapeDef::Cuboid {
            half_extents: self.half_extents()?,
        })
    }

    /// Y-up cylinder: radius from the X/Z extents, half height from Y.
    pub fn cylinder(&self) -> ShapeResult<ShapeDef> {
        let h = self.half_extents()?;
        Ok(ShapeDef::CylinderY {
            radius: h.x.max(h.z),
            half_height: h.y,
        })
    }

    /// Y-up capsule with the cylinder's radius and hemispherical caps of that radius.
    ///
    /// The caps are carved out of the Y extent, so the capsule spans `±half_y` when the
    /// geometry is taller than it is wide; otherwise it degenerates to a ball.
    pub fn capsule(&self) -> ShapeResult<ShapeDef> {
        let h = self.half_extents()?;
        let radius = h.x.max(h.z);
        Ok(ShapeDef::CapsuleY {
            radius,
            half_height: (h.y - radius).max(0.0),
        })
    }

    /// Convex hull of the welded vertex set.
    ///
    /// Fails with [`ShapeError::DegenerateGeometry`] when fewer than four affinely
    /// independent points remain after welding.
    pub fn convex_hull(&self) -> ShapeResult<ShapeDef> {
        if self.is_empty() {
            return Err(ShapeError::EmptyGeometry);
        }
        let points = self.welded_points();
        check_affine_rank(&points, self.settings.weld_epsilon)?;
        Ok(ShapeDef::ConvexHull { points })
    }

    /// [`ShapeFactory::convex_hull`], falling back to [`ShapeFactory::cuboid`] for
    /// flat or collinear geometry.
    pub fn convex_hull_or_cuboid(&self) -> ShapeResult<ShapeDef> {
        match self.convex_hull() {
            Err(ShapeError::DegenerateGeometry { reason }) => {
                log::warn!("convex hull unavailable ({reason}), using bounding box");
                self.cuboid()
            }
            other => other,
        }
    }

    /// Exact triangle mesh of the buffer.
    ///
    /// Triangles with repeated indices or (near) zero area are dropped. Fails when the
    /// index count is not a multiple of 3 or when no triangle survives.
    pub fn trimesh(&self) -> ShapeResult<ShapeDef> {
        if self.is_empty() {
            return Err(ShapeError::EmptyGeometry);
        }
        let indices = self.indices();
        if indices.len() % 3 != 0 {
            return Err(ShapeError::malformed(format!(
                "{} indices do not form whole triangles",
                indices.len()
            )));
        }

        let vertices: Vec<Point3> = self.vertices().iter().map(|p| self.scaled(p)).collect();
        let area_eps = self.settings.degenerate_area_epsilon;

        let mut triangles = Vec::with_capacity(indices.len() / 3);
        for tri in indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]];
            if a == b || b == c || a == c {
                continue;
            }
            let (pa, pb, pc) = (
                &vertices[a as usize],
                &vertices[b as usize],
                &vertices[c as usize],
            );
            if (pb - pa).cross(&(pc - pa)).norm_squared() <= area_eps * area_eps {
                continue;
            }
            triangles.push([a, b, c]);
        }

        let dropped = indices.len() / 3 - triangles.len();
        if dropped > 0 {
            log::warn!("dropped {dropped} degenerate triangle(s) from triangle mesh");
        }
        if triangles.is_empty() {
            return Err(ShapeError::degenerate("no non-degenerate triangle"));
        }

        Ok(ShapeDef::TriMesh {
            vertices,
            indices: triangles,
        })
    }

    /// Scaled vertices with near-coincident points merged (first occurrence wins).
    ///
    /// Points are bucketed on a grid of `weld_epsilon` cells; a point is dropped when a
    /// kept point in its own or a neighbouring cell lies within `weld_epsilon`.
    fn welded_points(&self) -> Vec<Point3> {
        let eps = self.settings.weld_epsilon.max(f32::MIN_POSITIVE);
        let cell_of = |p: &Point3| {
            [
                (p.x / eps).floor() as i64,
                (p.y / eps).floor() as i64,
                (p.z / eps).floor() as i64,
            ]
        };

        let mut kept: Vec<Point3> = Vec::with_capacity(self.vertex_count());
        let mut grid: HashMap<[i64; 3], Vec<usize>> =
            HashMap::with_capacity(self.vertex_count());
        for p in self.vertices().iter().map(|p| self.scaled(p)) {
            let cell = cell_of(&p);
            let near = (-1..=1).any(|dx| {
                (-1..=1).any(|dy| {
                    (-1..=1).any(|dz| {
                        grid.get(&[cell[0] + dx, cell[1] + dy, cell[2] + dz])
                            .is_some_and(|ids| ids.iter().any(|&i| (kept[i] - p).norm() < eps))
                    })
                })
            });
            if !near {
                grid.entry(cell).or_default().push(kept.len());
                kept.push(p);
            }
        }
        kept
    }
}

/// Require four affinely independent points (a tetrahedron with non-trivial volume).
fn check_affine_rank(points: &[Point3], eps: f32) -> ShapeResult<()> {
    let Some(p0) = points.first() else {
        return Err(ShapeError::degenerate("no points"));
    };

    let far_from = |f: &dyn Fn(&Point3) -> f32| {
        points
            .iter()
            .map(|p| (p, f(p)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .filter(|(_, d)| *d > eps)
            .map(|(p, _)| *p)
    };

    let p1 = far_from(&|p| (p - p0).norm())
        .ok_or_else(|| ShapeError::degenerate("all points coincide"))?;
    let line = (p1 - p0).normalize();

    let p2 = far_from(&|p| (p - p0).cross(&line).norm())
        .ok_or_else(|| ShapeError::degenerate("all points are collinear"))?;
    let normal = (p2 - p0).cross(&line).normalize();

    far_from(&|p| (p - p0).dot(&normal).abs())
        .ok_or_else(|| ShapeError::degenerate("all points are coplanar"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ±1 cube: 8 corners, 12 triangles.
    fn cube_factory() -> ShapeFactory {
        let mut f = ShapeFactory::default();
        let mut corners = Vec::new();
        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [-1.0, 1.0] {
                    corners.push(Point3::new(x, y, z));
                }
            }
        }
        let base = f.append_vertices(corners).unwrap();
        #[rustfmt::skip]
        let idx: [u16; 36] = [
            0, 1, 3, 0, 3, 2,
            4, 6, 7, 4, 7, 5,
            0, 4, 5, 0, 5, 1,
            2, 3, 7, 2, 7, 6,
            0, 2, 6, 0, 6, 4,
            1, 5, 7, 1, 7, 3,
        ];
        f.append_indices(&idx, base, 8).unwrap();
        f
    }

    fn factory_with(points: &[[f32; 3]]) -> ShapeFactory {
        let mut f = ShapeFactory::default();
        f.append_vertices(points.iter().map(|p| Point3::new(p[0], p[1], p[2])))
            .unwrap();
        f
    }

    #[test]
    fn every_shape_fails_on_empty_buffer() {
        let f = ShapeFactory::default();
        assert_eq!(f.sphere(), Err(ShapeError::EmptyGeometry));
        assert_eq!(f.cuboid(), Err(ShapeError::EmptyGeometry));
        assert_eq!(f.cylinder(), Err(ShapeError::EmptyGeometry));
        assert_eq!(f.capsule(), Err(ShapeError::EmptyGeometry));
        assert_eq!(f.convex_hull(), Err(ShapeError::EmptyGeometry));
        assert_eq!(f.trimesh(), Err(ShapeError::EmptyGeometry));
    }

    #[test]
    fn cube_box_half_extents_are_exact() {
        let f = cube_factory();
        assert_eq!(
            f.cuboid().unwrap(),
            ShapeDef::Cuboid {
                half_extents: Vec3::new(1.0, 1.0, 1.0)
            }
        );
        assert_eq!(f.size().unwrap(), Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn box_uses_max_abs_not_aabb_center() {
        let f = factory_with(&[[0.5, 0.0, 0.0], [3.0, -2.0, 0.25]]);
        assert_eq!(f.half_extents().unwrap(), Vec3::new(3.0, 2.0, 0.25));
    }

    #[test]
    fn sphere_contains_every_vertex() {
        let f = factory_with(&[[1.0, 2.0, 2.0], [-0.5, 0.0, 0.0], [0.0, -1.0, 0.0]]);
        let ShapeDef::Sphere { radius, center } = f.sphere().unwrap() else {
            panic!("expected a sphere");
        };
        assert!(radius >= 0.0);
        assert!((radius - 3.0).abs() < 1.0e-6);
        for v in f.vertices() {
            assert!((v.coords - center).norm() <= radius + 1.0e-6);
        }
    }

    #[test]
    fn centroid_sphere_is_offset_and_contains_vertices() {
        let settings = ConverterSettings {
            sphere_center: SphereCenter::Centroid,
            ..ConverterSettings::default()
        };
        let mut f = ShapeFactory::with_settings(Mat4::identity(), settings);
        f.append_vertices([Point3::new(10.0, 0.0, 0.0), Point3::new(12.0, 0.0, 0.0)])
            .unwrap();

        let ShapeDef::Sphere { radius, center } = f.sphere().unwrap() else {
            panic!("expected a sphere");
        };
        assert!((center - Vec3::new(11.0, 0.0, 0.0)).norm() < 1.0e-6);
        assert!((radius - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn scale_applies_per_axis() {
        let mut f = cube_factory();
        f.set_scale(Vec3::new(2.0, -1.0, 0.5));

        assert_eq!(f.half_extents().unwrap(), Vec3::new(2.0, 1.0, 0.5));
        let expected = (4.0f32 + 1.0 + 0.25).sqrt();
        assert!((f.radius().unwrap() - expected).abs() < 1.0e-6);
    }

    #[test]
    fn cylinder_and_capsule_are_y_up() {
        let f = factory_with(&[[0.5, 2.0, 0.0], [0.0, -2.0, -0.75]]);

        assert_eq!(
            f.cylinder().unwrap(),
            ShapeDef::CylinderY {
                radius: 0.75,
                half_height: 2.0
            }
        );
        assert_eq!(
            f.capsule().unwrap(),
            ShapeDef::CapsuleY {
                radius: 0.75,
                half_height: 1.25
            }
        );
    }

    #[test]
    fn squat_capsule_degenerates_to_ball() {
        let f = factory_with(&[[2.0, 0.5, 0.0]]);
        assert_eq!(
            f.capsule().unwrap(),
            ShapeDef::CapsuleY {
                radius: 2.0,
                half_height: 0.0
            }
        );
    }

    #[test]
    fn convex_hull_welds_duplicates() {
        let mut f = cube_factory();
        f.append_vertices([Point3::new(1.0, 1.0, 1.00001), Point3::new(-1.0, -1.0, -1.0)])
            .unwrap();

        let ShapeDef::ConvexHull { points } = f.convex_hull().unwrap() else {
            panic!("expected a hull");
        };
        assert_eq!(points.len(), 8);
    }

    #[test]
    fn welding_merges_points_across_grid_cells() {
        // The last two points are 2e-6 apart but straddle a 1e-4 grid boundary.
        let f = factory_with(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 1.0, 0.000099],
            [1.0, 1.0, 0.000101],
        ]);

        let welded = f.welded_points();
        assert_eq!(welded.len(), 5);
        assert_eq!(welded[4], Point3::new(1.0, 1.0, 0.000099));
    }

    #[test]
    fn convex_hull_of_plane_is_degenerate() {
        let f = factory_with(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 1.0]]);
        assert!(matches!(
            f.convex_hull(),
            Err(ShapeError::DegenerateGeometry { .. })
        ));
        assert_eq!(
            f.convex_hull_or_cuboid().unwrap(),
            ShapeDef::Cuboid {
                half_extents: Vec3::new(1.0, 0.0, 1.0)
            }
        );
    }

    #[test]
    fn convex_hull_of_line_is_degenerate() {
        let f = factory_with(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0], [3.0, 3.0, 3.0]]);
        assert!(matches!(
            f.convex_hull(),
            Err(ShapeError::DegenerateGeometry { .. })
        ));
    }

    #[test]
    fn trimesh_keeps_cube_topology() {
        let f = cube_factory();
        let ShapeDef::TriMesh { vertices, indices } = f.trimesh().unwrap() else {
            panic!("expected a trimesh");
        };
        assert_eq!(vertices.len(), 8);
        assert_eq!(indices.len(), 12);
        assert_eq!(indices[0], [0, 1, 3]);
    }

    #[test]
    fn trimesh_filters_repeated_index_triangle() {
        let mut f = ShapeFactory::default();
        let base = f
            .append_vertices([
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ])
            .unwrap();
        f.append_indices(&[0u32, 1, 2, 0, 0, 1], base, 3).unwrap();

        let ShapeDef::TriMesh { indices, .. } = f.trimesh().unwrap() else {
            panic!("expected a trimesh");
        };
        assert_eq!(indices, vec![[0, 1, 2]]);
    }

    #[test]
    fn trimesh_filters_collinear_triangle() {
        let mut f = ShapeFactory::default();
        let base = f
            .append_vertices([
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ])
            .unwrap();
        f.append_indices(&[0u16, 1, 2, 0, 1, 3], base, 4).unwrap();

        let ShapeDef::TriMesh { indices, .. } = f.trimesh().unwrap() else {
            panic!("expected a trimesh");
        };
        assert_eq!(indices, vec![[0, 1, 3]]);
    }

    #[test]
    fn trimesh_with_only_degenerate_triangles_fails() {
        let mut f = ShapeFactory::default();
        let base = f.append_vertices([Point3::origin(), Point3::new(1.0, 0.0, 0.0)]).unwrap();
        f.append_indices(&[0u16, 0, 1], base, 2).unwrap();

        assert!(matches!(
            f.trimesh(),
            Err(ShapeError::DegenerateGeometry { .. })
        ));
    }

    #[test]
    fn reset_returns_to_empty() {
        let mut f = cube_factory();
        f.reset();
        assert!(f.is_empty());
        assert_eq!(f.index_count(), 0);
        assert_eq!(f.cuboid(), Err(ShapeError::EmptyGeometry));
    }

    #[test]
    fn factory_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ShapeFactory>();
    }
}
