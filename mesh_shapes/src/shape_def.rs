//! Output vocabulary of the shape factory and its conversion into rapier shapes and
//! colliders.

use rapier3d::prelude::*;

use crate::{
    error::{ShapeError, ShapeResult},
    types::{Point3, Quat, Vec3},
};

/// Collision shape derived from extracted geometry.
///
/// This is plain data so results can be inspected and compared before handing them
/// to rapier. Every variant is expressed in the extraction space: the transform and
/// scale used during extraction are already baked in.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeDef {
    /// Ball, offset from the local origin by `center`.
    Sphere { radius: f32, center: Vec3 },

    /// Axis-aligned box centered on the local origin.
    Cuboid { half_extents: Vec3 },

    /// Y-aligned cylinder centered on the local origin.
    ///
    /// Fitted from the axis-aligned extents, so it only approximates the geometry.
    CylinderY { radius: f32, half_height: f32 },

    /// Y-aligned capsule; `half_height` is half the length of the cylindrical part.
    ///
    /// Same approximation as [`ShapeDef::CylinderY`].
    CapsuleY { radius: f32, half_height: f32 },

    /// Convex hull of welded points (at least 4 affinely independent ones).
    ConvexHull { points: Vec<Point3> },

    /// Exact triangle mesh with degenerate triangles removed.
    TriMesh {
        vertices: Vec<Point3>,
        indices: Vec<[u32; 3]>,
    },
}

impl ShapeDef {
    /// Build the rapier shape.
    ///
    /// Only the hull and trimesh variants can fail, when rapier rejects the input.
    pub fn to_shared_shape(&self) -> ShapeResult<SharedShape> {
        match self {
            ShapeDef::Sphere { radius, .. } => Ok(SharedShape::ball(*radius)),

            ShapeDef::Cuboid { half_extents } => Ok(SharedShape::cuboid(
                half_extents.x,
                half_extents.y,
                half_extents.z,
            )),

            ShapeDef::CylinderY {
                radius,
                half_height,
            } => Ok(SharedShape::cylinder(*half_height, *radius)),

            ShapeDef::CapsuleY {
                radius,
                half_height,
            } => Ok(SharedShape::capsule_y(*half_height, *radius)),

            ShapeDef::ConvexHull { points } => SharedShape::convex_hull(points)
                .ok_or_else(|| ShapeError::degenerate("rapier could not build the convex hull")),

            ShapeDef::TriMesh { vertices, indices } => {
                SharedShape::trimesh(vertices.clone(), indices.clone()).map_err(|err| {
                    ShapeError::degenerate(format!("rapier rejected the triangle mesh: {err:?}"))
                })
            }
        }
    }

    /// Offset of the shape's own origin from the local origin.
    pub fn local_translation(&self) -> Vec3 {
        match self {
            ShapeDef::Sphere { center, .. } => *center,
            _ => Vec3::zeros(),
        }
    }

    /// Build a collider with the shape placed at its local offset.
    pub fn to_collider(&self) -> ShapeResult<Collider> {
        Ok(ColliderBuilder::new(self.to_shared_shape()?)
            .translation(self.local_translation())
            .build())
    }
}

/// Collider for a box placed at `translation` with `rotation`.
pub fn placed_cuboid_collider(half_extents: Vec3, translation: Vec3, rotation: Quat) -> Collider {
    ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
        .translation(translation)
        .rotation(rotation.scaled_axis())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_points() -> Vec<Point3> {
        let mut pts = Vec::new();
        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [-1.0, 1.0] {
                    pts.push(Point3::new(x, y, z));
                }
            }
        }
        pts
    }

    #[test]
    fn primitives_map_to_rapier_parameters() {
        let ball = ShapeDef::Sphere {
            radius: 2.0,
            center: Vec3::zeros(),
        }
        .to_shared_shape()
        .unwrap();
        assert_eq!(ball.as_ball().unwrap().radius, 2.0);

        let cuboid = ShapeDef::Cuboid {
            half_extents: Vec3::new(1.0, 2.0, 3.0),
        }
        .to_shared_shape()
        .unwrap();
        assert_eq!(
            cuboid.as_cuboid().unwrap().half_extents,
            Vec3::new(1.0, 2.0, 3.0)
        );

        let cylinder = ShapeDef::CylinderY {
            radius: 0.5,
            half_height: 1.5,
        }
        .to_shared_shape()
        .unwrap();
        let c = cylinder.as_cylinder().unwrap();
        assert_eq!((c.radius, c.half_height), (0.5, 1.5));

        let capsule = ShapeDef::CapsuleY {
            radius: 0.5,
            half_height: 1.0,
        }
        .to_shared_shape()
        .unwrap();
        let c = capsule.as_capsule().unwrap();
        assert_eq!(c.radius, 0.5);
        assert!((c.half_height() - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn convex_hull_of_cube_builds() {
        let shape = ShapeDef::ConvexHull {
            points: cube_points(),
        }
        .to_shared_shape()
        .unwrap();
        assert!(shape.as_convex_polyhedron().is_some());
    }

    #[test]
    fn trimesh_keeps_triangles() {
        let shape = ShapeDef::TriMesh {
            vertices: cube_points(),
            indices: vec![[0, 1, 3], [0, 3, 2]],
        }
        .to_shared_shape()
        .unwrap();
        assert_eq!(shape.as_trimesh().unwrap().indices().len(), 2);
    }

    #[test]
    fn sphere_collider_is_offset_by_center() {
        let collider = ShapeDef::Sphere {
            radius: 1.0,
            center: Vec3::new(0.0, 3.0, 0.0),
        }
        .to_collider()
        .unwrap();
        assert_eq!(*collider.translation(), Vector::new(0.0, 3.0, 0.0));
    }
}
