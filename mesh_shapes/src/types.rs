/*!
Math aliases shared by the extraction and shape derivation modules.

This module intentionally contains no algorithms. Everything is `f32` so the
values can be handed to rapier without conversion.
*/

use nalgebra as na;

/// Common math aliases for clarity and consistency.
pub type Vec3 = na::Vector3<f32>;
pub type Point3 = na::Point3<f32>;
pub type Mat3 = na::Matrix3<f32>;
pub type Mat4 = na::Matrix4<f32>;
pub type Quat = na::UnitQuaternion<f32>;
pub type Iso = na::Isometry3<f32>;

/// Skeleton bone identifier.
///
/// Bone ids are small keys: blend indices in vertex buffers are stored as bytes,
/// so a skeleton addressed by this crate has at most 256 bones.
pub type BoneId = u8;

/// Build an isometry from a translation and a rotation.
#[inline]
pub fn iso_from_parts(translation: Vec3, rotation: Quat) -> Iso {
    Iso::from_parts(na::Translation3::from(translation), rotation)
}

/// Transform a point by an affine matrix (homogeneous divide included).
#[inline]
pub fn transform_point(m: &Mat4, p: &Point3) -> Point3 {
    m.transform_point(p)
}
