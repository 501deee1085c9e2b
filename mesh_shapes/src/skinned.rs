//! Geometry extraction from skinned meshes in their current pose.
//!
//! # Pipeline
//! 1. Every vertex is moved into mesh space by its submesh offset `O`, then skinned:
//!    `p' = Σ wᵢ · (Bᵢ · O · p) / Σ wᵢ` over its usable influences, where `Bᵢ` is the
//!    pose's skinning matrix of the influencing bone. Vertices without influences keep
//!    their (offset) rest position.
//! 2. The posed mesh, whose offsets are now baked in, is appended like a static mesh.
//! 3. Posed vertices are partitioned by their dominant (highest weight) bone into a
//!    [`BoneIndex`], which is returned to the caller. Partitioned positions carry the
//!    entity scale, so per-bone boxes match the whole-entity shapes.
//!
//! A [`BoneIndex`] is only valid for the pose it was built from; build a new one after
//! the pose changes. Per-bone queries copy vertices into a caller-owned [`BoneScratch`].

use std::collections::BTreeMap;

use rapier3d::prelude::Collider;

use crate::{
    error::{ShapeError, ShapeResult},
    factory::ShapeFactory,
    mesh::{BlendIndexMap, Entity, Mesh, SkeletonPose, VertexInfluences, resolve_bone},
    obb::{OrientedBox, axes_of, fit_aligned_box, fit_oriented_box},
    settings::ConverterSettings,
    shape_def::placed_cuboid_collider,
    static_mesh::append_mesh,
    types::{BoneId, Iso, Mat4, Point3, Quat, Vec3, iso_from_parts},
};

/// Reusable storage for per-bone vertex queries.
///
/// The buffer only grows, so iterating over many bones allocates at most once per new
/// maximum. Queries borrow it mutably, which keeps it single-writer.
#[derive(Clone, Debug, Default)]
pub struct BoneScratch {
    vertices: Vec<Point3>,
}

impl BoneScratch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.vertices.capacity()
    }

    fn load(&mut self, points: impl Iterator<Item = Point3>) -> &[Point3] {
        self.vertices.clear();
        self.vertices.extend(points);
        &self.vertices
    }
}

/// Posed vertices grouped by dominant bone.
///
/// Positions live in the scaled extraction space that factory shapes use, so bone
/// positions passed to queries must be expressed in that space too.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoneIndex {
    bones: BTreeMap<BoneId, Vec<Point3>>,
    bone_count: usize,
    min_half_extent: f32,
}

/// Per-axis unit scale.
fn unit_scale() -> Vec3 {
    Vec3::repeat(1.0)
}

impl BoneIndex {
    /// Partition `mesh` posed by `pose` and placed by `transform`, without extracting it.
    pub fn from_pose(
        mesh: &Mesh,
        pose: &SkeletonPose,
        transform: &Mat4,
        settings: &ConverterSettings,
    ) -> Self {
        Self::from_posed(&pose_mesh(mesh, pose), pose, transform, &unit_scale(), settings)
    }

    /// [`BoneIndex::from_pose`] for an entity: placed by `transform * entity.world_transform`
    /// and scaled per axis by the entity scale.
    pub fn from_entity_pose(
        entity: &Entity<'_>,
        pose: &SkeletonPose,
        transform: &Mat4,
        settings: &ConverterSettings,
    ) -> Self {
        Self::from_posed(
            &pose_mesh(entity.mesh, pose),
            pose,
            &(transform * entity.world_transform),
            &entity.scale,
            settings,
        )
    }

    /// Partition an already skinned mesh, scaling the placed positions by `scale`.
    fn from_posed(
        posed: &Mesh,
        pose: &SkeletonPose,
        transform: &Mat4,
        scale: &Vec3,
        settings: &ConverterSettings,
    ) -> Self {
        let mut bones: BTreeMap<BoneId, Vec<Point3>> = BTreeMap::new();
        let mut unassigned = 0usize;

        for stream in posed.vertex_streams() {
            let placement = stream.placement(transform);
            for (i, p) in stream.vertex_data.positions.iter().enumerate() {
                let dominant = stream.vertex_data.influences(i).and_then(|inf| {
                    inf.dominant_slot(settings.min_bone_weight)
                        .map(|slot| resolve_bone(stream.blend_index_map, inf.indices[slot]))
                });
                match dominant {
                    Some(bone) => bones
                        .entry(bone)
                        .or_default()
                        .push(Point3::from(
                            placement.transform_point(p).coords.component_mul(scale),
                        )),
                    None => unassigned += 1,
                }
            }
        }

        if unassigned > 0 {
            log::debug!("{unassigned} vertices have no dominant bone");
        }

        Self {
            bones,
            bone_count: pose.bone_count(),
            min_half_extent: settings.min_half_extent,
        }
    }

    /// Bones with at least one attributed vertex, in ascending order.
    pub fn bones(&self) -> impl Iterator<Item = BoneId> + '_ {
        self.bones.keys().copied()
    }

    /// Number of vertices attributed to `bone`.
    pub fn vertex_count(&self, bone: BoneId) -> usize {
        self.bones.get(&bone).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    fn posed_vertices(&self, bone: BoneId) -> ShapeResult<&[Point3]> {
        if (bone as usize) >= self.bone_count {
            return Err(ShapeError::UnknownBone(bone));
        }
        match self.bones.get(&bone) {
            Some(v) if !v.is_empty() => Ok(v.as_slice()),
            _ => Err(ShapeError::UnknownBone(bone)),
        }
    }

    /// Vertices dominated by `bone`, relative to `bone_position`.
    ///
    /// Fails with [`ShapeError::UnknownBone`] when the bone is outside the pose or has
    /// no vertices.
    pub fn bone_vertices<'s>(
        &self,
        bone: BoneId,
        bone_position: &Vec3,
        scratch: &'s mut BoneScratch,
    ) -> ShapeResult<&'s [Point3]> {
        let posed = self.posed_vertices(bone)?;
        let relative = scratch.load(posed.iter().map(|p| p - bone_position));
        Ok(relative)
    }

    /// Box aligned with the bone's own axes, fitting the bone's vertices exactly.
    ///
    /// Extents and center are expressed in bone-local space.
    pub fn aligned_box(
        &self,
        bone: BoneId,
        bone_position: &Vec3,
        bone_orientation: &Quat,
        scratch: &mut BoneScratch,
    ) -> ShapeResult<BoneBox> {
        let posed = self.posed_vertices(bone)?;
        let inverse = bone_orientation.inverse();
        let local = scratch.load(posed.iter().map(|p| inverse * (p - bone_position)));

        let fitted = fit_aligned_box(local).ok_or(ShapeError::UnknownBone(bone))?;
        Ok(BoneBox {
            half_extents: fitted.half_extents.map(|h| h.max(self.min_half_extent)),
            center: fitted.center,
            bone_position: *bone_position,
            bone_orientation: *bone_orientation,
        })
    }

    /// Near-minimal oriented box of the bone's vertices.
    ///
    /// Axes come from the principal components of the vertices when they give a smaller
    /// box than the bone's own axes. The center is relative to `bone_position`; extents
    /// never drop below the configured minimum.
    pub fn oriented_box(
        &self,
        bone: BoneId,
        bone_position: &Vec3,
        bone_orientation: &Quat,
        scratch: &mut BoneScratch,
    ) -> ShapeResult<OrientedBox> {
        let min_half_extent = self.min_half_extent;
        let relative = self.bone_vertices(bone, bone_position, scratch)?;
        fit_oriented_box(relative, axes_of(bone_orientation), min_half_extent)
            .ok_or(ShapeError::UnknownBone(bone))
    }
}

/// Box aligned with a bone, in bone-local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneBox {
    pub half_extents: Vec3,
    /// Box center in bone-local space.
    pub center: Vec3,
    pub bone_position: Vec3,
    pub bone_orientation: Quat,
}

impl BoneBox {
    /// Box center in extraction space.
    pub fn world_center(&self) -> Vec3 {
        self.bone_position + self.bone_orientation * self.center
    }

    /// Pose of the box in extraction space, e.g. for a rigid body following the bone.
    pub fn isometry(&self) -> Iso {
        iso_from_parts(self.world_center(), self.bone_orientation)
    }

    /// Cuboid collider placed at the box center with the bone's orientation.
    pub fn to_collider(&self) -> Collider {
        placed_cuboid_collider(self.half_extents, self.world_center(), self.bone_orientation)
    }
}

impl OrientedBox {
    /// Cuboid collider for a box whose center is relative to `origin`.
    pub fn to_collider(&self, origin: &Vec3) -> Collider {
        placed_cuboid_collider(self.half_extents, origin + self.center, self.rotation())
    }
}

/// Blend a rest position by its influences.
fn skin_position(
    p: &Point3,
    influences: Option<&VertexInfluences>,
    map: Option<&BlendIndexMap>,
    pose: &SkeletonPose,
) -> Point3 {
    let Some(inf) = influences else {
        return *p;
    };

    let mut acc = Vec3::zeros();
    let mut total = 0.0f32;
    for (&index, &w) in inf.indices.iter().zip(&inf.weights) {
        if w.is_nan() || w <= 0.0 {
            continue;
        }
        // Influences on bones the pose does not have are ignored.
        let Some(m) = pose.bone_matrix(resolve_bone(map, index)) else {
            continue;
        };
        acc += m.transform_point(p).coords * w;
        total += w;
    }

    if total > 0.0 {
        Point3::from(acc / total)
    } else {
        *p
    }
}

/// Copy of `mesh` with every stream skinned by `pose`.
///
/// Bone matrices act on mesh-space positions, so each submesh offset is applied before
/// skinning. The returned mesh has the offsets baked into its positions and every
/// submesh offset reset to identity.
pub fn pose_mesh(mesh: &Mesh, pose: &SkeletonPose) -> Mesh {
    let mut posed = mesh.map_positions(|stream| {
        let offset = stream.placement(&Mat4::identity());
        stream
            .vertex_data
            .positions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                skin_position(
                    &offset.transform_point(p),
                    stream.vertex_data.influences(i),
                    stream.blend_index_map,
                    pose,
                )
            })
            .collect()
    });
    for sub in &mut posed.submeshes {
        sub.offset = Mat4::identity();
    }
    posed
}

/// Fills a [`ShapeFactory`] from skinned meshes in their current pose.
#[derive(Clone, Debug, Default)]
pub struct AnimatedMeshConverter {
    factory: ShapeFactory,
}

impl AnimatedMeshConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: ConverterSettings) -> Self {
        Self {
            factory: ShapeFactory::with_settings(Mat4::identity(), settings),
        }
    }

    /// Converter holding `entity` in `pose`, plus the pose's bone partition.
    pub fn from_entity(
        entity: &Entity<'_>,
        pose: &SkeletonPose,
        transform: &Mat4,
    ) -> ShapeResult<(Self, BoneIndex)> {
        let mut converter = Self {
            factory: ShapeFactory::new(*transform),
        };
        let index = converter.add_entity(entity, pose, transform)?;
        Ok((converter, index))
    }

    /// Append `entity` in `pose` placed by `transform * entity.world_transform`.
    ///
    /// Returns the bone partition of the vertices appended by this call.
    pub fn add_entity(
        &mut self,
        entity: &Entity<'_>,
        pose: &SkeletonPose,
        transform: &Mat4,
    ) -> ShapeResult<BoneIndex> {
        let placement = transform * entity.world_transform;
        let index = self.add_posed(entity.mesh, pose, &placement, &entity.scale)?;
        self.factory.set_transform(*transform);
        self.factory.set_scale(entity.scale);
        Ok(index)
    }

    /// Append a raw skinned mesh in `pose` placed by `transform`.
    pub fn add_mesh(
        &mut self,
        mesh: &Mesh,
        pose: &SkeletonPose,
        transform: &Mat4,
    ) -> ShapeResult<BoneIndex> {
        let index = self.add_posed(mesh, pose, transform, &unit_scale())?;
        self.factory.set_transform(*transform);
        Ok(index)
    }

    fn add_posed(
        &mut self,
        mesh: &Mesh,
        pose: &SkeletonPose,
        placement: &Mat4,
        scale: &Vec3,
    ) -> ShapeResult<BoneIndex> {
        let posed = pose_mesh(mesh, pose);
        self.factory
            .buffer_mut()
            .atomically(|buffer| append_mesh(buffer, &posed, placement))?;

        let index = BoneIndex::from_posed(&posed, pose, placement, scale, self.factory.settings());
        log::debug!(
            "added skinned mesh: {} vertices total, {} bones with vertices",
            self.factory.vertex_count(),
            index.bones.len()
        );
        Ok(index)
    }

    #[inline]
    pub fn factory(&self) -> &ShapeFactory {
        &self.factory
    }

    #[inline]
    pub fn factory_mut(&mut self) -> &mut ShapeFactory {
        &mut self.factory
    }

    pub fn into_factory(self) -> ShapeFactory {
        self.factory
    }
}
