//! Engine-native mesh input model.
//!
//! These types describe geometry that is already resident in memory: vertex position
//! streams, index streams in either width, submesh layout, scene entities, and the
//! current skeleton pose. Loading them from files is the caller's job.
//!
//! # Layout
//! - A [`Mesh`] optionally owns one *shared* vertex stream used by any submesh whose
//!   `vertex_data` is `None`.
//! - Every [`SubMesh`] owns a triangle-list [`IndexData`] and optionally its own vertices.
//! - Skinned vertex streams carry up to four blend slots per vertex. A blend slot stores a
//!   *blend index*, which the owning stream's blend index map translates to a [`BoneId`].

use crate::{
    error::{ShapeError, ShapeResult},
    types::{BoneId, Mat4, Point3, Vec3},
};

/// Raw triangle-list indices in the width they were authored in.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexBuffer {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U16(v) => v.len(),
            IndexBuffer::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u16>> for IndexBuffer {
    fn from(v: Vec<u16>) -> Self {
        IndexBuffer::U16(v)
    }
}

impl From<Vec<u32>> for IndexBuffer {
    fn from(v: Vec<u32>) -> Self {
        IndexBuffer::U32(v)
    }
}

/// Borrowed window into an [`IndexBuffer`].
#[derive(Clone, Copy, Debug)]
pub enum IndexSlice<'a> {
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl IndexSlice<'_> {
    pub fn len(&self) -> usize {
        match self {
            IndexSlice::U16(s) => s.len(),
            IndexSlice::U32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A range of an index buffer that forms one triangle list.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexData {
    pub buffer: IndexBuffer,
    /// First index of the window.
    pub start: usize,
    /// Number of indices in the window.
    pub count: usize,
}

impl IndexData {
    /// Use the whole buffer as the triangle list.
    pub fn new(buffer: impl Into<IndexBuffer>) -> Self {
        let buffer = buffer.into();
        let count = buffer.len();
        Self {
            buffer,
            start: 0,
            count,
        }
    }

    /// Use `count` indices starting at `start`.
    pub fn with_range(buffer: impl Into<IndexBuffer>, start: usize, count: usize) -> Self {
        Self {
            buffer: buffer.into(),
            start,
            count,
        }
    }

    /// Borrow the configured window.
    ///
    /// Fails with [`ShapeError::MalformedIndexBuffer`] when the window runs past the
    /// end of the buffer.
    pub fn window(&self) -> ShapeResult<IndexSlice<'_>> {
        let end = self
            .start
            .checked_add(self.count)
            .filter(|&end| end <= self.buffer.len())
            .ok_or_else(|| {
                ShapeError::malformed(format!(
                    "index window of {} at {} exceeds buffer of {} indices",
                    self.count,
                    self.start,
                    self.buffer.len()
                ))
            })?;

        Ok(match &self.buffer {
            IndexBuffer::U16(v) => IndexSlice::U16(&v[self.start..end]),
            IndexBuffer::U32(v) => IndexSlice::U32(&v[self.start..end]),
        })
    }
}

/// Up to four bone influences of one vertex.
///
/// Unused slots carry a zero weight.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VertexInfluences {
    /// Blend indices (translated to bone ids through the stream's blend index map).
    pub indices: [u8; 4],
    pub weights: [f32; 4],
}

impl VertexInfluences {
    /// A vertex fully bound to one blend index.
    pub fn single(index: u8) -> Self {
        Self {
            indices: [index, 0, 0, 0],
            weights: [1.0, 0.0, 0.0, 0.0],
        }
    }

    pub fn new(indices: [u8; 4], weights: [f32; 4]) -> Self {
        Self { indices, weights }
    }

    /// Slot holding the highest weight above `min_weight`.
    ///
    /// Ties resolve to the earliest slot. Returns `None` for a vertex without usable weights.
    pub fn dominant_slot(&self, min_weight: f32) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (slot, &w) in self.weights.iter().enumerate() {
            if w.is_nan() || w <= min_weight {
                continue;
            }
            if best.map_or(true, |b| w > self.weights[b]) {
                best = Some(slot);
            }
        }
        best
    }
}

/// Translates blend indices stored in a vertex stream into skeleton bone ids.
///
/// Streams without a map store bone ids directly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlendIndexMap(pub Vec<BoneId>);

impl BlendIndexMap {
    /// Resolve a blend index; indices past the end of the map pass through unchanged.
    #[inline]
    pub fn bone(&self, blend_index: u8) -> BoneId {
        self.0
            .get(blend_index as usize)
            .copied()
            .unwrap_or(blend_index)
    }
}

/// Resolve a blend index through an optional map.
#[inline]
pub fn resolve_bone(map: Option<&BlendIndexMap>, blend_index: u8) -> BoneId {
    map.map_or(blend_index, |m| m.bone(blend_index))
}

/// One vertex stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexData {
    /// Rest-pose positions in mesh space.
    pub positions: Vec<Point3>,
    /// Per-vertex bone influences, present on skinned streams only.
    pub blend: Option<Vec<VertexInfluences>>,
}

impl VertexData {
    pub fn new(positions: Vec<Point3>) -> Self {
        Self {
            positions,
            blend: None,
        }
    }

    pub fn skinned(positions: Vec<Point3>, blend: Vec<VertexInfluences>) -> Self {
        Self {
            positions,
            blend: Some(blend),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Influences of vertex `i`, if the stream is skinned.
    #[inline]
    pub fn influences(&self, i: usize) -> Option<&VertexInfluences> {
        self.blend.as_ref().and_then(|b| b.get(i))
    }
}

/// A drawable part of a [`Mesh`].
#[derive(Clone, Debug, PartialEq)]
pub struct SubMesh {
    /// Own vertices, or `None` to index into the mesh's shared vertex stream.
    pub vertex_data: Option<VertexData>,
    pub index_data: IndexData,
    /// Placement of this submesh's own vertices relative to the mesh origin.
    ///
    /// Not applied to shared vertices, which belong to the mesh as a whole.
    pub offset: Mat4,
    pub blend_index_map: Option<BlendIndexMap>,
}

impl SubMesh {
    /// Submesh with its own vertex stream.
    pub fn new(vertex_data: VertexData, index_data: IndexData) -> Self {
        Self {
            vertex_data: Some(vertex_data),
            index_data,
            offset: Mat4::identity(),
            blend_index_map: None,
        }
    }

    /// Submesh indexing into the mesh's shared vertex stream.
    pub fn shared(index_data: IndexData) -> Self {
        Self {
            vertex_data: None,
            index_data,
            offset: Mat4::identity(),
            blend_index_map: None,
        }
    }

    pub fn with_offset(mut self, offset: Mat4) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_blend_index_map(mut self, map: BlendIndexMap) -> Self {
        self.blend_index_map = Some(map);
        self
    }

    pub fn uses_shared_vertices(&self) -> bool {
        self.vertex_data.is_none()
    }
}

/// A mesh asset: optional shared vertices plus submeshes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub shared_vertex_data: Option<VertexData>,
    pub shared_blend_index_map: Option<BlendIndexMap>,
    pub submeshes: Vec<SubMesh>,
}

impl Mesh {
    pub fn new(submeshes: Vec<SubMesh>) -> Self {
        Self {
            shared_vertex_data: None,
            shared_blend_index_map: None,
            submeshes,
        }
    }

    pub fn with_shared_vertices(mut self, vertex_data: VertexData) -> Self {
        self.shared_vertex_data = Some(vertex_data);
        self
    }

    pub fn with_shared_blend_index_map(mut self, map: BlendIndexMap) -> Self {
        self.shared_blend_index_map = Some(map);
        self
    }

    /// True when at least one submesh reads from the shared vertex stream.
    pub fn has_shared_submeshes(&self) -> bool {
        self.submeshes.iter().any(SubMesh::uses_shared_vertices)
    }

    /// Vertex streams in extraction order: the shared stream first, then every submesh
    /// that owns its vertices.
    pub fn vertex_streams(&self) -> impl Iterator<Item = VertexStream<'_>> {
        let shared = self.shared_vertex_data.as_ref().map(|vertex_data| VertexStream {
            vertex_data,
            blend_index_map: self.shared_blend_index_map.as_ref(),
            offset: None,
        });
        let own = self.submeshes.iter().filter_map(|sub| {
            sub.vertex_data.as_ref().map(|vertex_data| VertexStream {
                vertex_data,
                blend_index_map: sub.blend_index_map.as_ref(),
                offset: Some(&sub.offset),
            })
        });
        shared.into_iter().chain(own)
    }

    /// Total number of vertices over all streams.
    pub fn vertex_count(&self) -> usize {
        self.vertex_streams().map(|s| s.vertex_data.len()).sum()
    }

    /// Copy of this mesh with every stream's positions replaced by `f(stream)`.
    ///
    /// `f` must return exactly one position per vertex of the stream.
    pub fn map_positions<F>(&self, mut f: F) -> Mesh
    where
        F: FnMut(&VertexStream<'_>) -> Vec<Point3>,
    {
        let mut out = self.clone();
        if let (Some(dst_data), Some(src_data)) =
            (&mut out.shared_vertex_data, &self.shared_vertex_data)
        {
            let stream = VertexStream {
                vertex_data: src_data,
                blend_index_map: self.shared_blend_index_map.as_ref(),
                offset: None,
            };
            dst_data.positions = f(&stream);
        }
        for (dst, src) in out.submeshes.iter_mut().zip(&self.submeshes) {
            if let (Some(dst_data), Some(src_data)) = (&mut dst.vertex_data, &src.vertex_data) {
                let stream = VertexStream {
                    vertex_data: src_data,
                    blend_index_map: src.blend_index_map.as_ref(),
                    offset: Some(&src.offset),
                };
                dst_data.positions = f(&stream);
            }
        }
        out
    }
}

/// One vertex stream of a [`Mesh`] with the data needed to place and skin it.
#[derive(Clone, Copy, Debug)]
pub struct VertexStream<'a> {
    pub vertex_data: &'a VertexData,
    pub blend_index_map: Option<&'a BlendIndexMap>,
    /// Submesh offset; `None` for the shared stream.
    pub offset: Option<&'a Mat4>,
}

impl VertexStream<'_> {
    /// `transform` composed with this stream's offset.
    pub fn placement(&self, transform: &Mat4) -> Mat4 {
        match self.offset {
            Some(offset) => transform * offset,
            None => *transform,
        }
    }
}

/// A single vertex/index stream, e.g. one render operation.
#[derive(Clone, Debug, PartialEq)]
pub struct Renderable {
    pub vertex_data: VertexData,
    pub index_data: IndexData,
}

impl Renderable {
    pub fn new(vertex_data: VertexData, index_data: IndexData) -> Self {
        Self {
            vertex_data,
            index_data,
        }
    }
}

/// A placed instance of a [`Mesh`] in the scene.
#[derive(Clone, Debug)]
pub struct Entity<'a> {
    pub mesh: &'a Mesh,
    /// Rigid placement of the entity's scene node (rotation and translation).
    pub world_transform: Mat4,
    /// Scale of the entity's scene node, handed to the shape factory.
    pub scale: Vec3,
}

impl<'a> Entity<'a> {
    pub fn new(mesh: &'a Mesh) -> Self {
        Self {
            mesh,
            world_transform: Mat4::identity(),
            scale: Vec3::repeat(1.0),
        }
    }

    pub fn with_transform(mut self, world_transform: Mat4) -> Self {
        self.world_transform = world_transform;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }
}

/// Current skinning matrices of a skeleton, indexed by [`BoneId`].
///
/// Each matrix maps a rest-pose (bind) position to its posed position, i.e. it already
/// includes the inverse bind transform.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkeletonPose {
    pub bone_matrices: Vec<Mat4>,
}

impl SkeletonPose {
    pub fn new(bone_matrices: Vec<Mat4>) -> Self {
        Self { bone_matrices }
    }

    /// Bind pose for `bone_count` bones.
    pub fn identity(bone_count: usize) -> Self {
        Self {
            bone_matrices: vec![Mat4::identity(); bone_count],
        }
    }

    pub fn bone_count(&self) -> usize {
        self.bone_matrices.len()
    }

    pub fn contains(&self, bone: BoneId) -> bool {
        (bone as usize) < self.bone_matrices.len()
    }

    pub fn bone_matrix(&self, bone: BoneId) -> Option<&Mat4> {
        self.bone_matrices.get(bone as usize)
    }
}
