//! Flattened vertex/index accumulation shared by every extractor.
//!
//! # Invariants
//! - `indices.len()` is a multiple of 3.
//! - Every index is `< vertices.len()`.
//! - `bounds` always describes exactly the current vertex set (`None` when empty).
//!
//! Appends validate their input before touching the buffer, and multi-stream
//! extractions use [`GeometryBuffer::checkpoint`] / [`GeometryBuffer::rollback`] so a
//! failure part way through an entity leaves the buffer as it was before the call.

use num_traits::AsPrimitive;

use crate::{
    error::{ShapeError, ShapeResult},
    mesh::IndexSlice,
    types::{Mat4, Point3, Vec3, transform_point},
};

/// Aggregate bounds of the vertex cloud in local (post-transform) space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    /// Largest squared distance of a vertex from the local origin.
    pub max_norm_sq: f32,
    /// Per-axis largest |coordinate|.
    pub max_abs: Vec3,
    pub min: Point3,
    pub max: Point3,
}

impl Bounds {
    fn from_point(p: &Point3) -> Self {
        Self {
            max_norm_sq: p.coords.norm_squared(),
            max_abs: p.coords.abs(),
            min: *p,
            max: *p,
        }
    }

    fn include(&mut self, p: &Point3) {
        self.max_norm_sq = self.max_norm_sq.max(p.coords.norm_squared());
        self.max_abs = self.max_abs.sup(&p.coords.abs());
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    fn of_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let mut bounds = Self::from_point(iter.next()?);
        iter.for_each(|p| bounds.include(p));
        Some(bounds)
    }

    /// Distance of the farthest vertex from the local origin.
    #[inline]
    pub fn radius(&self) -> f32 {
        self.max_norm_sq.sqrt()
    }

    /// Full size of the axis-aligned bounding box (`max - min`).
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// Where a buffer stood before an extraction call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    vertex_len: usize,
    index_len: usize,
}

/// Vertex and triangle-index soup plus cached bounds.
#[derive(Clone, Debug, Default)]
pub struct GeometryBuffer {
    vertices: Vec<Point3>,
    indices: Vec<u32>,
    bounds: Option<Bounds>,
}

impl GeometryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    #[inline]
    pub fn bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    /// Vertex count as a 32-bit index base.
    pub fn base_offset(&self) -> ShapeResult<u32> {
        u32::try_from(self.vertices.len())
            .map_err(|_| ShapeError::malformed("vertex count exceeds the 32-bit index range"))
    }

    /// Transform and append positions, returning the base offset the first one landed at.
    pub fn append_vertices<I>(&mut self, positions: I, transform: &Mat4) -> ShapeResult<u32>
    where
        I: IntoIterator<Item = Point3>,
    {
        let base = self.base_offset()?;
        for p in positions {
            self.push_vertex(transform_point(transform, &p));
        }
        // Re-check so later rebasing cannot overflow.
        self.base_offset()?;
        Ok(base)
    }

    /// Append one already-transformed vertex.
    pub fn push_vertex(&mut self, p: Point3) {
        match &mut self.bounds {
            Some(b) => b.include(&p),
            None => self.bounds = Some(Bounds::from_point(&p)),
        }
        self.vertices.push(p);
    }

    /// Append a triangle list of any index width, rebased by `base`.
    ///
    /// `stream_len` is the number of vertices the source indices address; every source
    /// index must be below it. Nothing is appended unless the whole list is valid.
    pub fn append_indices<T>(&mut self, source: &[T], base: u32, stream_len: usize) -> ShapeResult<()>
    where
        T: AsPrimitive<u32>,
    {
        if source.len() % 3 != 0 {
            return Err(ShapeError::malformed(format!(
                "{} indices do not form whole triangles",
                source.len()
            )));
        }
        if base as usize + stream_len > self.vertices.len() {
            return Err(ShapeError::malformed(format!(
                "stream of {} vertices at base {} exceeds vertex buffer of {}",
                stream_len,
                base,
                self.vertices.len()
            )));
        }
        if let Some((pos, bad)) = source
            .iter()
            .map(|i| i.as_())
            .enumerate()
            .find(|&(_, i)| i as usize >= stream_len)
        {
            return Err(ShapeError::malformed(format!(
                "index {bad} at position {pos} is out of range for {stream_len} vertices"
            )));
        }

        self.indices.reserve(source.len());
        self.indices.extend(source.iter().map(|i| i.as_() + base));
        Ok(())
    }

    /// Width-dispatching form of [`GeometryBuffer::append_indices`].
    pub fn append_index_slice(
        &mut self,
        source: IndexSlice<'_>,
        base: u32,
        stream_len: usize,
    ) -> ShapeResult<()> {
        match source {
            IndexSlice::U16(s) => self.append_indices(s, base, stream_len),
            IndexSlice::U32(s) => self.append_indices(s, base, stream_len),
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            vertex_len: self.vertices.len(),
            index_len: self.indices.len(),
        }
    }

    /// Drop everything appended after `checkpoint` and recompute the bounds.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        if checkpoint.vertex_len >= self.vertices.len() && checkpoint.index_len >= self.indices.len()
        {
            return;
        }
        self.vertices.truncate(checkpoint.vertex_len);
        self.indices.truncate(checkpoint.index_len);
        self.bounds = Bounds::of_points(&self.vertices);
    }

    /// Run `f`, undoing everything it appended if it fails.
    pub fn atomically<T, F>(&mut self, f: F) -> ShapeResult<T>
    where
        F: FnOnce(&mut Self) -> ShapeResult<T>,
    {
        let checkpoint = self.checkpoint();
        let result = f(self);
        if let Err(err) = &result {
            log::debug!("extraction failed, rolling back: {err}");
            self.rollback(checkpoint);
        }
        result
    }

    /// Empty the buffer (the `Reset` transition).
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.bounds = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri() -> Vec<Point3> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        ]
    }

    #[test]
    fn append_rebases_second_stream() {
        let mut buf = GeometryBuffer::new();
        let id = Mat4::identity();

        let b0 = buf.append_vertices(tri(), &id).unwrap();
        buf.append_indices(&[0u16, 1, 2], b0, 3).unwrap();
        let b1 = buf.append_vertices(tri(), &id).unwrap();
        buf.append_indices(&[2u32, 1, 0], b1, 3).unwrap();

        assert_eq!(b0, 0);
        assert_eq!(b1, 3);
        assert_eq!(buf.indices(), &[0, 1, 2, 5, 4, 3]);
        assert_eq!(buf.triangle_count(), 2);
    }

    #[test]
    fn bounds_track_appends() {
        let mut buf = GeometryBuffer::new();
        assert!(buf.bounds().is_none());

        buf.append_vertices(tri(), &Mat4::new_translation(&Vec3::new(-3.0, 0.0, 0.0)))
            .unwrap();
        let b = buf.bounds().unwrap();

        assert_eq!(b.max_abs, Vec3::new(3.0, 2.0, 0.0));
        assert_eq!(b.size(), Vec3::new(1.0, 2.0, 0.0));
        assert!((b.radius() - 13.0f32.sqrt()).abs() < 1.0e-6);
    }

    #[test]
    fn out_of_range_index_appends_nothing() {
        let mut buf = GeometryBuffer::new();
        let base = buf.append_vertices(tri(), &Mat4::identity()).unwrap();

        let err = buf.append_indices(&[0u32, 1, 3], base, 3).unwrap_err();

        assert!(matches!(err, ShapeError::MalformedIndexBuffer { .. }));
        assert_eq!(buf.index_count(), 0);
    }

    #[test]
    fn partial_triangle_is_malformed() {
        let mut buf = GeometryBuffer::new();
        let base = buf.append_vertices(tri(), &Mat4::identity()).unwrap();

        let err = buf.append_indices(&[0u16, 1], base, 3).unwrap_err();
        assert!(matches!(err, ShapeError::MalformedIndexBuffer { .. }));
    }

    #[test]
    fn rollback_restores_contents_and_bounds() {
        let mut buf = GeometryBuffer::new();
        let base = buf.append_vertices(tri(), &Mat4::identity()).unwrap();
        buf.append_indices(&[0u16, 1, 2], base, 3).unwrap();
        let before = *buf.bounds().unwrap();

        let cp = buf.checkpoint();
        buf.append_vertices(tri(), &Mat4::new_scaling(10.0)).unwrap();
        buf.append_indices(&[0u16, 1, 2], 3, 3).unwrap();
        buf.rollback(cp);

        assert_eq!(buf.vertex_count(), 3);
        assert_eq!(buf.indices(), &[0, 1, 2]);
        assert_eq!(*buf.bounds().unwrap(), before);
    }

    #[test]
    fn clear_resets_to_empty() {
        let mut buf = GeometryBuffer::new();
        buf.append_vertices(tri(), &Mat4::identity()).unwrap();
        buf.clear();

        assert!(buf.is_empty());
        assert!(buf.bounds().is_none());
        assert_eq!(buf.index_count(), 0);
    }
}
