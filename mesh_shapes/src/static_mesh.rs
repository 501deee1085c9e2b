//! Geometry extraction from non-animated sources.
//!
//! Three kinds of source are accepted, selected through [`MeshSource`]:
//! - a single [`Renderable`] stream, placed by the supplied transform only;
//! - a scene [`Entity`], placed by `transform * entity.world_transform * submesh.offset`;
//! - a raw [`Mesh`] asset, placed by `transform * submesh.offset`.
//!
//! Every add is cumulative and atomic: a failing source leaves the buffer exactly as it
//! was before the call.

use crate::{
    buffer::GeometryBuffer,
    error::{ShapeError, ShapeResult},
    factory::ShapeFactory,
    mesh::{Entity, IndexData, Mesh, Renderable, VertexData},
    settings::ConverterSettings,
    types::Mat4,
};

/// Any geometry source the static converter understands.
#[derive(Clone, Copy, Debug)]
pub enum MeshSource<'a> {
    /// One vertex/index stream.
    Renderable(&'a Renderable),
    /// A placed mesh instance.
    Entity(&'a Entity<'a>),
    /// A mesh asset without a scene instance.
    RawAsset(&'a Mesh),
}

/// Fills a [`ShapeFactory`] from static geometry.
#[derive(Clone, Debug, Default)]
pub struct StaticMeshConverter {
    factory: ShapeFactory,
}

impl StaticMeshConverter {
    /// Empty converter; add sources later.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: ConverterSettings) -> Self {
        Self {
            factory: ShapeFactory::with_settings(Mat4::identity(), settings),
        }
    }

    /// Converter holding the geometry of `source` placed by `transform`.
    pub fn from_source(source: MeshSource<'_>, transform: &Mat4) -> ShapeResult<Self> {
        let mut converter = Self {
            factory: ShapeFactory::new(*transform),
        };
        converter.add_source(source, transform)?;
        Ok(converter)
    }

    pub fn add_source(&mut self, source: MeshSource<'_>, transform: &Mat4) -> ShapeResult<()> {
        match source {
            MeshSource::Renderable(renderable) => self.add_renderable(renderable, transform),
            MeshSource::Entity(entity) => self.add_entity(entity, transform),
            MeshSource::RawAsset(mesh) => self.add_mesh(mesh, transform),
        }
    }

    /// Append one stream placed by `transform`.
    pub fn add_renderable(&mut self, renderable: &Renderable, transform: &Mat4) -> ShapeResult<()> {
        self.factory.set_transform(*transform);
        self.factory.buffer_mut().atomically(|buffer| {
            append_stream(
                buffer,
                &renderable.vertex_data,
                &renderable.index_data,
                transform,
            )
        })?;
        log::debug!(
            "added renderable: {} vertices, {} indices total",
            self.factory.vertex_count(),
            self.factory.index_count()
        );
        Ok(())
    }

    /// Append every submesh of `entity`, adopting the entity's scale.
    pub fn add_entity(&mut self, entity: &Entity<'_>, transform: &Mat4) -> ShapeResult<()> {
        let placement = transform * entity.world_transform;
        self.factory.set_transform(*transform);
        self.factory
            .buffer_mut()
            .atomically(|buffer| append_mesh(buffer, entity.mesh, &placement))?;
        self.factory.set_scale(entity.scale);
        log::debug!(
            "added entity with {} submeshes: {} vertices, {} indices total",
            entity.mesh.submeshes.len(),
            self.factory.vertex_count(),
            self.factory.index_count()
        );
        Ok(())
    }

    /// Append a raw mesh asset placed by `transform` only.
    pub fn add_mesh(&mut self, mesh: &Mesh, transform: &Mat4) -> ShapeResult<()> {
        self.factory.set_transform(*transform);
        self.factory
            .buffer_mut()
            .atomically(|buffer| append_mesh(buffer, mesh, transform))?;
        log::debug!(
            "added mesh with {} submeshes: {} vertices, {} indices total",
            mesh.submeshes.len(),
            self.factory.vertex_count(),
            self.factory.index_count()
        );
        Ok(())
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

/// Append one vertex stream and the triangle list indexing it.
pub(crate) fn append_stream(
    buffer: &mut GeometryBuffer,
    vertex_data: &VertexData,
    index_data: &IndexData,
    transform: &Mat4,
) -> ShapeResult<()> {
    let window = index_data.window()?;
    let base = buffer.append_vertices(vertex_data.positions.iter().copied(), transform)?;
    buffer.append_index_slice(window, base, vertex_data.len())
}

/// Append all streams of `mesh`: shared vertices once, then each submesh.
///
/// Submeshes on shared vertices are rebased onto wherever the shared stream landed,
/// so several meshes can be merged into one buffer.
pub(crate) fn append_mesh(
    buffer: &mut GeometryBuffer,
    mesh: &Mesh,
    transform: &Mat4,
) -> ShapeResult<()> {
    let shared = match &mesh.shared_vertex_data {
        Some(data) => {
            let base = buffer.append_vertices(data.positions.iter().copied(), transform)?;
            Some((base, data.len()))
        }
        None => None,
    };

    for (i, sub) in mesh.submeshes.iter().enumerate() {
        match &sub.vertex_data {
            Some(data) => {
                let placement = transform * sub.offset;
                append_stream(buffer, data, &sub.index_data, &placement)?;
            }
            None => {
                let (base, len) = shared.ok_or_else(|| {
                    ShapeError::malformed(format!(
                        "submesh {i} uses shared vertices but the mesh has none"
                    ))
                })?;
                buffer.append_index_slice(sub.index_data.window()?, base, len)?;
            }
        }
        log::trace!(
            "submesh {i}: buffer now {} vertices / {} indices",
            buffer.vertex_count(),
            buffer.index_count()
        );
    }
    Ok(())
}
