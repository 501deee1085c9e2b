/*!
Collision shapes from render mesh geometry.

Geometry is flattened out of meshes into a single vertex/index buffer, then turned
into primitive shape definitions that rapier understands:

- mesh:        input model (vertex and index streams, submeshes, entities, poses)
- buffer:      flattened vertex/index accumulation with cached bounds
- factory:     shape derivation (sphere, box, cylinder, capsule, hull, trimesh)
- static_mesh: extraction from renderables, entities and raw mesh assets
- skinned:     extraction from posed skinned meshes, per-bone boxes
- obb:         aligned and oriented box fitting
- shape_def:   shape definitions and rapier collider construction
*/

pub mod buffer;
pub mod error;
pub mod factory;
pub mod mesh;
pub mod obb;
pub mod settings;
pub mod shape_def;
pub mod skinned;
pub mod static_mesh;
pub mod types;

pub use buffer::{Bounds, GeometryBuffer};
pub use error::{ShapeError, ShapeResult};
pub use factory::ShapeFactory;
pub use mesh::{
    BlendIndexMap, Entity, IndexBuffer, IndexData, Mesh, Renderable, SkeletonPose, SubMesh,
    VertexData, VertexInfluences,
};
pub use obb::{AlignedBox, OrientedBox};
pub use settings::{ConverterSettings, SphereCenter};
pub use shape_def::ShapeDef;
pub use skinned::{AnimatedMeshConverter, BoneBox, BoneIndex, BoneScratch};
pub use static_mesh::{MeshSource, StaticMeshConverter};
pub use types::{BoneId, Mat4, Point3, Quat, Vec3};
