/*!
Shape derivation settings and tolerances.

These constants centralize the tolerances used by hull welding, triangle
filtering and box fitting. Keeping them together makes tuning easier and
keeps results deterministic across platforms.

Notes
- Distances are in mesh units (usually meters) after the extraction transform.
- Favor practical world-space tolerances over machine epsilon.
- Per-converter overrides live in [`ConverterSettings`]; the constants are its defaults.
*/

/// Points closer than this are welded before convex hull construction.
pub const WELD_EPSILON: f32 = 1.0e-4;

/// Triangles whose doubled area is below this are treated as degenerate (squared units).
pub const DEGENERATE_AREA_EPSILON: f32 = 1.0e-10;

/// Smallest half extent produced by box fitting.
/// Flat or single-point bone subsets still get a box with some thickness.
pub const MIN_HALF_EXTENT: f32 = 1.0e-3;

/// Blend weights at or below this value do not attribute a vertex to a bone.
pub const MIN_BONE_WEIGHT: f32 = 0.0;

/// Reference point used when measuring the bounding sphere radius.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SphereCenter {
    /// Local origin of the extracted geometry (matches the box and cylinder frames).
    #[default]
    Origin,
    /// Arithmetic mean of the extracted vertices; the sphere is offset accordingly.
    Centroid,
}

/// Per-converter configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConverterSettings {
    pub sphere_center: SphereCenter,
    pub weld_epsilon: f32,
    pub degenerate_area_epsilon: f32,
    pub min_half_extent: f32,
    pub min_bone_weight: f32,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            sphere_center: SphereCenter::Origin,
            weld_epsilon: WELD_EPSILON,
            degenerate_area_epsilon: DEGENERATE_AREA_EPSILON,
            min_half_extent: MIN_HALF_EXTENT,
            min_bone_weight: MIN_BONE_WEIGHT,
        }
    }
}
