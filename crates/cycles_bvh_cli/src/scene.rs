//! A minimal in-memory scene (spec §6 Scene interface): scene ingestion
//! proper (XML/Alembic, shader graphs, subdivision) is out of scope (spec
//! §1). This reads a small JSON scene description — one object per entry,
//! a flat triangle list per object — so the CLI has something real to hand
//! `bvh_build::build`, and falls back to a built-in demo mesh when no scene
//! file is given.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use bvh_bounds::{Aabb, Vec3};
use bvh_refs::{PrimitiveRef, ReferencePool};
use bvh_split::{GeometrySource, PrimitiveGeometry};

use crate::error::CliConfigError;

/// One triangle, in world space, with the object it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Triangle {
    object_id: u32,
    verts: [Vec3; 3],
}

/// Wire format for a scene file: a list of objects, each a flat list of
/// `[x, y, z]` vertices grouped into triangles three at a time.
#[derive(Debug, Deserialize)]
struct SceneFile {
    objects: Vec<SceneObject>,
}

#[derive(Debug, Deserialize)]
struct SceneObject {
    #[serde(default)]
    vertices: Vec<[f32; 3]>,
}

/// The scene this CLI can actually ingest: a flat list of triangles. Real
/// Cycles scenes also carry curves, motion-step vertex streams, and
/// instanced objects (spec §6); none of that survives the distillation this
/// repo implements.
pub struct DemoScene {
    triangles: Vec<Triangle>,
}

impl GeometrySource for DemoScene {
    fn geometry(&self, reference: &PrimitiveRef) -> PrimitiveGeometry {
        let triangle = &self.triangles[reference.primitive_id as usize];
        PrimitiveGeometry::Triangle(triangle.verts)
    }
}

impl DemoScene {
    /// A single unit cube (12 triangles), used when no scene file is given
    /// so `--list-devices`-adjacent smoke runs still build a real tree.
    pub fn demo_cube() -> Self {
        let corners = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ];
        const FACES: [[usize; 4]; 6] = [
            [0, 1, 2, 3],
            [4, 5, 6, 7],
            [0, 1, 5, 4],
            [2, 3, 7, 6],
            [1, 2, 6, 5],
            [0, 3, 7, 4],
        ];
        let mut triangles = Vec::with_capacity(12);
        for face in FACES {
            let [a, b, c, d] = face;
            triangles.push(Triangle { object_id: 0, verts: [corners[a], corners[b], corners[c]] });
            triangles.push(Triangle { object_id: 0, verts: [corners[a], corners[c], corners[d]] });
        }
        DemoScene { triangles }
    }

    /// Parses a JSON scene description: `{"objects": [{"vertices": [[x,
    /// y, z], ...]}, ...]}`. Each object's vertex stream is grouped into
    /// triangles three at a time; a stray trailing vertex or two is
    /// ignored rather than rejected, since the demo format has no notion
    /// of polygon boundaries to validate against.
    pub fn load(path: &Path) -> Result<Self, CliConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| CliConfigError::SceneRead { path: path.display().to_string(), source })?;
        let scene_file: SceneFile = serde_json::from_str(&text)
            .map_err(|source| CliConfigError::SceneParse { path: path.display().to_string(), line: source.line() })?;

        let mut triangles = Vec::new();
        for (object_id, object) in scene_file.objects.iter().enumerate() {
            for verts in object.vertices.chunks_exact(3) {
                triangles.push(Triangle {
                    object_id: object_id as u32,
                    verts: [
                        Vec3::new(verts[0][0], verts[0][1], verts[0][2]),
                        Vec3::new(verts[1][0], verts[1][1], verts[1][2]),
                        Vec3::new(verts[2][0], verts[2][1], verts[2][2]),
                    ],
                });
            }
        }
        Ok(DemoScene { triangles })
    }

    /// Seeds a fresh reference pool, one reference per triangle (spec §6:
    /// "iterable of objects; for each: mesh*").
    pub fn to_reference_pool(&self) -> ReferencePool {
        let mut pool = ReferencePool::with_capacity(self.triangles.len());
        for (index, triangle) in self.triangles.iter().enumerate() {
            let mut bounds = Aabb::empty();
            for v in triangle.verts {
                bounds.grow_point(v);
            }
            pool.push(PrimitiveRef {
                object_id: triangle.object_id,
                primitive_id: index as i32,
                segment_id: bvh_refs::NO_SEGMENT,
                bounds,
                time_from: 0.0,
                time_to: 1.0,
                visibility: u32::MAX,
            });
        }
        pool
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_cube_has_twelve_triangles() {
        assert_eq!(DemoScene::demo_cube().triangle_count(), 12);
    }

    #[test]
    fn reference_pool_has_one_entry_per_triangle() {
        let scene = DemoScene::demo_cube();
        let pool = scene.to_reference_pool();
        assert_eq!(pool.len(), scene.triangle_count());
    }

    #[test]
    fn loads_a_single_triangle_from_json() {
        let dir = std::env::temp_dir();
        let path = dir.join("cycles_bvh_cli_test_scene.json");
        fs::write(
            &path,
            r#"{"objects": [{"vertices": [[0,0,0], [1,0,0], [0,1,0]]}]}"#,
        )
        .unwrap();

        let scene = DemoScene::load(&path).unwrap();
        assert_eq!(scene.triangle_count(), 1);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_malformed_json() {
        let dir = std::env::temp_dir();
        let path = dir.join("cycles_bvh_cli_test_scene_bad.json");
        fs::write(&path, "not json").unwrap();

        let err = DemoScene::load(&path).unwrap_err();
        assert!(matches!(err, CliConfigError::SceneParse { .. }));
        fs::remove_file(&path).ok();
    }
}
