//! Model ingestion: OBJ bundles via `tobj`.
//!
//! Loading produces two views of the same content: a [`SceneModel`] (the
//! inspection boundary: node hierarchy, geometry counts, materials, texture
//! refs) and the raw render payload ([`MeshData`]) the GPU layer uploads.
//!
//! ## Normal handling
//!
//! Provided normals are used when present. Missing normals are generated by
//! accumulating face normals per vertex and normalizing, which weights each
//! face by its area.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::ViewerError;
use crate::scene_graph::{
    Geometry, Material, SceneModel, SceneNode, TextureRef, TextureSlot,
};

/// Render-ready geometry for one mesh node.
#[derive(Clone, Debug)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    /// Index into the model's material pool.
    pub material: usize,
}

/// A loaded model: the inspection-boundary bundle plus render payload,
/// index-aligned so mesh node N corresponds to `meshes[N]`.
#[derive(Clone, Debug)]
pub struct LoadedModel {
    pub scene: SceneModel,
    pub meshes: Vec<MeshData>,
}

/// Load an OBJ (plus its MTL materials and referenced textures) into a
/// [`LoadedModel`]. Each tobj model becomes one mesh node under a group root.
pub fn load_obj(path: &Path) -> Result<LoadedModel, ViewerError> {
    let display = path.display().to_string();
    let load_options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };

    let (models, materials) =
        tobj::load_obj(path, &load_options).map_err(|e| ViewerError::load(&display, e))?;
    let obj_materials = materials.map_err(|e| ViewerError::load(&display, e))?;

    if models.is_empty() {
        return Err(ViewerError::load(&display, "OBJ file contains no models"));
    }

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut textures: Vec<TextureRef> = Vec::new();
    let mut texture_index: HashMap<String, usize> = HashMap::new();

    let mut pool: Vec<Material> = obj_materials
        .iter()
        .map(|m| convert_material(m, base_dir, &mut textures, &mut texture_index))
        .collect();
    if pool.is_empty() {
        pool.push(Material {
            name: "default".to_string(),
            base_color: Some([0.8, 0.8, 0.8, 1.0]),
            roughness: Some(0.9),
            ..Default::default()
        });
    }
    let fallback_material = pool.len() - 1;

    let mut children = Vec::new();
    let mut meshes = Vec::new();
    for model in &models {
        let mesh = &model.mesh;
        let material = mesh.material_id.unwrap_or(fallback_material).min(pool.len() - 1);

        let positions: Vec<[f32; 3]> = mesh
            .positions
            .chunks_exact(3)
            .map(|p| [p[0], p[1], p[2]])
            .collect();
        let indices: Vec<u32> = mesh.indices.clone();
        let normals = if mesh.normals.len() == mesh.positions.len() && !mesh.normals.is_empty() {
            mesh.normals
                .chunks_exact(3)
                .map(|n| [n[0], n[1], n[2]])
                .collect()
        } else {
            generate_normals(&positions, &indices)
        };

        let geometry = Geometry {
            vertex_count: positions.len(),
            index_count: indices.len(),
        };
        let name = if model.name.is_empty() {
            format!("mesh_{}", children.len())
        } else {
            model.name.clone()
        };
        children.push(SceneNode::mesh(name, geometry, material));
        meshes.push(MeshData {
            positions,
            normals,
            indices,
            material,
        });
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| display.clone());
    log::info!(
        "loaded model '{}': {} meshes, {} materials, {} textures",
        name,
        meshes.len(),
        pool.len(),
        textures.len()
    );

    Ok(LoadedModel {
        scene: SceneModel {
            root: SceneNode::group(name.clone(), children),
            name,
            materials: pool,
            textures,
        },
        meshes,
    })
}

/// Map a tobj/MTL material onto the boundary [`Material`]. PBR channels come
/// from the common MTL extensions (Pr, Pm, Ke and their map_ variants).
fn convert_material(
    m: &tobj::Material,
    base_dir: &Path,
    textures: &mut Vec<TextureRef>,
    texture_index: &mut HashMap<String, usize>,
) -> Material {
    let mut material = Material {
        name: m.name.clone(),
        base_color: m.diffuse.map(|d| [d[0], d[1], d[2], 1.0]),
        roughness: param_f32(m, "Pr"),
        metalness: param_f32(m, "Pm"),
        emissive: param_vec3(m, "Ke"),
        opacity: m.dissolve,
        textures: HashMap::new(),
    };

    let mut bind = |slot: TextureSlot, tex: &Option<String>| {
        if let Some(rel) = tex.as_deref().filter(|t| !t.is_empty()) {
            let id = intern_texture(rel, base_dir, textures, texture_index);
            material.textures.insert(slot, id);
        }
    };
    bind(TextureSlot::BaseColor, &m.diffuse_texture);
    bind(TextureSlot::Normal, &m.normal_texture);
    bind(TextureSlot::AmbientOcclusion, &m.ambient_texture);
    bind(TextureSlot::Opacity, &m.dissolve_texture);
    bind(TextureSlot::Roughness, &m.unknown_param.get("map_Pr").cloned());
    bind(TextureSlot::Metalness, &m.unknown_param.get("map_Pm").cloned());
    bind(TextureSlot::Emissive, &m.unknown_param.get("map_Ke").cloned());

    material
}

fn param_f32(m: &tobj::Material, key: &str) -> Option<f32> {
    m.unknown_param.get(key).and_then(|v| v.trim().parse().ok())
}

fn param_vec3(m: &tobj::Material, key: &str) -> Option<[f32; 3]> {
    let raw = m.unknown_param.get(key)?;
    let parts: Vec<f32> = raw
        .split_whitespace()
        .filter_map(|p| p.parse().ok())
        .collect();
    if parts.len() == 3 {
        Some([parts[0], parts[1], parts[2]])
    } else {
        None
    }
}

/// Decode a texture once and share the id across every slot that binds the
/// same file. Decode failure keeps the reference with no pixel data, which
/// downstream treats as "no preview".
fn intern_texture(
    relative: &str,
    base_dir: &Path,
    textures: &mut Vec<TextureRef>,
    texture_index: &mut HashMap<String, usize>,
) -> usize {
    if let Some(&id) = texture_index.get(relative) {
        return id;
    }
    let full = base_dir.join(relative);
    let texture = match image::open(&full) {
        Ok(img) => {
            let rgba = img.to_rgba8();
            TextureRef {
                name: relative.to_string(),
                width: rgba.width(),
                height: rgba.height(),
                pixels: Some(Arc::new(rgba.into_raw())),
            }
        }
        Err(e) => {
            log::warn!("could not decode texture {}: {}", full.display(), e);
            TextureRef {
                name: relative.to_string(),
                width: 0,
                height: 0,
                pixels: None,
            }
        }
    };
    let id = textures.len();
    textures.push(texture);
    texture_index.insert(relative.to_string(), id);
    id
}

/// Area-weighted vertex normals from face geometry.
fn generate_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![[0.0f32; 3]; positions.len()];
    let face = |i: usize| -> Option<[usize; 3]> {
        let tri = indices.get(i * 3..i * 3 + 3)?;
        Some([tri[0] as usize, tri[1] as usize, tri[2] as usize])
    };
    let faces = indices.len() / 3;
    for f in 0..faces {
        let Some([a, b, c]) = face(f) else { continue };
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let pa = glam::Vec3::from(positions[a]);
        let pb = glam::Vec3::from(positions[b]);
        let pc = glam::Vec3::from(positions[c]);
        // Cross product length is proportional to the face area, so simply
        // accumulating it gives the area weighting.
        let n = (pb - pa).cross(pc - pa);
        for &v in &[a, b, c] {
            normals[v][0] += n.x;
            normals[v][1] += n.y;
            normals[v][2] += n.z;
        }
    }
    for n in &mut normals {
        let v = glam::Vec3::from(*n).normalize_or_zero();
        *n = if v == glam::Vec3::ZERO {
            [0.0, 1.0, 0.0]
        } else {
            v.into()
        };
    }
    normals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_normals_flat_triangle() {
        let positions = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]];
        let normals = generate_normals(&positions, &[0, 1, 2]);
        for n in normals {
            assert!((n[1] - 1.0).abs() < 1e-5, "expected +Y normal, got {:?}", n);
        }
    }

    #[test]
    fn test_generate_normals_unreferenced_vertex_gets_fallback() {
        let positions = vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [5.0, 5.0, 5.0]];
        let normals = generate_normals(&positions, &[0, 1, 2]);
        assert_eq!(normals[3], [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_load_missing_obj_is_load_error() {
        let err = load_obj(Path::new("/nonexistent/maquette.obj")).unwrap_err();
        assert!(matches!(err, ViewerError::Load { .. }));
    }
}
