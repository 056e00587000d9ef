//! Scene statistics.
//!
//! Aggregates triangle, material and texture counts over every loaded model.
//! Materials shared by multiple mesh nodes are counted once; textures are
//! deduplicated across the six canonical slots. Refreshed once per frame by
//! the session tick.

use std::collections::HashSet;

use crate::scene_graph::{SceneModel, TextureSlot};

/// Aggregate statistics over the loaded scene.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneStats {
    pub node_count: usize,
    pub mesh_count: usize,
    pub triangle_count: usize,
    /// Distinct materials referenced by mesh nodes.
    pub material_count: usize,
    /// Distinct textures bound to the canonical slots of those materials.
    pub texture_count: usize,
    /// Total texture memory at 4 bytes per texel, in MB.
    pub texture_mb: f64,
}

impl SceneStats {
    /// Walk every model and aggregate.
    pub fn collect(models: &[SceneModel]) -> Self {
        let mut stats = SceneStats::default();

        for (model_idx, model) in models.iter().enumerate() {
            model.root.visit(&mut |_| stats.node_count += 1);

            // Material/texture identity is scoped per model: ids from
            // different bundles never alias.
            let mut materials: HashSet<(usize, usize)> = HashSet::new();
            let mut textures: HashSet<(usize, usize)> = HashSet::new();

            model.visit_meshes(|_, geometry, material_id| {
                stats.mesh_count += 1;
                stats.triangle_count += geometry.triangle_count();
                materials.insert((model_idx, material_id));
            });

            for &(_, material_id) in &materials {
                let Some(material) = model.materials.get(material_id) else {
                    continue;
                };
                for slot in TextureSlot::CANONICAL {
                    if let Some(texture_id) = material.texture(slot) {
                        textures.insert((model_idx, texture_id));
                    }
                }
            }

            stats.material_count += materials.len();
            stats.texture_count += textures.len();
            for &(_, texture_id) in &textures {
                if let Some(texture) = model.textures.get(texture_id) {
                    stats.texture_mb += texture.byte_size() as f64 / (1024.0 * 1024.0);
                }
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_graph::{Geometry, Material, SceneNode, TextureRef};
    use std::sync::Arc;

    fn test_model() -> SceneModel {
        let mut shared = Material {
            name: "shared".to_string(),
            base_color: Some([1.0, 0.0, 0.0, 1.0]),
            ..Default::default()
        };
        shared.textures.insert(TextureSlot::BaseColor, 0);
        shared.textures.insert(TextureSlot::Normal, 0); // Same texture, two slots.

        SceneModel {
            name: "test".to_string(),
            root: SceneNode::group(
                "root",
                vec![
                    SceneNode::mesh(
                        "a",
                        Geometry {
                            vertex_count: 80,
                            index_count: 300,
                        },
                        0,
                    ),
                    SceneNode::mesh(
                        "b",
                        Geometry {
                            vertex_count: 300,
                            index_count: 0,
                        },
                        0,
                    ),
                ],
            ),
            materials: vec![shared],
            textures: vec![TextureRef {
                name: "brick.png".to_string(),
                width: 512,
                height: 512,
                pixels: Some(Arc::new(vec![0; 512 * 512 * 4])),
            }],
        }
    }

    #[test]
    fn test_triangle_counts_indexed_and_unindexed() {
        let stats = SceneStats::collect(&[test_model()]);
        assert_eq!(stats.triangle_count, 200);
        assert_eq!(stats.mesh_count, 2);
    }

    #[test]
    fn test_shared_material_counted_once() {
        let stats = SceneStats::collect(&[test_model()]);
        assert_eq!(stats.material_count, 1);
    }

    #[test]
    fn test_texture_dedup_across_slots() {
        let stats = SceneStats::collect(&[test_model()]);
        assert_eq!(stats.texture_count, 1);
        let expected_mb = (512.0 * 512.0 * 4.0) / (1024.0 * 1024.0);
        assert!((stats.texture_mb - expected_mb).abs() < 1e-9);
    }

    #[test]
    fn test_opacity_slot_not_canonical() {
        let mut model = test_model();
        model.textures.push(TextureRef {
            name: "mask.png".to_string(),
            width: 64,
            height: 64,
            pixels: None,
        });
        model.materials[0]
            .textures
            .insert(TextureSlot::Opacity, 1);
        let stats = SceneStats::collect(&[model]);
        assert_eq!(stats.texture_count, 1);
    }

    #[test]
    fn test_two_models_do_not_alias_ids() {
        let stats = SceneStats::collect(&[test_model(), test_model()]);
        assert_eq!(stats.material_count, 2);
        assert_eq!(stats.texture_count, 2);
        assert_eq!(stats.triangle_count, 400);
    }

    #[test]
    fn test_unused_material_map_entry_ignored() {
        let mut model = test_model();
        // A material present in the pool but referenced by no mesh.
        model.materials.push(Material {
            name: "orphan".to_string(),
            ..Default::default()
        });
        let stats = SceneStats::collect(&[model]);
        assert_eq!(stats.material_count, 1);
    }
}
