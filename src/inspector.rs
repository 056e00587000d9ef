//! Scene and material inspection views.
//!
//! Derived, read-only views over the scene-graph boundary: a collapsible
//! hierarchy tree, a deduplicated material list, per-material attribute rows,
//! and a texture preview rasterizer. The UI layer renders these; nothing
//! here mutates scene state.

use image::RgbaImage;

use crate::scene_graph::{Material, NodeKind, SceneModel, SceneNode, TextureRef, TextureSlot};

// ============================================================================
// Scene tree
// ============================================================================

/// One node of the collapsible tree view.
#[derive(Clone, Debug)]
pub struct TreeNode {
    pub label: String,
    pub kind_label: &'static str,
    /// Whether this node's direct child container is visible. Only set by
    /// [`SceneTree::toggle`]; independent of ancestor/descendant state.
    pub expanded: bool,
    pub children: Vec<TreeNode>,
}

/// Collapsible view of a scene hierarchy.
#[derive(Clone, Debug, Default)]
pub struct SceneTree {
    pub roots: Vec<TreeNode>,
}

/// A flattened visible row: depth for indentation plus the path used to
/// address the node for toggling.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeRow {
    pub depth: usize,
    pub label: String,
    pub path: Vec<usize>,
    pub has_children: bool,
    pub expanded: bool,
}

impl SceneTree {
    /// Build the tree for a set of loaded models.
    pub fn build(models: &[SceneModel]) -> Self {
        Self {
            roots: models.iter().map(|m| build_node(&m.root)).collect(),
        }
    }

    /// Flip the expansion of the node at `path`. Affects only that node's
    /// direct child container.
    pub fn toggle(&mut self, path: &[usize]) {
        if let Some(node) = self.node_mut(path) {
            node.expanded = !node.expanded;
        }
    }

    fn node_mut(&mut self, path: &[usize]) -> Option<&mut TreeNode> {
        let (&first, rest) = path.split_first()?;
        let mut node = self.roots.get_mut(first)?;
        for &idx in rest {
            node = node.children.get_mut(idx)?;
        }
        Some(node)
    }

    pub fn node(&self, path: &[usize]) -> Option<&TreeNode> {
        let (&first, rest) = path.split_first()?;
        let mut node = self.roots.get(first)?;
        for &idx in rest {
            node = node.children.get(idx)?;
        }
        Some(node)
    }

    /// Flatten the currently visible rows. A node's children appear only if
    /// the node itself is expanded (and every ancestor on the way here was).
    pub fn visible_rows(&self) -> Vec<TreeRow> {
        let mut rows = Vec::new();
        for (i, root) in self.roots.iter().enumerate() {
            flatten(root, 0, &mut vec![i], &mut rows);
        }
        rows
    }
}

fn flatten(node: &TreeNode, depth: usize, path: &mut Vec<usize>, rows: &mut Vec<TreeRow>) {
    rows.push(TreeRow {
        depth,
        label: node.label.clone(),
        path: path.clone(),
        has_children: !node.children.is_empty(),
        expanded: node.expanded,
    });
    if node.expanded {
        for (i, child) in node.children.iter().enumerate() {
            path.push(i);
            flatten(child, depth + 1, path, rows);
            path.pop();
        }
    }
}

/// Default expansion rule: a node with children starts collapsed unless all
/// of its children are leaves (mesh/light), which keeps structural groups
/// visible while hiding geometry clutter.
fn build_node(node: &SceneNode) -> TreeNode {
    let expanded = !node.children.is_empty()
        && node.children.iter().all(|c| c.kind.is_leaf());
    TreeNode {
        label: node.name.clone(),
        kind_label: match node.kind {
            NodeKind::Group => "group",
            NodeKind::Mesh { .. } => "mesh",
            NodeKind::Light => "light",
        },
        expanded,
        children: node.children.iter().map(build_node).collect(),
    }
}

// ============================================================================
// Material list
// ============================================================================

/// One entry of the deduplicated material list.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialEntry {
    pub material: usize,
    pub name: String,
    /// Scalar base color for the swatch, when the material defines one.
    pub swatch: Option<[f32; 4]>,
    /// Texture footprint across the canonical slots, in MB.
    pub texture_mb: f64,
}

/// List each material of a model once, with swatch and texture footprint.
/// Selecting an entry routes to [`material_rows`].
pub fn material_list(model: &SceneModel) -> Vec<MaterialEntry> {
    model
        .materials
        .iter()
        .enumerate()
        .map(|(id, material)| {
            let mut seen = std::collections::HashSet::new();
            let mut bytes = 0u64;
            for slot in TextureSlot::CANONICAL {
                if let Some(tex_id) = material.texture(slot) {
                    if seen.insert(tex_id) {
                        if let Some(tex) = model.textures.get(tex_id) {
                            bytes += tex.byte_size();
                        }
                    }
                }
            }
            MaterialEntry {
                material: id,
                name: material.name.clone(),
                swatch: material.base_color,
                texture_mb: bytes as f64 / (1024.0 * 1024.0),
            }
        })
        .collect()
}

// ============================================================================
// Material attribute rows
// ============================================================================

/// Value shown for one material attribute row.
#[derive(Clone, Debug, PartialEq)]
pub enum RowValue {
    /// A texture is bound to the channel.
    Texture(usize),
    /// A scalar color.
    Color([f32; 4]),
    /// A scalar value.
    Scalar(f32),
    /// Shown only for base color when nothing is defined.
    NotAvailable,
}

impl std::fmt::Display for RowValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowValue::Texture(id) => write!(f, "texture #{}", id),
            RowValue::Color(c) => {
                write!(f, "rgba({:.2}, {:.2}, {:.2}, {:.2})", c[0], c[1], c[2], c[3])
            }
            RowValue::Scalar(v) => write!(f, "{:.3}", v),
            RowValue::NotAvailable => write!(f, "N/A"),
        }
    }
}

/// One displayable material attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialRow {
    pub label: &'static str,
    pub value: RowValue,
}

/// Derive the displayable rows for a material.
///
/// Base color always appears (texture, else scalar, else "N/A"). Roughness,
/// metalness, emissive and opacity show texture over scalar and are omitted
/// when neither exists. Normal and ambient occlusion have no scalar fallback
/// and appear only when a texture is bound.
pub fn material_rows(material: &Material) -> Vec<MaterialRow> {
    let mut rows = Vec::new();

    let base = if let Some(tex) = material.texture(TextureSlot::BaseColor) {
        RowValue::Texture(tex)
    } else if let Some(color) = material.base_color {
        RowValue::Color(color)
    } else {
        RowValue::NotAvailable
    };
    rows.push(MaterialRow {
        label: TextureSlot::BaseColor.label(),
        value: base,
    });

    let mut scalar_row = |slot: TextureSlot, scalar: Option<RowValue>| {
        if let Some(tex) = material.texture(slot) {
            rows.push(MaterialRow {
                label: slot.label(),
                value: RowValue::Texture(tex),
            });
        } else if let Some(value) = scalar {
            rows.push(MaterialRow {
                label: slot.label(),
                value,
            });
        }
    };
    scalar_row(TextureSlot::Roughness, material.roughness.map(RowValue::Scalar));
    scalar_row(TextureSlot::Metalness, material.metalness.map(RowValue::Scalar));
    scalar_row(
        TextureSlot::Emissive,
        material
            .emissive
            .map(|e| RowValue::Color([e[0], e[1], e[2], 1.0])),
    );
    scalar_row(TextureSlot::Opacity, material.opacity.map(RowValue::Scalar));

    // No scalar fallback exists for normal or AO.
    for slot in [TextureSlot::Normal, TextureSlot::AmbientOcclusion] {
        if let Some(tex) = material.texture(slot) {
            rows.push(MaterialRow {
                label: slot.label(),
                value: RowValue::Texture(tex),
            });
        }
    }

    rows
}

// ============================================================================
// Texture preview
// ============================================================================

/// Rasterize a texture into a standalone bitmap for preview, whatever its
/// original source representation was. Absence of pixel data yields `None`
/// silently; that is an expected state, not an error.
pub fn texture_preview(texture: &TextureRef) -> Option<RgbaImage> {
    let pixels = texture.pixels.as_ref()?;
    if texture.width == 0 || texture.height == 0 {
        return None;
    }
    RgbaImage::from_raw(texture.width, texture.height, pixels.as_ref().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_graph::Geometry;
    use std::sync::Arc;

    fn model_with_hierarchy() -> SceneModel {
        // root group
        //   structure (group with a nested group) -> collapsed
        //   furniture (group of meshes only)      -> expanded
        let root = SceneNode::group(
            "root",
            vec![
                SceneNode::group(
                    "structure",
                    vec![
                        SceneNode::group(
                            "walls",
                            vec![SceneNode::mesh("wall_a", Geometry::default(), 0)],
                        ),
                        SceneNode::mesh("roof", Geometry::default(), 0),
                    ],
                ),
                SceneNode::group(
                    "furniture",
                    vec![
                        SceneNode::mesh("table", Geometry::default(), 0),
                        SceneNode::mesh("chair", Geometry::default(), 0),
                    ],
                ),
            ],
        );
        SceneModel {
            name: "maquette".to_string(),
            root,
            materials: vec![Material::default()],
            textures: Vec::new(),
        }
    }

    #[test]
    fn test_default_expansion_rule() {
        let tree = SceneTree::build(&[model_with_hierarchy()]);
        let root = &tree.roots[0];
        // Root has a group child, so it starts collapsed.
        assert!(!root.expanded);
        // "structure" contains a group, collapsed.
        assert!(!root.children[0].expanded);
        // "walls" and "furniture" contain only leaves, expanded.
        assert!(root.children[0].children[0].expanded);
        assert!(root.children[1].expanded);
    }

    #[test]
    fn test_visible_rows_respect_collapse() {
        let mut tree = SceneTree::build(&[model_with_hierarchy()]);
        // Collapsed root: only the root row is visible.
        assert_eq!(tree.visible_rows().len(), 1);

        tree.toggle(&[0]);
        let labels: Vec<String> = tree.visible_rows().into_iter().map(|r| r.label).collect();
        // Root expanded; "structure" still collapsed so its children hide,
        // "furniture" was default-expanded so its meshes show.
        assert_eq!(
            labels,
            vec!["root", "structure", "furniture", "table", "chair"]
        );
    }

    #[test]
    fn test_toggle_is_independent_of_ancestors() {
        let mut tree = SceneTree::build(&[model_with_hierarchy()]);
        // Toggle a deep node while its ancestor chain is collapsed.
        tree.toggle(&[0, 0]);
        assert!(tree.node(&[0, 0]).unwrap().expanded);
        // The ancestor's own state did not change.
        assert!(!tree.node(&[0]).unwrap().expanded);
        // And the deep node's children stay hidden until ancestors expand.
        assert_eq!(tree.visible_rows().len(), 1);
    }

    #[test]
    fn test_material_list_swatch_and_footprint() {
        let mut model = model_with_hierarchy();
        model.materials[0].name = "plaster".to_string();
        model.materials[0].base_color = Some([0.9, 0.9, 0.8, 1.0]);
        model.textures.push(TextureRef {
            name: "plaster.png".to_string(),
            width: 256,
            height: 256,
            pixels: None,
        });
        model.materials[0]
            .textures
            .insert(TextureSlot::BaseColor, 0);

        let list = material_list(&model);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].swatch, Some([0.9, 0.9, 0.8, 1.0]));
        let expected = (256.0 * 256.0 * 4.0) / (1024.0 * 1024.0);
        assert!((list[0].texture_mb - expected).abs() < 1e-9);
    }

    #[test]
    fn test_rows_base_color_always_present() {
        let material = Material::default();
        let rows = material_rows(&material);
        assert_eq!(rows[0].label, "base color");
        assert_eq!(rows[0].value, RowValue::NotAvailable);
        // Nothing else is defined, so nothing else appears.
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_rows_texture_beats_scalar() {
        let mut material = Material {
            base_color: Some([1.0, 0.0, 0.0, 1.0]),
            roughness: Some(0.5),
            ..Default::default()
        };
        material.textures.insert(TextureSlot::BaseColor, 3);

        let rows = material_rows(&material);
        assert_eq!(rows[0].value, RowValue::Texture(3));
        assert!(rows
            .iter()
            .any(|r| r.label == "roughness" && r.value == RowValue::Scalar(0.5)));
    }

    #[test]
    fn test_rows_normal_requires_texture() {
        let mut material = Material::default();
        assert!(!material_rows(&material).iter().any(|r| r.label == "normal"));
        material.textures.insert(TextureSlot::Normal, 1);
        assert!(material_rows(&material).iter().any(|r| r.label == "normal"));
    }

    #[test]
    fn test_preview_without_pixels_is_silent_none() {
        let texture = TextureRef {
            name: "ghost.png".to_string(),
            width: 16,
            height: 16,
            pixels: None,
        };
        assert!(texture_preview(&texture).is_none());
    }

    #[test]
    fn test_preview_rasterizes_raw_pixels() {
        let texture = TextureRef {
            name: "dot.png".to_string(),
            width: 2,
            height: 2,
            pixels: Some(Arc::new(vec![255u8; 2 * 2 * 4])),
        };
        let img = texture_preview(&texture).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(1, 1).0, [255, 255, 255, 255]);
    }
}
