//! Scene-graph boundary types.
//!
//! These are the narrow interface over whatever produced the model bundle:
//! a traversable node hierarchy where nodes report their kind (group, mesh,
//! light), meshes report geometry counts and a material, and materials carry
//! scalar channels plus up to seven named texture slots. The viewer inspects
//! and aggregates over these types; it does not render from them directly.

use std::collections::HashMap;
use std::sync::Arc;

/// Index of a material within its owning [`SceneModel`].
pub type MaterialId = usize;

/// Index of a texture within its owning [`SceneModel`].
pub type TextureId = usize;

/// The named texture slots a material may bind.
///
/// The first six are the canonical slots that participate in texture
/// deduplication for statistics; opacity is accepted at the ingestion
/// boundary but is not a canonical slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    BaseColor,
    Normal,
    Roughness,
    Metalness,
    AmbientOcclusion,
    Emissive,
    Opacity,
}

impl TextureSlot {
    /// The six canonical slots, in display order.
    pub const CANONICAL: [TextureSlot; 6] = [
        TextureSlot::BaseColor,
        TextureSlot::Normal,
        TextureSlot::Roughness,
        TextureSlot::Metalness,
        TextureSlot::AmbientOcclusion,
        TextureSlot::Emissive,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TextureSlot::BaseColor => "base color",
            TextureSlot::Normal => "normal",
            TextureSlot::Roughness => "roughness",
            TextureSlot::Metalness => "metalness",
            TextureSlot::AmbientOcclusion => "ambient occlusion",
            TextureSlot::Emissive => "emissive",
            TextureSlot::Opacity => "opacity",
        }
    }
}

/// A texture referenced by one or more material slots.
#[derive(Clone, Debug)]
pub struct TextureRef {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Decoded RGBA8 pixels. `None` when the source image data is not
    /// available (preview is then silently skipped).
    pub pixels: Option<Arc<Vec<u8>>>,
}

impl TextureRef {
    /// Memory footprint in bytes at 4 bytes per texel.
    pub fn byte_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * 4
    }
}

/// A material at the ingestion boundary: optional scalar channels plus
/// texture slot bindings.
#[derive(Clone, Debug, Default)]
pub struct Material {
    pub name: String,
    /// Scalar base color (linear RGBA), when defined.
    pub base_color: Option<[f32; 4]>,
    pub roughness: Option<f32>,
    pub metalness: Option<f32>,
    /// Scalar emissive color, when defined.
    pub emissive: Option<[f32; 3]>,
    pub opacity: Option<f32>,
    /// Bound texture slots.
    pub textures: HashMap<TextureSlot, TextureId>,
}

impl Material {
    pub fn texture(&self, slot: TextureSlot) -> Option<TextureId> {
        self.textures.get(&slot).copied()
    }
}

/// Geometry counts reported by a mesh node.
#[derive(Clone, Copy, Debug, Default)]
pub struct Geometry {
    pub vertex_count: usize,
    /// Zero when the geometry is unindexed.
    pub index_count: usize,
}

impl Geometry {
    /// Triangle count: indexed geometry divides its index count by three,
    /// unindexed geometry divides its vertex count by three.
    pub fn triangle_count(&self) -> usize {
        if self.index_count > 0 {
            self.index_count / 3
        } else {
            self.vertex_count / 3
        }
    }
}

/// What a scene node is.
#[derive(Clone, Debug)]
pub enum NodeKind {
    Group,
    Mesh {
        geometry: Geometry,
        material: MaterialId,
    },
    Light,
}

impl NodeKind {
    /// Mesh and light nodes are leaves for tree-view purposes.
    pub fn is_leaf(&self) -> bool {
        !matches!(self, NodeKind::Group)
    }
}

/// A node in the traversable hierarchy.
#[derive(Clone, Debug)]
pub struct SceneNode {
    pub name: String,
    pub kind: NodeKind,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn group(name: impl Into<String>, children: Vec<SceneNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Group,
            children,
        }
    }

    pub fn mesh(name: impl Into<String>, geometry: Geometry, material: MaterialId) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Mesh { geometry, material },
            children: Vec::new(),
        }
    }

    /// Depth-first visit of this node and all descendants.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a SceneNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

/// A loaded model bundle: root node plus the material and texture pools the
/// nodes index into. Textures are owned by the model's material set and are
/// only released by discarding the whole model.
#[derive(Clone, Debug)]
pub struct SceneModel {
    pub name: String,
    pub root: SceneNode,
    pub materials: Vec<Material>,
    pub textures: Vec<TextureRef>,
}

impl SceneModel {
    /// Visit every mesh node in the model.
    pub fn visit_meshes(&self, mut f: impl FnMut(&SceneNode, &Geometry, MaterialId)) {
        self.root.visit(&mut |node| {
            if let NodeKind::Mesh { geometry, material } = &node.kind {
                f(node, geometry, *material);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle_count_indexed() {
        let g = Geometry {
            vertex_count: 80,
            index_count: 300,
        };
        assert_eq!(g.triangle_count(), 100);
    }

    #[test]
    fn test_triangle_count_unindexed() {
        let g = Geometry {
            vertex_count: 300,
            index_count: 0,
        };
        assert_eq!(g.triangle_count(), 100);
    }

    #[test]
    fn test_visit_is_depth_first() {
        let tree = SceneNode::group(
            "root",
            vec![
                SceneNode::group("a", vec![SceneNode::mesh("a1", Geometry::default(), 0)]),
                SceneNode::mesh("b", Geometry::default(), 0),
            ],
        );
        let mut names = Vec::new();
        tree.visit(&mut |n| names.push(n.name.clone()));
        assert_eq!(names, vec!["root", "a", "a1", "b"]);
    }

    #[test]
    fn test_leaf_kinds() {
        assert!(!NodeKind::Group.is_leaf());
        assert!(NodeKind::Light.is_leaf());
        assert!(NodeKind::Mesh {
            geometry: Geometry::default(),
            material: 0
        }
        .is_leaf());
    }
}
