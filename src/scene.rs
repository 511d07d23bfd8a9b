// ==============================================================================
// scene.rs — TYPED SCENE GRAPH + ASYNC MESH SOURCES
// ------------------------------------------------------------------------------
// The loaded vehicle arrives as a tree of named nodes. Node capabilities are a
// tagged variant (Mesh | Group | Light) rather than runtime type checks, and
// traversal goes through `SceneVisitor`, which sees each node together with its
// transform relative to the vehicle root.
//
// Loading is phase one of the vehicle lifecycle: `MeshSource::load()` yields a
// `MeshData`, which `Simulation::attach_physics` consumes in phase two.
// ==============================================================================

use crate::error::VehicleError;
use futures::future::{self, BoxFuture, FutureExt};
use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeTransform {
    #[serde(default)]
    pub translation: [f32; 3],
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4], // quaternion x, y, z, w
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self { translation: [0.0; 3], rotation: identity_rotation() }
    }
}

impl NodeTransform {
    pub fn at(translation: [f32; 3]) -> Self {
        Self { translation, ..Self::default() }
    }

    pub fn isometry(&self) -> Isometry3<f32> {
        let [x, y, z, w] = self.rotation;
        let [tx, ty, tz] = self.translation;
        Isometry3::from_parts(
            Translation3::new(tx, ty, tz),
            UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    /// Renderable geometry, described by its local bounding box.
    Mesh { half_extents: [f32; 3] },
    Group,
    Light,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub name: String,
    #[serde(default)]
    pub transform: NodeTransform,
    pub kind: NodeKind,
    #[serde(default)]
    pub children: Vec<SceneNode>,
}

/// What the walker should do after visiting a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    SkipChildren,
}

pub trait SceneVisitor {
    fn visit(&mut self, node: &SceneNode, to_root: &Isometry3<f32>) -> Visit;
}

impl<F> SceneVisitor for F
where
    F: FnMut(&SceneNode, &Isometry3<f32>) -> Visit,
{
    fn visit(&mut self, node: &SceneNode, to_root: &Isometry3<f32>) -> Visit {
        self(node, to_root)
    }
}

impl SceneNode {
    pub fn group(name: &str, transform: NodeTransform, children: Vec<SceneNode>) -> Self {
        Self { name: name.to_string(), transform, kind: NodeKind::Group, children }
    }

    pub fn mesh(name: &str, transform: NodeTransform, half_extents: [f32; 3]) -> Self {
        Self {
            name: name.to_string(),
            transform,
            kind: NodeKind::Mesh { half_extents },
            children: Vec::new(),
        }
    }

    /// Depth-first walk. The root's own transform is the vehicle frame, so
    /// it is not applied.
    pub fn walk<V: SceneVisitor + ?Sized>(&self, visitor: &mut V) {
        self.walk_from(&Isometry3::identity(), visitor);
    }

    fn walk_from<V: SceneVisitor + ?Sized>(&self, to_root: &Isometry3<f32>, visitor: &mut V) {
        if visitor.visit(self, to_root) == Visit::SkipChildren {
            return;
        }
        for child in &self.children {
            let child_to_root = to_root * child.transform.isometry();
            child.walk_from(&child_to_root, visitor);
        }
    }
}

/// Axis-aligned box in the vehicle frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Bounds {
    pub fn half_extents(&self) -> Vector3<f32> {
        (self.max - self.min) * 0.5
    }

    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }

    fn of_box(to_root: &Isometry3<f32>, half: [f32; 3]) -> Self {
        let h = Vector3::from(half);
        let abs_rot = to_root.rotation.to_rotation_matrix().matrix().abs();
        let extent = abs_rot * h;
        let c = Point3::from(to_root.translation.vector);
        Self { min: c - extent, max: c + extent }
    }

    fn merge(self, other: Bounds) -> Bounds {
        Bounds { min: self.min.inf(&other.min), max: self.max.sup(&other.max) }
    }
}

/// A loaded vehicle model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub root: SceneNode,
}

impl MeshData {
    /// Bounds of every mesh outside the subtrees for which `skip` holds.
    pub fn mesh_bounds(&self, skip: impl Fn(&SceneNode) -> bool) -> Option<Bounds> {
        let mut bounds: Option<Bounds> = None;
        let mut visitor = |node: &SceneNode, to_root: &Isometry3<f32>| {
            if skip(node) {
                return Visit::SkipChildren;
            }
            if let NodeKind::Mesh { half_extents } = node.kind {
                let b = Bounds::of_box(to_root, half_extents);
                bounds = Some(match bounds {
                    Some(acc) => acc.merge(b),
                    None => b,
                });
            }
            Visit::Continue
        };
        self.root.walk(&mut visitor);
        bounds
    }

    /// The car the server spawns when no scene file is configured.
    pub fn builtin_car() -> Self {
        let wheel = |name: &str, at: [f32; 3]| {
            SceneNode::group(
                name,
                NodeTransform::at(at),
                vec![SceneNode::mesh("tire", NodeTransform::default(), [0.12, 0.35, 0.35])],
            )
        };
        Self {
            root: SceneNode::group(
                "car",
                NodeTransform::default(),
                vec![
                    SceneNode::mesh("body", NodeTransform::default(), [0.9, 0.3, 2.0]),
                    SceneNode::mesh("cabin", NodeTransform::at([0.0, 0.45, 0.2]), [0.75, 0.2, 0.9]),
                    wheel("Wheel_Front_Left", [-0.8, -0.1, -1.4]),
                    wheel("Wheel_Front_Right", [0.8, -0.1, -1.4]),
                    wheel("Wheel_Back_Left", [-0.8, -0.1, 1.4]),
                    wheel("Wheel_Back_Right", [0.8, -0.1, 1.4]),
                    SceneNode {
                        name: "headlight".into(),
                        transform: NodeTransform::at([0.0, 0.1, -2.0]),
                        kind: NodeKind::Light,
                        children: Vec::new(),
                    },
                ],
            ),
        }
    }
}

// ------------------------------------------------------------------
// Sources
// ------------------------------------------------------------------

pub trait MeshSource: Send + Sync {
    fn load(&self) -> BoxFuture<'static, Result<MeshData, VehicleError>>;
}

/// Serves `MeshData::builtin_car()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinScene;

impl MeshSource for BuiltinScene {
    fn load(&self) -> BoxFuture<'static, Result<MeshData, VehicleError>> {
        future::ready(Ok(MeshData::builtin_car())).boxed()
    }
}

/// A JSON-serialized `SceneNode` tree on disk.
#[derive(Debug, Clone)]
pub struct SceneFile {
    pub path: PathBuf,
}

impl SceneFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MeshSource for SceneFile {
    fn load(&self) -> BoxFuture<'static, Result<MeshData, VehicleError>> {
        let path = self.path.clone();
        async move {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| VehicleError::SceneIo { path: path.clone(), source })?;
            let root: SceneNode = serde_json::from_str(&text)
                .map_err(|source| VehicleError::SceneParse { path: path.clone(), source })?;
            Ok(MeshData { root })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_composes_transforms() {
        let root = SceneNode::group(
            "root",
            NodeTransform::at([100.0, 0.0, 0.0]),
            vec![SceneNode::group(
                "arm",
                NodeTransform::at([1.0, 0.0, 0.0]),
                vec![SceneNode::mesh("tip", NodeTransform::at([0.0, 2.0, 0.0]), [0.1; 3])],
            )],
        );

        let mut seen = Vec::new();
        root.walk(&mut |node: &SceneNode, to_root: &Isometry3<f32>| {
            seen.push((node.name.clone(), to_root.translation.vector));
            Visit::Continue
        });

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].1, Vector3::zeros());
        assert_eq!(seen[1].1, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(seen[2].1, Vector3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn skip_children_prunes_subtree() {
        let car = MeshData::builtin_car();
        let mut names = Vec::new();
        car.root.walk(&mut |node: &SceneNode, _: &Isometry3<f32>| {
            names.push(node.name.clone());
            if node.name.starts_with("Wheel") { Visit::SkipChildren } else { Visit::Continue }
        });
        assert!(!names.iter().any(|n| n == "tire"));
    }

    #[test]
    fn chassis_bounds_exclude_skipped_nodes() {
        let car = MeshData::builtin_car();
        let bounds = car.mesh_bounds(|n| n.name.starts_with("Wheel")).unwrap();
        let h = bounds.half_extents();
        assert!((h.x - 0.9).abs() < 1e-5);
        assert!((h.z - 2.0).abs() < 1e-5);
        // cabin pokes above the body
        assert!((bounds.max.y - 0.65).abs() < 1e-5);
    }

    #[test]
    fn scene_json_round_trips_through_serde() {
        let json = r#"{
            "name": "car",
            "kind": { "type": "group" },
            "children": [
                { "name": "chassis", "kind": { "type": "mesh", "half_extents": [1.0, 0.4, 2.2] } },
                { "name": "lamp", "transform": { "translation": [0, 1, 0] }, "kind": { "type": "light" } }
            ]
        }"#;
        let root: SceneNode = serde_json::from_str(json).unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[1].kind, NodeKind::Light);
        assert_eq!(root.children[1].transform.rotation, [0.0, 0.0, 0.0, 1.0]);
    }

    #[tokio::test]
    async fn scene_file_reports_missing_path() {
        let err = SceneFile::new("/definitely/not/here.json").load().await.unwrap_err();
        assert!(matches!(err, VehicleError::SceneIo { .. }));
    }

    #[tokio::test]
    async fn builtin_source_resolves() {
        let mesh = BuiltinScene.load().await.unwrap();
        assert_eq!(mesh.root.name, "car");
    }
}
