//! # Placement
//!
//! Where an effect sits in the world. Every instance owns one node for its
//! whole life; playing an effect moves that node, either attached under a
//! parent or placed directly in world space.
//!
//! [`SceneGraph`] is the reference provider: a transform hierarchy stored in
//! a generational arena, so a destroyed node's id can never alias a new one.

use std::fmt;

use ember_core::{SlotArena, SlotHandle};
use ember_shared::Transform;

/// Handle to a placement node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(SlotHandle);

impl NodeId {
    /// Wraps a provider-specific handle.
    #[inline]
    #[must_use]
    pub const fn from_raw(handle: SlotHandle) -> Self {
        Self(handle)
    }

    /// Provider-specific handle.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> SlotHandle {
        self.0
    }
}

/// A node's parent link and local transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodePlacement {
    /// Parent node.
    pub parent: Option<NodeId>,
    /// Transform relative to that parent (world space if none).
    pub local: Transform,
}

impl NodePlacement {
    /// Unparented, at `world`.
    #[must_use]
    pub const fn world(world: Transform) -> Self {
        Self {
            parent: None,
            local: world,
        }
    }

    /// Attached under `parent` at `local`.
    #[must_use]
    pub const fn under(parent: NodeId, local: Transform) -> Self {
        Self {
            parent: Some(parent),
            local,
        }
    }
}

/// Transform hierarchy the effect engine places nodes in.
pub trait PlacementProvider: Send {
    /// Creates a root node at the origin.
    fn create_node(&mut self, name: &str) -> NodeId;

    /// Destroys a node. Its children are detached in place.
    fn destroy_node(&mut self, node: NodeId);

    /// True if the node exists.
    fn contains(&self, node: NodeId) -> bool;

    /// Current parent, if any.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Transform relative to the parent.
    fn local_transform(&self, node: NodeId) -> Option<Transform>;

    /// Transform in world space.
    fn world_transform(&self, node: NodeId) -> Option<Transform>;

    /// Attaches `node` under `parent` with the given local transform.
    ///
    /// Returns false (and changes nothing) if either node is missing or the
    /// link would create a cycle.
    fn attach(&mut self, node: NodeId, parent: NodeId, local: Transform) -> bool;

    /// Unparents `node` and sets its world transform.
    fn place_in_world(&mut self, node: NodeId, world: Transform);

    /// Unparents `node`, keeping its current world transform.
    fn detach_to_world(&mut self, node: NodeId);

    /// Captures the node's parent link and local transform.
    fn capture(&self, node: NodeId) -> Option<NodePlacement> {
        Some(NodePlacement {
            parent: self.parent(node),
            local: self.local_transform(node)?,
        })
    }

    /// Applies a placement. A missing parent leaves the node in world space
    /// at the given local transform.
    fn restore(&mut self, node: NodeId, placement: NodePlacement) {
        match placement.parent {
            Some(parent) if self.contains(parent) => {
                self.attach(node, parent, placement.local);
            }
            _ => self.place_in_world(node, placement.local),
        }
    }
}

#[derive(Clone, Debug)]
struct SceneNode {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    local: Transform,
}

/// Arena-backed transform hierarchy.
#[derive(Default)]
pub struct SceneGraph {
    nodes: SlotArena<SceneNode>,
}

impl SceneGraph {
    /// Longest parent chain walked before a hierarchy is considered corrupt.
    const MAX_DEPTH: usize = 1024;

    /// Empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if there are no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creates a node attached under `parent`.
    pub fn create_child(&mut self, name: &str, parent: NodeId, local: Transform) -> NodeId {
        let node = self.create_node(name);
        if !self.attach(node, parent, local) {
            self.set_local(node, local);
        }
        node
    }

    /// Node name.
    #[must_use]
    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).map(|n| n.name.as_str())
    }

    /// Direct children.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(node.0).map_or(&[], |n| n.children.as_slice())
    }

    /// Overwrites the local transform.
    pub fn set_local(&mut self, node: NodeId, local: Transform) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.local = local;
        }
    }

    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        for _ in 0..Self::MAX_DEPTH {
            match current {
                Some(id) if id == ancestor => return true,
                Some(id) => current = self.nodes.get(id.0).and_then(|n| n.parent),
                None => return false,
            }
        }
        true
    }

    fn unlink(&mut self, node: NodeId) {
        let parent = self.nodes.get_mut(node.0).and_then(|n| n.parent.take());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p.0)) {
            parent.children.retain(|&child| child != node);
        }
    }
}

impl PlacementProvider for SceneGraph {
    fn create_node(&mut self, name: &str) -> NodeId {
        NodeId(self.nodes.insert(SceneNode {
            name: name.to_owned(),
            parent: None,
            children: Vec::new(),
            local: Transform::IDENTITY,
        }))
    }

    fn destroy_node(&mut self, node: NodeId) {
        let children = self.children(node).to_vec();
        for child in children {
            self.detach_to_world(child);
        }
        self.unlink(node);
        self.nodes.remove(node.0);
    }

    fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(node.0)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    fn local_transform(&self, node: NodeId) -> Option<Transform> {
        self.nodes.get(node.0).map(|n| n.local)
    }

    fn world_transform(&self, node: NodeId) -> Option<Transform> {
        let mut world = self.nodes.get(node.0)?.local;
        let mut parent = self.parent(node);
        for _ in 0..Self::MAX_DEPTH {
            let Some(id) = parent else {
                return Some(world);
            };
            let n = self.nodes.get(id.0)?;
            world = n.local.compose(&world);
            parent = n.parent;
        }
        tracing::error!("Scene hierarchy deeper than {} nodes", Self::MAX_DEPTH);
        Some(world)
    }

    fn attach(&mut self, node: NodeId, parent: NodeId, local: Transform) -> bool {
        if !self.contains(node) || !self.contains(parent) {
            return false;
        }
        if self.is_ancestor(node, parent) {
            tracing::warn!("Refusing to attach a scene node under its own descendant");
            return false;
        }

        self.unlink(node);
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.push(node);
        }
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.parent = Some(parent);
            n.local = local;
        }
        true
    }

    fn place_in_world(&mut self, node: NodeId, world: Transform) {
        self.unlink(node);
        self.set_local(node, world);
    }

    fn detach_to_world(&mut self, node: NodeId) {
        if let Some(world) = self.world_transform(node) {
            self.place_in_world(node, world);
        }
    }
}

impl fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneGraph")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_shared::{Quaternion, Vec3};
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_world_transform_composes_chain() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        graph.set_local(root, Transform::from_position(Vec3::new(10.0, 0.0, 0.0)));
        let child = graph.create_child("child", root, Transform::from_position(Vec3::new(0.0, 1.0, 0.0)));

        let world = graph.world_transform(child).unwrap();
        assert!(world.position.approx_eq(Vec3::new(10.0, 1.0, 0.0)));
        assert_eq!(graph.children(root), &[child]);
    }

    #[test]
    fn test_detach_keeps_world_transform() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        graph.set_local(
            root,
            Transform::new(
                Vec3::new(1.0, 0.0, 0.0),
                Quaternion::from_axis_angle(Vec3::Y, FRAC_PI_2),
                Vec3::ONE,
            ),
        );
        let child = graph.create_child("child", root, Transform::from_position(Vec3::X));
        let before = graph.world_transform(child).unwrap();

        graph.detach_to_world(child);
        assert_eq!(graph.parent(child), None);
        assert!(graph.world_transform(child).unwrap().approx_eq(&before));
        assert!(graph.children(root).is_empty());
    }

    #[test]
    fn test_attach_rejects_cycle() {
        let mut graph = SceneGraph::new();
        let a = graph.create_node("a");
        let b = graph.create_child("b", a, Transform::IDENTITY);

        assert!(!graph.attach(a, b, Transform::IDENTITY));
        assert!(!graph.attach(a, a, Transform::IDENTITY));
        assert_eq!(graph.parent(a), None);
    }

    #[test]
    fn test_capture_restore() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        let node = graph.create_child("fx", root, Transform::from_position(Vec3::Z));
        let saved = graph.capture(node).unwrap();

        graph.place_in_world(node, Transform::from_position(Vec3::new(5.0, 5.0, 5.0)));
        assert_eq!(graph.parent(node), None);

        graph.restore(node, saved);
        assert_eq!(graph.parent(node), Some(root));
        assert!(graph.local_transform(node).unwrap().approx_eq(&Transform::from_position(Vec3::Z)));
    }

    #[test]
    fn test_destroy_detaches_children_and_invalidates_id() {
        let mut graph = SceneGraph::new();
        let root = graph.create_node("root");
        graph.set_local(root, Transform::from_position(Vec3::new(0.0, 2.0, 0.0)));
        let child = graph.create_child("child", root, Transform::IDENTITY);

        graph.destroy_node(root);
        assert!(!graph.contains(root));
        assert_eq!(graph.parent(child), None);
        assert!(graph.world_transform(child).unwrap().position.approx_eq(Vec3::new(0.0, 2.0, 0.0)));

        let reused = graph.create_node("new");
        assert_ne!(reused, root);
        assert_eq!(graph.len(), 2);
    }
}
