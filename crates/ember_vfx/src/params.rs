//! Placement parameters for one play cycle.

use ember_shared::{Quaternion, Transform, Vec3};

use crate::placement::{NodeId, PlacementProvider};

/// Where and how a pooled effect is placed when it starts playing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayParams {
    /// Attach under `parent` (true) or place in world space (false).
    pub should_attach: bool,
    /// Reference node for attachment or relative world placement.
    pub parent: Option<NodeId>,
    /// Offset, relative to `parent` if there is one.
    pub local_position: Vec3,
    /// Rotation, relative to `parent` if there is one.
    pub local_rotation: Quaternion,
    /// Scale multiplier. Zero means "unset" and acts as one.
    pub local_scale: Vec3,
    /// Fraction of the playback duration after which an attached effect
    /// detaches from its parent, in `[0, 1]`. Zero disables.
    pub deparent_time: f32,
}

impl Default for PlayParams {
    fn default() -> Self {
        Self {
            should_attach: false,
            parent: None,
            local_position: Vec3::ZERO,
            local_rotation: Quaternion::IDENTITY,
            local_scale: Vec3::ZERO,
            deparent_time: 0.0,
        }
    }
}

impl PlayParams {
    /// World-space placement at `position`.
    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self {
            local_position: position,
            ..Self::default()
        }
    }

    /// Attached under `parent` at its origin.
    #[must_use]
    pub fn attached_to(parent: NodeId) -> Self {
        Self {
            should_attach: true,
            parent: Some(parent),
            ..Self::default()
        }
    }

    /// Placed in world space relative to `parent`, without attaching.
    #[must_use]
    pub fn near(parent: NodeId) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    /// Sets the offset.
    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.local_position = position;
        self
    }

    /// Sets the rotation.
    #[must_use]
    pub fn with_rotation(mut self, rotation: Quaternion) -> Self {
        self.local_rotation = rotation;
        self
    }

    /// Sets the scale multiplier.
    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.local_scale = scale;
        self
    }

    /// Sets the deparent fraction.
    #[must_use]
    pub fn with_deparent_time(mut self, fraction: f32) -> Self {
        self.deparent_time = fraction.clamp(0.0, 1.0);
        self
    }

    /// Scale the node gets: prefab scale times the multiplier.
    #[must_use]
    pub fn spawn_scale(&self, base_scale: Vec3) -> Vec3 {
        let multiplier = if self.local_scale.is_zero() {
            Vec3::ONE
        } else {
            self.local_scale
        };
        base_scale.scale_by(multiplier)
    }

    /// True if these params ask for a detach timer.
    #[must_use]
    pub fn wants_deparent(&self) -> bool {
        self.should_attach && self.deparent_time > 0.0
    }

    /// Moves `node` into place. Returns true if it ended up attached.
    ///
    /// Relative world placement composes rotations as
    /// `parent.rotation * local_rotation`, the same order an attachment
    /// would produce, so an effect spawned near a parent starts out exactly
    /// where the attached version would.
    pub fn configure(
        &self,
        provider: &mut dyn PlacementProvider,
        node: NodeId,
        base_scale: Vec3,
    ) -> bool {
        let scale = self.spawn_scale(base_scale);
        let local = Transform::new(self.local_position, self.local_rotation, scale);

        if self.should_attach {
            if let Some(parent) = self.parent {
                if provider.attach(node, parent, local) {
                    return true;
                }
                tracing::warn!("Effect parent is gone; placing in world space instead");
            }
        }

        let world = match self.parent.and_then(|p| provider.world_transform(p)) {
            Some(parent) => Transform::new(
                parent.transform_point(self.local_position),
                (parent.rotation * self.local_rotation).normalized(),
                scale,
            ),
            None => local,
        };
        provider.place_in_world(node, world);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::SceneGraph;

    #[test]
    fn test_zero_scale_means_unit() {
        let base = Vec3::new(2.0, 2.0, 2.0);
        assert_eq!(PlayParams::default().spawn_scale(base), base);
        assert_eq!(
            PlayParams::default().with_scale(Vec3::new(0.5, 1.0, 2.0)).spawn_scale(base),
            Vec3::new(1.0, 2.0, 4.0)
        );
    }

    #[test]
    fn test_attach_places_under_parent() {
        let mut graph = SceneGraph::new();
        let parent = graph.create_node("parent");
        let fx = graph.create_node("fx");

        let attached = PlayParams::attached_to(parent)
            .with_position(Vec3::Y)
            .configure(&mut graph, fx, Vec3::ONE);
        assert!(attached);
        assert_eq!(graph.parent(fx), Some(parent));
        assert!(graph.local_transform(fx).unwrap().position.approx_eq(Vec3::Y));
    }

    #[test]
    fn test_world_placement_without_parent() {
        let mut graph = SceneGraph::new();
        let fx = graph.create_node("fx");

        let attached = PlayParams::at(Vec3::new(3.0, 0.0, 0.0)).configure(&mut graph, fx, Vec3::ONE);
        assert!(!attached);
        assert!(graph
            .world_transform(fx)
            .unwrap()
            .position
            .approx_eq(Vec3::new(3.0, 0.0, 0.0)));
    }

    #[test]
    fn test_attach_to_missing_parent_falls_back_to_world() {
        let mut graph = SceneGraph::new();
        let parent = graph.create_node("parent");
        graph.destroy_node(parent);
        let fx = graph.create_node("fx");

        let attached = PlayParams::attached_to(parent).configure(&mut graph, fx, Vec3::ONE);
        assert!(!attached);
        assert_eq!(graph.parent(fx), None);
    }

    #[test]
    fn test_wants_deparent() {
        let mut graph = SceneGraph::new();
        let parent = graph.create_node("parent");
        assert!(PlayParams::attached_to(parent).with_deparent_time(0.5).wants_deparent());
        assert!(!PlayParams::near(parent).with_deparent_time(0.5).wants_deparent());
        assert!(!PlayParams::attached_to(parent).wants_deparent());
        // Detach fractions stay within the playback
        assert!((PlayParams::default().with_deparent_time(3.0).deparent_time - 1.0).abs() < f32::EPSILON);
    }
}
