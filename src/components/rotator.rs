use cgmath::Vector3;

use crate::{data_structures::{scene_graph::Component, transform::Transform}, flow::UpdateContext};

/// Spins its entity at a fixed angular velocity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rotator {
    /// Radians per second about each axis.
    pub speed: Vector3<f32>,
}

impl Rotator {
    pub fn new(speed: Vector3<f32>) -> Self {
        Self { speed }
    }
}

impl Component for Rotator {
    fn update(&mut self, transform: &mut Transform, ctx: &UpdateContext) {
        transform.rotation += self.speed * ctx.delta_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_advances_with_delta_time() {
        let mut rotator = Rotator::new(Vector3::new(0.0, 2.0, 0.0));
        let mut transform = Transform::new();
        let ctx = UpdateContext {
            delta_time: 0.5,
            ..Default::default()
        };
        rotator.update(&mut transform, &ctx);
        rotator.update(&mut transform, &ctx);
        assert_eq!(transform.rotation, Vector3::new(0.0, 2.0, 0.0));
    }
}
