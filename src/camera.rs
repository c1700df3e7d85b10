//! Camera and projection.
//!
//! # Key types
//!
//! - [`Camera`]: an eye position looking at a target point, with its view matrix
//! - [`Projection`]: a perspective projection that follows the window size

use cgmath::{perspective, Matrix4, Point3, Rad, Vector3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    position: Point3<f32>,
    look_at: Point3<f32>,
    view: Matrix4<f32>,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Point3::new(0.0, 0.0, 5.0), Point3::new(0.0, 0.0, 0.0))
    }
}

impl Camera {
    pub fn new(position: Point3<f32>, look_at: Point3<f32>) -> Self {
        Self {
            position,
            look_at,
            view: Matrix4::look_at_rh(position, look_at, Vector3::unit_y()),
        }
    }

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    pub fn set_position(&mut self, position: Point3<f32>) {
        self.position = position;
        self.calc_view();
    }

    pub fn look_at(&self) -> Point3<f32> {
        self.look_at
    }

    pub fn set_look_at(&mut self, look_at: Point3<f32>) {
        self.look_at = look_at;
        self.calc_view();
    }

    pub fn view(&self) -> Matrix4<f32> {
        self.view
    }

    fn calc_view(&mut self) {
        self.view = Matrix4::look_at_rh(self.position, self.look_at, Vector3::unit_y());
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Transform};

    #[test]
    fn setters_recompute_the_view() {
        let mut camera = Camera::new(Point3::new(0.0, 0.0, 5.0), Point3::new(0.0, 0.0, 0.0));
        let before = camera.view();
        camera.set_position(Point3::new(3.0, 0.0, 0.0));
        assert_ne!(camera.view(), before);

        let origin = camera.view().transform_point(Point3::new(0.0, 0.0, 0.0));
        assert!((origin.z + 3.0).abs() < 1e-5);
    }

    #[test]
    fn projection_tracks_the_aspect_ratio() {
        let mut projection = Projection::new(800, 600, Deg(45.0), 0.1, 100.0);
        let wide = projection.calc_matrix();
        projection.resize(600, 600);
        assert!(wide.x.x < projection.calc_matrix().x.x);
    }
}
