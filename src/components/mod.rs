//! Built-in components.
//!
//! - `model` draws a mesh with the default shader or a program of its own
//! - `ui_image` and `ui_text` draw textured screen-space quads, usually inside a
//!   [`crate::data_structures::ui_layer::UiLayer`]
//! - `rotator` spins its entity

pub mod model;
pub mod rotator;
pub mod ui_image;
pub mod ui_text;

pub use model::Model;
pub use rotator::Rotator;
pub use ui_image::UiImage;
pub use ui_text::UiText;
