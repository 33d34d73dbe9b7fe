pub mod prompt;
pub mod render;

pub use prompt::ImagePromptDeriver;
pub use render::{ImageRenderer, RenderSettings};
