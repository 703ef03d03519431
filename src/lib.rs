pub mod config;
pub mod driver;
pub mod layout;
pub mod primitive;
pub mod projection;
pub mod render;
pub mod video;
pub mod vr;

pub use config::{Eye, Format, Layout, PlayerConfig};
pub use render::{DebugRenderer, RenderError, RenderResult, Renderer, RendererState, VrRenderer, play};
