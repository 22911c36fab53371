pub mod annotate;
pub mod composer;
pub mod sink;

#[cfg(feature = "sdl-display")]
pub mod display;

pub use composer::{ComposeError, Composer, Layout};
pub use sink::{
    spawn_renderer, Composite, NullRenderer, PngSink, RenderError, RenderSink, Renderer,
};

#[cfg(feature = "sdl-display")]
pub use display::Sdl2Display;
