//! SDL2 Window Display
//! Shows the composite in a resizable window. Closing the window or pressing
//! `q` requests shutdown.

use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;

use tracing::info;

use super::sink::{Composite, RenderError, Renderer};

const TITLE: &str = "Argus Multi-Camera Detection";

/// SDL2 Window Display
/// Must be created and used on the render thread.
pub struct Sdl2Display {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    event_pump: EventPump,
    _sdl: sdl2::Sdl,
}

impl Sdl2Display {
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        let sdl = sdl2::init().map_err(RenderError::Backend)?;
        let video_subsystem = sdl.video().map_err(RenderError::Backend)?;

        let window = video_subsystem
            .window(TITLE, width, height)
            .position_centered()
            .resizable()
            .build()
            .map_err(|e| RenderError::Backend(e.to_string()))?;

        let canvas = window
            .into_canvas()
            .present_vsync()
            .build()
            .map_err(|e| RenderError::Backend(e.to_string()))?;
        let texture_creator = canvas.texture_creator();
        let event_pump = sdl.event_pump().map_err(RenderError::Backend)?;

        Ok(Self {
            canvas,
            texture_creator,
            event_pump,
            _sdl: sdl,
        })
    }
}

impl Renderer for Sdl2Display {
    fn present(&mut self, composite: &Composite) -> Result<(), RenderError> {
        let (width, height) = composite.image.dimensions();

        let mut texture = self
            .texture_creator
            .create_texture_streaming(PixelFormatEnum::RGB24, width, height)
            .map_err(|e| RenderError::Backend(e.to_string()))?;

        texture
            .update(None, composite.image.as_raw(), (width * 3) as usize)
            .map_err(|e| RenderError::Backend(e.to_string()))?;

        if !composite.captions.is_empty() {
            let title = format!("{TITLE} - {}", composite.captions.join(" | "));
            // Title updates are cosmetic
            let _ = self.canvas.window_mut().set_title(&title);
        }

        self.canvas.clear();
        self.canvas
            .copy(&texture, None, None)
            .map_err(RenderError::Backend)?;

        self.canvas.present();
        Ok(())
    }

    fn exit_requested(&mut self) -> bool {
        for event in self.event_pump.poll_iter() {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Q),
                    ..
                } => {
                    info!("Quit event received");
                    return true;
                }
                _ => {}
            }
        }
        false
    }
}
