//! SDL2 display backend: one window per camera surface.

use std::collections::HashMap;
use std::time::Duration;

use sdl2::event::Event;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::Canvas;
use sdl2::video::Window;
use tracing::info;

use super::{DisplayBackend, DisplayError};
use crate::preview::PreviewImage;

pub struct Sdl2Display {
    video: sdl2::VideoSubsystem,
    event_pump: sdl2::EventPump,
    windows: HashMap<String, Canvas<Window>>,
    width: u32,
    height: u32,
}

impl Sdl2Display {
    pub fn new(width: u32, height: u32) -> Result<Self, DisplayError> {
        let sdl = sdl2::init().map_err(DisplayError::Backend)?;
        let video = sdl.video().map_err(DisplayError::Backend)?;
        let event_pump = sdl.event_pump().map_err(DisplayError::Backend)?;
        Ok(Self {
            video,
            event_pump,
            windows: HashMap::new(),
            width,
            height,
        })
    }
}

impl DisplayBackend for Sdl2Display {
    fn create_surface(&mut self, name: &str) -> Result<(), DisplayError> {
        let window = self
            .video
            .window(name, self.width, self.height)
            .position_centered()
            .build()
            .map_err(|e| DisplayError::Backend(e.to_string()))?;
        let canvas = window
            .into_canvas()
            .build()
            .map_err(|e| DisplayError::Backend(e.to_string()))?;
        info!(surface = name, "display surface created");
        self.windows.insert(name.to_owned(), canvas);
        Ok(())
    }

    fn update_surface(&mut self, name: &str, image: &PreviewImage) -> Result<(), DisplayError> {
        let canvas = self
            .windows
            .get_mut(name)
            .ok_or_else(|| DisplayError::UnknownSurface(name.to_owned()))?;

        let texture_creator = canvas.texture_creator();
        let mut texture = texture_creator
            .create_texture_streaming(PixelFormatEnum::RGB24, image.width, image.height)
            .map_err(|e| DisplayError::Backend(e.to_string()))?;
        texture
            .update(None, &image.data, image.width as usize * 3)
            .map_err(|e| DisplayError::Backend(e.to_string()))?;

        canvas.clear();
        canvas
            .copy(&texture, None, None)
            .map_err(DisplayError::Backend)?;
        canvas.present();
        Ok(())
    }

    fn destroy_surface(&mut self, name: &str) {
        // Dropping the canvas closes the window.
        self.windows.remove(name);
    }

    fn poll_key(&mut self, timeout: Duration) -> Option<char> {
        let ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX).max(1);
        match self.event_pump.wait_event_timeout(ms) {
            Some(Event::KeyDown {
                keycode: Some(key), ..
            }) => {
                let name = key.name();
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c.to_ascii_lowercase()),
                    _ => None, // non-character key (Space, Return, ...)
                }
            }
            _ => None,
        }
    }
}
