//! The windowing boundary.
//!
//! The rig only needs named surfaces it can push RGB24 buffers to, plus a
//! bounded keyboard poll. Rendering details live behind [`DisplayBackend`].

#[cfg(feature = "display-sdl2")]
pub mod sdl2;

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use thiserror::Error;

use crate::preview::PreviewImage;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("no surface named {0:?}")]
    UnknownSurface(String),
    #[error("display backend failure: {0}")]
    Backend(String),
}

pub trait DisplayBackend {
    fn create_surface(&mut self, name: &str) -> Result<(), DisplayError>;

    /// Replace the surface contents with `image`.
    fn update_surface(&mut self, name: &str, image: &PreviewImage) -> Result<(), DisplayError>;

    fn destroy_surface(&mut self, name: &str);

    /// Wait up to `timeout` for one keystroke.
    fn poll_key(&mut self, timeout: Duration) -> Option<char>;
}

/// Display for test and hardware-less runs: surfaces are bookkeeping only,
/// and keystrokes come from a script.
#[derive(Default)]
pub struct HeadlessDisplay {
    surfaces: HashSet<String>,
    keys: VecDeque<char>,
    updates: u64,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue keystrokes to be returned by successive `poll_key` calls.
    pub fn queue_keys(&mut self, keys: &str) {
        self.keys.extend(keys.chars());
    }

    pub fn update_count(&self) -> u64 {
        self.updates
    }
}

impl DisplayBackend for HeadlessDisplay {
    fn create_surface(&mut self, name: &str) -> Result<(), DisplayError> {
        self.surfaces.insert(name.to_owned());
        Ok(())
    }

    fn update_surface(&mut self, name: &str, _image: &PreviewImage) -> Result<(), DisplayError> {
        if !self.surfaces.contains(name) {
            return Err(DisplayError::UnknownSurface(name.to_owned()));
        }
        self.updates += 1;
        Ok(())
    }

    fn destroy_surface(&mut self, name: &str) {
        self.surfaces.remove(name);
    }

    fn poll_key(&mut self, timeout: Duration) -> Option<char> {
        match self.keys.pop_front() {
            Some(key) => Some(key),
            None => {
                std::thread::sleep(timeout);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_requires_a_created_surface() {
        let mut display = HeadlessDisplay::new();
        let image = PreviewImage::placeholder(2, 2);
        assert!(display.update_surface("101", &image).is_err());
        display.create_surface("101").expect("create");
        assert!(display.update_surface("101", &image).is_ok());
        display.destroy_surface("101");
        assert!(display.update_surface("101", &image).is_err());
    }

    #[test]
    fn scripted_keys_come_back_in_order() {
        let mut display = HeadlessDisplay::new();
        display.queue_keys("ab");
        assert_eq!(display.poll_key(Duration::from_millis(1)), Some('a'));
        assert_eq!(display.poll_key(Duration::from_millis(1)), Some('b'));
        assert_eq!(display.poll_key(Duration::from_millis(1)), None);
    }
}
