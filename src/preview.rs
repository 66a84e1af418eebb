//! Last-value preview slots shared between frame workers and the render loop.
//!
//! One slot per camera serial, published by the frame worker processing that
//! camera's frames and read by the render loop. Each slot is an atomically
//! swapped immutable snapshot; readers never observe a torn buffer.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use tracing::error;

/// A display-ready RGB24 image plus the sequence number it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl PreviewImage {
    /// Black frame shown before the first publication. Sequence 0 sorts
    /// below every real frame.
    pub fn placeholder(width: u32, height: u32) -> Self {
        Self {
            sequence: 0,
            width,
            height,
            data: Bytes::from(vec![0u8; width as usize * height as usize * 3]),
        }
    }

    pub fn from_rgb(sequence: u64, image: image::RgbImage) -> Self {
        Self {
            sequence,
            width: image.width(),
            height: image.height(),
            data: Bytes::from(image.into_raw()),
        }
    }
}

pub struct PreviewStore {
    slots: HashMap<u32, ArcSwap<PreviewImage>>,
    placeholder: Arc<PreviewImage>,
}

impl PreviewStore {
    pub fn new(serials: impl IntoIterator<Item = u32>, width: u32, height: u32) -> Self {
        let placeholder = Arc::new(PreviewImage::placeholder(width, height));
        let slots = serials
            .into_iter()
            .map(|serial| (serial, ArcSwap::from(Arc::clone(&placeholder))))
            .collect();
        Self { slots, placeholder }
    }

    /// Replace the slot for `serial`, last value wins.
    ///
    /// Workers complete in no particular order, so the swap is guarded by
    /// sequence number: a late worker carrying an older frame never clobbers
    /// a newer one. Publishing to an unknown serial is a programming error
    /// and is dropped with a diagnostic.
    pub fn publish(&self, serial: u32, image: PreviewImage) {
        let Some(slot) = self.slots.get(&serial) else {
            debug_assert!(false, "preview slot for serial {serial} was never created");
            error!(serial, "no preview slot for serial; dropping preview");
            return;
        };
        let fresh = Arc::new(image);
        slot.rcu(|current| {
            if current.sequence <= fresh.sequence {
                Arc::clone(&fresh)
            } else {
                Arc::clone(current)
            }
        });
    }

    /// Most recently published image for `serial`, or the placeholder.
    pub fn read(&self, serial: u32) -> Arc<PreviewImage> {
        self.slots
            .get(&serial)
            .map(|slot| slot.load_full())
            .unwrap_or_else(|| Arc::clone(&self.placeholder))
    }
}
