use super::{Keyed, ProgressList};
use crate::events::ImageStepEnd;

impl Keyed for ImageStepEnd {
    type Key = u32;

    fn key(&self) -> &u32 {
        &self.index
    }
}

/// Latest denoising preview per image of the current batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageStepStore {
    images: ProgressList<ImageStepEnd>,
}

impl ImageStepStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the batch with `count` blank previews.
    pub fn init_images(&mut self, count: u32) {
        self.images.clear();
        for index in 0..count {
            self.images.upsert(ImageStepEnd::blank(index));
        }
    }

    /// Store a step-end preview, appending it if its index is new.
    pub fn on_update(&mut self, step: ImageStepEnd) {
        self.images.upsert(step);
    }

    /// Latest preview of image `index`.
    pub fn get(&self, index: u32) -> Option<&ImageStepEnd> {
        self.images.get(&index)
    }

    /// Previews in batch order.
    pub fn images(&self) -> &[ImageStepEnd] {
        self.images.as_slice()
    }

    /// Forget every preview.
    pub fn reset(&mut self) {
        self.images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preview(index: u32, current_step: u32, image: &str) -> ImageStepEnd {
        ImageStepEnd {
            index,
            current_step,
            timestep: 999.0 - current_step as f64,
            image_base64: image.to_string(),
        }
    }

    #[test]
    fn test_init_images_seeds_blanks() {
        let mut store = ImageStepStore::new();
        store.init_images(3);
        assert_eq!(store.images().len(), 3);
        assert_eq!(store.get(2), Some(&ImageStepEnd::blank(2)));

        store.init_images(1);
        assert_eq!(store.images().len(), 1);
    }

    #[test]
    fn test_update_replaces_by_index() {
        let mut store = ImageStepStore::new();
        store.init_images(2);
        store.on_update(preview(1, 4, "aGVsbG8="));
        store.on_update(preview(1, 5, "d29ybGQ="));

        assert_eq!(store.images().len(), 2);
        assert_eq!(store.get(1), Some(&preview(1, 5, "d29ybGQ=")));
        assert_eq!(store.get(0), Some(&ImageStepEnd::blank(0)));
    }

    #[test]
    fn test_unknown_index_appends() {
        let mut store = ImageStepStore::new();
        store.on_update(preview(4, 1, ""));
        assert_eq!(store.images().len(), 1);
        assert_eq!(store.images()[0].index, 4);

        store.reset();
        store.reset();
        assert!(store.images().is_empty());
    }
}
