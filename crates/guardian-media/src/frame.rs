//! Decoded video frames.

/// Edge length of the centred square compared for freeze detection.
pub const FREEZE_REGION_SIZE: u32 = 100;

const CHANNELS: usize = 3;

/// A decoded frame in packed RGB24.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Zero-based position in the source
    pub index: u64,
    /// `width * height * 3` bytes, row-major
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, index: u64, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            index,
            data,
        }
    }

    /// A frame with every byte set to `value`.
    pub fn filled(width: u32, height: u32, index: u64, value: u8) -> Self {
        Self::new(width, height, index, vec![value; Self::byte_len(width, height)])
    }

    /// Size in bytes of an RGB24 frame.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * CHANNELS
    }

    /// Copy of the centred `size x size` region (clamped to the frame).
    ///
    /// Rows are concatenated so two regions can be compared with `==`.
    pub fn center_region(&self, size: u32) -> Vec<u8> {
        let w = size.min(self.width) as usize;
        let h = size.min(self.height) as usize;
        if w == 0 || h == 0 || self.data.len() < Self::byte_len(self.width, self.height) {
            return Vec::new();
        }

        let x0 = (self.width as usize - w) / 2;
        let y0 = (self.height as usize - h) / 2;
        let stride = self.width as usize * CHANNELS;

        let mut region = Vec::with_capacity(w * h * CHANNELS);
        for row in y0..y0 + h {
            let start = row * stride + x0 * CHANNELS;
            region.extend_from_slice(&self.data[start..start + w * CHANNELS]);
        }
        region
    }

    /// Region used for freeze comparison.
    pub fn freeze_region(&self) -> Vec<u8> {
        self.center_region(FREEZE_REGION_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_region_size() {
        let frame = Frame::filled(640, 480, 0, 7);
        let region = frame.freeze_region();
        assert_eq!(region.len(), 100 * 100 * 3);
        assert!(region.iter().all(|b| *b == 7));
    }

    #[test]
    fn test_center_region_clamped_to_small_frames() {
        let frame = Frame::filled(40, 20, 0, 1);
        assert_eq!(frame.freeze_region().len(), 40 * 20 * 3);
    }

    #[test]
    fn test_center_region_ignores_edges() {
        let mut frame = Frame::filled(300, 300, 0, 0);
        // Change a pixel in the top-left corner, outside the centred square.
        frame.data[0] = 255;
        let reference = Frame::filled(300, 300, 1, 0);
        assert_eq!(frame.freeze_region(), reference.freeze_region());

        // Change the exact centre pixel.
        let centre = (150 * 300 + 150) * 3;
        frame.data[centre] = 255;
        assert_ne!(frame.freeze_region(), reference.freeze_region());
    }

    #[test]
    fn test_truncated_frame_has_empty_region() {
        let frame = Frame::new(10, 10, 0, vec![0; 5]);
        assert!(frame.center_region(4).is_empty());
    }
}
