/// Bytes per pixel of every decoded frame (packed RGB24).
pub const RGB_BYTES: usize = 3;

/// One picture pulled off a live stream, as packed RGB24 rows.
///
/// A source may hand back a successful read that carries no picture;
/// that shows up here as an empty frame which the capture loop skips.
#[derive(Clone, Debug)]
pub struct Frame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    sequence: usize,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: usize) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize * RGB_BYTES,
            "pixel buffer does not match {width}x{height} RGB"
        );
        Self {
            pixels,
            width,
            height,
            sequence,
        }
    }

    pub fn empty(sequence: usize) -> Self {
        Self {
            pixels: Vec::new(),
            width: 0,
            height: 0,
            sequence,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Reads since the stream was opened, counting this one.
    pub fn sequence(&self) -> usize {
        self.sequence
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}
