//! Source segmentation

pub mod chunk;
pub mod segmenter;

pub use chunk::Chunk;
pub use segmenter::{LineNumbering, SegmentError, Segmenter};
