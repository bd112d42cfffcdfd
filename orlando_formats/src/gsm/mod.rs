pub mod arith;
mod decoder;
pub mod tables;
pub mod unpack;

pub use decoder::{GsmDecoder, GsmLayout, SAMPLES_PER_FRAME};
pub use unpack::{FrameParams, STANDARD_FRAME_LEN, WAV49_PAIR_LEN};
