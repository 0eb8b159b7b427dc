//! Audio input adapters

pub mod wav_source;

pub use wav_source::WavSource;
