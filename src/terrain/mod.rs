//! Procedural density synthesis

pub mod params;
pub mod synthesizer;

pub use params::{NoiseParams, CarveParams, MAX_OCTAVES};
pub use synthesizer::FieldSynthesizer;
