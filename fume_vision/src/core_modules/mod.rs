pub mod accumulator;
pub mod frame;
pub mod gaussian;
pub mod hue_band;
pub mod mask;
pub mod pixel;
