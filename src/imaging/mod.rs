//! Decoding, the manipulation pipeline and encoding.
//!
//! A request's bytes are decoded into a [`RasterBuffer`], run through the
//! fixed [`Pipeline`] of [`Manipulator`] stages and encoded according to
//! [`EncodeOptions`].

pub mod color;
pub mod encode;
pub mod geometry;
pub mod manipulators;
pub mod mask;
pub mod pipeline;
pub mod raster;
pub mod smartcrop;

pub use encode::{EncodeOptions, OutputFormat};
pub use pipeline::{Manipulator, Pipeline};
pub use raster::RasterBuffer;
