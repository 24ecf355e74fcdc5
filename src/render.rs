//! Rasterization: turn separated scene layers into the final bitmap.

pub mod composite;
pub mod raster;
pub mod scene;
pub mod text;

pub use raster::{Bitmap, RasterOutput, rasterize};
