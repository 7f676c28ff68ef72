//! The thirteen pipeline stages, one per file, in pipeline order.

mod background;
mod blur;
mod brightness;
mod contrast;
mod crop;
mod filter;
mod gamma;
mod letterbox;
mod orientation;
mod shape;
mod sharpen;
mod thumbnail;
mod trim;

pub use background::Background;
pub use blur::Blur;
pub use brightness::Brightness;
pub use contrast::Contrast;
pub use crop::Crop;
pub use filter::Filter;
pub use gamma::Gamma;
pub use letterbox::Letterbox;
pub use orientation::Orientation;
pub use shape::ShapeMask;
pub use sharpen::Sharpen;
pub use thumbnail::Thumbnail;
pub use trim::Trim;
