pub mod estimate;
pub mod grabcut;
pub mod measurement;
pub mod resolution;
pub mod scaling;
pub mod threshold;

pub use estimate::*;
pub use grabcut::{GrabCutExtractor, Label, LabelMap};
pub use measurement::*;
pub use resolution::*;
pub use scaling::*;
pub use threshold::*;
