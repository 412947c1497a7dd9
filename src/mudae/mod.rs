//! Game message model and classification.

pub mod classifier;
pub mod command;
pub mod markup;
pub mod roll;
pub mod timer;
pub mod types;

pub use classifier::{Classifier, ClassifierContext};
pub use types::*;
