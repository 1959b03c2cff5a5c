//! Dataset access for training, evaluation and prediction

mod module;

pub use module::{DataConfig, DataModule, LabeledData, UnlabeledData, ID_COLUMN};
