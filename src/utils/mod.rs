//! Utility functions and types

pub mod data_loader;
pub mod random;

pub use data_loader::{DataLoader, DataSaver, drop_missing_rows, frame_to_array2, series_to_array1, column_names};
pub use random::{seed_everything, next_seed, derived_rng};
