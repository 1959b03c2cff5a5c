//! Data preprocessing
//!
//! Feature scaling applied as the optional first pipeline stage.

mod scaler;

pub use scaler::StandardScaler;
