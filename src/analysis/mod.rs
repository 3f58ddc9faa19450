//! Signal reduction and classification

pub mod classifier;
pub mod reducer;

pub use classifier::{classify, gaussian_pdf, Classification, UNKNOWN_LABEL};
pub use reducer::{rms, smooth, Reduction, SignalReducer};
