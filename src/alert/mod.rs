//! Alert gate and the sound services it drives

pub mod gate;
pub mod sound;

pub use gate::{AlertGate, AlertSink};
pub use sound::{alert_sink, AlertClip, AlertFlag, LogAlert, LoopingAlert};
