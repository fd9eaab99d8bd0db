//! Side-effect capabilities outside the pipeline: alert sounds and display
//! power. Both delegate to system commands and carry no state.

mod display;
mod sound;

pub use display::{DisplayPower, VcgencmdDisplay};
pub use sound::{AlertSink, SilentAlerts, SoundPlayer};
