pub mod fixtures;
mod recording;

pub use recording::{RecordedExecutable, RecordingCompiler};
