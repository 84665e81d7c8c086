// Tailing module: incremental, rotation-aware reads from the activity log

mod buffer;
mod tailer;

pub use buffer::LineBuffer;
pub use tailer::FileTailer;
