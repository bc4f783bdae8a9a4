//! Grain schedulers: sequential playback of prepared packfile grains, and windowed live grains
//! which are read from the capture ring buffer.

pub mod file;
pub mod live;

pub use file::FileGranulator;
pub use live::{
    GrainBufferView, GrainControlBlock, GrainManager, GrainViewEntry, WindowShape,
    MAX_VIEW_GRAINS, WINDOW_LENGTH,
};
