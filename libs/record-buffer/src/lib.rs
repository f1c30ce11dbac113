mod buffer;
mod set;

pub use buffer::RecordBuffer;
pub use set::BufferSet;
