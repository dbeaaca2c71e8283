pub mod use_count;
pub mod utils_time;

pub use use_count::UseCount;
