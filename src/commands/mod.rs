pub mod common;
pub mod count;

pub use count::{run_count, CountArgs};
