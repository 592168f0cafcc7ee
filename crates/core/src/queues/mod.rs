pub mod bounded_drop_newest_queue;

pub use bounded_drop_newest_queue::*;
