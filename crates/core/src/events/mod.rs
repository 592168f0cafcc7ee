pub mod batch;
pub mod event;

pub use batch::*;
pub use event::*;
