pub mod action;
pub mod raw_event;
pub mod session;

pub use action::*;
pub use raw_event::*;
pub use session::*;
