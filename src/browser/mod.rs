pub mod dom;
pub mod driver;
pub mod manager;
pub mod screencast;
pub mod stability;

#[cfg(test)]
pub mod fake;

pub use dom::{DomElement, DomSnapshot, PageState};
pub use driver::{BoundingBox, BrowserDriver, NavigationEvent, VideoCapture};
pub use manager::{BrowserManager, LaunchOptions};
pub use stability::{NavigationOutcome, NavigationWatch, StabilityWaiter};
