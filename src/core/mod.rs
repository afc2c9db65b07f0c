mod request;
pub use request::*;
mod fetch;
pub use fetch::*;
mod cache;
pub use cache::*;
mod manifest;
pub use manifest::*;
mod event;
pub use event::*;
