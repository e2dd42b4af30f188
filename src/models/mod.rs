pub mod common;
pub mod document;
pub mod event;
pub mod template;

pub use common::*;
pub use document::*;
pub use event::*;
pub use template::*;
