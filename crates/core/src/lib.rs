pub mod config;
pub mod entry;
pub mod error;
pub mod item;
pub mod source;

pub use entry::*;
pub use error::*;
pub use item::*;
pub use source::*;
