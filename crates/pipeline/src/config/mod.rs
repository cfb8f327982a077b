mod loading;
mod types;
mod validation;


pub use types::*;
