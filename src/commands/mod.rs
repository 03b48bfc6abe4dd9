pub mod edit;

pub use edit::*;