pub mod cache;
pub mod json;

pub use cache::WorkingSet;
pub use json::JsonStore;
