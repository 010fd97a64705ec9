// tandem-common: presence data model and coordinate translation shared across Tandem crates

pub mod color;
pub mod path;
pub mod translate;
pub mod tree;
pub mod types;
