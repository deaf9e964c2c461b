pub mod ask;
pub mod env;
