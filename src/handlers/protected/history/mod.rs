// handlers/protected/history/mod.rs - The caller's stored prompt/answer pairs

pub mod delete;
pub mod export;
pub mod list;

pub use delete::{delete_all, delete_one};
pub use export::{export_csv, export_json};
pub use list::list;
