pub mod api;
pub mod models;

pub use models::{DropRecord, DropRecordView, DropState};
