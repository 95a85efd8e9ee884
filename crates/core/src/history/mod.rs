pub mod history_store;
pub mod json_history_store;
