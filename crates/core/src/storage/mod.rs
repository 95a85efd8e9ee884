pub mod capture_store;
pub mod naming;
