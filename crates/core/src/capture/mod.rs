pub mod capture_error;
pub mod capture_events;
mod capture_loop;
pub mod capture_manager;
pub mod capture_settings;
#[cfg(test)]
mod test_support;
