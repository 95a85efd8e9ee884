pub mod capture;
pub mod history;
pub mod shared;
pub mod storage;
pub mod video;
