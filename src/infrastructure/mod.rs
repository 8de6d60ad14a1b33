pub mod audio;
pub mod fetch;
pub mod observability;
pub mod persistence;
pub mod service;
pub mod storage;
