pub mod configuration;
pub use configuration::*;

pub mod controller;
pub use controller::*;

pub mod data_capture;

pub mod error_handling;

pub mod session_management;
pub use session_management::*;

pub mod status;

pub mod storage;
