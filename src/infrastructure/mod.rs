pub mod logging;
pub mod sensors;
pub mod transport;
