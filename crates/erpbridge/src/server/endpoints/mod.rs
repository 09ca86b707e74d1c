pub mod attendance;
pub mod relay;
pub mod status;
