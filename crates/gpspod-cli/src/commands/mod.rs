pub mod debug;
pub mod device;
pub mod dump;
pub mod settings;
pub mod tracks;
