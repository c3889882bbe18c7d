//! Concrete transports and configuration

pub mod email;
