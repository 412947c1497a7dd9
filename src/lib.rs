//! AutoMudae: automated rolling, claiming and kakera collection for the Mudae chat game.

pub mod actuator;
pub mod agent;
pub mod budget;
pub mod channels;
pub mod config;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod mudae;
