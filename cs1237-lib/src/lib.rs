pub mod command;
pub mod engine;
pub mod error;
pub mod frame;
pub mod link;
pub mod register;
pub mod sim;

// Re-export the driver and translator for easy access
pub use command::CommandTranslator;
pub use engine::Cs1237;
