//! Platform-agnostic devices.

pub mod gdrom;
pub mod ram;

pub use gdrom::Gdrom;
pub use ram::Ram;
