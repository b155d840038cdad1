#[macro_use]
extern crate static_assertions;

#[macro_use]
extern crate log;

pub mod devices;
pub mod disc;
pub mod error;
pub mod memory;
pub mod signal;
