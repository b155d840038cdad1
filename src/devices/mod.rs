#![allow(
    clippy::unit_arg,  // Substantially reduces boilerplate
    clippy::match_bool // can make things more clear at times
)]

pub mod generic;
pub mod platform;
pub mod prelude;

/// Common trait implemented by all emulated devices.
pub trait Device {
    /// The name of the emulated device.
    fn kind(&self) -> &'static str;

    /// Query what register exists at a particular memory offset.
    fn probe(&self, offset: u32) -> Probe<'_>;
}

/// What a device exposes at a particular memory offset.
pub enum Probe<'a> {
    /// A named register.
    Register(&'a str),
    /// Unmapped memory.
    Unmapped,
}

impl<'a> std::fmt::Display for Probe<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Probe::Register(name) => write!(f, "{}", name)?,
            Probe::Unmapped => write!(f, "<unmapped>")?,
        }

        Ok(())
    }
}
