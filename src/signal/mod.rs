//! Signaling and notification between devices and the host system.

pub mod irq;
