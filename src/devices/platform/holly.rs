//! Holly-side adapters for the G1 bus peripherals.

use crate::devices::prelude::*;

use crate::devices::generic::gdrom::{Gdrom, GdromReg};

/// GD-ROM register window on the Holly G1 bus.
///
/// Registers occupy 32-bit slots but carry 16-bit values. Offsets are
/// relative to the base of the drive's MMIO window.
#[derive(Debug)]
pub struct GdromCon {
    gdrom: Gdrom,
}

impl GdromCon {
    pub fn new(irq: irq::Sender) -> GdromCon {
        GdromCon {
            gdrom: Gdrom::new(irq),
        }
    }

    pub fn as_gdrom(&mut self) -> &mut Gdrom {
        &mut self.gdrom
    }
}

impl Device for GdromCon {
    fn kind(&self) -> &'static str {
        "GD-ROM Controller"
    }

    fn probe(&self, offset: u32) -> Probe {
        let reg = match offset {
            0x18 => "AltStatus/DevControl",
            0x80 => "Data",
            0x84 => "Error/Features",
            0x88 => "IntReason/SectorCount",
            0x8c => "SectorNumber",
            0x90 => "ByteCountLo",
            0x94 => "ByteCountHi",
            0x98 => "DriveSelect",
            0x9c => "Status/Command",
            _ => return Probe::Unmapped,
        };

        Probe::Register(reg)
    }
}

impl Memory for GdromCon {
    fn r32(&mut self, offset: u32) -> MemResult<u32> {
        let reg = match offset {
            0x18 => GdromReg::AltStatus,
            0x80 => GdromReg::Data,
            0x84 => GdromReg::Error,
            0x88 => GdromReg::IntReason,
            0x8c => GdromReg::SectorNum,
            0x90 => GdromReg::ByteCountLo,
            0x94 => GdromReg::ByteCountHi,
            0x98 => GdromReg::DriveSel,
            0x9c => GdromReg::Status,
            _ => return Err(Unexpected),
        };

        self.gdrom.read16(reg).map(|v| v as u32)
    }

    fn w32(&mut self, offset: u32, val: u32) -> MemResult<()> {
        let reg = match offset {
            0x18 => GdromReg::DevControl,
            0x80 => GdromReg::Data,
            0x84 => GdromReg::Features,
            0x88 => GdromReg::SectorCount,
            0x8c => GdromReg::SectorNum,
            0x90 => GdromReg::ByteCountLo,
            0x94 => GdromReg::ByteCountHi,
            0x98 => GdromReg::DriveSel,
            0x9c => GdromReg::Command,
            _ => return Err(Unexpected),
        };

        self.gdrom.write16(reg, val as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::signal::irq;

    fn controller() -> (GdromCon, irq::Reciever) {
        let pending = irq::Pending::new();
        let (tx, rx) = irq::new(pending, "G1 GD");
        (GdromCon::new(tx), rx)
    }

    #[test]
    fn probe_names_every_register() {
        let (con, _rx) = controller();

        assert_eq!(con.probe(0x9c).to_string(), "Status/Command");
        assert_eq!(con.probe(0x80).to_string(), "Data");
        assert!(matches!(con.probe(0x40), Probe::Unmapped));
    }

    #[test]
    fn window_routes_to_drive_registers() {
        let (mut con, rx) = controller();

        // SET_FEATURES completes and raises the line
        con.w32(0x9c, 0xef).unwrap();
        assert!(rx.asserted());

        // alt-status leaves the line alone, status acks it
        con.r32(0x18).unwrap();
        assert!(rx.asserted());
        con.r32(0x9c).unwrap();
        assert!(!rx.asserted());

        // no disc loaded
        let sectnum = con.r32(0x8c).unwrap();
        assert_eq!(sectnum & 0xf, 0x7);
    }

    #[test]
    fn read_only_slots_reject_writes() {
        let (mut con, _rx) = controller();

        assert!(matches!(con.w32(0x88, 0), Err(InvalidAccess)));
        assert!(matches!(con.w32(0x8c, 0), Err(InvalidAccess)));
        assert!(matches!(con.w32(0x40, 0), Err(Unexpected)));
    }
}
