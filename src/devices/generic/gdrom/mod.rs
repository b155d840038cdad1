use crate::devices::prelude::*;

use std::convert::TryFrom;

use num_enum::TryFromPrimitive;

use crate::devices::generic::ram::Ram;
use crate::disc::{self, Area, Disc};

pub mod reg;
mod reply;

pub use reply::HwInfo;

/// Size of the PIO and DMA staging buffers.
const BUF_SIZE: usize = 0x10000;

/// Every SPI command arrives as a 12-byte packet.
const SPI_PACKET_SIZE: usize = 12;

/// Sectors read per staging-buffer fill. Sized for worst-case raw sectors so
/// a full batch always fits.
const SECTORS_PER_FILL: u32 = (BUF_SIZE / disc::MAX_SECTOR_SIZE) as u32;
const_assert!(SECTORS_PER_FILL > 0);

/// GD-ROM register to access.
///
/// Registers which share a window offset are aliases for one another, split
/// by access direction (e.g: reading the Status/Command slot returns Status,
/// while writing it issues a Command).
#[derive(Debug)]
pub enum GdromReg {
    AltStatus,
    DevControl,
    Data,
    Error,
    Features,
    IntReason,
    SectorCount,
    SectorNum,
    ByteCountLo,
    ByteCountHi,
    DriveSel,
    Status,
    Command,
}

#[derive(Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
enum AtaCmd {
    Nop = 0x00,
    SoftReset = 0x08,
    ExecDiag = 0x90,
    PacketCmd = 0xa0,
    IdentifyDev = 0xa1,
    SetFeatures = 0xef,
}

#[derive(Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
enum SpiCmd {
    TestUnit = 0x00,
    ReqStat = 0x10,
    ReqMode = 0x11,
    SetMode = 0x12,
    ReqError = 0x13,
    GetToc = 0x14,
    ReqSes = 0x15,
    CdOpen = 0x16,
    CdPlay = 0x20,
    CdSeek = 0x21,
    CdScan = 0x22,
    CdRead = 0x30,
    CdRead2 = 0x31,
    GetScd = 0x40,
    ChkSecu = 0x70,
    ReqSecu = 0x71,
}

/// CD_SEEK parameter types (packet byte 1, low nibble).
#[derive(Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
enum SeekParam {
    Fad = 1,
    Msf = 2,
    Stop = 3,
    Pause = 4,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    /// Idle, waiting for an ATA command.
    ReadAtaCmd,
    /// Receiving a 12-byte SPI packet from the host.
    ReadAtaData,
    /// Receiving an SPI payload from the host.
    ReadSpiData,
    /// Sending an SPI payload to the host over PIO.
    WriteSpiData,
    /// Sending a CD-read payload to the host over DMA.
    WriteDmaData,
}

#[derive(Debug, Copy, Clone)]
enum Event {
    /// Host wrote the command register.
    AtaCmd(u8),
    /// Host wrote the data register.
    PioWrite,
    /// A full 12-byte packet has accumulated.
    SpiCmd,
    /// Host read the data register.
    PioRead,
    /// A host-to-device SPI payload has fully arrived.
    SpiData,
}

/// Decode a frame address from packet bytes 2..=4, either as a 24-bit
/// big-endian value or as minutes/seconds/frames (75 frames per second).
fn decode_fad(a: u8, b: u8, c: u8, msf: bool) -> u32 {
    if msf {
        (a as u32) * 60 * 75 + (b as u32) * 75 + c as u32
    } else {
        (a as u32) << 16 | (b as u32) << 8 | c as u32
    }
}

mod staging {
    use super::{MemException::Fatal, MemResult, SPI_PACKET_SIZE};

    use byteorder::{ByteOrder, LittleEndian};

    /// PIO staging buffer.
    ///
    /// `head` is the next byte to transfer and `size` the length of the
    /// staged payload. `offset` records the hardware-info destination for
    /// host-to-device payloads.
    pub struct PioBuf {
        buf: Box<[u8; super::BUF_SIZE]>,
        head: usize,
        size: usize,
        offset: usize,
    }

    impl std::fmt::Debug for PioBuf {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("PioBuf")
                .field("buf", &"[..]")
                .field("head", &self.head)
                .field("size", &self.size)
                .field("offset", &self.offset)
                .finish()
        }
    }

    impl PioBuf {
        pub fn new() -> PioBuf {
            PioBuf {
                buf: Box::new([0; super::BUF_SIZE]),
                head: 0,
                size: 0,
                offset: 0,
            }
        }

        pub fn head(&self) -> usize {
            self.head
        }

        pub fn size(&self) -> usize {
            self.size
        }

        pub fn offset(&self) -> usize {
            self.offset
        }

        pub fn drained(&self) -> bool {
            self.head == self.size
        }

        /// Rewind the cursor for an incoming 12-byte packet.
        pub fn begin_packet(&mut self) {
            self.head = 0;
            self.size = 0;
        }

        /// Stage a device-to-host payload.
        pub fn stage(&mut self, data: &[u8]) -> MemResult<()> {
            if data.len() > super::BUF_SIZE {
                return Err(Fatal(format!(
                    "SPI payload of {} bytes overruns the PIO staging buffer",
                    data.len()
                )));
            }

            self.buf[..data.len()].copy_from_slice(data);
            self.head = 0;
            self.size = data.len();
            Ok(())
        }

        /// Arm receipt of a host-to-device payload of `size` bytes, destined
        /// for hardware-info offset `offset`.
        pub fn expect(&mut self, size: usize, offset: usize) {
            self.head = 0;
            self.size = size;
            self.offset = offset;
        }

        /// The staged payload.
        pub fn filled(&self) -> &[u8] {
            &self.buf[..self.size]
        }

        /// First 12 bytes of the buffer (the SPI packet).
        pub fn packet(&self) -> [u8; SPI_PACKET_SIZE] {
            let mut packet = [0; SPI_PACKET_SIZE];
            packet.copy_from_slice(&self.buf[..SPI_PACKET_SIZE]);
            packet
        }

        pub fn raw_mut(&mut self) -> &mut [u8; super::BUF_SIZE] {
            &mut self.buf
        }

        /// Mark `size` bytes as staged and rewind the cursor.
        pub fn reset(&mut self, size: usize) {
            self.head = 0;
            self.size = size;
        }

        pub fn read16(&mut self) -> MemResult<u16> {
            if self.head + 2 > self.size {
                return Err(Fatal("read past end of PIO staging buffer".into()));
            }

            let val = LittleEndian::read_u16(&self.buf[self.head..]);
            self.head += 2;
            Ok(val)
        }

        pub fn write16(&mut self, val: u16) -> MemResult<()> {
            if self.head + 2 > super::BUF_SIZE {
                return Err(Fatal("write past end of PIO staging buffer".into()));
            }

            LittleEndian::write_u16(&mut self.buf[self.head..], val);
            self.head += 2;
            Ok(())
        }
    }

    /// DMA staging buffer.
    pub struct DmaBuf {
        buf: Box<[u8; super::BUF_SIZE]>,
        head: usize,
        size: usize,
    }

    impl std::fmt::Debug for DmaBuf {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("DmaBuf")
                .field("buf", &"[..]")
                .field("head", &self.head)
                .field("size", &self.size)
                .finish()
        }
    }

    impl DmaBuf {
        pub fn new() -> DmaBuf {
            DmaBuf {
                buf: Box::new([0; super::BUF_SIZE]),
                head: 0,
                size: 0,
            }
        }

        pub fn size(&self) -> usize {
            self.size
        }

        pub fn drained(&self) -> bool {
            self.head >= self.size
        }

        pub fn raw_mut(&mut self) -> &mut [u8; super::BUF_SIZE] {
            &mut self.buf
        }

        pub fn reset(&mut self, size: usize) {
            self.head = 0;
            self.size = size;
        }

        /// Copy staged bytes into `dst`, advancing the cursor. Returns the
        /// number of bytes copied.
        pub fn take(&mut self, dst: &mut [u8]) -> usize {
            let n = dst.len().min(self.size - self.head);
            dst[..n].copy_from_slice(&self.buf[self.head..self.head + n]);
            self.head += n;
            n
        }
    }
}

use staging::{DmaBuf, PioBuf};

/// In-flight CD_READ progress.
#[derive(Debug, Default)]
struct CdReadState {
    /// Deliver over DMA instead of PIO.
    dma: bool,
    sector_fmt: u8,
    sector_mask: u8,
    /// Frame address of the next sector to stage.
    next_fad: u32,
    /// Sectors left to stage.
    remaining: u32,
}

/// Emulated GD-ROM drive.
///
/// The drive speaks a two-level protocol: ATA commands arrive through the
/// command register, and the ATA PACKET command in turn carries 12-byte SPI
/// packets through the data register. Reply payloads stream back to the host
/// either word-by-word through the data register (PIO) or in bulk through
/// [Gdrom::dma_read].
///
/// Every register access drives an internal state machine; the interrupt
/// line is raised at each phase boundary and acknowledged when the host
/// reads the status register.
#[derive(Debug)]
pub struct Gdrom {
    irq: irq::Sender,

    state: State,
    disc: Option<Box<dyn Disc>>,
    hw_info: HwInfo,

    // internal registers
    error: u16,
    features: u16,
    ireason: u16,
    sectnum: u16,
    byte_count: u16,
    status: u16,

    cdread: CdReadState,

    pio: PioBuf,
    dma: DmaBuf,
}

impl Gdrom {
    pub fn new(irq: irq::Sender) -> Gdrom {
        let mut gd = Gdrom {
            irq,

            state: State::ReadAtaCmd,
            disc: None,
            hw_info: HwInfo::default(),

            error: 0,
            features: 0,
            ireason: 0,
            sectnum: 0,
            byte_count: 0,
            status: 0,

            cdread: CdReadState::default(),

            pio: PioBuf::new(),
            dma: DmaBuf::new(),
        };
        gd.soft_reset();
        gd
    }

    /// Insert (or eject, with `None`) a disc, dropping any previously loaded
    /// disc and soft-resetting the drive.
    pub fn set_disc(&mut self, disc: Option<Box<dyn Disc>>) {
        if let Some(disc) = &disc {
            let meta = disc.meta();
            info!(
                "disc inserted: {} {} - {}",
                meta.name.trim(),
                meta.version.trim(),
                meta.id.trim()
            );
        }

        self.disc = disc;
        self.soft_reset();
    }

    /// Host-side view of the hardware information block.
    pub fn drive_mode(&self) -> HwInfo {
        self.hw_info
    }

    /// Host-side override of the hardware information block.
    pub fn set_drive_mode(&mut self, info: HwInfo) {
        self.hw_info = info;
    }

    /// Check if the drive is currently asserting its interrupt line.
    pub fn irq_state(&self) -> bool {
        self.irq.is_asserting()
    }

    fn soft_reset(&mut self) {
        self.error = 0;

        self.status = 0;
        self.status.set_bit(reg::STATUS::DRDY, true);

        self.sectnum = 0;
        match &self.disc {
            Some(disc) => {
                let format = disc.format() as u16;
                (self.sectnum)
                    .set_bits(reg::SECTNUM::STATUS, reg::DRIVE_STATUS::PAUSE)
                    .set_bits(reg::SECTNUM::FORMAT, format);
            }
            None => {
                (self.sectnum).set_bits(reg::SECTNUM::STATUS, reg::DRIVE_STATUS::NODISC);
            }
        }

        // how the features, interrupt reason and byte count registers behave
        // across a soft reset is unverified; they are left untouched
    }

    /// Perform a 16-bit read from a GD-ROM register.
    pub fn read16(&mut self, reg: GdromReg) -> MemResult<u16> {
        use GdromReg::*;

        match reg {
            Data => self.data_read16(),
            Error | Features => Ok(self.error),
            IntReason | SectorCount => Ok(self.ireason),
            SectorNum => Ok(self.sectnum),
            ByteCountLo => Ok(self.byte_count.get_bits(0..=7)),
            ByteCountHi => Ok(self.byte_count.get_bits(8..=15)),
            DriveSel => Err(StubRead(Debug, 0)),
            Status | Command => {
                self.irq.clear(); // ack IRQ
                Ok(self.status)
            }
            // same as the status register, but reading it does not
            // acknowledge the interrupt
            AltStatus | DevControl => Ok(self.status),
        }
    }

    /// Perform a 16-bit write to a GD-ROM register.
    pub fn write16(&mut self, reg: GdromReg, val: u16) -> MemResult<()> {
        use GdromReg::*;

        match reg {
            Data => self.data_write16(val),
            Features | Error => Ok(self.features = val),
            ByteCountLo => {
                self.byte_count.set_bits(0..=7, val.get_bits(0..=7));
                Ok(())
            }
            ByteCountHi => {
                self.byte_count.set_bits(8..=15, val.get_bits(0..=7));
                Ok(())
            }
            IntReason | SectorCount | SectorNum => Err(InvalidAccess),
            DriveSel => Err(StubWrite(Debug, ())),
            DevControl | AltStatus => Err(StubWrite(Debug, ())),
            Command | Status => self.event(Event::AtaCmd(val as u8)),
        }
    }

    fn data_read16(&mut self) -> MemResult<u16> {
        let val = self.pio.read16()?;
        self.event(Event::PioRead)?;
        Ok(val)
    }

    fn data_write16(&mut self, val: u16) -> MemResult<()> {
        self.pio.write16(val)?;
        self.event(Event::PioWrite)
    }

    /// Run the state machine. A fresh ATA command resets the machine from any
    /// state; every other (state, event) pair outside the transition table is
    /// a protocol violation.
    fn event(&mut self, ev: Event) -> MemResult<()> {
        use Event::*;
        use State::*;

        match (self.state, ev) {
            (_, AtaCmd(cmd)) => self.ata_cmd(cmd),
            (ReadAtaData, PioWrite) | (ReadSpiData, PioWrite) => self.pio_write(),
            (ReadAtaData, SpiCmd) => self.spi_cmd(),
            (ReadSpiData, SpiData) => self.spi_data(),
            (WriteSpiData, PioRead) | (WriteDmaData, PioRead) => self.pio_read(),
            (state, ev) => Err(Fatal(format!(
                "illegal {:?} event while in {:?}",
                ev, state
            ))),
        }
    }

    fn ata_cmd(&mut self, cmd: u8) -> MemResult<()> {
        (self.status)
            .set_bit(reg::STATUS::DRDY, false)
            .set_bit(reg::STATUS::BSY, true);

        // error bits describe the most recent command only
        self.error = 0;
        self.status.set_bit(reg::STATUS::CHECK, false);

        let cmd = AtaCmd::try_from(cmd).map_err(|_| ContractViolation {
            msg: format!("unknown ATA command: {:#04x?}", cmd),
            severity: Error,
            stub_val: None,
        })?;

        trace!("ata_cmd {:?}", cmd);

        use AtaCmd::*;
        match cmd {
            Nop => {
                // terminates the command in progress
                self.error.set_bit(reg::ERROR::ABRT, true);
                self.status.set_bit(reg::STATUS::CHECK, true);
                self.ata_end();
                Ok(())
            }
            SoftReset => {
                self.soft_reset();
                self.ata_end();
                Ok(())
            }
            PacketCmd => {
                self.pio.begin_packet();

                (self.ireason)
                    .set_bit(reg::IREASON::COD, true)
                    .set_bit(reg::IREASON::IO, false);
                (self.status)
                    .set_bit(reg::STATUS::DRQ, true)
                    .set_bit(reg::STATUS::BSY, false);

                // no interrupt: the host follows up with the packet bytes
                self.state = State::ReadAtaData;
                Ok(())
            }
            SetFeatures => {
                // transfer mode settings are ignored
                self.ata_end();
                Ok(())
            }
            ExecDiag => Err(Fatal("ATA EXEC_DIAG is not supported".into())),
            IdentifyDev => Err(Fatal("ATA IDENTIFY_DEV is not supported".into())),
        }
    }

    fn ata_end(&mut self) {
        (self.status)
            .set_bit(reg::STATUS::DRDY, true)
            .set_bit(reg::STATUS::BSY, false);

        self.irq.assert();

        self.state = State::ReadAtaCmd;
    }

    fn pio_write(&mut self) -> MemResult<()> {
        if self.state == State::ReadAtaData && self.pio.head() == SPI_PACKET_SIZE {
            self.event(Event::SpiCmd)
        } else if self.state == State::ReadSpiData && self.pio.head() == self.pio.size() {
            self.event(Event::SpiData)
        } else {
            Ok(())
        }
    }

    fn pio_read(&mut self) -> MemResult<()> {
        if self.pio.drained() {
            if self.cdread.remaining > 0 {
                self.cd_read_fill()
            } else {
                self.spi_end();
                Ok(())
            }
        } else {
            Ok(())
        }
    }

    fn spi_cmd(&mut self) -> MemResult<()> {
        let packet = self.pio.packet();

        (self.status)
            .set_bit(reg::STATUS::DRQ, false)
            .set_bit(reg::STATUS::BSY, true);

        let cmd = SpiCmd::try_from(packet[0]).map_err(|_| ContractViolation {
            msg: format!("unknown SPI command: {:#04x?}", packet[0]),
            severity: Error,
            stub_val: None,
        })?;

        trace!("spi_cmd {:?}", cmd);

        use SpiCmd::*;
        match cmd {
            // -- packet command flow for pio data to host -- //
            ReqStat => {
                let offset = packet[2] as usize;
                let size = packet[4] as usize;

                let stat = reply::status_reply(self.sectnum);
                let stat = slice_reply(&stat, offset, size)?;
                self.spi_write(stat)
            }
            ReqMode => {
                let offset = packet[2] as usize;
                let size = packet[4] as usize;

                let info = self.hw_info;
                let data = info.read(offset, size).ok_or_else(|| {
                    Fatal(format!(
                        "REQ_MODE slice [{}, {}) overruns the hardware info block",
                        offset,
                        offset + size
                    ))
                })?;
                self.spi_write(data)
            }
            ReqError => {
                let size = packet[4] as usize;

                let err = reply::error_reply();
                let err = slice_reply(&err, 0, size)?;
                self.spi_write(err)
            }
            GetToc => {
                let area = match packet[1].get_bit(0) {
                    false => Area::SingleDensity,
                    true => Area::HighDensity,
                };
                let size = (packet[3] as usize) << 8 | packet[4] as usize;

                let toc = reply::toc_reply(self.require_disc()?, area);
                let toc = slice_reply(&toc, 0, size)?;
                self.spi_write(toc)
            }
            ReqSes => {
                let session_num = packet[2] as usize;
                // the full 6-byte reply is always sent, whatever byte 4 says

                let drive_status = self.sectnum.get_bits(reg::SECTNUM::STATUS) as u8;
                let ses = reply::session_reply(self.require_disc()?, session_num, drive_status);
                self.spi_write(&ses)
            }
            GetScd => {
                let format = packet[1].get_bits(0..=3);
                let size = (packet[3] as usize) << 8 | packet[4] as usize;

                self.require_disc()?;
                let scd = reply::subcode_reply(format);
                let scd = slice_reply(&scd, 0, size)?;
                self.spi_write(scd)
            }
            CdRead => {
                let msf = packet[1].get_bit(0);

                self.cdread = CdReadState {
                    dma: self.features.get_bit(reg::FEATURES::DMA),
                    sector_fmt: packet[1].get_bits(1..=3),
                    sector_mask: packet[1].get_bits(4..=7),
                    next_fad: decode_fad(packet[2], packet[3], packet[4], msf),
                    remaining: (packet[8] as u32) << 16
                        | (packet[9] as u32) << 8
                        | packet[10] as u32,
                };

                self.cd_read_fill()
            }
            ReqSecu => self.spi_write(&reply::SECURITY_REPLY),

            // -- packet command flow for pio data from host -- //
            SetMode => {
                let offset = packet[2] as usize;
                let size = packet[4] as usize;

                self.spi_read(offset, size)
            }

            // -- non-data command flow -- //
            TestUnit | ChkSecu => {
                self.spi_end();
                Ok(())
            }
            CdPlay | CdScan => {
                warn!("ignoring {:?}", cmd);

                (self.sectnum).set_bits(reg::SECTNUM::STATUS, reg::DRIVE_STATUS::PAUSE);

                self.spi_end();
                Ok(())
            }
            CdSeek => {
                warn!("ignoring CD_SEEK");

                match SeekParam::try_from(packet[1].get_bits(0..=3)) {
                    Ok(SeekParam::Fad) | Ok(SeekParam::Msf) | Ok(SeekParam::Pause) => {
                        (self.sectnum).set_bits(reg::SECTNUM::STATUS, reg::DRIVE_STATUS::PAUSE);
                    }
                    Ok(SeekParam::Stop) => {
                        (self.sectnum).set_bits(reg::SECTNUM::STATUS, reg::DRIVE_STATUS::STANDBY);
                    }
                    Err(_) => {}
                }

                self.spi_end();
                Ok(())
            }

            CdRead2 => Err(Fatal("SPI CD_READ2 is not supported".into())),
            CdOpen => Err(Fatal("SPI CD_OPEN is not supported".into())),
        }
    }

    /// Host-to-device SPI payload fully received (only SET_MODE uses this
    /// flow): commit it to the hardware info block.
    fn spi_data(&mut self) -> MemResult<()> {
        self.hw_info.write(self.pio.offset(), self.pio.filled());
        self.spi_end();
        Ok(())
    }

    /// Stage a device-to-host payload and arm the PIO transfer phase.
    fn spi_write(&mut self, data: &[u8]) -> MemResult<()> {
        // a staged reply supersedes any in-flight CD read
        self.cdread.remaining = 0;

        self.pio.stage(data)?;

        self.byte_count = data.len() as u16;
        (self.ireason)
            .set_bit(reg::IREASON::IO, true)
            .set_bit(reg::IREASON::COD, false);
        (self.status)
            .set_bit(reg::STATUS::DRQ, true)
            .set_bit(reg::STATUS::BSY, false);

        self.irq.assert();

        self.state = State::WriteSpiData;
        Ok(())
    }

    /// Arm receipt of a host-to-device payload of `size` bytes destined for
    /// hardware-info offset `offset`.
    fn spi_read(&mut self, offset: usize, size: usize) -> MemResult<()> {
        self.cdread.remaining = 0;

        if offset + size > HwInfo::SIZE {
            return Err(Fatal(format!(
                "SET_MODE payload [{}, {}) overruns the hardware info block",
                offset,
                offset + size
            )));
        }

        self.pio.expect(size, offset);

        self.byte_count = size as u16;
        (self.ireason)
            .set_bit(reg::IREASON::IO, false)
            .set_bit(reg::IREASON::COD, false);
        (self.status)
            .set_bit(reg::STATUS::DRQ, true)
            .set_bit(reg::STATUS::BSY, false);

        self.irq.assert();

        self.state = State::ReadSpiData;
        Ok(())
    }

    /// Packet command fully processed: report completion and return to idle.
    fn spi_end(&mut self) {
        (self.ireason)
            .set_bit(reg::IREASON::IO, true)
            .set_bit(reg::IREASON::COD, true);
        (self.status)
            .set_bit(reg::STATUS::DRDY, true)
            .set_bit(reg::STATUS::BSY, false)
            .set_bit(reg::STATUS::DRQ, false);

        self.irq.assert();

        self.state = State::ReadAtaCmd;
    }

    /// Stage the next batch of CD sectors into the outbound buffer.
    fn cd_read_fill(&mut self) -> MemResult<()> {
        let num = self.cdread.remaining.min(SECTORS_PER_FILL);
        let fad = self.cdread.next_fad;
        let (fmt, mask) = (self.cdread.sector_fmt, self.cdread.sector_mask);

        if self.cdread.dma {
            let n = Self::read_sectors(&mut self.disc, fad, fmt, mask, num, self.dma.raw_mut());
            self.dma.reset(n);

            self.cdread.next_fad += num;
            self.cdread.remaining -= num;

            // no interrupt: the host kicks off the DMA transfer itself
            self.state = State::WriteDmaData;
        } else {
            let n = Self::read_sectors(&mut self.disc, fad, fmt, mask, num, self.pio.raw_mut());
            self.pio.reset(n);

            self.cdread.next_fad += num;
            self.cdread.remaining -= num;

            self.byte_count = n as u16;
            (self.ireason)
                .set_bit(reg::IREASON::IO, true)
                .set_bit(reg::IREASON::COD, false);
            (self.status)
                .set_bit(reg::STATUS::DRQ, true)
                .set_bit(reg::STATUS::BSY, false);

            self.irq.assert();

            self.state = State::WriteSpiData;
        }

        Ok(())
    }

    /// Read `num` sectors one at a time through the disc handle,
    /// concatenating the results into `dst`. Returns the number of bytes
    /// produced; reads with no disc loaded produce nothing.
    fn read_sectors(
        disc: &mut Option<Box<dyn Disc>>,
        fad: u32,
        fmt: u8,
        mask: u8,
        num: u32,
        dst: &mut [u8],
    ) -> usize {
        let disc = match disc {
            Some(disc) => disc,
            None => {
                warn!("sector read failed, no disc");
                return 0;
            }
        };

        trace!("read_sectors [{}, {})", fad, fad + num);

        let mut read = 0;
        let mut sector = [0; disc::MAX_SECTOR_SIZE];
        for i in 0..num {
            let n = disc.read_sector(fad + i, fmt, mask, &mut sector);
            dst[read..read + n].copy_from_slice(&sector[..n]);
            read += n;
        }

        read
    }

    /// Read `num` sectors and bulk-copy them into guest memory at `dst`.
    /// Returns the number of bytes copied.
    pub fn copy_sectors(
        &mut self,
        fad: u32,
        fmt: u8,
        mask: u8,
        num: u32,
        space: &mut Ram,
        dst: u32,
    ) -> usize {
        if self.disc.is_none() {
            warn!("copy_sectors failed, no disc");
            return 0;
        }

        let mut copied = 0;
        let mut sector = [0; disc::MAX_SECTOR_SIZE];
        for i in 0..num {
            let n = Self::read_sectors(&mut self.disc, fad + i, fmt, mask, 1, &mut sector);
            space.bulk_write(dst + copied as u32, &sector[..n]);
            copied += n;
        }

        copied
    }

    /// Mark the start of a host-driven DMA transfer.
    pub fn dma_begin(&mut self) -> MemResult<()> {
        if self.dma.size() == 0 {
            return Err(Fatal("dma_begin with no staged payload".into()));
        }

        trace!("dma_begin");
        Ok(())
    }

    /// Mark the end of a host-driven DMA transfer.
    pub fn dma_end(&mut self) {
        trace!("dma_end");
    }

    /// Copy staged CD-read payload into `dst`, refilling the staging buffer
    /// from the disc as it drains. The packet command completes once the
    /// final batch has been consumed. Returns the number of bytes copied.
    pub fn dma_read(&mut self, dst: &mut [u8]) -> MemResult<usize> {
        if self.state != State::WriteDmaData {
            return Err(Fatal(format!("dma_read while in {:?}", self.state)));
        }

        // refill once the current batch has been completely read
        if self.dma.drained() {
            self.cd_read_fill()?;
        }

        let n = self.dma.take(dst);
        if n == 0 {
            return Err(Fatal("dma_read with no staged data".into()));
        }

        trace!("dma_read {} bytes", n);

        if self.dma.drained() && self.cdread.remaining == 0 {
            // CD_READ command is now done
            self.spi_end();
        }

        Ok(n)
    }

    fn require_disc(&self) -> MemResult<&dyn Disc> {
        match &self.disc {
            Some(disc) => Ok(&**disc),
            None => Err(Fatal("packet command requires a disc".into())),
        }
    }
}

/// Slice `size` bytes at `offset` out of a reply payload, faulting on
/// overrun.
fn slice_reply(reply: &[u8], offset: usize, size: usize) -> MemResult<&[u8]> {
    reply.get(offset..offset + size).ok_or_else(|| {
        Fatal(format!(
            "reply slice [{}, {}) overruns the {}-byte payload",
            offset,
            offset + size,
            reply.len()
        ))
    })
}
