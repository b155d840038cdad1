//! Byte-exact SPI reply payloads.
//!
//! Multi-byte fields are serialized explicitly; frame addresses become 24-bit
//! big-endian values at this boundary and nowhere else.

use std::ops::Range;

use bit_field::BitField;
use byteorder::{BigEndian, ByteOrder};

use crate::disc::{Area, Disc};

use super::reg;

pub const STATUS_REPLY_SIZE: usize = 10;
pub const ERROR_REPLY_SIZE: usize = 10;
pub const TOC_REPLY_SIZE: usize = 408;
pub const SESSION_REPLY_SIZE: usize = 6;
pub const SUBCODE_REPLY_SIZE: usize = 100;

/// The TOC reply carries 99 four-byte track slots followed by the
/// first/last/lead-out descriptors.
const TOC_ENTRIES: usize = 99;
const_assert_eq!(TOC_ENTRIES * 4 + 12, TOC_REPLY_SIZE);

/// Subcode audio-status byte: "no status to report" (audio playback is not
/// emulated).
const AUDIO_NOSTATUS: u8 = 0x15;

fn put_fad(dst: &mut [u8], fad: u32) {
    BigEndian::write_u24(dst, fad);
}

/// CD status reply (SPI REQ_STAT).
///
/// ```text
/// byte 0: drive status nibble
/// byte 1: format nibble << 4 | repeat count
/// byte 2: address nibble << 4 | control nibble
/// byte 3: subcode-q track
/// byte 4: subcode-q index
/// byte 5-7: fad
/// byte 8: max read-error retry count
/// byte 9: reserved
/// ```
pub fn status_reply(sectnum: u16) -> [u8; STATUS_REPLY_SIZE] {
    let status = sectnum.get_bits(reg::SECTNUM::STATUS) as u8;
    let format = sectnum.get_bits(reg::SECTNUM::FORMAT) as u8;

    let mut buf = [0; STATUS_REPLY_SIZE];
    buf[0] = status;
    buf[1] = format << 4; // repeat count 0
    buf[2] = 0x4; // address 0, control "data track"
    buf[3] = 2; // subcode-q track
    buf[4] = 0; // subcode-q index
    put_fad(&mut buf[5..8], 0);
    buf
}

/// CD error reply (SPI REQ_ERROR). Sense key/code reporting is not
/// implemented; only the leading "one" nibble is populated.
pub fn error_reply() -> [u8; ERROR_REPLY_SIZE] {
    let mut buf = [0; ERROR_REPLY_SIZE];
    buf[0] = 0x0f;
    buf
}

/// TOC reply (SPI GET_TOC) for one disc area.
///
/// Track slots are indexed by `track_num - 1`; a slot not covered by the area
/// reads as 0xff in every byte.
pub fn toc_reply(disc: &dyn Disc, area: Area) -> [u8; TOC_REPLY_SIZE] {
    let toc = disc.toc(area);

    let mut buf = [0xff; TOC_REPLY_SIZE];

    for num in toc.first.num..=toc.last.num {
        let track = disc.track(num as usize - 1);
        let entry = &mut buf[4 * (num as usize - 1)..][..4];
        entry[0] = track.ctrl << 4 | track.adr;
        put_fad(&mut entry[1..4], track.fad);
    }

    let first = &mut buf[4 * TOC_ENTRIES..][..4];
    first[0] = toc.first.ctrl << 4 | toc.first.adr;
    first[1] = toc.first.num;

    let last = &mut buf[4 * TOC_ENTRIES + 4..][..4];
    last[0] = toc.last.ctrl << 4 | toc.last.adr;
    last[1] = toc.last.num;

    // the lead-out slot carries only the fad
    put_fad(&mut buf[4 * TOC_ENTRIES + 9..][..3], toc.leadout_fad);

    buf
}

/// Session reply (SPI REQ_SES).
///
/// Session 0 reports the session count and the last session's lead-out fad;
/// session N reports the number and starting fad of that session's first
/// track.
pub fn session_reply(disc: &dyn Disc, session_num: usize, drive_status: u8) -> [u8; SESSION_REPLY_SIZE] {
    let mut buf = [0; SESSION_REPLY_SIZE];
    buf[0] = drive_status & 0xf;

    if session_num == 0 {
        let num_sessions = disc.num_sessions();
        let last = disc.session(num_sessions - 1);
        buf[2] = num_sessions as u8;
        put_fad(&mut buf[3..6], last.leadout_fad);
    } else {
        let session = disc.session(session_num - 1);
        let first_track = disc.track(session.first_track);
        buf[2] = first_track.num;
        put_fad(&mut buf[3..6], first_track.fad);
    }

    buf
}

/// Subcode reply (SPI GET_SCD). Only the header bytes are populated; real
/// hardware contents are unknown.
pub fn subcode_reply(format: u8) -> [u8; SUBCODE_REPLY_SIZE] {
    let mut buf = [0; SUBCODE_REPLY_SIZE];
    buf[1] = AUDIO_NOSTATUS;

    match format {
        0 => {
            buf[2] = 0x00;
            buf[3] = 0x64;
        }
        1 => {
            buf[2] = 0x00;
            buf[3] = 0x0e;
        }
        _ => {}
    }

    buf
}

/// Canned SPI REQ_SECU reply, recorded from real hardware. The security
/// exchange itself has never been reverse engineered; the drive accepts the
/// check and hands back this blob when the result is requested.
#[rustfmt::skip]
pub const SECURITY_REPLY: [u8; 126] = [
    0x96, 0x0b, 0x45, 0xf0, 0x7e, 0xff, 0x3d, 0x06, 0x4d, 0x7d, 0x10, 0xbf,
    0x07, 0x00, 0x73, 0xcf, 0x9c, 0x00, 0xbc, 0x0c, 0x1c, 0xaf, 0x1c, 0x30,
    0xe7, 0xa7, 0x03, 0xa8, 0x98, 0x00, 0xbd, 0x0f, 0xbd, 0x5b, 0xaa, 0x50,
    0x23, 0x39, 0x31, 0x10, 0x0e, 0x69, 0x13, 0xe5, 0x00, 0xd2, 0x0d, 0x66,
    0x54, 0xbf, 0x5f, 0xfd, 0x37, 0x74, 0xf4, 0x5b, 0x22, 0x00, 0xc6, 0x09,
    0x0f, 0xca, 0x93, 0xe8, 0xa4, 0xab, 0x00, 0x61, 0x0e, 0x2e, 0xe1, 0x4b,
    0x76, 0x8b, 0x6a, 0xa5, 0x9c, 0xe6, 0x23, 0xc4, 0x00, 0x4b, 0x06, 0x1b,
    0x91, 0x01, 0x00, 0xe2, 0x0d, 0xcf, 0xca, 0x38, 0x3a, 0xb9, 0xe7, 0x91,
    0xe5, 0xef, 0x4b, 0x00, 0xd6, 0x09, 0xd3, 0x68, 0x3e, 0xc4, 0xaf, 0x2d,
    0x00, 0x2a, 0x0d, 0xf9, 0xfc, 0x78, 0xed, 0xae, 0x99, 0xb3, 0x32, 0x5a,
    0xe7, 0x00, 0x4c, 0x0a, 0x22, 0x97,
];

/// Drive hardware information block (SPI REQ_MODE / SET_MODE target).
///
/// Fixed 32-byte layout; strings are space padded to their field width.
///
/// ```text
/// byte 0-1: reserved
/// byte 2: drive speed
/// byte 3: reserved
/// byte 4-5: standby time (hi/lo)
/// byte 6: read flags
/// byte 7-8: reserved
/// byte 9: read retry count
/// byte 10-17: drive vendor
/// byte 18-25: firmware version
/// byte 26-31: firmware date
/// ```
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct HwInfo([u8; HwInfo::SIZE]);

impl std::fmt::Debug for HwInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HwInfo").field("raw", &"[..]").finish()
    }
}

impl HwInfo {
    pub const SIZE: usize = 32;

    const SPEED: usize = 2;
    const STANDBY_HI: usize = 4;
    const STANDBY_LO: usize = 5;
    const READ_FLAGS: usize = 6;
    const READ_RETRY: usize = 9;
    const DRIVE_INFO: Range<usize> = 10..18;
    const SYSTEM_VERSION: Range<usize> = 18..26;
    const SYSTEM_DATE: Range<usize> = 26..32;

    pub fn bytes(&self) -> &[u8; HwInfo::SIZE] {
        &self.0
    }

    /// Slice of the block, or None if the range falls outside it.
    pub fn read(&self, offset: usize, size: usize) -> Option<&[u8]> {
        self.0.get(offset..offset.checked_add(size)?)
    }

    /// Overwrite `data.len()` bytes at `offset`. The caller validates bounds.
    pub fn write(&mut self, offset: usize, data: &[u8]) {
        self.0[offset..offset + data.len()].copy_from_slice(data);
    }

    fn put_str(&mut self, field: Range<usize>, s: &str) {
        let field = &mut self.0[field];
        for b in field.iter_mut() {
            *b = b' ';
        }
        field[..s.len()].copy_from_slice(s.as_bytes());
    }
}

impl Default for HwInfo {
    fn default() -> HwInfo {
        let mut info = HwInfo([0; HwInfo::SIZE]);
        info.0[HwInfo::SPEED] = 0x00;
        info.0[HwInfo::STANDBY_HI] = 0x00;
        info.0[HwInfo::STANDBY_LO] = 0xb4;
        info.0[HwInfo::READ_FLAGS] = 0x19;
        info.0[HwInfo::READ_RETRY] = 0x08;
        info.put_str(HwInfo::DRIVE_INFO, "SE");
        info.put_str(HwInfo::SYSTEM_VERSION, "Rev 6.43");
        info.put_str(HwInfo::SYSTEM_DATE, "990408");
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hw_info_default_block() {
        let expected: [u8; 32] = [
            0x00, 0x00, 0x00, 0x00, 0x00, 0xb4, 0x19, 0x00, 0x00, 0x08, // config
            b'S', b'E', b' ', b' ', b' ', b' ', b' ', b' ', // vendor
            b'R', b'e', b'v', b' ', b'6', b'.', b'4', b'3', // version
            b'9', b'9', b'0', b'4', b'0', b'8', // date
        ];
        assert_eq!(HwInfo::default().bytes(), &expected);
    }

    #[test]
    fn status_reply_layout() {
        use crate::devices::prelude::*;

        let mut sectnum = 0u16;
        sectnum.set_bits(reg::SECTNUM::STATUS, reg::DRIVE_STATUS::PAUSE);
        sectnum.set_bits(reg::SECTNUM::FORMAT, 0x8);

        let reply = status_reply(sectnum);
        assert_eq!(
            reply,
            [0x01, 0x80, 0x04, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn error_reply_layout() {
        let reply = error_reply();
        assert_eq!(reply[0], 0x0f);
        assert!(reply[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn subcode_reply_trailers() {
        let reply = subcode_reply(0);
        assert_eq!((reply[1], reply[2], reply[3]), (0x15, 0x00, 0x64));
        let reply = subcode_reply(1);
        assert_eq!((reply[1], reply[2], reply[3]), (0x15, 0x00, 0x0e));
        assert_eq!(reply.len(), SUBCODE_REPLY_SIZE);
    }
}
