use crate::disc::{self, Area, Disc, Format, Meta, Session, Toc, Track};

/// Sector payload reported by the null disc.
const SECTOR_SIZE: usize = 2048;

/// Null disc. Reports a single-session, single-track disc of the given length
/// where every sector reads as zeros.
#[derive(Debug)]
pub struct Null {
    num_sectors: u32,
    format: Format,
}

impl Null {
    pub fn new(num_sectors: u32, format: Format) -> Null {
        Null {
            num_sectors,
            format,
        }
    }

    fn data_track(&self) -> Track {
        Track {
            num: 1,
            adr: 1,
            ctrl: 4,
            fad: disc::LEADIN_FAD,
        }
    }
}

impl Disc for Null {
    fn read_sector(&mut self, _fad: u32, _fmt: u8, _mask: u8, dst: &mut [u8]) -> usize {
        dst[..SECTOR_SIZE].iter_mut().for_each(|b| *b = 0);
        SECTOR_SIZE
    }

    fn toc(&self, _area: Area) -> Toc {
        Toc {
            first: self.data_track(),
            last: self.data_track(),
            leadin_fad: 0,
            leadout_fad: disc::LEADIN_FAD + self.num_sectors,
        }
    }

    fn num_sessions(&self) -> usize {
        1
    }

    fn session(&self, _idx: usize) -> Session {
        Session {
            first_track: 0,
            leadout_fad: disc::LEADIN_FAD + self.num_sectors,
        }
    }

    fn track(&self, _idx: usize) -> Track {
        self.data_track()
    }

    fn format(&self) -> Format {
        self.format
    }

    fn meta(&self) -> Meta {
        Meta {
            name: "NULLDISC".into(),
            version: "1.000".into(),
            id: "T-0000".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sectors_read_as_zeros() {
        let mut disc = Null::new(100, Format::Cdrom);

        let mut buf = [0xff; disc::MAX_SECTOR_SIZE];
        assert_eq!(disc.read_sector(150, 0, 0, &mut buf), SECTOR_SIZE);
        assert!(buf[..SECTOR_SIZE].iter().all(|&b| b == 0));

        let toc = disc.toc(Area::SingleDensity);
        assert_eq!(toc.first.num, 1);
        assert_eq!(toc.leadout_fad, 250);
    }
}
