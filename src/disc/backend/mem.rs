use thiserror::Error;

use crate::disc::{self, Area, Disc, Format, Meta, Session, Toc, Track};

/// Standard frame address of a GD-ROM's high-density lead-in.
const HIGH_DENSITY_LEADIN_FAD: u32 = 45000;

#[derive(Error, Debug)]
pub enum MemDiscError {
    #[error("disc must contain at least one track")]
    NoTracks,
    #[error("track sector size must be between 1 and {}", disc::MAX_SECTOR_SIZE)]
    BadSectorSize,
    #[error("track data must be a whole number of sectors")]
    UnevenData,
    #[error("track frame addresses must be ascending and non-overlapping")]
    BadFadOrder,
}

/// A single track image backing a [Mem] disc.
#[derive(Debug, Clone)]
pub struct MemTrack {
    /// Subcode-Q ADR field
    pub adr: u8,
    /// Subcode-Q control field
    pub ctrl: u8,
    /// Frame address of the track's first sector
    pub fad: u32,
    /// Bytes per sector
    pub sector_size: usize,
    /// Raw track data (`sector_size` bytes per sector)
    pub data: Vec<u8>,
}

impl MemTrack {
    fn num_sectors(&self) -> u32 {
        (self.data.len() / self.sector_size) as u32
    }

    fn end_fad(&self) -> u32 {
        self.fad + self.num_sectors()
    }
}

/// In-memory disc assembled from raw track images.
///
/// Tracks are numbered by position (the first `MemTrack` becomes track 1).
/// GD-ROM format discs with three-or-more tracks are split into two sessions
/// the way a real GD-ROM is mastered: tracks 1 and 2 form the single-density
/// area, everything else the high-density area. Other layouts are treated as
/// one session.
#[derive(Debug)]
pub struct Mem {
    format: Format,
    meta: Meta,
    tracks: Vec<MemTrack>,
}

impl Mem {
    pub fn new(format: Format, tracks: Vec<MemTrack>) -> Result<Mem, MemDiscError> {
        if tracks.is_empty() {
            return Err(MemDiscError::NoTracks);
        }

        for track in &tracks {
            if track.sector_size == 0 || track.sector_size > disc::MAX_SECTOR_SIZE {
                return Err(MemDiscError::BadSectorSize);
            }
            if track.data.len() % track.sector_size != 0 {
                return Err(MemDiscError::UnevenData);
            }
        }

        for pair in tracks.windows(2) {
            if pair[1].fad < pair[0].end_fad() {
                return Err(MemDiscError::BadFadOrder);
            }
        }

        Ok(Mem {
            format,
            meta: Meta {
                name: "MEMDISC".into(),
                version: "1.000".into(),
                id: "T-0000".into(),
            },
            tracks,
        })
    }

    pub fn with_meta(mut self, meta: Meta) -> Mem {
        self.meta = meta;
        self
    }

    /// Track indices [start, end] making up the given session.
    fn session_bounds(&self, idx: usize) -> (usize, usize) {
        match (self.split_sessions(), idx) {
            (true, 0) => (0, 1),
            (true, _) => (2, self.tracks.len() - 1),
            (false, _) => (0, self.tracks.len() - 1),
        }
    }

    fn split_sessions(&self) -> bool {
        self.format == Format::Gdrom && self.tracks.len() >= 3
    }
}

impl Disc for Mem {
    fn read_sector(&mut self, fad: u32, _fmt: u8, _mask: u8, dst: &mut [u8]) -> usize {
        let track = match self
            .tracks
            .iter()
            .find(|t| t.fad <= fad && fad < t.end_fad())
        {
            Some(track) => track,
            None => return 0,
        };

        let offset = (fad - track.fad) as usize * track.sector_size;
        let sector = &track.data[offset..offset + track.sector_size];
        dst[..sector.len()].copy_from_slice(sector);
        sector.len()
    }

    fn toc(&self, area: Area) -> Toc {
        let session = match area {
            Area::SingleDensity => 0,
            Area::HighDensity => self.num_sessions() - 1,
        };
        let (first, last) = self.session_bounds(session);

        Toc {
            first: self.track(first),
            last: self.track(last),
            leadin_fad: match area {
                Area::SingleDensity => 0,
                Area::HighDensity => HIGH_DENSITY_LEADIN_FAD,
            },
            leadout_fad: self.session(session).leadout_fad,
        }
    }

    fn num_sessions(&self) -> usize {
        if self.split_sessions() {
            2
        } else {
            1
        }
    }

    fn session(&self, idx: usize) -> Session {
        let (first, last) = self.session_bounds(idx);

        Session {
            first_track: first,
            leadout_fad: self.tracks[last].end_fad(),
        }
    }

    fn track(&self, idx: usize) -> Track {
        let track = &self.tracks[idx];

        Track {
            num: idx as u8 + 1,
            adr: track.adr,
            ctrl: track.ctrl,
            fad: track.fad,
        }
    }

    fn format(&self) -> Format {
        self.format
    }

    fn meta(&self) -> Meta {
        self.meta.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(fad: u32, sectors: u32, sector_size: usize) -> MemTrack {
        MemTrack {
            adr: 1,
            ctrl: 4,
            fad,
            sector_size,
            data: vec![0; sectors as usize * sector_size],
        }
    }

    #[test]
    fn rejects_bad_layouts() {
        assert!(matches!(
            Mem::new(Format::Cdrom, vec![]),
            Err(MemDiscError::NoTracks)
        ));

        let mut uneven = track(150, 2, 2048);
        uneven.data.pop();
        assert!(matches!(
            Mem::new(Format::Cdrom, vec![uneven]),
            Err(MemDiscError::UnevenData)
        ));

        // second track starts inside the first
        assert!(matches!(
            Mem::new(Format::Cdrom, vec![track(150, 10, 2048), track(155, 10, 2048)]),
            Err(MemDiscError::BadFadOrder)
        ));
    }

    #[test]
    fn gdrom_layout_splits_into_two_sessions() {
        let disc = Mem::new(
            Format::Gdrom,
            vec![
                track(150, 4, 2048),
                track(300, 4, 2352),
                track(45150, 8, 2048),
            ],
        )
        .unwrap();

        assert_eq!(disc.num_sessions(), 2);
        assert_eq!(disc.session(0).first_track, 0);
        assert_eq!(disc.session(0).leadout_fad, 304);
        assert_eq!(disc.session(1).first_track, 2);
        assert_eq!(disc.session(1).leadout_fad, 45158);

        let toc = disc.toc(Area::HighDensity);
        assert_eq!(toc.first.num, 3);
        assert_eq!(toc.last.num, 3);
        assert_eq!(toc.leadout_fad, 45158);
    }

    #[test]
    fn read_sector_addresses_by_fad() {
        let mut t = track(150, 2, 2048);
        t.data[2048] = 0xaa;
        let mut disc = Mem::new(Format::Cdrom, vec![t]).unwrap();

        let mut buf = [0xff; disc::MAX_SECTOR_SIZE];
        assert_eq!(disc.read_sector(151, 0, 0, &mut buf), 2048);
        assert_eq!(buf[0], 0xaa);

        // out-of-range fad reads nothing
        assert_eq!(disc.read_sector(1000, 0, 0, &mut buf), 0);
    }
}
