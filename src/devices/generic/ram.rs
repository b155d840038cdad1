/// Basic guest RAM. Serves as the bulk-copy target for DMA transfers out of
/// the drive.
pub struct Ram {
    mem: Vec<u8>,
}

impl std::fmt::Debug for Ram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ram").field("mem", &"[..]").finish()
    }
}

impl Ram {
    /// Allocate some RAM. `size` is the size in bytes.
    pub fn new(size: usize) -> Ram {
        Ram {
            mem: vec![b'-'; size], // non-zero value to make it easier to spot bugs
        }
    }

    pub fn bulk_write(&mut self, offset: u32, data: &[u8]) {
        let offset = offset as usize;
        self.mem[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn bulk_read(&self, offset: u32, data: &mut [u8]) {
        let offset = offset as usize;
        data.copy_from_slice(&self.mem[offset..offset + data.len()]);
    }
}
