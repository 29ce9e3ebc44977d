//! Boot volume surface
//!
//! The loader reads the boot volume through these traits. The UEFI glue
//! backs them with `EFI_SIMPLE_FILE_SYSTEM_PROTOCOL`; tests use memory.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{LoaderError, Result};

/// One entry of the volume's root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub is_directory: bool,
}

/// A file opened read-only on the boot volume.
pub trait PayloadFile {
    /// File length in bytes.
    fn size(&mut self) -> Result<u64>;

    /// Move the read cursor.
    fn set_position(&mut self, position: u64) -> Result<()>;

    /// Read from the cursor into `buf`. Returns bytes read; 0 at end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Fill `buf` starting at `position`. A short file is a device fault.
    fn read_exact_at(&mut self, position: u64, buf: &mut [u8]) -> Result<()> {
        self.set_position(position)?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..])? {
                0 => return Err(LoaderError::DeviceFault),
                n => filled += n,
            }
        }
        Ok(())
    }
}

impl<F: PayloadFile + ?Sized> PayloadFile for &mut F {
    fn size(&mut self) -> Result<u64> {
        (**self).size()
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        (**self).set_position(position)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }
}

/// Root directory of the boot volume.
pub trait BootVolume {
    type File: PayloadFile;

    /// Entries of the root directory, in volume order.
    fn root_entries(&mut self) -> Result<Vec<DirEntry>>;

    /// Open `name` in the root directory for reading.
    fn open(&mut self, name: &str) -> Result<Self::File>;
}

/// Read a whole (small) file, e.g. the loader executable.
pub fn read_to_end<F: PayloadFile>(file: &mut F) -> Result<Vec<u8>> {
    let size = usize::try_from(file.size()?).map_err(|_| LoaderError::DeviceFault)?;
    let mut buf = alloc::vec![0u8; size];
    file.read_exact_at(0, &mut buf)?;
    Ok(buf)
}
