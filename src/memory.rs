use std::{
    fs,
    io::{Cursor, Read, Seek, SeekFrom, Write},
    path::Path,
    sync::Mutex,
};

use crate::error::BackingStoreError;

pub trait Medium: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> Medium for T {}

/// Simulated RAM shared by every core. Each read or write holds the single
/// bus lock for its whole duration; the size is fixed when the store is opened.
pub struct BackingStore {
    medium: Mutex<Box<dyn Medium>>,
    size: u64,
}

impl std::fmt::Debug for BackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackingStore")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl BackingStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackingStoreError> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        let size = file.metadata()?.len();
        Ok(BackingStore {
            medium: Mutex::new(Box::new(file)),
            size,
        })
    }

    pub fn in_memory(bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        BackingStore {
            medium: Mutex::new(Box::new(Cursor::new(bytes))),
            size,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    fn check(&self, offset: u64, len: usize) -> Result<(), BackingStoreError> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(BackingStoreError::OutOfRange {
                offset,
                len,
                size: self.size,
            }),
        }
    }

    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, BackingStoreError> {
        self.check(offset, len)?;
        let mut medium = self.medium.lock().map_err(|_| BackingStoreError::Poisoned)?;
        medium.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0; len];
        medium.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn write_at(&self, offset: u64, bytes: &[u8]) -> Result<(), BackingStoreError> {
        self.check(offset, bytes.len())?;
        let mut medium = self.medium.lock().map_err(|_| BackingStoreError::Poisoned)?;
        medium.seek(SeekFrom::Start(offset))?;
        medium.write_all(bytes)?;
        medium.flush()?;
        Ok(())
    }

    /// Reads the whole image, mostly for inspecting results.
    pub fn snapshot(&self) -> Result<Vec<u8>, BackingStoreError> {
        self.read_at(0, self.size as usize)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn read_write_round_trip() {
        let store = BackingStore::in_memory(vec![0; 64]);
        store.write_at(8, &[1, 2, 3, 4]).unwrap();
        assert_eq!(store.read_at(6, 8).unwrap(), vec![0, 0, 1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn out_of_range_accesses_fail_without_touching_the_image() {
        let store = BackingStore::in_memory(vec![7; 16]);
        assert!(matches!(
            store.read_at(12, 8),
            Err(BackingStoreError::OutOfRange { offset: 12, len: 8, size: 16 })
        ));
        assert!(store.write_at(u64::MAX, &[1]).is_err());
        assert_eq!(store.snapshot().unwrap(), vec![7; 16]);
    }

    #[test]
    fn concurrent_writers_are_serialised() {
        let store = Arc::new(BackingStore::in_memory(vec![0; 256]));
        let handles: Vec<_> = (0..4u8)
            .map(|core| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..16u64 {
                        let offset = core as u64 * 64 + i * 4;
                        store.write_at(offset, &[core; 4]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let image = store.snapshot().unwrap();
        for core in 0..4u8 {
            let start = core as usize * 64;
            assert!(image[start..start + 64].iter().all(|&b| b == core));
        }
    }

    #[test]
    fn file_backed_store_persists_writes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xaa; 128]).unwrap();
        let store = BackingStore::open(file.path()).unwrap();
        assert_eq!(store.size(), 128);
        store.write_at(4, &[1, 2]).unwrap();
        drop(store);

        let image = fs::read(file.path()).unwrap();
        assert_eq!(&image[..8], &[0xaa, 0xaa, 0xaa, 0xaa, 1, 2, 0xaa, 0xaa]);
    }
}
