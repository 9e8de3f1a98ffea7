use crate::storage::error::{StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const PAGE_SIZE: usize = 4096;

/// Reads and writes fixed-size pages of a single file.
pub struct PageManager {
    file: File,
}

impl PageManager {
    pub fn create(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self { file })
    }

    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    pub fn read_page(&mut self, page_no: u32, buf: &mut [u8]) -> StorageResult<()> {
        Self::check_len(buf.len())?;

        let num_pages = self.num_pages()?;
        if page_no >= num_pages {
            return Err(StorageError::PageOutOfRange { page_no, num_pages });
        }

        self.file.seek(SeekFrom::Start(Self::page_offset(page_no)))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Writes a page, growing the file if `page_no` lies past its end.
    pub fn write_page(&mut self, page_no: u32, data: &[u8]) -> StorageResult<()> {
        Self::check_len(data.len())?;

        let offset = Self::page_offset(page_no);
        if offset >= self.file.metadata()?.len() {
            self.file.set_len(offset + PAGE_SIZE as u64)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn num_pages(&self) -> StorageResult<u32> {
        let file_size = self.file.metadata()?.len();
        Ok((file_size / PAGE_SIZE as u64) as u32)
    }

    fn check_len(len: usize) -> StorageResult<()> {
        if len != PAGE_SIZE {
            return Err(StorageError::Corrupt(format!(
                "buffer must be PAGE_SIZE ({}) bytes, got {}",
                PAGE_SIZE, len
            )));
        }
        Ok(())
    }

    fn page_offset(page_no: u32) -> u64 {
        page_no as u64 * PAGE_SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_open() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");

        {
            let pm = PageManager::create(&file_path)?;
            assert_eq!(pm.num_pages()?, 0);
        }

        let pm = PageManager::open(&file_path)?;
        assert_eq!(pm.num_pages()?, 0);

        Ok(())
    }

    #[test]
    fn test_write_and_read_page() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("test.db"))?;

        let mut write_buf = vec![0u8; PAGE_SIZE];
        write_buf[0] = 42;
        write_buf[PAGE_SIZE - 1] = 24;
        pm.write_page(0, &write_buf)?;

        let mut read_buf = vec![0u8; PAGE_SIZE];
        pm.read_page(0, &mut read_buf)?;
        assert_eq!(read_buf, write_buf);

        Ok(())
    }

    #[test]
    fn test_read_nonexistent_page() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("test.db"))?;

        let mut buf = vec![0u8; PAGE_SIZE];
        let result = pm.read_page(10, &mut buf);
        assert!(matches!(
            result,
            Err(StorageError::PageOutOfRange {
                page_no: 10,
                num_pages: 0
            })
        ));

        Ok(())
    }

    #[test]
    fn test_invalid_buffer_size() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("test.db"))?;

        let mut small_buf = vec![0u8; 100];
        assert!(pm.read_page(0, &mut small_buf).is_err());
        assert!(pm.write_page(0, &small_buf).is_err());

        Ok(())
    }

    #[test]
    fn test_open_nonexistent_file() -> Result<()> {
        let dir = tempdir()?;
        let result = PageManager::open(&dir.path().join("nonexistent.db"));
        assert!(matches!(result, Err(StorageError::Io(_))));
        Ok(())
    }

    #[test]
    fn test_file_growth() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("test.db"))?;

        pm.write_page(5, &vec![5u8; PAGE_SIZE])?;
        assert_eq!(pm.num_pages()?, 6);

        // Skipped pages read back as zeroes
        let mut buf = vec![1u8; PAGE_SIZE];
        pm.read_page(2, &mut buf)?;
        assert!(buf.iter().all(|&b| b == 0));

        Ok(())
    }

    #[test]
    fn test_persistence() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.db");

        {
            let mut pm = PageManager::create(&file_path)?;
            pm.write_page(0, &vec![99u8; PAGE_SIZE])?;
        }

        let mut pm = PageManager::open(&file_path)?;
        let mut buf = vec![0u8; PAGE_SIZE];
        pm.read_page(0, &mut buf)?;
        assert_eq!(buf[0], 99);

        Ok(())
    }
}
