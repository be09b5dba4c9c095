//! On-disk ordered window store
//!
//! A byte-keyed map (lexicographic order) backed by an append-only file.
//! Puts append length-framed entries; opening replays the file. `clear`
//! truncates, `delete` unlinks, and `rename` moves the backing file so
//! rotation can move the `-empty` suffix to the cleared side.
//!
//! `size_in_bytes` is the backing-file length, so duplicate puts of a key
//! count until the next clear; the gauge tracks disk, not live entries.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Ordered on-disk map for one window
pub struct WindowStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    file: File,
    path: PathBuf,
    file_bytes: u64,
}

impl WindowStore {
    /// Open (or create) a store at `path`, replaying any existing entries
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let entries = replay(&mut file)?;
        let file_bytes = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            entries,
            file,
            path,
            file_bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> std::io::Result<()> {
        self.append_frame(&key, &value)?;
        self.entries.insert(key, value);
        Ok(())
    }

    /// Insert a whole batch, appending every frame before updating the map
    pub fn put_all(&mut self, batch: BTreeMap<Vec<u8>, Vec<u8>>) -> std::io::Result<()> {
        for (key, value) in &batch {
            self.append_frame(key, value)?;
        }
        self.entries.extend(batch);
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes on disk, including superseded frames
    pub fn size_in_bytes(&self) -> u64 {
        self.file_bytes
    }

    /// Drop every entry and truncate the backing file
    pub fn clear(&mut self) -> std::io::Result<()> {
        self.entries.clear();
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::End(0))?;
        self.file_bytes = 0;
        Ok(())
    }

    /// Move the backing file; the open handle stays valid
    pub fn rename(&mut self, new_path: impl Into<PathBuf>) -> std::io::Result<()> {
        let new_path = new_path.into();
        std::fs::rename(&self.path, &new_path)?;
        self.path = new_path;
        Ok(())
    }

    /// Unlink the backing file; the store is unusable afterwards
    pub fn delete(self) -> std::io::Result<()> {
        std::fs::remove_file(&self.path)
    }

    /// This shard's slice of the entries, in key order
    ///
    /// Entry `i` (by key order) belongs to shard `i % total_shards`; the
    /// union over all shards is exactly the store's contents. Lazy, nothing
    /// is materialized.
    pub fn iter_shard(
        &self,
        total_shards: usize,
        shard_id: usize,
    ) -> impl Iterator<Item = (&[u8], &[u8])> {
        let total = total_shards.max(1);
        self.entries
            .iter()
            .enumerate()
            .filter(move |(index, _)| index % total == shard_id)
            .map(|(_, (key, value))| (key.as_slice(), value.as_slice()))
    }

    fn append_frame(&mut self, key: &[u8], value: &[u8]) -> std::io::Result<()> {
        self.file.write_all(&(key.len() as u32).to_be_bytes())?;
        self.file.write_all(key)?;
        self.file.write_all(&(value.len() as u32).to_be_bytes())?;
        self.file.write_all(value)?;
        self.file_bytes += 8 + key.len() as u64 + value.len() as u64;
        Ok(())
    }
}

/// Rebuild the map from length-framed entries; later frames win
fn replay(file: &mut File) -> std::io::Result<BTreeMap<Vec<u8>, Vec<u8>>> {
    let mut entries = BTreeMap::new();
    file.seek(SeekFrom::Start(0))?;
    let mut len_buf = [0u8; 4];
    loop {
        match file.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
        let key_len = u32::from_be_bytes(len_buf) as usize;
        let mut key = vec![0u8; key_len];
        file.read_exact(&mut key)?;
        file.read_exact(&mut len_buf)?;
        let value_len = u32::from_be_bytes(len_buf) as usize;
        let mut value = vec![0u8; value_len];
        file.read_exact(&mut value)?;
        entries.insert(key, value);
    }
    Ok(entries)
}
