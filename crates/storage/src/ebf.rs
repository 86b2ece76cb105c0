//! The entity binary file (EBF)
//!
//! An append-only, content-addressed file of self-delimiting, checksummed
//! [`Entity`] records. Every mutation appends a brand new record — EBF never
//! rewrites a byte in place, so an entity's full history lives in however
//! many records it has accumulated; the latest offset for an id is what the
//! [`crate::index::Indices`] `ById` map tracks.
//!
//! # Record format
//!
//! ```text
//! [magic: "EDBF"]      4 bytes
//! [version: u16]       2 bytes
//! [id_len: u32][id]    4 + N bytes
//! [tag_count: u32]     4 bytes
//! repeated tag_count times:
//!   [tag_len: u32][tag bytes]
//! [content_len: u32][content]  4 + N bytes
//! [created_at: i64]    8 bytes
//! [updated_at: i64]    8 bytes
//! [lsn: u64]            8 bytes, the WAL intent this record absorbed
//! [crc32: u32]         4 bytes, over everything above
//! ```
//!
//! `lsn` is what makes WAL replay idempotent (spec §4.9): recovery compares
//! an intent's `lsn` against the record's `lsn` for that id and skips the
//! intent if it's already reflected on disk.
//!
//! The record has no leading length prefix: a reader instead accumulates
//! bytes until the declared `content_len` (and the fixed trailer) are
//! satisfied. This mirrors the teacher's MANIFEST format (magic + fields +
//! trailing CRC) rather than the WAL's length-prefixed frame, since EBF
//! records are read by absolute offset, not streamed sequentially in the
//! common case.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use entitydb_core::{Entity, EntityId, Error, Tag, Timestamp};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const EBF_MAGIC: [u8; 4] = *b"EDBF";
const EBF_VERSION: u16 = 1;

/// One decoded EBF record plus the byte range it occupied, handed back by
/// [`EbfFile::scan`].
#[derive(Debug, Clone)]
pub struct EbfRecord {
    /// Byte offset this record starts at.
    pub offset: u64,
    /// Length in bytes of the encoded record.
    pub len: u64,
    /// The decoded entity snapshot.
    pub entity: Entity,
    /// The WAL intent LSN this record absorbed.
    pub lsn: u64,
}

fn encode_entity(entity: &Entity, lsn: u64) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&EBF_MAGIC);
    buf.write_u16::<LittleEndian>(EBF_VERSION)
        .map_err(|e| Error::Internal(e.to_string()))?;

    let id_bytes = entity.id.as_str().as_bytes();
    buf.write_u32::<LittleEndian>(id_bytes.len() as u32)
        .map_err(|e| Error::Internal(e.to_string()))?;
    buf.extend_from_slice(id_bytes);

    buf.write_u32::<LittleEndian>(entity.tags.len() as u32)
        .map_err(|e| Error::Internal(e.to_string()))?;
    for tag in &entity.tags {
        let raw = tag.as_str().as_bytes();
        buf.write_u32::<LittleEndian>(raw.len() as u32)
            .map_err(|e| Error::Internal(e.to_string()))?;
        buf.extend_from_slice(raw);
    }

    buf.write_u32::<LittleEndian>(entity.content.len() as u32)
        .map_err(|e| Error::Internal(e.to_string()))?;
    buf.extend_from_slice(&entity.content);

    buf.write_i64::<LittleEndian>(entity.created_at.as_nanos())
        .map_err(|e| Error::Internal(e.to_string()))?;
    buf.write_i64::<LittleEndian>(entity.updated_at.as_nanos())
        .map_err(|e| Error::Internal(e.to_string()))?;
    buf.write_u64::<LittleEndian>(lsn)
        .map_err(|e| Error::Internal(e.to_string()))?;

    let crc = crc32fast::hash(&buf);
    buf.write_u32::<LittleEndian>(crc)
        .map_err(|e| Error::Internal(e.to_string()))?;

    Ok(buf)
}

/// Decode one record from `buf`, which must contain at least one full
/// record at its start (trailing bytes are ignored). Returns the entity and
/// the number of bytes consumed.
fn decode_entity(buf: &[u8]) -> Result<(Entity, u64, usize), Error> {
    let mut cursor = std::io::Cursor::new(buf);
    let mut magic = [0u8; 4];
    cursor
        .read_exact(&mut magic)
        .map_err(|_| Error::Corrupted("EBF record truncated before magic".into()))?;
    if magic != EBF_MAGIC {
        return Err(Error::Corrupted("EBF record has bad magic".into()));
    }
    let _version = cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| Error::Corrupted("EBF record truncated before version".into()))?;

    let id_len = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::Corrupted("EBF record truncated before id length".into()))? as usize;
    let mut id_bytes = vec![0u8; id_len];
    cursor
        .read_exact(&mut id_bytes)
        .map_err(|_| Error::Corrupted("EBF record truncated in id".into()))?;
    let id = EntityId::new(
        String::from_utf8(id_bytes).map_err(|e| Error::Corrupted(format!("EBF id not utf8: {e}")))?,
    )?;

    let tag_count = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::Corrupted("EBF record truncated before tag count".into()))?;
    let mut tags = Vec::with_capacity(tag_count as usize);
    for _ in 0..tag_count {
        let tag_len = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::Corrupted("EBF record truncated before tag length".into()))?
            as usize;
        let mut tag_bytes = vec![0u8; tag_len];
        cursor
            .read_exact(&mut tag_bytes)
            .map_err(|_| Error::Corrupted("EBF record truncated in tag".into()))?;
        let raw = String::from_utf8(tag_bytes)
            .map_err(|e| Error::Corrupted(format!("EBF tag not utf8: {e}")))?;
        tags.push(Tag::parse(&raw)?);
    }

    let content_len = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::Corrupted("EBF record truncated before content length".into()))?
        as usize;
    let mut content = vec![0u8; content_len];
    cursor
        .read_exact(&mut content)
        .map_err(|_| Error::Corrupted("EBF record truncated in content".into()))?;

    let created_at = cursor
        .read_i64::<LittleEndian>()
        .map_err(|_| Error::Corrupted("EBF record truncated before created_at".into()))?;
    let updated_at = cursor
        .read_i64::<LittleEndian>()
        .map_err(|_| Error::Corrupted("EBF record truncated before updated_at".into()))?;
    let lsn = cursor
        .read_u64::<LittleEndian>()
        .map_err(|_| Error::Corrupted("EBF record truncated before lsn".into()))?;

    let consumed_before_crc = cursor.position() as usize;
    let expected_crc = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::Corrupted("EBF record truncated before checksum".into()))?;
    let actual_crc = crc32fast::hash(&buf[..consumed_before_crc]);
    if actual_crc != expected_crc {
        return Err(Error::Corrupted(format!(
            "EBF checksum mismatch: expected {expected_crc:08x}, got {actual_crc:08x}"
        )));
    }

    let entity = Entity {
        id,
        tags,
        content,
        created_at: Timestamp::from_nanos(created_at),
        updated_at: Timestamp::from_nanos(updated_at),
    };
    Ok((entity, lsn, consumed_before_crc + 4))
}

/// The append-only entity binary file.
pub struct EbfFile {
    path: PathBuf,
    writer: BufWriter<File>,
    size: u64,
}

impl EbfFile {
    /// Open (or create) the EBF at `path`, positioned for appends.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        Ok(EbfFile {
            path,
            writer: BufWriter::new(file),
            size,
        })
    }

    /// Append a new record for `entity` absorbing WAL intent `lsn`,
    /// returning its byte offset.
    pub fn append(&mut self, entity: &Entity, lsn: u64) -> Result<u64, Error> {
        let encoded = encode_entity(entity, lsn)?;
        let offset = self.size;
        self.writer.write_all(&encoded)?;
        self.writer.flush()?;
        self.size += encoded.len() as u64;
        Ok(offset)
    }

    /// fsync the underlying file.
    pub fn fsync(&mut self) -> Result<(), Error> {
        self.writer.flush()?;
        self.writer.get_mut().sync_all()?;
        Ok(())
    }

    /// Read the full entity record at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<Entity, Error> {
        let (entity, _lsn) = self.read_at_with_lsn(offset)?;
        Ok(entity)
    }

    /// Read the entity record at `offset` along with the WAL intent LSN it
    /// absorbed, so callers doing idempotent replay can compare watermarks.
    pub fn read_at_with_lsn(&self, offset: u64) -> Result<(Entity, u64), Error> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        let (entity, lsn, _consumed) = decode_entity(&buf)
            .map_err(|e| e.context(format!("EBF read_at offset {offset}")))?;
        Ok((entity, lsn))
    }

    /// Current size of the EBF in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scan the whole file from the start, yielding every decodable record.
    /// On a corrupt record, the scan stops there and returns the records
    /// decoded so far plus the byte offset corruption was found at (spec
    /// §4.8 `FindOrphanedEntries`/recovery uses this to know how much of the
    /// file is trustworthy).
    pub fn scan(&self) -> Result<Vec<EbfRecord>, Error> {
        let mut file = File::open(&self.path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset < buf.len() {
            match decode_entity(&buf[offset..]) {
                Ok((entity, lsn, consumed)) => {
                    records.push(EbfRecord {
                        offset: offset as u64,
                        len: consumed as u64,
                        entity,
                        lsn,
                    });
                    offset += consumed;
                }
                Err(_) => break,
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::Tag;
    use tempfile::TempDir;

    fn sample_entity(id: &str) -> Entity {
        Entity {
            id: EntityId::from(id),
            tags: vec![Tag::new(Timestamp::from_nanos(1), "type:task").unwrap()],
            content: b"hello".to_vec(),
            created_at: Timestamp::from_nanos(1),
            updated_at: Timestamp::from_nanos(1),
        }
    }

    #[test]
    fn append_and_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut ebf = EbfFile::open(dir.path().join("data.ebf")).unwrap();
        let offset = ebf.append(&sample_entity("e1"), 7).unwrap();
        let read = ebf.read_at(offset).unwrap();
        assert_eq!(read.id.as_str(), "e1");
        assert_eq!(read.content, b"hello");
        let (_, lsn) = ebf.read_at_with_lsn(offset).unwrap();
        assert_eq!(lsn, 7);
    }

    #[test]
    fn scan_finds_every_record_in_order() {
        let dir = TempDir::new().unwrap();
        let mut ebf = EbfFile::open(dir.path().join("data.ebf")).unwrap();
        ebf.append(&sample_entity("e1"), 1).unwrap();
        ebf.append(&sample_entity("e2"), 2).unwrap();
        let records = ebf.scan().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].entity.id.as_str(), "e1");
        assert_eq!(records[0].lsn, 1);
        assert_eq!(records[1].entity.id.as_str(), "e2");
        assert_eq!(records[1].lsn, 2);
    }

    #[test]
    fn scan_stops_cleanly_at_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.ebf");
        {
            let mut ebf = EbfFile::open(&path).unwrap();
            ebf.append(&sample_entity("e1"), 1).unwrap();
        }
        {
            use std::io::Write as _;
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        }
        let ebf = EbfFile::open(&path).unwrap();
        let records = ebf.scan().unwrap();
        assert_eq!(records.len(), 1);
    }
}
