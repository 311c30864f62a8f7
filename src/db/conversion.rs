//! Conversion cache repository
//!
//! Maps a content digest to the media reference Telegram assigned when the
//! converted clip was first uploaded. Entries are only ever written after a
//! successful fresh delivery and are never deleted.

use chrono::NaiveDateTime;
use rusqlite::Row;

use super::DbPool;
use crate::channels::{MediaKind, MediaRef};
use crate::pipeline::ContentDigest;
use crate::{Error, Result};

/// `SQLite` `datetime('now')` format
const SQLITE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

/// Provenance recorded next to a cache entry
#[derive(Debug, Clone, Default)]
pub struct CacheMeta {
    /// URL the content was first fetched from
    pub source_url: String,
    /// Size of the downloaded source in bytes
    pub size_bytes: u64,
}

/// A stored conversion with its provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Reference to resend
    pub media: MediaRef,
    /// URL the content was fetched from when stored
    pub source_url: Option<String>,
    /// Source size in bytes
    pub size_bytes: Option<u64>,
    /// When the entry was written (UTC)
    pub created_at: Option<NaiveDateTime>,
}

/// Aggregate numbers about the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached conversions
    pub entries: u64,
    /// Sum of source sizes for all entries
    pub total_bytes: u64,
    /// When the most recent entry was written (UTC)
    pub last_stored: Option<NaiveDateTime>,
}

/// Repository for the digest → reference mapping
#[derive(Debug, Clone)]
pub struct ConversionRepo {
    pool: DbPool,
}

impl ConversionRepo {
    /// Create a new repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Look up the media reference for a digest
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails or the stored kind is unknown
    pub fn lookup(&self, digest: &ContentDigest) -> Result<Option<MediaRef>> {
        Ok(self.entry(digest)?.map(|entry| entry.media))
    }

    /// Load the full entry for a digest
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails or the stored kind is unknown
    pub fn entry(&self, digest: &ContentDigest) -> Result<Option<CacheEntry>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let result = conn.query_row(
            "SELECT reference, kind, source_url, size_bytes, created_at
             FROM conversions WHERE digest = ?1",
            [digest.to_hex()],
            Self::row_to_entry,
        );

        match result {
            Ok(entry) => entry.map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store the media reference for a digest
    ///
    /// Last write wins on an existing digest.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn store(&self, digest: &ContentDigest, media: &MediaRef, meta: &CacheMeta) -> Result<()> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            r"INSERT INTO conversions (digest, reference, kind, source_url, size_bytes, created_at)
              VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
              ON CONFLICT(digest) DO UPDATE SET
                reference = excluded.reference,
                kind = excluded.kind,
                source_url = excluded.source_url,
                size_bytes = excluded.size_bytes,
                created_at = datetime('now')",
            rusqlite::params![
                digest.to_hex(),
                media.file_id,
                media.kind.as_str(),
                meta.source_url,
                i64::try_from(meta.size_bytes).unwrap_or(i64::MAX),
            ],
        )?;

        Ok(())
    }

    /// Summarize the cache contents
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn stats(&self) -> Result<CacheStats> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let (entries, total_bytes, last_stored) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0), MAX(created_at) FROM conversions",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )?;

        Ok(CacheStats {
            entries: u64::try_from(entries).unwrap_or_default(),
            total_bytes: u64::try_from(total_bytes).unwrap_or_default(),
            last_stored: last_stored.and_then(|s| parse_datetime(&s)),
        })
    }

    fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<Result<CacheEntry>> {
        let file_id: String = row.get(0)?;
        let kind: String = row.get(1)?;
        let source_url: Option<String> = row.get(2)?;
        let size_bytes: Option<i64> = row.get(3)?;
        let created_at: Option<String> = row.get(4)?;

        let Some(kind) = MediaKind::parse(&kind) else {
            return Ok(Err(Error::Database(format!("unknown media kind {kind:?}"))));
        };

        Ok(Ok(CacheEntry {
            media: MediaRef::new(kind, file_id),
            source_url,
            size_bytes: size_bytes.and_then(|n| u64::try_from(n).ok()),
            created_at: created_at.and_then(|s| parse_datetime(&s)),
        }))
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, SQLITE_DATETIME).ok()
}
