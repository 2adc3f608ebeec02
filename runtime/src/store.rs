//! Seen-listing store backed by SQLite.
//!
//! The gate only needs `exists` and `save`; the full record and its
//! first-seen time are kept so `sentinel status` can show recent finds.

use crate::listing::Listing;
use anyhow::{anyhow, Context, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Existence check and insert, nothing else.
pub trait ListingStore: Send + Sync {
    fn exists(&self, product_id: &str) -> Result<bool>;
    fn save(&self, listing: &Listing) -> Result<()>;
}

/// A stored record with the time it was first seen.
#[derive(Debug, Clone, Serialize)]
pub struct StoredListing {
    #[serde(flatten)]
    pub listing: Listing,
    pub first_seen: String,
}

pub struct SqliteStore {
    db: Mutex<Connection>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS listings (
    product_id TEXT PRIMARY KEY,
    title TEXT,
    price TEXT,
    link TEXT,
    img TEXT,
    seller_name TEXT,
    seller_url TEXT,
    time_posted TEXT,
    condition TEXT,
    size TEXT,
    likes TEXT NOT NULL DEFAULT '0',
    first_seen TEXT NOT NULL
);";

impl SqliteStore {
    /// Open or create a store, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let db = Connection::open(path)
            .with_context(|| format!("failed to open store: {}", path.display()))?;
        Self::init(db)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self> {
        db.execute_batch(SCHEMA)
            .context("failed to create listings table")?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| anyhow!("store connection poisoned"))
    }

    pub fn count(&self) -> Result<u64> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Most recently first-seen records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredListing>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT product_id, title, price, link, img, seller_name, seller_url,
                    time_posted, condition, size, likes, first_seen
             FROM listings ORDER BY first_seen DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], |row| {
            Ok(StoredListing {
                listing: Listing {
                    product_id: row.get(0)?,
                    title: row.get(1)?,
                    price: row.get(2)?,
                    link: row.get(3)?,
                    img: row.get(4)?,
                    seller_name: row.get(5)?,
                    seller_url: row.get(6)?,
                    time_posted: row.get(7)?,
                    condition: row.get(8)?,
                    size: row.get(9)?,
                    likes: row.get(10)?,
                },
                first_seen: row.get(11)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read recent listings")
    }
}

impl ListingStore for SqliteStore {
    fn exists(&self, product_id: &str) -> Result<bool> {
        let found = self
            .conn()?
            .query_row(
                "SELECT 1 FROM listings WHERE product_id = ?1",
                rusqlite::params![product_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn save(&self, listing: &Listing) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR IGNORE INTO listings (product_id, title, price, link, img,
                    seller_name, seller_url, time_posted, condition, size, likes, first_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    listing.product_id,
                    listing.title,
                    listing.price,
                    listing.link,
                    listing.img,
                    listing.seller_name,
                    listing.seller_url,
                    listing.time_posted,
                    listing.condition,
                    listing.size,
                    listing.likes,
                    chrono::Utc::now().to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to save listing {}", listing.product_id))?;
        Ok(())
    }
}
