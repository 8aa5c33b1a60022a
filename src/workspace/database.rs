//! Read-only summary of the COLMAP feature database.
//!
//! COLMAP owns the schema; we only count rows so the progress label can say
//! something more useful than "done".

use rusqlite::{Connection, OpenFlags, Result as SqlResult};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatabaseSummary {
    pub images: i64,
    pub keypoints: i64,
    /// Image pairs with a verified two-view geometry
    pub verified_pairs: i64,
}

impl DatabaseSummary {
    pub fn read(path: &Path) -> SqlResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let images = conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;

        // `rows` is the keypoint count of each image blob
        let keypoints = conn.query_row(
            "SELECT COALESCE(SUM(rows), 0) FROM keypoints",
            [],
            |row| row.get(0),
        )?;

        let verified_pairs = conn.query_row(
            "SELECT COUNT(*) FROM two_view_geometries WHERE rows > 0",
            [],
            |row| row.get(0),
        )?;

        Ok(Self {
            images,
            keypoints,
            verified_pairs,
        })
    }
}
