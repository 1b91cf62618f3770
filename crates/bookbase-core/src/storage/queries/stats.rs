use rusqlite::Connection;

use crate::error::Result;
use crate::models::CatalogStats;

pub struct CatalogStatsQuery<'a> {
    conn: &'a Connection,
}

impl<'a> CatalogStatsQuery<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get_stats(&self) -> Result<CatalogStats> {
        let (total, available, checked_out, favorites) = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'available'), 0),
                    COALESCE(SUM(status = 'checked-out'), 0),
                    COALESCE(SUM(is_favorite), 0)
             FROM books",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )?;

        Ok(CatalogStats {
            total: total as usize,
            available: available as usize,
            checked_out: checked_out as usize,
            favorites: favorites as usize,
        })
    }
}
