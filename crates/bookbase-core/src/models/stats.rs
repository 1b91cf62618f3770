use serde::{Deserialize, Serialize};

/// Dashboard counters over the whole catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub total: usize,
    pub available: usize,
    pub checked_out: usize,
    pub favorites: usize,
}
