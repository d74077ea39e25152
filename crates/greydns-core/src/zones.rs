//! Zone name resolution against the cached zone table

use crate::error::{Error, Result};
use crate::types::{Zone, ZoneTable};

/// Maps a zone name to its provider zone
///
/// The table is owned by the cache refresh cycle; resolution never calls the
/// provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneResolver;

impl ZoneResolver {
    /// Resolve `zone_name` in `zones`
    pub fn resolve(zone_name: &str, zones: &ZoneTable) -> Result<Zone> {
        let name = zone_name.trim().trim_end_matches('.');
        zones
            .get(name)
            .map(|id| Zone {
                id: id.clone(),
                name: name.to_string(),
            })
            .ok_or_else(|| Error::zone_not_found(zone_name))
    }
}
