//! Input validation
//!
//! Clustering and ranking reject malformed collections up front instead of
//! producing partial results.

use std::collections::HashSet;

use common::error::{Error, Result};
use common::photos::PhotoItem;

/// Checks that ids are present and unique and that coordinates are in range
pub fn validate_items(items: &[PhotoItem]) -> Result<()> {
    let mut seen = HashSet::with_capacity(items.len());

    for item in items {
        if item.id.is_empty() {
            return Err(Error::InvalidArgument("Photo id must not be empty".to_string()));
        }

        if !seen.insert(item.id.as_str()) {
            return Err(Error::InvalidArgument(format!("Duplicate photo id: {}", item.id)));
        }

        if let Some(location) = &item.location {
            let lat_ok = (-90.0..=90.0).contains(&location.lat);
            let lon_ok = (-180.0..=180.0).contains(&location.lon);

            if !lat_ok || !lon_ok {
                return Err(Error::InvalidArgument(format!(
                    "Photo {} has an out-of-range location ({}, {})",
                    item.id, location.lat, location.lon
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::photos::GeoPoint;

    #[test]
    fn test_rejects_duplicates_and_bad_coordinates() {
        let now = Utc::now();
        assert!(validate_items(&[PhotoItem::new("a", now), PhotoItem::new("b", now)]).is_ok());
        assert!(validate_items(&[PhotoItem::new("a", now), PhotoItem::new("a", now)]).is_err());
        assert!(validate_items(&[PhotoItem::new("", now)]).is_err());

        let mut item = PhotoItem::new("a", now);
        item.location = Some(GeoPoint::new(91.0, 0.0));
        assert!(matches!(validate_items(&[item]), Err(Error::InvalidArgument(_))));
    }
}
