//! Hard filters
//!
//! Items failing a goal's filters are excluded before scoring, whatever their
//! score would have been.

use common::photos::{Orientation, PhotoItem};

use crate::goals::{CurationGoal, GoalFilters};

/// Returns true if the item satisfies every set filter
pub fn passes(item: &PhotoItem, filters: &GoalFilters) -> bool {
    if let Some(min) = filters.min_faces {
        if item.face_count < min {
            return false;
        }
    }

    if let Some(max) = filters.max_faces {
        if item.face_count > max {
            return false;
        }
    }

    if filters.require_smiles == Some(true) && item.smiling_faces == 0 {
        return false;
    }

    if filters.landscape_only == Some(true) && item.orientation() != Orientation::Landscape {
        return false;
    }

    if filters.portrait_only == Some(true) && item.orientation() != Orientation::Portrait {
        return false;
    }

    true
}

/// Items passing the goal's filters, in input order
pub fn apply_filters<'a>(items: &'a [PhotoItem], goal: &CurationGoal) -> Vec<&'a PhotoItem> {
    items.iter().filter(|item| passes(item, &goal.filters)).collect()
}
