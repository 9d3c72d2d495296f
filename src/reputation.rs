//! Reputation accumulation.
//!
//! One record is appended per rated completion and the mean is recomputed
//! over the full history. The O(n) recompute is deliberate: the history
//! stays auditable and the mean is bit-for-bit reproducible on replay,
//! where an incremental running mean would depend on update order
//! rounding.

use crate::error::DirectoryError;
use crate::types::{RatingRecord, Reputation};
use crate::view::{get_entity, keys, put_entity, KvView};

/// Append `record` to `rated_id`'s history and recompute the average.
///
/// Returns the updated reputation.
pub fn apply_rating(
    view: &mut impl KvView,
    rated_id: &str,
    record: RatingRecord,
) -> Result<Reputation, DirectoryError> {
    let key = keys::reputation(rated_id);
    let mut rep = get_entity::<Reputation>(view, &key)?.unwrap_or_default();

    rep.ratings.push(record);
    rep.total_ratings = rep.ratings.len() as u64;
    rep.average_rating = mean(&rep.ratings);

    put_entity(view, &key, &rep);
    Ok(rep)
}

/// Mean over the full rating list, summed in list order.
fn mean(ratings: &[RatingRecord]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: f64 = ratings.iter().map(|r| r.rating).sum();
    sum / ratings.len() as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
