use std::collections::BTreeSet;

/// Set union of stored achievements and a newly earned one. The result is
/// sorted and free of duplicates whatever the stored list looked like.
pub(crate) fn merge_achievement(existing: &[i32], achievement: i32) -> Vec<i32> {
    existing.iter().copied().chain([achievement]).collect::<BTreeSet<_>>().into_iter().collect()
}
