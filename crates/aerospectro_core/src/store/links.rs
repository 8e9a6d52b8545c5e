//! Project/profile many-to-many link set.
//!
//! # Responsibility
//! - Hold the explicit set of (project, profile) pairs, independent of the
//!   area-based ownership chain.
//!
//! # Invariants
//! - At most one link exists per pair.
//! - Membership tests are O(1); per-side listings scan the set fresh on every
//!   call, so they always reflect current state.
//!
//! Persistence is not handled here: the store writes the link row through the
//! backend before mutating this set.

use crate::model::{ProfileId, ProjectId};
use std::collections::HashSet;

/// In-memory half of the project↔profile join relation.
#[derive(Debug, Default, Clone)]
pub struct LinkSet {
    pairs: HashSet<(ProjectId, ProfileId)>,
}

impl LinkSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_pairs(pairs: impl IntoIterator<Item = (ProjectId, ProfileId)>) -> Self {
        Self {
            pairs: pairs.into_iter().collect(),
        }
    }

    /// Whether the pair is currently linked.
    pub fn contains(&self, project_id: ProjectId, profile_id: ProfileId) -> bool {
        self.pairs.contains(&(project_id, profile_id))
    }

    /// Number of links in the set.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// All pairs, in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (ProjectId, ProfileId)> + '_ {
        self.pairs.iter().copied()
    }

    /// Profiles linked to the given project.
    pub fn profiles_for(&self, project_id: ProjectId) -> impl Iterator<Item = ProfileId> + '_ {
        self.pairs
            .iter()
            .filter(move |(p, _)| *p == project_id)
            .map(|(_, f)| *f)
    }

    /// Projects linked to the given profile.
    pub fn projects_for(&self, profile_id: ProfileId) -> impl Iterator<Item = ProjectId> + '_ {
        self.pairs
            .iter()
            .filter(move |(_, f)| *f == profile_id)
            .map(|(p, _)| *p)
    }

    /// Returns `true` when the pair was newly inserted.
    pub(crate) fn insert(&mut self, project_id: ProjectId, profile_id: ProfileId) -> bool {
        self.pairs.insert((project_id, profile_id))
    }

    /// Returns `true` when the pair was present.
    pub(crate) fn remove(&mut self, project_id: ProjectId, profile_id: ProfileId) -> bool {
        self.pairs.remove(&(project_id, profile_id))
    }

    /// Sorted pairs touching the given project, for deterministic cascade
    /// plans.
    pub(crate) fn pairs_for_project(&self, project_id: ProjectId) -> Vec<(ProjectId, ProfileId)> {
        let mut pairs: Vec<_> = self
            .pairs
            .iter()
            .filter(|(p, _)| *p == project_id)
            .copied()
            .collect();
        pairs.sort();
        pairs
    }

    /// Sorted pairs touching the given profile.
    pub(crate) fn pairs_for_profile(&self, profile_id: ProfileId) -> Vec<(ProjectId, ProfileId)> {
        let mut pairs: Vec<_> = self
            .pairs
            .iter()
            .filter(|(_, f)| *f == profile_id)
            .copied()
            .collect();
        pairs.sort();
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::LinkSet;
    use crate::model::{ProfileId, ProjectId};

    #[test]
    fn insert_is_idempotent_per_pair() {
        let mut links = LinkSet::new();
        assert!(links.insert(ProjectId(1), ProfileId(2)));
        assert!(!links.insert(ProjectId(1), ProfileId(2)));
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn per_side_listing_reflects_current_state() {
        let mut links = LinkSet::new();
        links.insert(ProjectId(1), ProfileId(10));
        links.insert(ProjectId(1), ProfileId(11));
        links.insert(ProjectId(2), ProfileId(10));

        let mut for_project: Vec<_> = links.profiles_for(ProjectId(1)).collect();
        for_project.sort();
        assert_eq!(for_project, vec![ProfileId(10), ProfileId(11)]);

        let mut for_profile: Vec<_> = links.projects_for(ProfileId(10)).collect();
        for_profile.sort();
        assert_eq!(for_profile, vec![ProjectId(1), ProjectId(2)]);

        links.remove(ProjectId(1), ProfileId(10));
        assert_eq!(links.projects_for(ProfileId(10)).count(), 1);
    }

    #[test]
    fn pair_listings_are_sorted() {
        let mut links = LinkSet::new();
        links.insert(ProjectId(3), ProfileId(7));
        links.insert(ProjectId(1), ProfileId(7));
        links.insert(ProjectId(2), ProfileId(7));

        assert_eq!(
            links.pairs_for_profile(ProfileId(7)),
            vec![
                (ProjectId(1), ProfileId(7)),
                (ProjectId(2), ProfileId(7)),
                (ProjectId(3), ProfileId(7)),
            ]
        );
    }
}
