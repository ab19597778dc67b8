//! Association traversal for deep history

use std::collections::{BTreeSet, VecDeque};

use crate::entities::{load_association, EntitySource};
use crate::registry::EntityRegistry;
use crate::types::SubjectRef;

/// `start` plus every subject currently reachable through declared associations
///
/// Breadth-first; `max_depth` of `Some(1)` stops at direct associations.
/// Subjects whose type is not registered contribute no associations.
pub fn associated_subjects(
    registry: &EntityRegistry,
    source: &dyn EntitySource,
    start: &SubjectRef,
    max_depth: Option<usize>,
) -> BTreeSet<SubjectRef> {
    let mut visited = BTreeSet::new();
    visited.insert(start.clone());

    let mut queue = VecDeque::new();
    queue.push_back((start.clone(), 0usize));

    while let Some((subject, depth)) = queue.pop_front() {
        if max_depth.is_some_and(|max| depth >= max) {
            continue;
        }
        let Some(def) = registry.resolve(&subject.subject_type) else {
            continue;
        };

        for association in &def.associations {
            for target in load_association(source, &subject, association) {
                let target = target.subject();
                if visited.insert(target.clone()) {
                    queue.push_back((target, depth + 1));
                }
            }
        }
    }

    visited
}
