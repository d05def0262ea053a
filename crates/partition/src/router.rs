//! Partition Router: maps query predicates onto a query scope and the
//! partition ids that must be consulted (spec §4.8).

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::manager::PartitionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryScope {
    SinglePartition,
    MultiPartition,
    Global,
}

#[derive(Debug, Clone, Default)]
pub struct QueryPredicates {
    pub capsule_id: Option<Uuid>,
    pub domain_tags: Option<BTreeSet<String>>,
    pub user_id: Option<String>,
}

pub struct PartitionRouter<'a> {
    manager: &'a PartitionManager,
}

impl<'a> PartitionRouter<'a> {
    pub fn new(manager: &'a PartitionManager) -> Self {
        Self { manager }
    }

    pub fn route_query(&self, predicates: &QueryPredicates) -> (QueryScope, Vec<String>) {
        if let Some(capsule_id) = predicates.capsule_id {
            if let Some(partition_id) = self.manager.get_capsule_partition(capsule_id) {
                return (QueryScope::SinglePartition, vec![partition_id]);
            }
        }

        if let Some(tags) = &predicates.domain_tags {
            let matching = self.find_by_tags(tags);
            if !matching.is_empty() {
                let scope = if matching.len() == 1 {
                    QueryScope::SinglePartition
                } else {
                    QueryScope::MultiPartition
                };
                return (scope, matching);
            }
        }

        if let Some(user_id) = &predicates.user_id {
            let matching = self.find_by_user(user_id);
            if !matching.is_empty() {
                let scope = if matching.len() == 1 {
                    QueryScope::SinglePartition
                } else {
                    QueryScope::MultiPartition
                };
                return (scope, matching);
            }
        }

        let all = self
            .manager
            .list_partitions()
            .into_iter()
            .filter(|p| p.state == forge_primitives::PartitionState::Active)
            .map(|p| p.partition_id)
            .collect();
        (QueryScope::Global, all)
    }

    fn find_by_tags(&self, tags: &BTreeSet<String>) -> Vec<String> {
        self.manager
            .list_partitions()
            .into_iter()
            .filter(|p| !p.domain_tags.is_disjoint(tags))
            .map(|p| p.partition_id)
            .collect()
    }

    fn find_by_user(&self, user_id: &str) -> Vec<String> {
        self.manager
            .list_partitions()
            .into_iter()
            .filter(|p| p.user_ids.contains(user_id))
            .map(|p| p.partition_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::AssignmentHint;
    use forge_primitives::PartitionStrategy;

    #[test]
    fn routes_by_capsule_id_to_a_single_partition() {
        let manager = PartitionManager::default();
        let capsule_id = Uuid::new_v4();
        let partition_id = manager.assign_capsule(capsule_id, &AssignmentHint::default());

        let router = PartitionRouter::new(&manager);
        let (scope, ids) = router.route_query(&QueryPredicates {
            capsule_id: Some(capsule_id),
            ..Default::default()
        });
        assert_eq!(scope, QueryScope::SinglePartition);
        assert_eq!(ids, vec![partition_id]);
    }

    #[test]
    fn routes_by_domain_tags_across_multiple_matching_partitions() {
        let manager = PartitionManager::new(1000, 0.2);
        manager.create_partition(
            "eng".to_string(),
            PartitionStrategy::Domain,
            BTreeSet::from(["eng".to_string()]),
            None,
        );
        manager.create_partition(
            "eng2".to_string(),
            PartitionStrategy::Domain,
            BTreeSet::from(["eng".to_string()]),
            None,
        );

        let router = PartitionRouter::new(&manager);
        let (scope, ids) = router.route_query(&QueryPredicates {
            domain_tags: Some(BTreeSet::from(["eng".to_string()])),
            ..Default::default()
        });
        assert_eq!(scope, QueryScope::MultiPartition);
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn falls_back_to_global_scope_with_no_predicates() {
        let manager = PartitionManager::default();
        let router = PartitionRouter::new(&manager);
        let (scope, ids) = router.route_query(&QueryPredicates::default());
        assert_eq!(scope, QueryScope::Global);
        assert_eq!(ids, vec!["default".to_string()]);
    }
}
