use tracing::info;

use crate::store::{AdvancementRule, DivisionStore};
use crate::types::*;

/// Generate the advancement rules mapping finishing ranks in the source
/// phase (per pool, when it has pools) onto the target phase's incoming slot
/// numbers, using the source phase's seeding strategy. The prior rule set
/// for this (source, target) pair is replaced wholesale, never patched.
///
/// `advancing_per_pool` defaults to the target's incoming slot count divided
/// by the source pool count.
pub fn generate_advancement_rules(
    store: &mut DivisionStore,
    source_phase_id: PhaseId,
    target_phase_id: PhaseId,
    advancing_per_pool: Option<u32>,
) -> EngineResult<Vec<RuleId>> {
    let source = store.phase(source_phase_id)?.clone();
    let target = store.phase(target_phase_id)?.clone();
    let pools = store.pools_for_phase(source_phase_id);
    // A pool-less phase ranks as one implicit pool.
    let pool_ids: Vec<Option<PoolId>> = if pools.is_empty() {
        vec![None]
    } else {
        pools.iter().map(|p| Some(p.id)).collect()
    };
    let pool_count = pool_ids.len() as u32;

    let per_pool = match advancing_per_pool {
        Some(count) => count,
        None => target.incoming_slot_count / pool_count,
    };
    if per_pool == 0 {
        return Err(EngineError::validation(
            "Advancing per pool must be at least 1.",
        ));
    }

    // (pool, rank) assignments in target slot order.
    let assignments: Vec<(Option<PoolId>, u32)> = match source.seeding_strategy {
        SeedingStrategy::Snake => {
            let mut out = Vec::new();
            for rank in 1..=per_pool {
                if rank % 2 == 1 {
                    for pool in &pool_ids {
                        out.push((*pool, rank));
                    }
                } else {
                    for pool in pool_ids.iter().rev() {
                        out.push((*pool, rank));
                    }
                }
            }
            out
        }
        SeedingStrategy::Sequential => {
            let mut out = Vec::new();
            for pool in &pool_ids {
                for rank in 1..=per_pool {
                    out.push((*pool, rank));
                }
            }
            out
        }
        SeedingStrategy::CrossPool => {
            if pool_ids.len() != 2 {
                return Err(EngineError::validation(
                    "Cross-pool seeding requires exactly two pools.",
                ));
            }
            // Fixed crossing: A1, B2, B1, A2.
            vec![
                (pool_ids[0], 1),
                (pool_ids[1], 2),
                (pool_ids[1], 1),
                (pool_ids[0], 2),
            ]
        }
    };

    if assignments.len() as u32 > target.incoming_slot_count {
        return Err(EngineError::validation(
            "Advancement rules exceed the target phase's incoming slots.",
        ));
    }

    store.delete_rules_for_pair(source_phase_id, target_phase_id);
    let mut rule_ids = Vec::with_capacity(assignments.len());
    for (index, (pool_id, rank)) in assignments.into_iter().enumerate() {
        let slot_number = index as u32 + 1;
        let id = store.insert_rule(AdvancementRule {
            id: 0,
            source_phase_id,
            source_pool_id: pool_id,
            source_rank: rank,
            target_phase_id,
            target_slot_number: slot_number,
            process_order: slot_number,
        });
        rule_ids.push(id);
    }
    info!(
        source_phase_id,
        target_phase_id,
        rules = rule_ids.len(),
        strategy = ?source.seeding_strategy,
        "generated advancement rules"
    );
    Ok(rule_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::{create_phase, NewPhase};
    use std::collections::HashSet;

    fn make_linked_phases(
        pool_count: u32,
        strategy: SeedingStrategy,
        target_incoming: u32,
    ) -> (DivisionStore, PhaseId, PhaseId) {
        let mut store = DivisionStore::new();
        let division_id = store.create_division("Open", pool_count * 4);
        let source = create_phase(
            &mut store,
            division_id,
            NewPhase {
                name: "Pool Play".to_string(),
                phase_type: PhaseType::Pools,
                incoming_slot_count: pool_count * 4,
                advancing_slot_count: target_incoming,
                pool_count,
                seeding_strategy: strategy,
                include_consolation: false,
            },
        )
        .unwrap();
        let target = create_phase(
            &mut store,
            division_id,
            NewPhase::bracket_round("Bracket", target_incoming, target_incoming / 2),
        )
        .unwrap();
        (store, source, target)
    }

    fn rule_tuples(
        store: &DivisionStore,
        source: PhaseId,
        target: PhaseId,
    ) -> Vec<(Option<PoolId>, u32, u32)> {
        store
            .rules_for_pair(source, target)
            .iter()
            .map(|r| (r.source_pool_id, r.source_rank, r.target_slot_number))
            .collect()
    }

    #[test]
    fn test_snake_two_pools_two_ranks() {
        let (mut store, source, target) = make_linked_phases(2, SeedingStrategy::Snake, 4);
        generate_advancement_rules(&mut store, source, target, Some(2)).unwrap();
        let pools = store.pools_for_phase(source);
        let pool_a = Some(pools[0].id);
        let pool_b = Some(pools[1].id);
        assert_eq!(
            rule_tuples(&store, source, target),
            vec![
                (pool_a, 1, 1),
                (pool_b, 1, 2),
                (pool_b, 2, 3),
                (pool_a, 2, 4),
            ]
        );
    }

    #[test]
    fn test_snake_fills_every_target_slot_once() {
        let (mut store, source, target) = make_linked_phases(3, SeedingStrategy::Snake, 6);
        generate_advancement_rules(&mut store, source, target, Some(2)).unwrap();
        let slots: HashSet<u32> = store
            .rules_for_pair(source, target)
            .iter()
            .map(|r| r.target_slot_number)
            .collect();
        assert_eq!(slots, (1..=6).collect::<HashSet<u32>>());
    }

    #[test]
    fn test_sequential_runs_pool_by_pool() {
        let (mut store, source, target) = make_linked_phases(2, SeedingStrategy::Sequential, 4);
        generate_advancement_rules(&mut store, source, target, Some(2)).unwrap();
        let pools = store.pools_for_phase(source);
        let pool_a = Some(pools[0].id);
        let pool_b = Some(pools[1].id);
        assert_eq!(
            rule_tuples(&store, source, target),
            vec![
                (pool_a, 1, 1),
                (pool_a, 2, 2),
                (pool_b, 1, 3),
                (pool_b, 2, 4),
            ]
        );
    }

    #[test]
    fn test_cross_pool_fixed_mapping() {
        let (mut store, source, target) = make_linked_phases(2, SeedingStrategy::CrossPool, 4);
        generate_advancement_rules(&mut store, source, target, None).unwrap();
        let pools = store.pools_for_phase(source);
        let pool_a = Some(pools[0].id);
        let pool_b = Some(pools[1].id);
        assert_eq!(
            rule_tuples(&store, source, target),
            vec![
                (pool_a, 1, 1),
                (pool_b, 2, 2),
                (pool_b, 1, 3),
                (pool_a, 2, 4),
            ]
        );
    }

    #[test]
    fn test_cross_pool_rejects_other_pool_counts() {
        let (mut store, source, target) = make_linked_phases(3, SeedingStrategy::CrossPool, 6);
        let err = generate_advancement_rules(&mut store, source, target, None).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(store.rules_for_pair(source, target).is_empty());
    }

    #[test]
    fn test_default_advancing_per_pool_from_target() {
        let (mut store, source, target) = make_linked_phases(2, SeedingStrategy::Snake, 4);
        // 4 incoming / 2 pools = 2 per pool
        let rules = generate_advancement_rules(&mut store, source, target, None).unwrap();
        assert_eq!(rules.len(), 4);
    }

    #[test]
    fn test_regeneration_replaces_prior_pair_rules() {
        let (mut store, source, target) = make_linked_phases(2, SeedingStrategy::Snake, 4);
        generate_advancement_rules(&mut store, source, target, Some(2)).unwrap();
        generate_advancement_rules(&mut store, source, target, Some(1)).unwrap();
        let rules = store.rules_for_pair(source, target);
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.source_rank == 1));
    }

    #[test]
    fn test_implicit_single_pool_when_phase_has_no_pools() {
        let mut store = DivisionStore::new();
        let division_id = store.create_division("Open", 4);
        let source = create_phase(
            &mut store,
            division_id,
            NewPhase {
                name: "Round Robin".to_string(),
                phase_type: PhaseType::RoundRobin,
                incoming_slot_count: 4,
                advancing_slot_count: 2,
                pool_count: 1,
                seeding_strategy: SeedingStrategy::Snake,
                include_consolation: false,
            },
        )
        .unwrap();
        let target = create_phase(
            &mut store,
            division_id,
            NewPhase::bracket_round("Final", 2, 1),
        )
        .unwrap();
        generate_advancement_rules(&mut store, source, target, None).unwrap();
        assert_eq!(
            rule_tuples(&store, source, target),
            vec![(None, 1, 1), (None, 2, 2)]
        );
    }
}
