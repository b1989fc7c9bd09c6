use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::{DivisionStore, Phase, Pool, PoolSlot, Slot};
use crate::types::*;

// ── Labels ─────────────────────────────────────────────────────────────

/// Placeholder for an advancing slot, named by competitive significance.
pub fn advancing_label(position: u32) -> String {
    match position {
        1 => "Champion".to_string(),
        2 => "Runner-up".to_string(),
        3 => "3rd Place".to_string(),
        4 => "4th Place".to_string(),
        n => format!("#{n}"),
    }
}

fn pool_name(index: u32) -> String {
    let letter = char::from(b'A' + (index % 26) as u8);
    if index < 26 {
        letter.to_string()
    } else {
        format!("{letter}{}", index / 26 + 1)
    }
}

// ── Phase creation ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPhase {
    pub name: String,
    pub phase_type: PhaseType,
    pub incoming_slot_count: u32,
    pub advancing_slot_count: u32,
    pub pool_count: u32,
    pub seeding_strategy: SeedingStrategy,
    pub include_consolation: bool,
}

impl NewPhase {
    pub fn bracket_round(name: &str, incoming: u32, advancing: u32) -> Self {
        NewPhase {
            name: name.to_string(),
            phase_type: PhaseType::BracketRound,
            incoming_slot_count: incoming,
            advancing_slot_count: advancing,
            pool_count: 1,
            seeding_strategy: SeedingStrategy::Snake,
            include_consolation: false,
        }
    }
}

/// Create a phase with its incoming "Seed i" slots, advancing slots, and
/// (for multi-pool phases) a snake distribution of incoming slots across
/// pools so top seeds do not cluster in one pool.
pub fn create_phase(
    store: &mut DivisionStore,
    division_id: DivisionId,
    params: NewPhase,
) -> EngineResult<PhaseId> {
    store.division(division_id)?;
    if params.incoming_slot_count == 0 {
        return Err(EngineError::validation(
            "Phase needs at least one incoming slot.",
        ));
    }
    if params.pool_count == 0 {
        return Err(EngineError::validation("Pool count must be at least 1."));
    }
    if params.pool_count > MAX_POOL_COUNT {
        return Err(EngineError::validation(format!(
            "Pool count exceeds the limit of {MAX_POOL_COUNT}."
        )));
    }
    if params.pool_count > params.incoming_slot_count {
        return Err(EngineError::validation(
            "Pool count exceeds the incoming slot count.",
        ));
    }

    let next_order = store
        .phases_for_division(division_id)
        .last()
        .map(|p| p.phase_order + 1)
        .unwrap_or(1);

    let phase_id = store.insert_phase(Phase {
        id: 0,
        division_id,
        phase_order: next_order,
        phase_type: params.phase_type,
        name: params.name.clone(),
        incoming_slot_count: params.incoming_slot_count,
        advancing_slot_count: params.advancing_slot_count,
        pool_count: params.pool_count,
        status: PhaseStatus::Pending,
        is_manually_locked: false,
        seeding_strategy: params.seeding_strategy,
        include_consolation: params.include_consolation,
    });

    let mut incoming_ids = Vec::with_capacity(params.incoming_slot_count as usize);
    for number in 1..=params.incoming_slot_count {
        let id = store.insert_slot(Slot {
            id: 0,
            phase_id,
            slot_type: SlotType::Incoming,
            slot_number: number,
            source_type: SlotSourceType::Seeded,
            unit_id: None,
            placeholder_label: format!("Seed {number}"),
        });
        incoming_ids.push(id);
    }
    for number in 1..=params.advancing_slot_count {
        store.insert_slot(Slot {
            id: 0,
            phase_id,
            slot_type: SlotType::Advancing,
            slot_number: number,
            source_type: SlotSourceType::RankFromPhase,
            unit_id: None,
            placeholder_label: advancing_label(number),
        });
    }

    if params.pool_count > 1 {
        let partition = snake_pool_partition(params.incoming_slot_count, params.pool_count);
        for (pool_index, slot_indexes) in partition.iter().enumerate() {
            let pool_id = store.insert_pool(Pool {
                id: 0,
                phase_id,
                pool_name: pool_name(pool_index as u32),
                pool_order: pool_index as u32 + 1,
                slot_count: slot_indexes.len() as u32,
            });
            for (position, slot_index) in slot_indexes.iter().enumerate() {
                store.insert_pool_slot(PoolSlot {
                    pool_id,
                    slot_id: incoming_ids[*slot_index as usize],
                    pool_position: position as u32 + 1,
                });
            }
        }
    }

    info!(
        phase_id,
        division_id,
        order = next_order,
        "created phase \"{}\"",
        params.name
    );
    Ok(phase_id)
}

/// Snake distribution of `total` incoming slots (0-based absolute indexes)
/// across `pool_count` pools: even pools read forward through their block,
/// odd pools read backward, and the last pool absorbs the remainder of an
/// uneven field.
pub fn snake_pool_partition(total: u32, pool_count: u32) -> Vec<Vec<u32>> {
    let slots_per_pool = total.div_ceil(pool_count);
    let mut pools = Vec::with_capacity(pool_count as usize);
    for p in 0..pool_count {
        let mut indexes = Vec::new();
        for i in 0..slots_per_pool {
            let index = if p % 2 == 0 {
                p * slots_per_pool + i
            } else {
                // Reversed block; the high end can fall past the field on
                // the clamped last pool.
                match ((p + 1) * slots_per_pool).checked_sub(1 + i) {
                    Some(v) => v,
                    None => continue,
                }
            };
            if index < total {
                indexes.push(index);
            }
        }
        pools.push(indexes);
    }
    pools
}

// ── Phase update / lock / delete ───────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseUpdate {
    pub name: Option<String>,
    pub status: Option<PhaseStatus>,
    pub seeding_strategy: Option<SeedingStrategy>,
    pub include_consolation: Option<bool>,
}

pub fn update_phase(
    store: &mut DivisionStore,
    phase_id: PhaseId,
    update: PhaseUpdate,
) -> EngineResult<()> {
    let phase = store.phase_mut(phase_id)?;
    if phase.is_manually_locked {
        return Err(EngineError::validation("Phase is manually locked."));
    }
    if let Some(name) = update.name {
        phase.name = name;
    }
    if let Some(status) = update.status {
        phase.status = status;
    }
    if let Some(strategy) = update.seeding_strategy {
        phase.seeding_strategy = strategy;
    }
    if let Some(consolation) = update.include_consolation {
        phase.include_consolation = consolation;
    }
    Ok(())
}

/// The lock toggle itself works on a locked phase; everything else does not.
pub fn set_manual_lock(
    store: &mut DivisionStore,
    phase_id: PhaseId,
    locked: bool,
) -> EngineResult<()> {
    let phase = store.phase_mut(phase_id)?;
    phase.is_manually_locked = locked;
    Ok(())
}

/// Delete a Pending phase, cascading to its slots, pools, encounters and any
/// advancement rule that references it, then renumber the division's
/// remaining phases to a dense 1..N sequence.
pub fn delete_phase(store: &mut DivisionStore, phase_id: PhaseId) -> EngineResult<()> {
    let phase = store.phase(phase_id)?;
    if phase.status != PhaseStatus::Pending {
        return Err(EngineError::validation(
            "Only pending phases can be deleted.",
        ));
    }
    let division_id = phase.division_id;

    store.delete_rules_referencing_phase(phase_id);
    store.delete_encounters_for_phase(phase_id);
    store.remove_pools_for_phase(phase_id);
    store.remove_slots_for_phase(phase_id);
    store.remove_phase(phase_id);

    let remaining = store.phases_for_division(division_id);
    for (index, phase) in remaining.iter().enumerate() {
        let dense = index as u32 + 1;
        if phase.phase_order != dense {
            store.phase_mut(phase.id)?.phase_order = dense;
        }
    }
    info!(phase_id, division_id, "deleted phase and renumbered division");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store_with_division(unit_count: u32) -> (DivisionStore, DivisionId) {
        let mut store = DivisionStore::new();
        let division_id = store.create_division("Open Singles", unit_count);
        (store, division_id)
    }

    fn make_pool_phase(incoming: u32, pools: u32) -> NewPhase {
        NewPhase {
            name: "Pool Play".to_string(),
            phase_type: PhaseType::Pools,
            incoming_slot_count: incoming,
            advancing_slot_count: pools * 2,
            pool_count: pools,
            seeding_strategy: SeedingStrategy::Snake,
            include_consolation: false,
        }
    }

    #[test]
    fn test_snake_partition_even_field() {
        let pools = snake_pool_partition(8, 2);
        assert_eq!(pools, vec![vec![0, 1, 2, 3], vec![7, 6, 5, 4]]);
    }

    #[test]
    fn test_snake_partition_uneven_field_clamps_last_pool() {
        let pools = snake_pool_partition(7, 2);
        assert_eq!(pools[0], vec![0, 1, 2, 3]);
        assert_eq!(pools[1], vec![6, 5, 4]);
        let total: usize = pools.iter().map(|p| p.len()).sum();
        assert_eq!(total, 7);
    }

    #[test]
    fn test_snake_partition_three_pools() {
        let pools = snake_pool_partition(9, 3);
        assert_eq!(pools, vec![vec![0, 1, 2], vec![5, 4, 3], vec![6, 7, 8]]);
    }

    #[test]
    fn test_create_phase_slot_counts_and_labels() {
        let (mut store, division_id) = make_store_with_division(8);
        let phase_id = create_phase(&mut store, division_id, make_pool_phase(8, 2)).unwrap();

        let incoming = store.slots_for_phase(phase_id, SlotType::Incoming);
        assert_eq!(incoming.len(), 8);
        assert_eq!(incoming[0].placeholder_label, "Seed 1");
        assert_eq!(incoming[7].placeholder_label, "Seed 8");

        let advancing = store.slots_for_phase(phase_id, SlotType::Advancing);
        assert_eq!(advancing.len(), 4);
        assert_eq!(advancing[0].placeholder_label, "Champion");
        assert_eq!(advancing[1].placeholder_label, "Runner-up");
        assert_eq!(advancing[2].placeholder_label, "3rd Place");
        assert_eq!(advancing[3].placeholder_label, "4th Place");
    }

    #[test]
    fn test_pool_slot_counts_sum_to_incoming() {
        let (mut store, division_id) = make_store_with_division(11);
        let phase_id = create_phase(&mut store, division_id, make_pool_phase(11, 3)).unwrap();
        let pools = store.pools_for_phase(phase_id);
        assert_eq!(pools.len(), 3);
        let total: u32 = pools.iter().map(|p| p.slot_count).sum();
        assert_eq!(total, 11);
        assert_eq!(pools[0].pool_name, "A");
        assert_eq!(pools[2].pool_name, "C");
    }

    #[test]
    fn test_update_rejected_when_locked() {
        let (mut store, division_id) = make_store_with_division(8);
        let phase_id = create_phase(&mut store, division_id, make_pool_phase(8, 2)).unwrap();
        set_manual_lock(&mut store, phase_id, true).unwrap();
        let err = update_phase(
            &mut store,
            phase_id,
            PhaseUpdate {
                name: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        set_manual_lock(&mut store, phase_id, false).unwrap();
        assert!(update_phase(&mut store, phase_id, PhaseUpdate::default()).is_ok());
    }

    #[test]
    fn test_delete_rejected_unless_pending() {
        let (mut store, division_id) = make_store_with_division(8);
        let phase_id = create_phase(&mut store, division_id, make_pool_phase(8, 2)).unwrap();
        update_phase(
            &mut store,
            phase_id,
            PhaseUpdate {
                status: Some(PhaseStatus::Active),
                ..Default::default()
            },
        )
        .unwrap();
        let err = delete_phase(&mut store, phase_id).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_delete_renumbers_remaining_phases() {
        let (mut store, division_id) = make_store_with_division(16);
        let first = create_phase(&mut store, division_id, make_pool_phase(16, 4)).unwrap();
        let second = create_phase(
            &mut store,
            division_id,
            NewPhase::bracket_round("Semifinal", 4, 2),
        )
        .unwrap();
        let third = create_phase(
            &mut store,
            division_id,
            NewPhase::bracket_round("Final", 2, 1),
        )
        .unwrap();

        delete_phase(&mut store, second).unwrap();
        let phases = store.phases_for_division(division_id);
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].id, first);
        assert_eq!(phases[0].phase_order, 1);
        assert_eq!(phases[1].id, third);
        assert_eq!(phases[1].phase_order, 2);
    }

    #[test]
    fn test_delete_cascades_rules_referencing_phase() {
        use crate::store::AdvancementRule;

        let (mut store, division_id) = make_store_with_division(8);
        let source = create_phase(&mut store, division_id, make_pool_phase(8, 2)).unwrap();
        let target = create_phase(
            &mut store,
            division_id,
            NewPhase::bracket_round("Final", 4, 1),
        )
        .unwrap();
        store.insert_rule(AdvancementRule {
            id: 0,
            source_phase_id: source,
            source_pool_id: None,
            source_rank: 1,
            target_phase_id: target,
            target_slot_number: 1,
            process_order: 1,
        });

        delete_phase(&mut store, target).unwrap();
        assert!(store.rules_for_pair(source, target).is_empty());
    }
}
