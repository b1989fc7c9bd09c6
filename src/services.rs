use tracing::info;

use crate::store::DivisionStore;
use crate::types::*;

// ── Division-wide match numbering ──────────────────────────────────────

/// Assigns the dense, division-wide sequential encounter number. The engine
/// never computes this locally; generation calls the collaborator once after
/// its structural writes and the operation is not complete until it returns.
pub trait MatchNumbering {
    fn assign_sequential_numbers(
        &mut self,
        store: &mut DivisionStore,
        division_id: DivisionId,
    ) -> EngineResult<u32>;
}

/// Default collaborator: numbers encounters 1..N ordered by
/// (phase order, creation id), the same ordering the stored routine used.
#[derive(Default)]
pub struct StoreNumbering;

impl MatchNumbering for StoreNumbering {
    fn assign_sequential_numbers(
        &mut self,
        store: &mut DivisionStore,
        division_id: DivisionId,
    ) -> EngineResult<u32> {
        let ordered: Vec<EncounterId> = store
            .encounters_for_division(division_id)
            .iter()
            .map(|e| e.id)
            .collect();
        let mut number = 0u32;
        for id in &ordered {
            number += 1;
            store.encounter_mut(*id)?.encounter_number = Some(number);
        }
        Ok(number)
    }
}

// ── Bye resolution ─────────────────────────────────────────────────────

/// Resolves all Bye encounters of a phase by advancing the sole occupant,
/// returning how many byes were processed.
pub trait ByeResolver {
    fn resolve_byes(&mut self, store: &mut DivisionStore, phase_id: PhaseId) -> EngineResult<u32>;
}

#[derive(Default)]
pub struct StoreByeResolver;

impl ByeResolver for StoreByeResolver {
    fn resolve_byes(&mut self, store: &mut DivisionStore, phase_id: PhaseId) -> EngineResult<u32> {
        store.phase(phase_id)?;
        let byes: Vec<EncounterId> = store
            .encounters_for_phase(phase_id)
            .iter()
            .filter(|e| e.status == EncounterStatus::Bye)
            .map(|e| e.id)
            .collect();

        let mut processed = 0u32;
        for id in byes {
            let (occupant, next, position) = {
                let encounter = store.encounter(id)?;
                let occupant = encounter
                    .sides
                    .iter()
                    .find(|side| side.unit_id.is_some() || side.slot_id.is_some())
                    .cloned();
                (
                    occupant,
                    encounter.winner_next_encounter_id,
                    encounter.winner_slot_position,
                )
            };
            if let (Some(occupant), Some(next_id), Some(position)) = (occupant, next, position) {
                let next = store.encounter_mut(next_id)?;
                let index = (position.saturating_sub(1)) as usize;
                if index < next.sides.len() {
                    next.sides[index] = occupant;
                }
            }
            store.encounter_mut(id)?.status = EncounterStatus::Completed;
            processed += 1;
        }
        info!(phase_id, processed, "resolved byes");
        Ok(processed)
    }
}

// ── Manual exit-slot override ──────────────────────────────────────────

/// TD discretionary override: force an Advancing slot to a concrete unit,
/// bypassing rank-based advancement. The engine validates the caller's
/// authorization context; the resolution itself is a single slot write.
pub fn force_exit_slot(
    store: &mut DivisionStore,
    auth: &AuthContext,
    phase_id: PhaseId,
    slot_number: u32,
    unit_id: UnitId,
) -> EngineResult<()> {
    if !auth.can_mutate() {
        return Err(EngineError::forbidden(
            "Only an owner or admin can override exit slots.",
        ));
    }
    store.phase(phase_id)?;
    let slot = store.find_slot_mut(phase_id, SlotType::Advancing, slot_number)?;
    slot.unit_id = Some(unit_id);
    slot.source_type = SlotSourceType::Manual;
    info!(phase_id, slot_number, unit_id, "forced exit slot resolution");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::{create_phase, NewPhase};

    #[test]
    fn test_force_exit_slot_requires_mutating_role() {
        let mut store = DivisionStore::new();
        let division_id = store.create_division("Open", 4);
        let phase_id = create_phase(
            &mut store,
            division_id,
            NewPhase::bracket_round("Final", 2, 1),
        )
        .unwrap();

        let err =
            force_exit_slot(&mut store, &AuthContext::viewer(), phase_id, 1, 42).unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));

        force_exit_slot(&mut store, &AuthContext::owner(), phase_id, 1, 42).unwrap();
        let slot = store
            .slots_for_phase(phase_id, SlotType::Advancing)
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(slot.unit_id, Some(42));
        assert_eq!(slot.source_type, SlotSourceType::Manual);
        assert!(slot.is_resolved());
    }
}
