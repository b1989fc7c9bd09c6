use crate::advancement;
use crate::encounters::{self, GenerationSummary};
use crate::phases::{self, NewPhase, PhaseUpdate};
use crate::services::{self, ByeResolver, StoreByeResolver, StoreNumbering};
use crate::store::{AdvancementRule, Encounter, Phase, PhaseTemplate};
use crate::templates::{self, ApplyOptions, ApplyReport, NewTemplate, TemplateUpdate};
use crate::types::*;

// ── Helpers ─────────────────────────────────────────────────────────────

/// Lock the engine state, then call `f` with it. One lock per command keeps
/// every operation a single serialized sequence against the store.
fn with_engine<F, R>(engine: &SharedEngine, f: F) -> EngineResult<R>
where
    F: FnOnce(&mut EngineState) -> EngineResult<R>,
{
    let mut guard = engine
        .lock()
        .map_err(|_| EngineError::validation("Engine state lock is poisoned."))?;
    f(&mut guard)
}

fn require_mutation(auth: &AuthContext) -> EngineResult<()> {
    if !auth.can_mutate() {
        return Err(EngineError::forbidden(
            "This operation requires an owner or admin role.",
        ));
    }
    Ok(())
}

// ── Division commands ───────────────────────────────────────────────────

pub fn create_division(
    engine: &SharedEngine,
    auth: &AuthContext,
    name: &str,
    unit_count: u32,
) -> EngineResult<DivisionId> {
    require_mutation(auth)?;
    with_engine(engine, |state| Ok(state.store.create_division(name, unit_count)))
}

pub fn set_division_unit_count(
    engine: &SharedEngine,
    auth: &AuthContext,
    division_id: DivisionId,
    unit_count: u32,
) -> EngineResult<()> {
    require_mutation(auth)?;
    with_engine(engine, |state| {
        state.store.set_division_unit_count(division_id, unit_count)
    })
}

// ── Phase commands ──────────────────────────────────────────────────────

pub fn create_phase(
    engine: &SharedEngine,
    auth: &AuthContext,
    division_id: DivisionId,
    params: NewPhase,
) -> EngineResult<PhaseId> {
    require_mutation(auth)?;
    with_engine(engine, |state| {
        phases::create_phase(&mut state.store, division_id, params)
    })
}

pub fn update_phase(
    engine: &SharedEngine,
    auth: &AuthContext,
    phase_id: PhaseId,
    update: PhaseUpdate,
) -> EngineResult<()> {
    require_mutation(auth)?;
    with_engine(engine, |state| {
        phases::update_phase(&mut state.store, phase_id, update)
    })
}

pub fn set_phase_lock(
    engine: &SharedEngine,
    auth: &AuthContext,
    phase_id: PhaseId,
    locked: bool,
) -> EngineResult<()> {
    require_mutation(auth)?;
    with_engine(engine, |state| {
        phases::set_manual_lock(&mut state.store, phase_id, locked)
    })
}

pub fn delete_phase(
    engine: &SharedEngine,
    auth: &AuthContext,
    phase_id: PhaseId,
) -> EngineResult<()> {
    require_mutation(auth)?;
    with_engine(engine, |state| {
        phases::delete_phase(&mut state.store, phase_id)
    })
}

pub fn list_phases(engine: &SharedEngine, division_id: DivisionId) -> EngineResult<Vec<Phase>> {
    with_engine(engine, |state| {
        state.store.division(division_id)?;
        Ok(state.store.phases_for_division(division_id))
    })
}

// ── Encounter commands ──────────────────────────────────────────────────

pub fn generate_encounters(
    engine: &SharedEngine,
    auth: &AuthContext,
    phase_id: PhaseId,
) -> EngineResult<GenerationSummary> {
    require_mutation(auth)?;
    with_engine(engine, |state| {
        encounters::generate_encounters(&mut state.store, phase_id, &mut StoreNumbering)
    })
}

pub fn list_encounters(engine: &SharedEngine, phase_id: PhaseId) -> EngineResult<Vec<Encounter>> {
    with_engine(engine, |state| {
        state.store.phase(phase_id)?;
        Ok(state.store.encounters_for_phase(phase_id))
    })
}

pub fn resolve_byes(
    engine: &SharedEngine,
    auth: &AuthContext,
    phase_id: PhaseId,
) -> EngineResult<u32> {
    require_mutation(auth)?;
    with_engine(engine, |state| {
        StoreByeResolver.resolve_byes(&mut state.store, phase_id)
    })
}

pub fn force_exit_slot(
    engine: &SharedEngine,
    auth: &AuthContext,
    phase_id: PhaseId,
    slot_number: u32,
    unit_id: UnitId,
) -> EngineResult<()> {
    with_engine(engine, |state| {
        services::force_exit_slot(&mut state.store, auth, phase_id, slot_number, unit_id)
    })
}

// ── Advancement commands ────────────────────────────────────────────────

pub fn generate_advancement_rules(
    engine: &SharedEngine,
    auth: &AuthContext,
    source_phase_id: PhaseId,
    target_phase_id: PhaseId,
    advancing_per_pool: Option<u32>,
) -> EngineResult<Vec<RuleId>> {
    require_mutation(auth)?;
    with_engine(engine, |state| {
        advancement::generate_advancement_rules(
            &mut state.store,
            source_phase_id,
            target_phase_id,
            advancing_per_pool,
        )
    })
}

pub fn list_rules_for_target(
    engine: &SharedEngine,
    target_phase_id: PhaseId,
) -> EngineResult<Vec<AdvancementRule>> {
    with_engine(engine, |state| {
        state.store.phase(target_phase_id)?;
        Ok(state.store.rules_for_target(target_phase_id))
    })
}

// ── Template commands ───────────────────────────────────────────────────

pub fn create_template(
    engine: &SharedEngine,
    auth: &AuthContext,
    template: NewTemplate,
) -> EngineResult<TemplateId> {
    with_engine(engine, |state| {
        templates::create_template(&mut state.store, auth, template)
    })
}

pub fn update_template(
    engine: &SharedEngine,
    auth: &AuthContext,
    template_id: TemplateId,
    update: TemplateUpdate,
) -> EngineResult<()> {
    with_engine(engine, |state| {
        templates::update_template(&mut state.store, auth, template_id, update)
    })
}

pub fn deactivate_template(
    engine: &SharedEngine,
    auth: &AuthContext,
    template_id: TemplateId,
) -> EngineResult<()> {
    with_engine(engine, |state| {
        templates::deactivate_template(&mut state.store, auth, template_id)
    })
}

pub fn list_templates(engine: &SharedEngine) -> EngineResult<Vec<PhaseTemplate>> {
    with_engine(engine, |state| Ok(state.store.active_templates()))
}

pub fn apply_template(
    engine: &SharedEngine,
    auth: &AuthContext,
    template_id: TemplateId,
    division_id: DivisionId,
    options: ApplyOptions,
) -> EngineResult<ApplyReport> {
    require_mutation(auth)?;
    with_engine(engine, |state| {
        templates::apply_template(&mut state.store, template_id, division_id, options)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{
        AdvancementPlan, BracketGenerator, StructureDefinition, StructurePlan,
    };

    fn make_engine() -> SharedEngine {
        new_shared_engine()
    }

    fn make_template() -> NewTemplate {
        NewTemplate {
            name: "Open Bracket".to_string(),
            is_system: false,
            min_units: 2,
            max_units: 64,
            default_units: 8,
            definition: StructureDefinition {
                plan: StructurePlan::Bracket(BracketGenerator::default()),
                rules: AdvancementPlan::Auto,
            },
        }
    }

    #[test]
    fn test_viewer_cannot_mutate() {
        let engine = make_engine();
        let viewer = AuthContext::viewer();
        let err = create_division(&engine, &viewer, "Open", 8).unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
        let err = generate_encounters(&engine, &viewer, 1).unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let engine = make_engine();
        let err = list_phases(&engine, 999).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        let err = list_encounters(&engine, 999).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_apply_template_then_generate_full_division() {
        let engine = make_engine();
        let admin = AuthContext::admin();
        let division_id = create_division(&engine, &admin, "Open", 5).unwrap();
        let template_id = create_template(&engine, &admin, make_template()).unwrap();

        let report =
            apply_template(&engine, &admin, template_id, division_id, ApplyOptions::default())
                .unwrap();
        assert_eq!(report.unit_count, 5);
        assert_eq!(report.phase_ids.len(), 3);

        let mut total = 0u32;
        for phase_id in &report.phase_ids {
            total += generate_encounters(&engine, &admin, *phase_id)
                .unwrap()
                .encounter_count;
        }
        // 4 + 2 + 1 bracket-round encounters
        assert_eq!(total, 7);

        // numbering is dense across the whole division
        let mut numbers = Vec::new();
        for phase_id in &report.phase_ids {
            for encounter in list_encounters(&engine, *phase_id).unwrap() {
                numbers.push(encounter.encounter_number.unwrap());
            }
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=total).collect::<Vec<u32>>());
    }

    #[test]
    fn test_resolve_byes_counts_processed() {
        let engine = make_engine();
        let admin = AuthContext::admin();
        let division_id = create_division(&engine, &admin, "Open", 5).unwrap();
        let phase_id = create_phase(
            &engine,
            &admin,
            division_id,
            NewPhase {
                name: String::new(),
                phase_type: PhaseType::SingleElimination,
                incoming_slot_count: 5,
                advancing_slot_count: 1,
                pool_count: 1,
                seeding_strategy: SeedingStrategy::Snake,
                include_consolation: false,
            },
        )
        .unwrap();

        let summary = generate_encounters(&engine, &admin, phase_id).unwrap();
        assert_eq!(summary.bye_count, 2);
        let processed = resolve_byes(&engine, &admin, phase_id).unwrap();
        assert_eq!(processed, 2);

        let encounters = list_encounters(&engine, phase_id).unwrap();
        assert!(encounters
            .iter()
            .all(|e| e.status != EncounterStatus::Bye));
        // the sole occupant of the first bye landed in its next encounter
        let bye = encounters
            .iter()
            .find(|e| e.status == EncounterStatus::Completed && e.sides[1].slot_id.is_none())
            .unwrap();
        let next = encounters
            .iter()
            .find(|e| Some(e.id) == bye.winner_next_encounter_id)
            .unwrap();
        let position = bye.winner_slot_position.unwrap() as usize - 1;
        assert_eq!(next.sides[position].slot_id, bye.sides[0].slot_id);
    }
}
