use serde::Serialize;
use tracing::{info, warn};

use crate::services::MatchNumbering;
use crate::store::{DivisionStore, Encounter, EncounterSide, Phase, Pool, Slot};
use crate::types::*;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSummary {
    pub phase_id: PhaseId,
    pub encounter_count: u32,
    pub bye_count: u32,
}

/// Generate the encounter set for a phase, replacing any prior set. The
/// phase's slots must already exist; after the structural writes the injected
/// numbering collaborator assigns division-wide sequential numbers. There is
/// no rollback past the first write — callers hold the transaction.
pub fn generate_encounters(
    store: &mut DivisionStore,
    phase_id: PhaseId,
    numbering: &mut dyn MatchNumbering,
) -> EngineResult<GenerationSummary> {
    let phase = store.phase(phase_id)?.clone();
    if phase.incoming_slot_count < MIN_ROUND_ROBIN_SLOTS {
        return Err(EngineError::validation(
            "Encounter generation needs at least two incoming slots.",
        ));
    }

    store.delete_encounters_for_phase(phase_id);

    let encounter_ids = match phase.phase_type {
        PhaseType::RoundRobin | PhaseType::Pools => generate_pool_play(store, &phase)?,
        PhaseType::SingleElimination | PhaseType::Bracket => {
            generate_single_elimination(store, &phase)?
        }
        PhaseType::DoubleElimination => {
            // Known simplification: double elimination currently reuses the
            // single-elimination topology. Tracked, not silent.
            warn!(
                phase_id,
                "double elimination is generated as single elimination"
            );
            generate_single_elimination(store, &phase)?
        }
        PhaseType::BracketRound => generate_bracket_round(store, &phase)?,
    };

    numbering.assign_sequential_numbers(store, phase.division_id)?;

    let bye_count = encounter_ids
        .iter()
        .filter(|id| {
            store
                .encounter(**id)
                .map(|e| e.status == EncounterStatus::Bye)
                .unwrap_or(false)
        })
        .count() as u32;
    info!(
        phase_id,
        encounters = encounter_ids.len(),
        bye_count,
        "generated encounters"
    );
    Ok(GenerationSummary {
        phase_id,
        encounter_count: encounter_ids.len() as u32,
        bye_count,
    })
}

fn side_from_slot(slot: &Slot) -> EncounterSide {
    EncounterSide {
        unit_id: slot.unit_id,
        slot_id: Some(slot.id),
        label: Some(slot.placeholder_label.clone()),
    }
}

fn placeholder_side(label: String) -> EncounterSide {
    EncounterSide {
        unit_id: None,
        slot_id: None,
        label: Some(label),
    }
}

// ── Round robin ────────────────────────────────────────────────────────

fn generate_pool_play(store: &mut DivisionStore, phase: &Phase) -> EngineResult<Vec<EncounterId>> {
    let pools = store.pools_for_phase(phase.id);
    let mut ids = Vec::new();
    if pools.is_empty() {
        let slots = store.slots_for_phase(phase.id, SlotType::Incoming);
        ids.extend(round_robin_for_group(store, phase, None, &slots));
    } else {
        for pool in &pools {
            let mut slots = Vec::with_capacity(pool.slot_count as usize);
            for row in store.pool_slots_for_pool(pool.id) {
                slots.push(store.slot(row.slot_id)?.clone());
            }
            ids.extend(round_robin_for_group(store, phase, Some(pool), &slots));
        }
    }
    Ok(ids)
}

/// Circle-method round robin for one group of slots. The rotation modulus is
/// the number of rounds: n-1 rounds with slot n-1 pinned when n is even,
/// n rounds with one idle slot per round when n is odd. Produces every
/// unordered pair exactly once, n(n-1)/2 encounters in total.
fn round_robin_for_group(
    store: &mut DivisionStore,
    phase: &Phase,
    pool: Option<&Pool>,
    slots: &[Slot],
) -> Vec<EncounterId> {
    let n = slots.len();
    if n < 2 {
        return Vec::new();
    }
    let rounds = if n % 2 == 0 { n - 1 } else { n };
    let mut ids = Vec::new();
    let mut match_in_group = 0u32;

    for r in 1..=rounds {
        for i in 0..n / 2 {
            let home = (r + i) % rounds;
            let mut away = (n - 1 - i + r) % rounds;
            if i == 0 && n % 2 == 0 {
                away = n - 1;
            }
            if home == away || home >= n || away >= n {
                continue;
            }
            match_in_group += 1;
            let label = match pool {
                Some(p) => format!("{}M{match_in_group}", p.pool_name),
                None => format!("M{match_in_group}"),
            };
            let id = store.insert_encounter(Encounter {
                id: 0,
                division_id: phase.division_id,
                phase_id: phase.id,
                pool_id: pool.map(|p| p.id),
                round_type: RoundType::Pool,
                round_number: r as u32,
                round_name: format!("Round {r}"),
                label,
                encounter_number: None,
                sides: [side_from_slot(&slots[home]), side_from_slot(&slots[away])],
                status: EncounterStatus::Scheduled,
                winner_next_encounter_id: None,
                winner_slot_position: None,
                loser_next_encounter_id: None,
                loser_slot_position: None,
            });
            ids.push(id);
        }
    }
    ids
}

// ── Single elimination ─────────────────────────────────────────────────

fn elimination_round_name(round: u32, total_rounds: u32) -> String {
    match total_rounds - round {
        0 => "Final".to_string(),
        1 => "Semifinal".to_string(),
        2 => "Quarterfinal".to_string(),
        _ => format!("Round {round}"),
    }
}

fn elimination_round_code(round: u32, total_rounds: u32) -> String {
    match total_rounds - round {
        0 => "F".to_string(),
        1 => "SF".to_string(),
        2 => "QF".to_string(),
        _ => format!("R{round}"),
    }
}

/// Full single-elimination bracket: bracket size is the next power of two at
/// or above the incoming slot count, first-round encounters bind slot pairs
/// (0,1), (2,3), … in seed order, missing sides become byes, and every
/// non-final encounter points at its winner's next encounter.
fn generate_single_elimination(
    store: &mut DivisionStore,
    phase: &Phase,
) -> EngineResult<Vec<EncounterId>> {
    let slots = store.slots_for_phase(phase.id, SlotType::Incoming);
    let bracket_size = slots.len().max(2).next_power_of_two();
    if bracket_size as u32 > MAX_BRACKET_SIZE {
        return Err(EngineError::validation(format!(
            "Bracket size exceeds the limit of {MAX_BRACKET_SIZE}."
        )));
    }
    let total_rounds = bracket_size.ilog2();

    let mut round_ids: Vec<Vec<EncounterId>> = Vec::with_capacity(total_rounds as usize);
    let mut round_labels: Vec<Vec<String>> = Vec::with_capacity(total_rounds as usize);
    let mut all = Vec::new();

    let first_code = elimination_round_code(1, total_rounds);
    let mut ids = Vec::new();
    let mut labels = Vec::new();
    for m in 0..bracket_size / 2 {
        let side_a = slots.get(m * 2).map(side_from_slot).unwrap_or_default();
        let side_b = slots.get(m * 2 + 1).map(side_from_slot).unwrap_or_default();
        let status = if side_a.slot_id.is_none() || side_b.slot_id.is_none() {
            EncounterStatus::Bye
        } else {
            EncounterStatus::Scheduled
        };
        let label = format!("{first_code}{}", m + 1);
        let id = store.insert_encounter(Encounter {
            id: 0,
            division_id: phase.division_id,
            phase_id: phase.id,
            pool_id: None,
            round_type: RoundType::Bracket,
            round_number: 1,
            round_name: elimination_round_name(1, total_rounds),
            label: label.clone(),
            encounter_number: None,
            sides: [side_a, side_b],
            status,
            winner_next_encounter_id: None,
            winner_slot_position: None,
            loser_next_encounter_id: None,
            loser_slot_position: None,
        });
        ids.push(id);
        labels.push(label);
        all.push(id);
    }
    round_ids.push(ids);
    round_labels.push(labels);

    for round in 2..=total_rounds {
        let code = elimination_round_code(round, total_rounds);
        let prior_labels = round_labels[(round - 2) as usize].clone();
        let count = bracket_size >> round;
        let mut ids = Vec::new();
        let mut labels = Vec::new();
        for m in 0..count {
            let label = format!("{code}{}", m + 1);
            let id = store.insert_encounter(Encounter {
                id: 0,
                division_id: phase.division_id,
                phase_id: phase.id,
                pool_id: None,
                round_type: RoundType::Bracket,
                round_number: round,
                round_name: elimination_round_name(round, total_rounds),
                label: label.clone(),
                encounter_number: None,
                sides: [
                    placeholder_side(format!("Winner {}", prior_labels[m * 2])),
                    placeholder_side(format!("Winner {}", prior_labels[m * 2 + 1])),
                ],
                status: EncounterStatus::Scheduled,
                winner_next_encounter_id: None,
                winner_slot_position: None,
                loser_next_encounter_id: None,
                loser_slot_position: None,
            });
            ids.push(id);
            labels.push(label);
            all.push(id);
        }
        round_ids.push(ids);
        round_labels.push(labels);
    }

    for round_index in 0..round_ids.len().saturating_sub(1) {
        for (index, id) in round_ids[round_index].clone().into_iter().enumerate() {
            let next_id = round_ids[round_index + 1][index / 2];
            let encounter = store.encounter_mut(id)?;
            encounter.winner_next_encounter_id = Some(next_id);
            encounter.winner_slot_position = Some((index % 2) as u8 + 1);
        }
    }

    Ok(all)
}

// ── Single bracket round ───────────────────────────────────────────────

fn bracket_round_name(match_count: usize) -> String {
    match match_count {
        1 => "Final".to_string(),
        2 => "Semifinal".to_string(),
        4 => "Quarterfinal".to_string(),
        _ => "Bracket Round".to_string(),
    }
}

fn bracket_round_code(match_count: usize) -> String {
    match match_count {
        1 => "F".to_string(),
        2 => "SF".to_string(),
        4 => "QF".to_string(),
        _ => "BR".to_string(),
    }
}

/// One standalone bracket round. An odd field gives the top seed an implicit
/// bye (no encounter is created for it); an optional "3rd Place" consolation
/// encounter is loser-linked from the first two matches.
fn generate_bracket_round(
    store: &mut DivisionStore,
    phase: &Phase,
) -> EngineResult<Vec<EncounterId>> {
    let slots = store.slots_for_phase(phase.id, SlotType::Incoming);
    let n = slots.len();
    let match_count = n / 2;
    let offset = n % 2;

    let round_name = if phase.name.is_empty() {
        bracket_round_name(match_count)
    } else {
        phase.name.clone()
    };
    let code = bracket_round_code(match_count);

    let mut ids = Vec::new();
    let mut labels = Vec::new();
    for m in 0..match_count {
        let label = format!("{code}{}", m + 1);
        let id = store.insert_encounter(Encounter {
            id: 0,
            division_id: phase.division_id,
            phase_id: phase.id,
            pool_id: None,
            round_type: RoundType::Bracket,
            round_number: 1,
            round_name: round_name.clone(),
            label: label.clone(),
            encounter_number: None,
            sides: [
                side_from_slot(&slots[offset + m * 2]),
                side_from_slot(&slots[offset + m * 2 + 1]),
            ],
            status: EncounterStatus::Scheduled,
            winner_next_encounter_id: None,
            winner_slot_position: None,
            loser_next_encounter_id: None,
            loser_slot_position: None,
        });
        ids.push(id);
        labels.push(label);
    }

    if phase.include_consolation && match_count >= 2 {
        let consolation_id = store.insert_encounter(Encounter {
            id: 0,
            division_id: phase.division_id,
            phase_id: phase.id,
            pool_id: None,
            round_type: RoundType::Consolation,
            round_number: 1,
            round_name: "3rd Place".to_string(),
            label: "3P".to_string(),
            encounter_number: None,
            sides: [
                placeholder_side(format!("Loser {}", labels[0])),
                placeholder_side(format!("Loser {}", labels[1])),
            ],
            status: EncounterStatus::Scheduled,
            winner_next_encounter_id: None,
            winner_slot_position: None,
            loser_next_encounter_id: None,
            loser_slot_position: None,
        });
        for (position, id) in ids.iter().take(2).enumerate() {
            let encounter = store.encounter_mut(*id)?;
            encounter.loser_next_encounter_id = Some(consolation_id);
            encounter.loser_slot_position = Some(position as u8 + 1);
        }
        ids.push(consolation_id);
    }

    Ok(ids)
}
