use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::templates::StructureDefinition;
use crate::types::*;

// ── Records ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Division {
    pub id: DivisionId,
    pub name: String,
    pub unit_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    pub id: PhaseId,
    pub division_id: DivisionId,
    pub phase_order: u32,
    pub phase_type: PhaseType,
    pub name: String,
    pub incoming_slot_count: u32,
    pub advancing_slot_count: u32,
    pub pool_count: u32,
    pub status: PhaseStatus,
    pub is_manually_locked: bool,
    pub seeding_strategy: SeedingStrategy,
    pub include_consolation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: SlotId,
    pub phase_id: PhaseId,
    pub slot_type: SlotType,
    pub slot_number: u32,
    pub source_type: SlotSourceType,
    pub unit_id: Option<UnitId>,
    pub placeholder_label: String,
}

impl Slot {
    pub fn is_resolved(&self) -> bool {
        self.unit_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: PoolId,
    pub phase_id: PhaseId,
    pub pool_name: String,
    pub pool_order: u32,
    pub slot_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSlot {
    pub pool_id: PoolId,
    pub slot_id: SlotId,
    pub pool_position: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancementRule {
    pub id: RuleId,
    pub source_phase_id: PhaseId,
    pub source_pool_id: Option<PoolId>,
    pub source_rank: u32,
    pub target_phase_id: PhaseId,
    pub target_slot_number: u32,
    pub process_order: u32,
}

/// One side of an encounter: a resolved unit, an unresolved slot reference,
/// or nothing (a bye side). The label is what overlays show until resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterSide {
    pub unit_id: Option<UnitId>,
    pub slot_id: Option<SlotId>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    pub id: EncounterId,
    pub division_id: DivisionId,
    pub phase_id: PhaseId,
    pub pool_id: Option<PoolId>,
    pub round_type: RoundType,
    pub round_number: u32,
    pub round_name: String,
    /// Short handle like "QF2", used to build "Winner QF2" placeholders.
    pub label: String,
    /// Division-wide sequential number, assigned by the numbering
    /// collaborator after generation — never computed here.
    pub encounter_number: Option<u32>,
    pub sides: [EncounterSide; 2],
    pub status: EncounterStatus,
    pub winner_next_encounter_id: Option<EncounterId>,
    pub winner_slot_position: Option<u8>,
    pub loser_next_encounter_id: Option<EncounterId>,
    pub loser_slot_position: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTemplate {
    pub id: TemplateId,
    pub name: String,
    pub version: u32,
    pub is_system: bool,
    pub is_active: bool,
    pub min_units: u32,
    pub max_units: u32,
    pub default_units: u32,
    pub definition: StructureDefinition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── In-memory store ────────────────────────────────────────────────────

/// Persistence collaborator for the engine. Everything lives in HashMaps
/// keyed by id; ordered reads sort on the way out. Callers own the
/// transaction boundary — the store itself never rolls anything back.
#[derive(Default)]
pub struct DivisionStore {
    next_id: u64,
    divisions: HashMap<DivisionId, Division>,
    phases: HashMap<PhaseId, Phase>,
    slots: HashMap<SlotId, Slot>,
    pools: HashMap<PoolId, Pool>,
    pool_slots: Vec<PoolSlot>,
    rules: HashMap<RuleId, AdvancementRule>,
    encounters: HashMap<EncounterId, Encounter>,
    templates: HashMap<TemplateId, PhaseTemplate>,
}

impl DivisionStore {
    pub fn new() -> Self {
        DivisionStore::default()
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // ── Divisions ──────────────────────────────────────────────────────

    pub fn create_division(&mut self, name: &str, unit_count: u32) -> DivisionId {
        let id = self.alloc_id();
        self.divisions.insert(
            id,
            Division {
                id,
                name: name.to_string(),
                unit_count,
            },
        );
        id
    }

    pub fn division(&self, id: DivisionId) -> EngineResult<&Division> {
        self.divisions
            .get(&id)
            .ok_or_else(|| EngineError::not_found("Division not found."))
    }

    pub fn set_division_unit_count(&mut self, id: DivisionId, unit_count: u32) -> EngineResult<()> {
        let division = self
            .divisions
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("Division not found."))?;
        division.unit_count = unit_count;
        Ok(())
    }

    // ── Phases ─────────────────────────────────────────────────────────

    pub fn insert_phase(&mut self, mut phase: Phase) -> PhaseId {
        let id = self.alloc_id();
        phase.id = id;
        self.phases.insert(id, phase);
        id
    }

    pub fn phase(&self, id: PhaseId) -> EngineResult<&Phase> {
        self.phases
            .get(&id)
            .ok_or_else(|| EngineError::not_found("Phase not found."))
    }

    pub fn phase_mut(&mut self, id: PhaseId) -> EngineResult<&mut Phase> {
        self.phases
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("Phase not found."))
    }

    /// Phases of a division ordered by `phase_order`.
    pub fn phases_for_division(&self, division_id: DivisionId) -> Vec<Phase> {
        let mut phases: Vec<Phase> = self
            .phases
            .values()
            .filter(|p| p.division_id == division_id)
            .cloned()
            .collect();
        phases.sort_by_key(|p| p.phase_order);
        phases
    }

    pub fn remove_phase(&mut self, id: PhaseId) {
        self.phases.remove(&id);
    }

    // ── Slots ──────────────────────────────────────────────────────────

    pub fn insert_slot(&mut self, mut slot: Slot) -> SlotId {
        let id = self.alloc_id();
        slot.id = id;
        self.slots.insert(id, slot);
        id
    }

    pub fn slot(&self, id: SlotId) -> EngineResult<&Slot> {
        self.slots
            .get(&id)
            .ok_or_else(|| EngineError::not_found("Slot not found."))
    }

    /// Slots of one type within a phase, ordered by slot number.
    pub fn slots_for_phase(&self, phase_id: PhaseId, slot_type: SlotType) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self
            .slots
            .values()
            .filter(|s| s.phase_id == phase_id && s.slot_type == slot_type)
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.slot_number);
        slots
    }

    pub fn find_slot_mut(
        &mut self,
        phase_id: PhaseId,
        slot_type: SlotType,
        slot_number: u32,
    ) -> EngineResult<&mut Slot> {
        self.slots
            .values_mut()
            .find(|s| {
                s.phase_id == phase_id && s.slot_type == slot_type && s.slot_number == slot_number
            })
            .ok_or_else(|| EngineError::not_found("Slot not found."))
    }

    pub fn remove_slots_for_phase(&mut self, phase_id: PhaseId) {
        self.slots.retain(|_, s| s.phase_id != phase_id);
    }

    // ── Pools ──────────────────────────────────────────────────────────

    pub fn insert_pool(&mut self, mut pool: Pool) -> PoolId {
        let id = self.alloc_id();
        pool.id = id;
        self.pools.insert(id, pool);
        id
    }

    pub fn pool(&self, id: PoolId) -> EngineResult<&Pool> {
        self.pools
            .get(&id)
            .ok_or_else(|| EngineError::not_found("Pool not found."))
    }

    /// Pools of a phase ordered by `pool_order`.
    pub fn pools_for_phase(&self, phase_id: PhaseId) -> Vec<Pool> {
        let mut pools: Vec<Pool> = self
            .pools
            .values()
            .filter(|p| p.phase_id == phase_id)
            .cloned()
            .collect();
        pools.sort_by_key(|p| p.pool_order);
        pools
    }

    pub fn remove_pools_for_phase(&mut self, phase_id: PhaseId) {
        let pool_ids: Vec<PoolId> = self
            .pools
            .values()
            .filter(|p| p.phase_id == phase_id)
            .map(|p| p.id)
            .collect();
        self.pool_slots.retain(|ps| !pool_ids.contains(&ps.pool_id));
        self.pools.retain(|_, p| p.phase_id != phase_id);
    }

    pub fn insert_pool_slot(&mut self, pool_slot: PoolSlot) {
        self.pool_slots.push(pool_slot);
    }

    /// Join rows for one pool, ordered by pool position.
    pub fn pool_slots_for_pool(&self, pool_id: PoolId) -> Vec<PoolSlot> {
        let mut rows: Vec<PoolSlot> = self
            .pool_slots
            .iter()
            .filter(|ps| ps.pool_id == pool_id)
            .cloned()
            .collect();
        rows.sort_by_key(|ps| ps.pool_position);
        rows
    }

    // ── Advancement rules ──────────────────────────────────────────────

    pub fn insert_rule(&mut self, mut rule: AdvancementRule) -> RuleId {
        let id = self.alloc_id();
        rule.id = id;
        self.rules.insert(id, rule);
        id
    }

    /// Rules for one (source, target) phase pair, ordered by process order.
    pub fn rules_for_pair(&self, source: PhaseId, target: PhaseId) -> Vec<AdvancementRule> {
        let mut rules: Vec<AdvancementRule> = self
            .rules
            .values()
            .filter(|r| r.source_phase_id == source && r.target_phase_id == target)
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.process_order);
        rules
    }

    /// Rules feeding one target phase, ordered by process order.
    pub fn rules_for_target(&self, target: PhaseId) -> Vec<AdvancementRule> {
        let mut rules: Vec<AdvancementRule> = self
            .rules
            .values()
            .filter(|r| r.target_phase_id == target)
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.process_order);
        rules
    }

    pub fn delete_rules_for_pair(&mut self, source: PhaseId, target: PhaseId) {
        self.rules
            .retain(|_, r| !(r.source_phase_id == source && r.target_phase_id == target));
    }

    /// Drops every rule that names the phase as source or target.
    pub fn delete_rules_referencing_phase(&mut self, phase_id: PhaseId) {
        self.rules
            .retain(|_, r| r.source_phase_id != phase_id && r.target_phase_id != phase_id);
    }

    // ── Encounters ─────────────────────────────────────────────────────

    pub fn insert_encounter(&mut self, mut encounter: Encounter) -> EncounterId {
        let id = self.alloc_id();
        encounter.id = id;
        self.encounters.insert(id, encounter);
        id
    }

    pub fn encounter(&self, id: EncounterId) -> EngineResult<&Encounter> {
        self.encounters
            .get(&id)
            .ok_or_else(|| EngineError::not_found("Encounter not found."))
    }

    pub fn encounter_mut(&mut self, id: EncounterId) -> EngineResult<&mut Encounter> {
        self.encounters
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("Encounter not found."))
    }

    /// Encounters of a phase in creation order.
    pub fn encounters_for_phase(&self, phase_id: PhaseId) -> Vec<Encounter> {
        let mut encounters: Vec<Encounter> = self
            .encounters
            .values()
            .filter(|e| e.phase_id == phase_id)
            .cloned()
            .collect();
        encounters.sort_by_key(|e| e.id);
        encounters
    }

    /// Encounters of a whole division ordered by (phase order, creation id).
    pub fn encounters_for_division(&self, division_id: DivisionId) -> Vec<Encounter> {
        let mut encounters: Vec<Encounter> = self
            .encounters
            .values()
            .filter(|e| e.division_id == division_id)
            .cloned()
            .collect();
        encounters.sort_by_key(|e| {
            let order = self
                .phases
                .get(&e.phase_id)
                .map(|p| p.phase_order)
                .unwrap_or(u32::MAX);
            (order, e.id)
        });
        encounters
    }

    pub fn delete_encounters_for_phase(&mut self, phase_id: PhaseId) {
        self.encounters.retain(|_, e| e.phase_id != phase_id);
    }

    // ── Templates ──────────────────────────────────────────────────────

    pub fn insert_template(&mut self, mut template: PhaseTemplate) -> TemplateId {
        let id = self.alloc_id();
        template.id = id;
        self.templates.insert(id, template);
        id
    }

    pub fn template(&self, id: TemplateId) -> EngineResult<&PhaseTemplate> {
        self.templates
            .get(&id)
            .ok_or_else(|| EngineError::not_found("Template not found."))
    }

    pub fn template_mut(&mut self, id: TemplateId) -> EngineResult<&mut PhaseTemplate> {
        self.templates
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found("Template not found."))
    }

    /// Active templates, system first, then by name.
    pub fn active_templates(&self) -> Vec<PhaseTemplate> {
        let mut templates: Vec<PhaseTemplate> = self
            .templates
            .values()
            .filter(|t| t.is_active)
            .cloned()
            .collect();
        templates.sort_by(|a, b| {
            b.is_system
                .cmp(&a.is_system)
                .then_with(|| a.name.cmp(&b.name))
        });
        templates
    }
}
