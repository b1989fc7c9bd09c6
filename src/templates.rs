use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::min;
use tracing::info;

use crate::advancement::generate_advancement_rules;
use crate::phases::{create_phase, NewPhase};
use crate::store::{AdvancementRule, DivisionStore, PhaseTemplate};
use crate::types::*;

// ── Structure definition ───────────────────────────────────────────────

/// Parsed form of a template's structure document. The raw key/value tree is
/// inspected exactly once, here; the generation code only ever sees this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureDefinition {
    pub plan: StructurePlan,
    pub rules: AdvancementPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StructurePlan {
    /// Literal ordered phase list.
    Fixed(Vec<PhaseDescriptor>),
    /// Bracket unwound from the apply-time unit count.
    Bracket(BracketGenerator),
    /// Pool play sized by the unit count, then the bracket unwinding.
    PoolPlusBracket(PoolBracketGenerator),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDescriptor {
    pub name: Option<String>,
    pub phase_type: PhaseType,
    pub incoming_slot_count: u32,
    pub advancing_slot_count: u32,
    #[serde(default = "default_pool_count")]
    pub pool_count: u32,
    #[serde(default)]
    pub include_consolation: bool,
    #[serde(default)]
    pub seeding_strategy: Option<SeedingStrategy>,
}

fn default_pool_count() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BracketGenerator {
    pub include_consolation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolBracketGenerator {
    pub pool_size: u32,
    pub advance_per_pool: u32,
    #[serde(default)]
    pub include_consolation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdvancementPlan {
    /// Pair each consecutive phase 1:1 on rank.
    Auto,
    Explicit(Vec<ExplicitRule>),
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplicitRule {
    pub source_phase_order: u32,
    /// 1-based pool order within the source phase, when pool-scoped.
    #[serde(default)]
    pub source_pool_index: Option<u32>,
    pub source_rank: u32,
    pub target_phase_order: u32,
    pub target_slot_number: u32,
}

// ── Document parsing ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StructureDocument {
    is_flexible: bool,
    phases: Option<Vec<PhaseDescriptor>>,
    generate_bracket: Option<BracketGenerator>,
    generate_format: Option<PoolBracketGenerator>,
    advancement_rules: Option<Value>,
}

/// Parse a structure document from its key/value tree. Every malformed shape
/// is a `Parse` error raised before any store mutation.
pub fn parse_structure_definition(value: &Value) -> EngineResult<StructureDefinition> {
    let doc: StructureDocument = serde_json::from_value(value.clone())
        .map_err(|e| EngineError::parse(format!("Invalid structure definition: {e}.")))?;

    let plan = if doc.is_flexible {
        if doc.phases.is_some() {
            return Err(EngineError::parse(
                "Flexible definitions cannot list literal phases.",
            ));
        }
        match (doc.generate_bracket, doc.generate_format) {
            (Some(bracket), None) => StructurePlan::Bracket(bracket),
            (None, Some(format)) => {
                if format.pool_size < 2 {
                    return Err(EngineError::parse("Pool size must be at least 2."));
                }
                if format.advance_per_pool == 0 {
                    return Err(EngineError::parse("Advance per pool must be at least 1."));
                }
                StructurePlan::PoolPlusBracket(format)
            }
            (Some(_), Some(_)) => {
                return Err(EngineError::parse(
                    "Flexible definitions take exactly one generator.",
                ));
            }
            (None, None) => {
                return Err(EngineError::parse("Flexible definitions need a generator."));
            }
        }
    } else {
        if doc.generate_bracket.is_some() || doc.generate_format.is_some() {
            return Err(EngineError::parse(
                "Fixed definitions cannot carry generators.",
            ));
        }
        let phases = doc.phases.unwrap_or_default();
        if phases.is_empty() {
            return Err(EngineError::parse(
                "Fixed definitions need at least one phase.",
            ));
        }
        StructurePlan::Fixed(phases)
    };

    let rules = match doc.advancement_rules {
        None => AdvancementPlan::None,
        Some(Value::String(token)) if token == "auto" => AdvancementPlan::Auto,
        Some(Value::String(token)) => {
            return Err(EngineError::parse(format!(
                "Unknown advancement rule token \"{token}\"."
            )));
        }
        Some(array @ Value::Array(_)) => {
            let rules: Vec<ExplicitRule> = serde_json::from_value(array)
                .map_err(|e| EngineError::parse(format!("Invalid advancement rules: {e}.")))?;
            AdvancementPlan::Explicit(rules)
        }
        Some(_) => {
            return Err(EngineError::parse(
                "Advancement rules must be \"auto\" or an array.",
            ));
        }
    };

    Ok(StructureDefinition { plan, rules })
}

pub fn parse_structure_document(text: &str) -> EngineResult<StructureDefinition> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| EngineError::parse(format!("Invalid structure document: {e}.")))?;
    parse_structure_definition(&value)
}

// ── Template CRUD ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub is_system: bool,
    pub min_units: u32,
    pub max_units: u32,
    pub default_units: u32,
    pub definition: StructureDefinition,
}

pub fn create_template(
    store: &mut DivisionStore,
    auth: &AuthContext,
    template: NewTemplate,
) -> EngineResult<TemplateId> {
    if !auth.can_mutate() {
        return Err(EngineError::forbidden(
            "Only an owner or admin can create templates.",
        ));
    }
    if template.min_units > template.max_units {
        return Err(EngineError::validation(
            "Template minimum units exceed its maximum units.",
        ));
    }
    if template.default_units < template.min_units || template.default_units > template.max_units {
        return Err(EngineError::validation(
            "Template default units fall outside its unit range.",
        ));
    }
    let now = Utc::now();
    let id = store.insert_template(PhaseTemplate {
        id: 0,
        name: template.name,
        version: 1,
        is_system: template.is_system,
        is_active: true,
        min_units: template.min_units,
        max_units: template.max_units,
        default_units: template.default_units,
        definition: template.definition,
        created_at: now,
        updated_at: now,
    });
    Ok(id)
}

#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub min_units: Option<u32>,
    pub max_units: Option<u32>,
    pub default_units: Option<u32>,
    pub definition: Option<StructureDefinition>,
}

fn guard_template_mutation(
    store: &DivisionStore,
    auth: &AuthContext,
    template_id: TemplateId,
) -> EngineResult<()> {
    if !auth.can_mutate() {
        return Err(EngineError::forbidden(
            "Only an owner or admin can modify templates.",
        ));
    }
    let template = store.template(template_id)?;
    if template.is_system {
        return Err(EngineError::forbidden("System templates cannot be modified."));
    }
    Ok(())
}

pub fn update_template(
    store: &mut DivisionStore,
    auth: &AuthContext,
    template_id: TemplateId,
    update: TemplateUpdate,
) -> EngineResult<()> {
    guard_template_mutation(store, auth, template_id)?;
    let current = store.template(template_id)?;
    let min_units = update.min_units.unwrap_or(current.min_units);
    let max_units = update.max_units.unwrap_or(current.max_units);
    let default_units = update.default_units.unwrap_or(current.default_units);
    if min_units > max_units || default_units < min_units || default_units > max_units {
        return Err(EngineError::validation(
            "Template unit bounds are inconsistent.",
        ));
    }
    let template = store.template_mut(template_id)?;
    if let Some(name) = update.name {
        template.name = name;
    }
    template.min_units = min_units;
    template.max_units = max_units;
    template.default_units = default_units;
    if let Some(definition) = update.definition {
        template.definition = definition;
    }
    template.version += 1;
    template.updated_at = Utc::now();
    Ok(())
}

/// Soft delete: the template stays for history but stops applying.
pub fn deactivate_template(
    store: &mut DivisionStore,
    auth: &AuthContext,
    template_id: TemplateId,
) -> EngineResult<()> {
    guard_template_mutation(store, auth, template_id)?;
    let template = store.template_mut(template_id)?;
    template.is_active = false;
    template.updated_at = Utc::now();
    Ok(())
}

// ── Template application ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    pub unit_count: Option<u32>,
    pub clear_existing: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub division_id: DivisionId,
    pub unit_count: u32,
    pub phase_ids: Vec<PhaseId>,
    pub rule_count: u32,
}

/// Materialize a template onto a division: phases with their slots and
/// pools, then advancement rules, in one logical operation. Validation and
/// unit-count resolution happen before the first write; after that the
/// caller's transaction is the only rollback.
pub fn apply_template(
    store: &mut DivisionStore,
    template_id: TemplateId,
    division_id: DivisionId,
    options: ApplyOptions,
) -> EngineResult<ApplyReport> {
    let template = store.template(template_id)?.clone();
    if !template.is_active {
        return Err(EngineError::validation("Template is deactivated."));
    }
    let division = store.division(division_id)?.clone();

    let unit_count = options
        .unit_count
        .or_else(|| (division.unit_count > 0).then_some(division.unit_count))
        .unwrap_or(template.default_units);
    if unit_count < template.min_units || unit_count > template.max_units {
        return Err(EngineError::validation(format!(
            "Unit count {unit_count} is outside the template's range {}..={}.",
            template.min_units, template.max_units
        )));
    }

    let planned = match &template.definition.plan {
        StructurePlan::Fixed(descriptors) => {
            descriptors.iter().map(descriptor_to_new_phase).collect()
        }
        StructurePlan::Bracket(generator) => {
            bracket_stage_phases(unit_count, generator.include_consolation)
        }
        StructurePlan::PoolPlusBracket(generator) => {
            pool_plus_bracket_phases(unit_count, generator)
        }
    };

    if options.clear_existing {
        clear_division_structure(store, division_id);
    }

    let mut phase_ids = Vec::with_capacity(planned.len());
    for params in planned {
        phase_ids.push(create_phase(store, division_id, params)?);
    }

    let rule_count = apply_advancement_plan(store, &template.definition.rules, &phase_ids)?;

    info!(
        template_id,
        division_id,
        unit_count,
        phases = phase_ids.len(),
        rule_count,
        "applied template \"{}\"",
        template.name
    );
    Ok(ApplyReport {
        division_id,
        unit_count,
        phase_ids,
        rule_count,
    })
}

fn descriptor_to_new_phase(descriptor: &PhaseDescriptor) -> NewPhase {
    NewPhase {
        name: descriptor.name.clone().unwrap_or_default(),
        phase_type: descriptor.phase_type,
        incoming_slot_count: descriptor.incoming_slot_count,
        advancing_slot_count: descriptor.advancing_slot_count,
        pool_count: descriptor.pool_count,
        seeding_strategy: descriptor.seeding_strategy.unwrap_or(SeedingStrategy::Snake),
        include_consolation: descriptor.include_consolation,
    }
}

fn stage_name(size: u32) -> String {
    match size {
        2 => "Finals".to_string(),
        4 => "Semifinals".to_string(),
        8 => "Quarterfinals".to_string(),
        n => format!("Round of {n}"),
    }
}

/// Walk the bracket from its full size down to the final, one phase per
/// stage, each stage halving. Consolation only makes sense at the four-slot
/// stage, so the flag is honored there alone.
fn bracket_stage_phases(unit_count: u32, include_consolation: bool) -> Vec<NewPhase> {
    let bracket_size = unit_count.max(2).next_power_of_two();
    let mut phases = Vec::new();
    let mut size = bracket_size;
    while size > 1 {
        phases.push(NewPhase {
            name: stage_name(size),
            phase_type: PhaseType::BracketRound,
            incoming_slot_count: size,
            advancing_slot_count: size / 2,
            pool_count: 1,
            seeding_strategy: SeedingStrategy::Snake,
            include_consolation: include_consolation && size == 4,
        });
        size /= 2;
    }
    phases
}

fn pool_plus_bracket_phases(unit_count: u32, generator: &PoolBracketGenerator) -> Vec<NewPhase> {
    let pool_count = unit_count.div_ceil(generator.pool_size);
    let advancing_count = pool_count * generator.advance_per_pool;
    let mut phases = vec![NewPhase {
        name: "Pool Play".to_string(),
        phase_type: PhaseType::Pools,
        incoming_slot_count: unit_count,
        advancing_slot_count: advancing_count,
        pool_count,
        seeding_strategy: SeedingStrategy::Snake,
        include_consolation: false,
    }];
    phases.extend(bracket_stage_phases(
        advancing_count,
        generator.include_consolation,
    ));
    phases
}

fn apply_advancement_plan(
    store: &mut DivisionStore,
    plan: &AdvancementPlan,
    phase_ids: &[PhaseId],
) -> EngineResult<u32> {
    match plan {
        AdvancementPlan::None => Ok(0),
        AdvancementPlan::Auto => {
            let mut count = 0u32;
            for pair in phase_ids.windows(2) {
                let (source_id, target_id) = (pair[0], pair[1]);
                if store.pools_for_phase(source_id).len() > 1 {
                    count += generate_advancement_rules(store, source_id, target_id, None)?.len()
                        as u32;
                    continue;
                }
                let source = store.phase(source_id)?.clone();
                let target = store.phase(target_id)?.clone();
                let limit = min(source.advancing_slot_count, target.incoming_slot_count);
                store.delete_rules_for_pair(source_id, target_id);
                for rank in 1..=limit {
                    store.insert_rule(AdvancementRule {
                        id: 0,
                        source_phase_id: source_id,
                        source_pool_id: None,
                        source_rank: rank,
                        target_phase_id: target_id,
                        target_slot_number: rank,
                        process_order: rank,
                    });
                }
                count += limit;
            }
            Ok(count)
        }
        AdvancementPlan::Explicit(rules) => {
            for (index, rule) in rules.iter().enumerate() {
                let source_id = phase_for_order(phase_ids, rule.source_phase_order)?;
                let target_id = phase_for_order(phase_ids, rule.target_phase_order)?;
                let source_pool_id = match rule.source_pool_index {
                    Some(pool_index) => {
                        let pools = store.pools_for_phase(source_id);
                        let pool = pools
                            .get(pool_index.saturating_sub(1) as usize)
                            .ok_or_else(|| {
                                EngineError::validation(format!(
                                    "Rule references pool {pool_index}, which the source phase does not have."
                                ))
                            })?;
                        Some(pool.id)
                    }
                    None => None,
                };
                store.insert_rule(AdvancementRule {
                    id: 0,
                    source_phase_id: source_id,
                    source_pool_id,
                    source_rank: rule.source_rank,
                    target_phase_id: target_id,
                    target_slot_number: rule.target_slot_number,
                    process_order: index as u32 + 1,
                });
            }
            Ok(rules.len() as u32)
        }
    }
}

fn phase_for_order(phase_ids: &[PhaseId], order: u32) -> EngineResult<PhaseId> {
    phase_ids
        .get(order.saturating_sub(1) as usize)
        .copied()
        .ok_or_else(|| {
            EngineError::validation(format!("Rule references unknown phase order {order}."))
        })
}

/// Delete a division's existing structure in dependency order: rules,
/// encounters, slots, pools, then the phases themselves.
pub fn clear_division_structure(store: &mut DivisionStore, division_id: DivisionId) {
    let phases = store.phases_for_division(division_id);
    for phase in &phases {
        store.delete_rules_referencing_phase(phase.id);
    }
    for phase in &phases {
        store.delete_encounters_for_phase(phase.id);
    }
    for phase in &phases {
        store.remove_slots_for_phase(phase.id);
    }
    for phase in &phases {
        store.remove_pools_for_phase(phase.id);
    }
    for phase in &phases {
        store.remove_phase(phase.id);
    }
}
