pub mod advancement;
pub mod commands;
pub mod encounters;
pub mod phases;
pub mod services;
pub mod store;
pub mod templates;
pub mod types;

pub use advancement::generate_advancement_rules;
pub use encounters::{generate_encounters, GenerationSummary};
pub use phases::{create_phase, delete_phase, update_phase, NewPhase, PhaseUpdate};
pub use services::{
    force_exit_slot, ByeResolver, MatchNumbering, StoreByeResolver, StoreNumbering,
};
pub use store::{
    AdvancementRule, Division, DivisionStore, Encounter, EncounterSide, Phase, PhaseTemplate,
    Pool, PoolSlot, Slot,
};
pub use templates::{
    apply_template, clear_division_structure, create_template, deactivate_template,
    parse_structure_definition, parse_structure_document, update_template, AdvancementPlan,
    ApplyOptions, ApplyReport, BracketGenerator, ExplicitRule, NewTemplate, PhaseDescriptor,
    PoolBracketGenerator, StructureDefinition, StructurePlan, TemplateUpdate,
};
pub use types::*;

use tracing_subscriber::EnvFilter;

/// Initialize tracing with env-filtered stderr output. Safe to call more
/// than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
