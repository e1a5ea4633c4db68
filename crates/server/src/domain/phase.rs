//! Phase lifecycle.
//!
//! A project moves through a fixed sequence of phases. The only stored
//! progress value is the project's `current_phase`; each phase's state is
//! derived from it:
//!
//! - phase `n < current_phase` is completed
//! - phase `n == current_phase` is active
//! - phase `n > current_phase` is locked
//!
//! The counter only moves forward, one phase at a time.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const PHASE_COUNT: u8 = 20;

pub const FIRST_PHASE: u8 = 1;

/// Name and description of each phase, in order.
pub const PHASE_CATALOG: [(&str, &str); PHASE_COUNT as usize] = [
    ("Planning & Design", "Brief, drawings and budget agreed with the client"),
    ("Permits & Approvals", "Building permits and utility approvals obtained"),
    ("Site Preparation", "Clearing, surveying and setting out the site"),
    ("Demolition", "Removal of existing structures and waste"),
    ("Excavation", "Digging for foundations and services"),
    ("Foundations", "Footings, slabs and damp proofing"),
    ("Structural Frame", "Load-bearing walls, columns and beams"),
    ("Roofing", "Roof structure, covering and drainage"),
    ("Windows & Exterior Doors", "Openings fitted and sealed"),
    ("Plumbing Rough-in", "Supply and waste pipework before closing walls"),
    ("Electrical Rough-in", "Cabling, boxes and distribution board"),
    ("HVAC", "Heating, ventilation and air conditioning"),
    ("Insulation", "Thermal and acoustic insulation"),
    ("Drywall & Plastering", "Partitions, boarding and plaster finish"),
    ("Flooring", "Screed, tiles and floor coverings"),
    ("Kitchen & Bathrooms", "Cabinetry, sanitaryware and fittings"),
    ("Interior Finishes", "Joinery, painting and decoration"),
    ("Exterior Works", "Facade, paving and landscaping"),
    ("Final Inspection", "Snagging, testing and certification"),
    ("Handover", "Keys, documentation and warranties delivered"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "phase_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PhaseState {
    Locked,
    Active,
    Completed,
}

/// Clamp a stored counter into the valid phase range.
pub fn clamp_current_phase(value: i64) -> u8 {
    value.clamp(FIRST_PHASE as i64, PHASE_COUNT as i64) as u8
}

pub fn is_valid_phase(number: i64) -> bool {
    (FIRST_PHASE as i64..=PHASE_COUNT as i64).contains(&number)
}

pub fn phase_state(number: u8, current_phase: u8) -> PhaseState {
    use std::cmp::Ordering;

    match number.cmp(&current_phase) {
        Ordering::Less => PhaseState::Completed,
        Ordering::Equal => PhaseState::Active,
        Ordering::Greater => PhaseState::Locked,
    }
}

/// State shown to clients: an admin override wins over the derived state.
/// Never used for counts, progress or locking.
pub fn display_state(number: u8, current_phase: u8, manual: Option<PhaseState>) -> PhaseState {
    manual.unwrap_or_else(|| phase_state(number, current_phase))
}

pub fn completed_count(current_phase: u8) -> u8 {
    clamp_current_phase(current_phase as i64) - FIRST_PHASE
}

pub fn progress_percent(current_phase: u8) -> f64 {
    completed_count(current_phase) as f64 * 100.0 / PHASE_COUNT as f64
}

/// Move the counter forward by exactly one phase.
pub fn advance(current_phase: u8) -> Result<u8> {
    let current = clamp_current_phase(current_phase as i64);
    if current >= PHASE_COUNT {
        return Err(AppError::Validation(
            "Project is already in its final phase".to_string(),
        ));
    }
    Ok(current + 1)
}

pub fn phase_info(number: u8) -> Option<(&'static str, &'static str)> {
    let index = number.checked_sub(FIRST_PHASE)? as usize;
    PHASE_CATALOG.get(index).copied()
}

/// One generated phase slot.
///
/// `state`, `completed` and `locked` always follow the counter;
/// `display_state` carries an admin override when one is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSlot {
    pub number: u8,
    pub name: &'static str,
    pub description: &'static str,
    pub state: PhaseState,
    pub display_state: PhaseState,
    pub completed: bool,
    pub locked: bool,
}

impl PhaseSlot {
    fn new(number: u8, current_phase: u8, manual: Option<PhaseState>) -> Self {
        let (name, description) = phase_info(number).unwrap_or(("", ""));
        let state = phase_state(number, current_phase);
        Self {
            number,
            name,
            description,
            state,
            display_state: display_state(number, current_phase, manual),
            completed: state == PhaseState::Completed,
            locked: state == PhaseState::Locked,
        }
    }
}

/// Generate every phase slot for a project at `current_phase`.
pub fn generate_phases(current_phase: u8) -> Vec<PhaseSlot> {
    generate_phases_with(current_phase, |_| None)
}

/// Like [`generate_phases`], annotating slots with per-phase overrides.
pub fn generate_phases_with<F>(current_phase: u8, override_for: F) -> Vec<PhaseSlot>
where
    F: Fn(u8) -> Option<PhaseState>,
{
    let current = clamp_current_phase(current_phase as i64);
    (FIRST_PHASE..=PHASE_COUNT)
        .map(|n| PhaseSlot::new(n, current, override_for(n)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_project_has_only_first_phase_active() {
        let phases = generate_phases(FIRST_PHASE);
        assert_eq!(phases.len(), PHASE_COUNT as usize);
        assert_eq!(phases[0].state, PhaseState::Active);
        assert!(phases[1..].iter().all(|p| p.locked && !p.completed));
    }

    #[test]
    fn states_around_current_phase() {
        assert_eq!(phase_state(4, 5), PhaseState::Completed);
        assert_eq!(phase_state(5, 5), PhaseState::Active);
        assert_eq!(phase_state(6, 5), PhaseState::Locked);
    }

    #[test]
    fn advancing_to_the_end() {
        let mut current = FIRST_PHASE;
        while current < PHASE_COUNT {
            current = advance(current).unwrap();
        }

        let phases = generate_phases(current);
        assert!(phases[..19].iter().all(|p| p.completed));
        assert_eq!(phases[19].state, PhaseState::Active);
        assert!(advance(current).is_err());
    }

    #[test]
    fn clamping() {
        assert_eq!(clamp_current_phase(0), 1);
        assert_eq!(clamp_current_phase(-3), 1);
        assert_eq!(clamp_current_phase(21), 20);
        assert_eq!(clamp_current_phase(7), 7);
    }

    #[test]
    fn progress_values() {
        assert_eq!(progress_percent(1), 0.0);
        assert_eq!(progress_percent(11), 50.0);
        assert_eq!(progress_percent(20), 95.0);
    }

    #[test]
    fn overrides_only_change_the_display_state() {
        let phases = generate_phases_with(3, |n| (n == 10).then_some(PhaseState::Completed));
        assert_eq!(phases[9].display_state, PhaseState::Completed);
        assert_eq!(phases[9].state, PhaseState::Locked);
        assert!(phases[9].locked && !phases[9].completed);
        assert_eq!(phases.iter().filter(|p| p.completed).count(), 2);
        assert_eq!(completed_count(3), 2);

        let phases = generate_phases_with(1, |n| (n == 20).then_some(PhaseState::Active));
        assert_eq!(phases.iter().filter(|p| !p.locked).count(), 1);
        assert_eq!(phases[19].display_state, PhaseState::Active);
    }

    #[test]
    fn catalog_lookup() {
        assert_eq!(phase_info(1).map(|p| p.0), Some("Planning & Design"));
        assert_eq!(phase_info(20).map(|p| p.0), Some("Handover"));
        assert!(phase_info(0).is_none());
        assert!(phase_info(21).is_none());
    }
}
