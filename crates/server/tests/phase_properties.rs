use proptest::prelude::*;

use buildtrack_server::domain::{
    access::{self, CurrentUser, Permission},
    cost,
    phase::{self, PhaseState, FIRST_PHASE, PHASE_COUNT},
    Role,
};

fn any_role() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::ALL.to_vec())
}

fn any_phase() -> impl Strategy<Value = u8> {
    FIRST_PHASE..=PHASE_COUNT
}

proptest! {
    #[test]
    fn every_role_satisfies_itself(role in any_role()) {
        prop_assert!(role.has_role(role));
        prop_assert!(Role::Admin.has_role(role));
        prop_assert!(role.has_role(Role::User));
    }

    #[test]
    fn role_check_follows_rank(held in any_role(), required in any_role()) {
        prop_assert_eq!(held.has_role(required), held.rank() >= required.rank());
    }

    #[test]
    fn roles_round_trip_through_text(role in any_role()) {
        prop_assert_eq!(role.as_str().to_uppercase().parse::<Role>().unwrap(), role);
    }

    #[test]
    fn exactly_one_active_phase(current in any_phase()) {
        let phases = phase::generate_phases(current);
        prop_assert_eq!(phases.len(), PHASE_COUNT as usize);

        let active: Vec<_> = phases.iter().filter(|p| p.state == PhaseState::Active).collect();
        prop_assert_eq!(active.len(), 1);
        prop_assert_eq!(active[0].number, current);

        let completed = phases.iter().filter(|p| p.completed).count();
        prop_assert_eq!(completed, (current - 1) as usize);
        prop_assert_eq!(phase::completed_count(current) as usize, completed);
    }

    #[test]
    fn advancing_never_relocks_a_phase(current in FIRST_PHASE..PHASE_COUNT) {
        let next = phase::advance(current).unwrap();
        prop_assert_eq!(next, current + 1);

        let before = phase::generate_phases(current);
        let after = phase::generate_phases(next);
        for (b, a) in before.iter().zip(&after) {
            if b.completed {
                prop_assert!(a.completed);
            }
            if !b.locked {
                prop_assert!(!a.locked);
            }
        }
        prop_assert!(phase::progress_percent(next) > phase::progress_percent(current));
    }

    #[test]
    fn progress_stays_in_range(raw in any::<i64>()) {
        let current = phase::clamp_current_phase(raw);
        let progress = phase::progress_percent(current);
        prop_assert!((0.0..100.0).contains(&progress));
    }

    #[test]
    fn overrides_do_not_change_progress(current in any_phase(), target in any_phase()) {
        let with_override = phase::generate_phases_with(current, |n| {
            (n == target).then_some(PhaseState::Completed)
        });
        let slot = &with_override[(target - 1) as usize];
        prop_assert_eq!(slot.display_state, PhaseState::Completed);
        prop_assert_eq!(slot.state, phase::phase_state(target, current));
        let completed = with_override.iter().filter(|p| p.completed).count();
        prop_assert_eq!(completed, (current - 1) as usize);
        let unlocked = with_override.iter().filter(|p| !p.locked).count();
        prop_assert_eq!(unlocked, current as usize);
    }

    #[test]
    fn admins_hold_every_permission(id in "[a-z]{1,8}", owner in "[a-z]{1,8}") {
        let admin = CurrentUser::new(id, Role::Admin);
        prop_assert!(access::can_access_project(Some(&admin), &owner, false));
        prop_assert!(access::can_edit_project(Some(&admin), &owner));
        for permission in Permission::ALL {
            prop_assert!(permission.check(Some(&admin)));
        }
    }

    #[test]
    fn line_totals_are_never_below_net(
        quantity in 0.0f64..1_000.0,
        unit_cost in 0.0f64..10_000.0,
        vat in 0.0f64..=100.0,
    ) {
        let net = quantity * unit_cost;
        let gross = cost::line_total(quantity, unit_cost, vat);
        prop_assert!(gross >= net);
        prop_assert!(gross <= net * 2.0 + 1e-9);
    }
}

#[test]
fn final_phase_cannot_advance() {
    assert!(phase::advance(PHASE_COUNT).is_err());
    assert_eq!(phase::progress_percent(PHASE_COUNT), 95.0);
}
