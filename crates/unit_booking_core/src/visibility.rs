//! crates/unit_booking_core/src/visibility.rs
//!
//! Role- and ownership-based projection of units onto a viewer, and the
//! per-unit actions that viewer is offered.

use crate::domain::{Unit, UnitStatus, Viewer};

/// Whether `viewer` may see `unit` at all.
///
/// Admins see everything. Salespeople see Available units, their own
/// reservations and their own blocks.
pub fn is_visible_to(unit: &Unit, viewer: &Viewer) -> bool {
    if viewer.is_admin() {
        return true;
    }
    match unit.status {
        UnitStatus::Available => true,
        UnitStatus::Reserved => unit.is_reserved_by(&viewer.email),
        UnitStatus::Blocked => unit.is_blocked_by(viewer),
        UnitStatus::Booked | UnitStatus::Sold => false,
    }
}

/// Narrows an already filtered unit set to what `viewer` is entitled to see.
pub fn project_visible<'a>(units: Vec<&'a Unit>, viewer: &Viewer) -> Vec<&'a Unit> {
    if viewer.is_admin() {
        return units;
    }
    units
        .into_iter()
        .filter(|unit| is_visible_to(unit, viewer))
        .collect()
}

/// The affordances a viewer gets for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitActions {
    pub can_reserve: bool,
    pub can_book: bool,
    pub can_cancel: bool,
    pub can_block: bool,
    pub can_unblock: bool,
}

impl UnitActions {
    pub fn for_viewer(unit: &Unit, viewer: &Viewer) -> Self {
        let owns_reservation = unit.is_reserved_by(&viewer.email)
            || (unit.status == UnitStatus::Reserved && viewer.is_admin());
        let owns_block = unit.is_blocked_by(viewer)
            || (unit.status == UnitStatus::Blocked && viewer.is_admin());
        let available = unit.status == UnitStatus::Available;

        Self {
            can_reserve: available,
            can_book: owns_reservation,
            can_cancel: owns_reservation,
            can_block: available,
            can_unblock: owns_block,
        }
    }

    /// Sold and Booked units, and units held by someone else, offer nothing.
    pub fn is_interactive(&self) -> bool {
        self.can_reserve || self.can_book || self.can_cancel || self.can_block || self.can_unblock
    }
}

/// Colour a unit tile is drawn with. Terminal statuses are de-emphasized.
pub fn display_color(unit: &Unit, viewer: &Viewer) -> &'static str {
    match unit.status {
        UnitStatus::Available => "#90EE90",
        UnitStatus::Reserved if unit.is_reserved_by(&viewer.email) => "#FFFF00",
        UnitStatus::Reserved => "#FFA500",
        UnitStatus::Booked => "#FFEB3B",
        UnitStatus::Sold => "#FF6961",
        UnitStatus::Blocked => "#C1C7CD",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PlanPrices, Role};
    use uuid::Uuid;

    fn viewer(email: &str, role: Role) -> Viewer {
        Viewer {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role,
        }
    }

    fn unit(status: UnitStatus) -> Unit {
        Unit {
            id: Uuid::new_v4(),
            property_id: Uuid::nil(),
            unit_number: "101".to_string(),
            floor_number: Some(1),
            unit_type: "Studio".to_string(),
            unit_type_file_path: None,
            number_of_bedrooms: Some(0),
            square_footage: None,
            bathrooms: None,
            amenities: None,
            release: None,
            prices: PlanPrices::default(),
            status,
            reserved_by_email: None,
            reservation_time: None,
            blocked_by: None,
            blocked_by_email: None,
            floor_id: None,
            unit_type_id: None,
            bedroom_id: None,
            version: 1,
        }
    }

    fn reserved_by(email: &str) -> Unit {
        Unit {
            reserved_by_email: Some(email.to_string()),
            reservation_time: Some(chrono::Utc::now()),
            ..unit(UnitStatus::Reserved)
        }
    }

    #[test]
    fn salesperson_never_sees_terminal_or_foreign_reservations() {
        let alice = viewer("alice@example.com", Role::User);
        let units = vec![
            unit(UnitStatus::Available),
            unit(UnitStatus::Booked),
            unit(UnitStatus::Sold),
            unit(UnitStatus::Blocked),
            reserved_by("bob@example.com"),
            reserved_by("alice@example.com"),
        ];

        let visible = project_visible(units.iter().collect(), &alice);
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|u| u.status == UnitStatus::Available
            || u.reserved_by_email.as_deref() == Some("alice@example.com")));
    }

    #[test]
    fn admin_projection_is_identity() {
        let admin = viewer("root@example.com", Role::Admin);
        let units = vec![
            unit(UnitStatus::Sold),
            reserved_by("bob@example.com"),
            unit(UnitStatus::Blocked),
        ];
        let filtered: Vec<&Unit> = units.iter().collect();
        assert_eq!(project_visible(filtered.clone(), &admin), filtered);
    }

    #[test]
    fn own_block_stays_visible() {
        let alice = viewer("alice@example.com", Role::User);
        let mine = Unit {
            blocked_by: Some(alice.id),
            blocked_by_email: Some(alice.email.clone()),
            ..unit(UnitStatus::Blocked)
        };
        assert!(is_visible_to(&mine, &alice));
        assert!(UnitActions::for_viewer(&mine, &alice).can_unblock);
    }

    #[test]
    fn actions_follow_ownership() {
        let alice = viewer("alice@example.com", Role::User);
        let admin = viewer("root@example.com", Role::Admin);

        let available = UnitActions::for_viewer(&unit(UnitStatus::Available), &alice);
        assert!(available.can_reserve && available.can_block && !available.can_book);

        let foreign = reserved_by("bob@example.com");
        assert!(!UnitActions::for_viewer(&foreign, &alice).is_interactive());
        assert!(UnitActions::for_viewer(&foreign, &admin).can_book);

        let mine = reserved_by("alice@example.com");
        let actions = UnitActions::for_viewer(&mine, &alice);
        assert!(actions.can_book && actions.can_cancel && !actions.can_reserve);

        for status in [UnitStatus::Sold, UnitStatus::Booked] {
            assert!(!UnitActions::for_viewer(&unit(status), &admin).is_interactive());
        }
    }

    #[test]
    fn own_reservation_is_drawn_differently() {
        let alice = viewer("alice@example.com", Role::User);
        assert_eq!(display_color(&reserved_by("alice@example.com"), &alice), "#FFFF00");
        assert_eq!(display_color(&reserved_by("bob@example.com"), &alice), "#FFA500");
    }
}
