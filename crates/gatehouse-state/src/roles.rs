//! Role registry.
//!
//! Holds role memberships, the admin-of relation, and the one-way manager
//! badge flags. Mutation happens only through [`crate::GateState::apply`];
//! the `plan_*` methods validate an operator request and return the change
//! to apply.

use crate::StateChange;
use gatehouse_types::{Address, GateError, Role};
use std::collections::{BTreeMap, BTreeSet};

/// Role memberships keyed by role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleRegistry {
    members: BTreeMap<Role, BTreeSet<Address>>,
    manager_badges: BTreeSet<Address>,
}

impl RoleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the role that administers `role`.
    ///
    /// `Root` administers every role, itself included.
    pub fn admin_of(&self, _role: Role) -> Role {
        Role::Root
    }

    /// Returns `true` if `account` holds `role`.
    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.members
            .get(&role)
            .is_some_and(|set| set.contains(account))
    }

    /// Returns `true` if `account` holds any of `roles`.
    pub fn has_any(&self, roles: &[Role], account: &Address) -> bool {
        roles.iter().any(|role| self.has_role(*role, account))
    }

    /// Returns the roles held by `account`, in hierarchy order.
    pub fn roles_of(&self, account: &Address) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| self.has_role(*role, account))
            .collect()
    }

    /// Returns the members of `role` in address order.
    pub fn members(&self, role: Role) -> impl Iterator<Item = &Address> + '_ {
        self.members.get(&role).into_iter().flatten()
    }

    /// Returns `true` if `account` ever received `Manager` through a record.
    pub fn has_manager_badge(&self, account: &Address) -> bool {
        self.manager_badges.contains(account)
    }

    /// Iterates over every badge holder.
    pub fn manager_badges(&self) -> impl Iterator<Item = &Address> + '_ {
        self.manager_badges.iter()
    }

    /// Fails with `Unauthorized` unless `caller` holds the admin role of `role`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Unauthorized`] when the caller is not an admin.
    pub fn require_admin(&self, caller: &Address, role: Role) -> Result<(), GateError> {
        let admin = self.admin_of(role);
        if self.has_role(admin, caller) {
            Ok(())
        } else {
            Err(GateError::unauthorized(format!(
                "{caller} lacks {admin} required to administer {role}"
            )))
        }
    }

    /// Validates an operator grant.
    ///
    /// Returns `None` when `account` already holds `role` (a successful
    /// no-op).
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Unauthorized`] when the caller is not an admin.
    pub fn plan_grant(
        &self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> Result<Option<StateChange>, GateError> {
        self.require_admin(caller, role)?;
        if self.has_role(role, &account) {
            return Ok(None);
        }
        Ok(Some(StateChange::GrantRole { role, account }))
    }

    /// Validates an operator revoke.
    ///
    /// Returns `None` when `account` does not hold `role` (a successful
    /// no-op).
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Unauthorized`] when the caller is not an admin.
    pub fn plan_revoke(
        &self,
        caller: &Address,
        role: Role,
        account: Address,
    ) -> Result<Option<StateChange>, GateError> {
        self.require_admin(caller, role)?;
        if !self.has_role(role, &account) {
            return Ok(None);
        }
        Ok(Some(StateChange::RevokeRole { role, account }))
    }

    pub(crate) fn set_membership(&mut self, role: Role, account: Address, held: bool) {
        if held {
            self.members.entry(role).or_default().insert(account);
        } else if let Some(set) = self.members.get_mut(&role) {
            set.remove(&account);
            if set.is_empty() {
                self.members.remove(&role);
            }
        }
    }

    pub(crate) fn issue_badge(&mut self, account: Address) {
        self.manager_badges.insert(account);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new([n; 20])
    }

    fn registry_with_root() -> RoleRegistry {
        let mut registry = RoleRegistry::new();
        registry.set_membership(Role::Root, addr(1), true);
        registry
    }

    #[test]
    fn multi_role_membership() {
        let mut registry = registry_with_root();
        registry.set_membership(Role::Manager, addr(2), true);
        registry.set_membership(Role::Villager, addr(2), true);

        assert_eq!(registry.roles_of(&addr(2)), vec![Role::Manager, Role::Villager]);
        assert!(registry.has_any(&[Role::Root, Role::Manager], &addr(2)));
        assert!(!registry.has_role(Role::Root, &addr(2)));
    }

    #[test]
    fn grant_requires_root() {
        let registry = registry_with_root();
        let err = registry
            .plan_grant(&addr(2), Role::Manager, addr(3))
            .unwrap_err();
        assert!(matches!(err, GateError::Unauthorized(_)));

        let change = registry
            .plan_grant(&addr(1), Role::Manager, addr(3))
            .unwrap();
        assert_eq!(
            change,
            Some(StateChange::GrantRole {
                role: Role::Manager,
                account: addr(3)
            })
        );
    }

    #[test]
    fn redundant_grant_and_revoke_are_noops() {
        let mut registry = registry_with_root();
        registry.set_membership(Role::Manager, addr(3), true);

        assert_eq!(registry.plan_grant(&addr(1), Role::Manager, addr(3)).unwrap(), None);
        assert_eq!(registry.plan_revoke(&addr(1), Role::Manager, addr(4)).unwrap(), None);
    }

    #[test]
    fn members_are_sorted_and_empty_sets_vanish() {
        let mut registry = registry_with_root();
        registry.set_membership(Role::Manager, addr(9), true);
        registry.set_membership(Role::Manager, addr(5), true);
        let members: Vec<_> = registry.members(Role::Manager).copied().collect();
        assert_eq!(members, vec![addr(5), addr(9)]);

        registry.set_membership(Role::Manager, addr(9), false);
        registry.set_membership(Role::Manager, addr(5), false);
        assert_eq!(registry.members(Role::Manager).count(), 0);
        assert_eq!(registry, registry_with_root());
    }

    #[test]
    fn badge_is_one_way() {
        let mut registry = registry_with_root();
        registry.issue_badge(addr(4));
        registry.set_membership(Role::Manager, addr(4), false);
        assert!(registry.has_manager_badge(&addr(4)));
    }
}
