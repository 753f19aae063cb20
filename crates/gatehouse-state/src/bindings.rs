//! Schema-to-action binding table.

use gatehouse_types::{Action, Role, Uid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A binding key: a schema, optionally qualified by the issuer role it
/// applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingKey {
    /// The schema identifier.
    pub schema: Uid,
    /// The qualifying role, or `None` for a binding that applies to any issuer.
    pub role: Option<Role>,
}

impl BindingKey {
    /// An unqualified key.
    pub fn schema(schema: Uid) -> Self {
        Self { schema, role: None }
    }

    /// A role-qualified key.
    pub fn qualified(schema: Uid, role: Role) -> Self {
        Self {
            schema,
            role: Some(role),
        }
    }
}

/// Maps binding keys to actions. Absent keys resolve to `Action::None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingTable {
    bindings: BTreeMap<BindingKey, Action>,
}

impl BindingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves an exact key.
    pub fn resolve(&self, schema: Uid, role: Option<Role>) -> Action {
        self.bindings
            .get(&BindingKey { schema, role })
            .copied()
            .unwrap_or_default()
    }

    /// Resolves a schema for an issuer holding `roles`.
    ///
    /// A role-qualified binding for one of `roles`, tried in the order given,
    /// takes precedence over the unqualified binding.
    pub fn resolve_for_roles(&self, schema: Uid, roles: &[Role]) -> Action {
        roles
            .iter()
            .map(|role| self.resolve(schema, Some(*role)))
            .find(|action| *action != Action::None)
            .unwrap_or_else(|| self.resolve(schema, None))
    }

    /// Iterates over every bound key in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&BindingKey, &Action)> + '_ {
        self.bindings.iter()
    }

    pub(crate) fn set(&mut self, key: BindingKey, action: Action) {
        if action == Action::None {
            self.bindings.remove(&key);
        } else {
            self.bindings.insert(key, action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(n: u8) -> Uid {
        Uid::new([n; 32])
    }

    #[test]
    fn unknown_keys_resolve_to_none() {
        let table = BindingTable::new();
        assert_eq!(table.resolve(schema(1), None), Action::None);
        assert_eq!(table.resolve_for_roles(schema(1), &Role::ALL), Action::None);
    }

    #[test]
    fn rebinding_overwrites_and_none_unbinds() {
        let mut table = BindingTable::new();
        table.set(BindingKey::schema(schema(1)), Action::Attest);
        table.set(BindingKey::schema(schema(1)), Action::Reply);
        assert_eq!(table.resolve(schema(1), None), Action::Reply);

        table.set(BindingKey::schema(schema(1)), Action::None);
        assert_eq!(table.resolve(schema(1), None), Action::None);
        assert_eq!(table.entries().count(), 0);
    }

    #[test]
    fn qualified_binding_wins_for_holders() {
        let mut table = BindingTable::new();
        table.set(BindingKey::schema(schema(2)), Action::Attest);
        table.set(BindingKey::qualified(schema(2), Role::Manager), Action::AssignVillager);

        assert_eq!(
            table.resolve_for_roles(schema(2), &[Role::Manager, Role::Villager]),
            Action::AssignVillager
        );
        assert_eq!(
            table.resolve_for_roles(schema(2), &[Role::Villager]),
            Action::Attest
        );
    }
}
