use std::collections::BTreeMap;
use std::fmt;

use serde_derive::{Deserialize, Serialize};

use crate::StringId;

/// Path-like identifier of an external resource (skeleton, clip, child
/// graph). Resolution to actual data happens in the asset pipeline.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceReference(String);

impl ResourceReference {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub const fn none() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }
}

impl From<&str> for ResourceReference {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const DEFAULT_VARIATION_NAME: &str = "Default";

/// A named variant of a graph: its own skeleton plus per-slot resource
/// overrides. Every variation except `Default` names a parent; lookup of a
/// slot resource walks the parent chain up to `Default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    pub id: StringId,
    pub parent_id: StringId,
    pub skeleton: ResourceReference,
    #[serde(default)]
    pub overrides: BTreeMap<StringId, ResourceReference>,
}

impl Variation {
    pub fn is_default(&self) -> bool {
        self.id.as_str() == DEFAULT_VARIATION_NAME
    }
}

/// Ordered collection of variations, unique by id, always containing exactly
/// one `Default` root. Edit operations assert their preconditions: a
/// duplicate id, an unknown parent or touching `Default` is authoring-tool
/// misuse, not a recoverable condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationHierarchy {
    variations: Vec<Variation>,
}

impl Default for VariationHierarchy {
    fn default() -> Self {
        Self {
            variations: vec![Variation {
                id: Self::default_id(),
                parent_id: StringId::none(),
                skeleton: ResourceReference::none(),
                overrides: BTreeMap::new(),
            }],
        }
    }
}

impl VariationHierarchy {
    pub fn default_id() -> StringId {
        StringId::from(DEFAULT_VARIATION_NAME)
    }

    pub fn variations(&self) -> &[Variation] {
        &self.variations
    }

    pub fn get_variation(&self, id: &StringId) -> Option<&Variation> {
        self.variations.iter().find(|x| &x.id == id)
    }

    pub fn get_variation_mut(&mut self, id: &StringId) -> Option<&mut Variation> {
        self.variations.iter_mut().find(|x| &x.id == id)
    }

    pub fn is_valid_variation(&self, id: &StringId) -> bool {
        self.get_variation(id).is_some()
    }

    pub fn get_parent_variation_id(&self, id: &StringId) -> Option<&StringId> {
        self.get_variation(id)
            .filter(|x| !x.is_default())
            .map(|x| &x.parent_id)
    }

    /// Case-insensitive lookup returning the canonical-cased id.
    pub fn try_get_case_correct_variation_id(&self, name: &str) -> Option<StringId> {
        self.variations
            .iter()
            .find(|x| x.id.eq_ignore_case(name))
            .map(|x| x.id.clone())
    }

    pub fn get_child_variations(&self, id: &StringId) -> Vec<&Variation> {
        self.variations
            .iter()
            .filter(|x| !x.is_default() && &x.parent_id == id)
            .collect()
    }

    pub fn create_variation(&mut self, id: StringId, parent_id: &StringId) {
        assert!(id.is_valid(), "variation id must be valid");
        assert!(
            self.try_get_case_correct_variation_id(id.as_str()).is_none(),
            "variation already exists: {id}"
        );
        assert!(
            self.is_valid_variation(parent_id),
            "unknown parent variation: {parent_id}"
        );

        self.variations.push(Variation {
            id,
            parent_id: parent_id.clone(),
            skeleton: ResourceReference::none(),
            overrides: BTreeMap::new(),
        });
    }

    /// Global find-and-replace over both the id and every parent reference.
    pub fn rename_variation(&mut self, old_id: &StringId, new_id: StringId) {
        assert!(
            old_id.as_str() != DEFAULT_VARIATION_NAME && new_id.as_str() != DEFAULT_VARIATION_NAME,
            "the default variation cannot be renamed"
        );
        assert!(new_id.is_valid(), "variation id must be valid");
        assert!(
            self.is_valid_variation(old_id),
            "unknown variation: {old_id}"
        );
        assert!(
            self.try_get_case_correct_variation_id(new_id.as_str())
                .is_none(),
            "variation already exists: {new_id}"
        );

        for variation in self.variations.iter_mut() {
            if &variation.id == old_id {
                variation.id = new_id.clone();
            }
            if &variation.parent_id == old_id {
                variation.parent_id = new_id.clone();
            }
        }
    }

    /// Removes the variation and, to a fixed point, every remaining
    /// non-default entry whose parent no longer resolves — multi-level
    /// orphaning is handled in one call.
    pub fn destroy_variation(&mut self, id: &StringId) {
        assert!(
            id.as_str() != DEFAULT_VARIATION_NAME,
            "the default variation cannot be destroyed"
        );
        assert!(self.is_valid_variation(id), "unknown variation: {id}");

        self.variations.retain(|x| &x.id != id);

        loop {
            let live: Vec<StringId> = self.variations.iter().map(|x| x.id.clone()).collect();
            let before = self.variations.len();
            self.variations
                .retain(|x| x.is_default() || live.contains(&x.parent_id));
            if self.variations.len() == before {
                break;
            }
        }
    }

    /// Walk the parent chain from `variation` towards `Default`, returning
    /// the first override recorded for `slot`.
    pub fn resolve_override(
        &self,
        variation: &StringId,
        slot: &StringId,
    ) -> Option<&ResourceReference> {
        let mut current = variation;
        // chain length is bounded by the hierarchy size; a malformed parent
        // loop terminates instead of spinning
        for _ in 0..self.variations.len() {
            let entry = self.get_variation(current)?;
            if let Some(resource) = entry.overrides.get(slot) {
                return Some(resource);
            }
            if entry.is_default() {
                return None;
            }
            current = &entry.parent_id;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy_with(children: &[(&str, &str)]) -> VariationHierarchy {
        let mut hierarchy = VariationHierarchy::default();
        for (id, parent) in children {
            hierarchy.create_variation(StringId::from(*id), &StringId::from(*parent));
        }
        hierarchy
    }

    #[test]
    fn test_create_and_list_children() {
        let hierarchy = hierarchy_with(&[("Combat", "Default")]);

        let children = hierarchy.get_child_variations(&VariationHierarchy::default_id());
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, StringId::from("Combat"));
    }

    #[test]
    #[should_panic(expected = "default variation cannot be destroyed")]
    fn test_destroy_default_is_rejected() {
        let mut hierarchy = hierarchy_with(&[("Combat", "Default")]);
        hierarchy.destroy_variation(&VariationHierarchy::default_id());
    }

    #[test]
    #[should_panic(expected = "already exists")]
    fn test_duplicate_id_is_rejected_case_insensitively() {
        let mut hierarchy = hierarchy_with(&[("Combat", "Default")]);
        hierarchy.create_variation(StringId::from("COMBAT"), &VariationHierarchy::default_id());
    }

    #[test]
    fn test_rename_rewrites_parent_references() {
        let mut hierarchy = hierarchy_with(&[("Combat", "Default"), ("Stealth", "Combat")]);

        hierarchy.rename_variation(&StringId::from("Combat"), StringId::from("CombatV2"));

        assert!(!hierarchy.is_valid_variation(&StringId::from("Combat")));
        assert_eq!(
            hierarchy.get_parent_variation_id(&StringId::from("Stealth")),
            Some(&StringId::from("CombatV2"))
        );
    }

    #[test]
    fn test_destroy_removes_orphans_to_a_fixed_point() {
        let mut hierarchy = hierarchy_with(&[
            ("Combat", "Default"),
            ("Stealth", "Combat"),
            ("StealthNight", "Stealth"),
            ("Swimming", "Default"),
        ]);

        hierarchy.destroy_variation(&StringId::from("Combat"));

        assert!(!hierarchy.is_valid_variation(&StringId::from("Stealth")));
        assert!(!hierarchy.is_valid_variation(&StringId::from("StealthNight")));
        assert!(hierarchy.is_valid_variation(&StringId::from("Swimming")));
        for variation in hierarchy.variations() {
            assert_ne!(variation.parent_id, StringId::from("Combat"));
        }
    }

    #[test]
    fn test_case_correct_lookup() {
        let hierarchy = hierarchy_with(&[("Combat", "Default")]);
        assert_eq!(
            hierarchy.try_get_case_correct_variation_id("combat"),
            Some(StringId::from("Combat"))
        );
        assert_eq!(hierarchy.try_get_case_correct_variation_id("Ranged"), None);
    }

    #[test]
    fn test_override_resolution_walks_parent_chain() {
        let mut hierarchy = hierarchy_with(&[("Combat", "Default"), ("Stealth", "Combat")]);
        let slot = StringId::from("idle_clip");

        hierarchy
            .get_variation_mut(&StringId::from("Combat"))
            .expect("Valid")
            .overrides
            .insert(slot.clone(), ResourceReference::from("anim/idle_combat"));

        assert_eq!(
            hierarchy.resolve_override(&StringId::from("Stealth"), &slot),
            Some(&ResourceReference::from("anim/idle_combat"))
        );
        assert_eq!(
            hierarchy.resolve_override(&VariationHierarchy::default_id(), &slot),
            None
        );
    }
}
