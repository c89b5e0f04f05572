//! Resolves per-nutrient Upper Limits (ULs) from a demographic reference
//! table overlaid with user overrides.
//!
//! The built-in table is illustrative, not authoritative: a real deployment
//! is expected to supply `upper_limits_overrides` wholesale so this table's
//! defaults are fully shadowed. It exists so the solver is testable
//! standalone without a live demographic-reference collaborator.

use crate::model::ResolvedUls;
use std::collections::HashMap;

/// Daily UL reference values (milligrams/micrograms as conventionally
/// published for each nutrient; the solver treats them as opaque units that
/// must match whatever unit a `Recipe`'s micronutrient map uses).
fn reference_table() -> HashMap<&'static str, HashMap<&'static str, f64>> {
    let mut table = HashMap::new();

    let mut adult_male = HashMap::new();
    adult_male.insert("sodium", 2300.0);
    adult_male.insert("vitamin_a", 3000.0);
    adult_male.insert("vitamin_d", 100.0);
    adult_male.insert("calcium", 2500.0);
    adult_male.insert("iron", 45.0);
    adult_male.insert("zinc", 40.0);
    table.insert("adult_male", adult_male);

    let mut adult_female = HashMap::new();
    adult_female.insert("sodium", 2300.0);
    adult_female.insert("vitamin_a", 3000.0);
    adult_female.insert("vitamin_d", 100.0);
    adult_female.insert("calcium", 2500.0);
    adult_female.insert("iron", 45.0);
    adult_female.insert("zinc", 40.0);
    table.insert("adult_female", adult_female);

    let mut pregnant = HashMap::new();
    pregnant.insert("sodium", 2300.0);
    pregnant.insert("vitamin_a", 3000.0);
    pregnant.insert("vitamin_d", 100.0);
    pregnant.insert("calcium", 2500.0);
    pregnant.insert("iron", 45.0);
    pregnant.insert("zinc", 40.0);
    table.insert("pregnant", pregnant);

    let mut adolescent = HashMap::new();
    adolescent.insert("sodium", 2300.0);
    adolescent.insert("vitamin_a", 2800.0);
    adolescent.insert("vitamin_d", 100.0);
    adolescent.insert("calcium", 3000.0);
    adolescent.insert("iron", 45.0);
    adolescent.insert("zinc", 34.0);
    table.insert("adolescent", adolescent);

    table
}

/// Looks up `demographic`'s defaults (empty map if the demographic is
/// unrecognized — callers relying on the built-in table for an unlisted
/// demographic get "no UL" for everything, which is the conservative,
/// never-too-restrictive choice) and overlays `overrides` on top, entry by
/// entry.
pub fn resolve_uls(demographic: &str, overrides: &HashMap<String, f64>) -> ResolvedUls {
    let table = reference_table();
    let mut resolved: ResolvedUls = table
        .get(demographic)
        .map(|m| m.iter().map(|(k, v)| (k.to_string(), *v)).collect())
        .unwrap_or_default();

    for (nutrient, limit) in overrides {
        resolved.insert(nutrient.clone(), *limit);
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_demographic_resolves_defaults() {
        let resolved = resolve_uls("adult_male", &HashMap::new());
        assert_eq!(resolved.get("sodium"), Some(&2300.0));
    }

    #[test]
    fn unknown_demographic_has_no_uls_by_default() {
        let resolved = resolve_uls("unknown", &HashMap::new());
        assert!(resolved.is_empty());
    }

    #[test]
    fn override_replaces_default() {
        let mut overrides = HashMap::new();
        overrides.insert("sodium".to_string(), 1800.0);
        let resolved = resolve_uls("adult_male", &overrides);
        assert_eq!(resolved.get("sodium"), Some(&1800.0));
        assert_eq!(resolved.get("vitamin_a"), Some(&3000.0));
    }

    #[test]
    fn override_can_add_untracked_demographic_nutrient() {
        let mut overrides = HashMap::new();
        overrides.insert("potassium".to_string(), 3400.0);
        let resolved = resolve_uls("unknown", &overrides);
        assert_eq!(resolved.get("potassium"), Some(&3400.0));
    }
}
