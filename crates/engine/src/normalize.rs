//! Canonical names for species and mutation tags.
//!
//! Every comparison between a draft and live state goes through
//! [`Normalizer`]. Raw names come from several places (seed items, crop
//! items, potted plants, hand-edited import files) and all of them must fold
//! to the same catalog key, otherwise matching silently disagrees between the
//! requirement summary and the apply loop.

use crate::catalog::{self, MutationGroup, PLANTS};
use crate::model::{PlantObject, TileObject};
use std::collections::{BTreeSet, HashMap};

/// Order-independent set of canonical mutation names.
pub type MutationSet = BTreeSet<String>;

const SPECIES_SUFFIXES: &[&str] = &["seed", "plant", "pod", "crop"];

/// Normalized alias -> catalog species key. Built once per session.
#[derive(Debug, Clone)]
pub struct SpeciesAliases {
    keys: Vec<&'static str>,
    aliases: HashMap<String, &'static str>,
}

impl SpeciesAliases {
    pub fn from_catalog() -> Self {
        let mut aliases = HashMap::new();
        for entry in PLANTS {
            for name in [entry.species, entry.seed, entry.plant, entry.crop] {
                let alias = alias_token(name);
                if !alias.is_empty() {
                    aliases.entry(alias).or_insert(entry.species);
                }
            }
        }
        Self {
            keys: PLANTS.iter().map(|p| p.species).collect(),
            aliases,
        }
    }
}

/// Lowercase alphanumerics only.
fn compact(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn alias_token(raw: &str) -> String {
    let token = compact(raw);
    for suffix in SPECIES_SUFFIXES {
        if let Some(stem) = token.strip_suffix(suffix) {
            if !stem.is_empty() {
                return stem.to_string();
            }
        }
    }
    token
}

/// Canonical species key for `raw`. Unknown names come back unchanged.
pub fn resolve_plant_species_key(raw: &str, aliases: &SpeciesAliases) -> String {
    let trimmed = raw.trim();
    if catalog::is_species_key(trimmed) {
        return trimmed.to_string();
    }
    if let Some(key) = aliases.aliases.get(&alias_token(trimmed)) {
        return key.to_string();
    }

    // Names with a decoration we do not know about ("Carrot (potted)").
    let token = compact(trimmed);
    if !token.is_empty() {
        let best = aliases
            .keys
            .iter()
            .filter(|key| {
                let k = compact(key);
                token == k || token.starts_with(&k)
            })
            .max_by_key(|key| key.len());
        if let Some(key) = best {
            return key.to_string();
        }
    }
    trimmed.to_string()
}

/// Canonical mutation name for a raw tag. Unknown tags come back trimmed.
pub fn normalize_mutation_tag(value: &str) -> String {
    let trimmed = value.trim();
    let collapsed: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect();

    let canonical = match collapsed.as_str() {
        "golden" => Some("Gold"),
        "amberlit" | "amber" => Some("Ambershine"),
        "dawnbound" | "dawncharge" => Some("Dawncharged"),
        "amberbound" | "ambercharge" => Some("Ambercharged"),
        "dawn" => Some("Dawnlit"),
        "chill" => Some("Chilled"),
        "freeze" => Some("Frozen"),
        _ => None,
    };
    if let Some(name) = canonical {
        return name.to_string();
    }

    let mut chars = collapsed.chars();
    let titled: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    if catalog::mutation_group(&titled).is_some() {
        return titled;
    }
    trimmed.to_string()
}

/// Identity key of a species + mutation set, e.g. `Carrot::Gold+Wet`.
pub fn mutation_key(species: &str, mutations: &MutationSet) -> String {
    let joined: Vec<&str> = mutations.iter().map(String::as_str).collect();
    format!("{species}::{}", joined.join("+"))
}

/// Session-scoped matching context.
#[derive(Debug, Clone)]
pub struct Normalizer {
    aliases: SpeciesAliases,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            aliases: SpeciesAliases::from_catalog(),
        }
    }

    pub fn species(&self, raw: &str) -> String {
        resolve_plant_species_key(raw, &self.aliases)
    }

    pub fn mutation_set<I, T>(&self, raw: I) -> MutationSet
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        raw.into_iter()
            .map(|m| normalize_mutation_tag(m.as_ref()))
            .filter(|m| !m.is_empty())
            .collect()
    }

    /// Mutations a live plant actually has (union over its slots).
    pub fn plant_mutations(&self, plant: &PlantObject) -> MutationSet {
        self.mutation_set(plant.slots.iter().flat_map(|s| s.mutations.iter()))
    }

    /// Mutations a draft plant asks for.
    pub fn desired_mutations(&self, plant: &PlantObject) -> MutationSet {
        self.mutation_set(plant.glc_mutations.iter())
    }

    /// Desired mutation list cleaned for storage: canonical names, at most
    /// one per group, capped at `max`.
    pub fn clean_glc_mutations(&self, raw: &[String], max: usize) -> Vec<String> {
        let mut groups: BTreeSet<MutationGroup> = BTreeSet::new();
        let mut out: Vec<String> = Vec::new();
        for tag in raw {
            let name = normalize_mutation_tag(tag);
            if name.is_empty() || out.contains(&name) {
                continue;
            }
            if let Some(group) = catalog::mutation_group(&name) {
                if !groups.insert(group) {
                    continue;
                }
            }
            out.push(name);
            if out.len() >= max {
                break;
            }
        }
        out
    }

    /// True when the plant has every required mutation (it may have more).
    pub fn plant_has_mutations_inclusive(&self, plant: &PlantObject, required: &[String]) -> bool {
        let have = self.plant_mutations(plant);
        self.mutation_set(required).is_subset(&have)
    }

    /// Type + identity equality. Mutations do not participate.
    pub fn same_object(&self, a: &TileObject, b: &TileObject) -> bool {
        match (a, b) {
            (TileObject::Plant(a), TileObject::Plant(b)) => {
                self.species(&a.species) == self.species(&b.species)
            }
            (TileObject::Decor(a), TileObject::Decor(b)) => a.decor_id == b.decor_id,
            (TileObject::Egg(a), TileObject::Egg(b)) => a.egg_id == b.egg_id,
            _ => false,
        }
    }

    /// `current` already fulfils `desired`: same object, and for plants every
    /// desired mutation is present.
    pub fn satisfies(&self, current: Option<&TileObject>, desired: &TileObject) -> bool {
        let Some(current) = current else {
            return false;
        };
        if !self.same_object(current, desired) {
            return false;
        }
        match (current, desired) {
            (TileObject::Plant(live), TileObject::Plant(want)) => {
                self.plant_has_mutations_inclusive(live, &want.glc_mutations)
            }
            _ => true,
        }
    }
}
