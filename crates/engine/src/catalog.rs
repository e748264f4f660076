//! Static game catalog data: plant species with their item names, and the
//! mutation tags grouped by the exclusive family they belong to.

pub struct PlantEntry {
    pub species: &'static str,
    pub seed: &'static str,
    pub plant: &'static str,
    pub crop: &'static str,
}

const fn plant(
    species: &'static str,
    seed: &'static str,
    plant: &'static str,
    crop: &'static str,
) -> PlantEntry {
    PlantEntry {
        species,
        seed,
        plant,
        crop,
    }
}

pub const PLANTS: &[PlantEntry] = &[
    plant("Carrot", "Carrot Seed", "Carrot Plant", "Carrot"),
    plant("Strawberry", "Strawberry Seed", "Strawberry Plant", "Strawberry"),
    plant("Aloe", "Aloe Seed", "Aloe Plant", "Aloe"),
    plant("Blueberry", "Blueberry Seed", "Blueberry Plant", "Blueberry"),
    plant("Apple", "Apple Seed", "Apple Tree", "Apple"),
    plant("OrangeTulip", "Tulip Seed", "Tulip Plant", "Tulip"),
    plant("Tomato", "Tomato Seed", "Tomato Plant", "Tomato"),
    plant("Daffodil", "Daffodil Seed", "Daffodil Plant", "Daffodil"),
    plant("Corn", "Corn Kernel", "Corn Plant", "Corn"),
    plant("Watermelon", "Watermelon Seed", "Watermelon Plant", "Watermelon"),
    plant("Pumpkin", "Pumpkin Seed", "Pumpkin Plant", "Pumpkin"),
    plant("Echeveria", "Echeveria Cutting", "Echeveria Plant", "Echeveria"),
    plant("Coconut", "Coconut Seed", "Coconut Tree", "Coconut"),
    plant("Banana", "Banana Seed", "Banana Plant", "Banana"),
    plant("Lily", "Lily Seed", "Lily Plant", "Lily"),
    plant("BurrosTail", "Burro's Tail Cutting", "Burro's Tail Plant", "Burro's Tail"),
    plant("Mushroom", "Mushroom Spore", "Mushroom Patch", "Mushroom"),
    plant("Cactus", "Cactus Seed", "Cactus Plant", "Cactus"),
    plant("Bamboo", "Bamboo Seed", "Bamboo Plant", "Bamboo Shoot"),
    plant("Grape", "Grape Seed", "Grape Vine", "Grape"),
    plant("Pepper", "Pepper Seed", "Pepper Plant", "Pepper"),
    plant("Lemon", "Lemon Seed", "Lemon Tree", "Lemon"),
    plant("PassionFruit", "Passion Fruit Seed", "Passion Fruit Vine", "Passion Fruit"),
    plant("DragonFruit", "Dragon Fruit Seed", "Dragon Fruit Cactus", "Dragon Fruit"),
    plant("Lychee", "Lychee Pit", "Lychee Tree", "Lychee"),
    plant("Sunflower", "Sunflower Seed", "Sunflower Plant", "Sunflower"),
    plant("Starweaver", "Starweaver Pod", "Starweaver Plant", "Starweaver Fruit"),
    plant("DawnCelestial", "Dawnbinder Pod", "Dawnbinder", "Dawnbinder Bulb"),
    plant("MoonCelestial", "Moonbinder Pod", "Moonbinder", "Moonbinder Bulb"),
];

/// Mutations are exclusive within a group: a plant carries at most one per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MutationGroup {
    Color,
    Weather,
    Lunar,
}

pub const MUTATIONS: &[(&str, MutationGroup)] = &[
    ("Gold", MutationGroup::Color),
    ("Rainbow", MutationGroup::Color),
    ("Wet", MutationGroup::Weather),
    ("Chilled", MutationGroup::Weather),
    ("Frozen", MutationGroup::Weather),
    ("Dawnlit", MutationGroup::Lunar),
    ("Ambershine", MutationGroup::Lunar),
    ("Dawncharged", MutationGroup::Lunar),
    ("Ambercharged", MutationGroup::Lunar),
];

pub fn mutation_group(name: &str) -> Option<MutationGroup> {
    MUTATIONS
        .iter()
        .find(|(m, _)| *m == name)
        .map(|(_, group)| *group)
}

pub fn is_species_key(raw: &str) -> bool {
    PLANTS.iter().any(|p| p.species == raw)
}

/// Tool whose charges are spent by `PotPlant`.
pub const PLANTER_POT_TOOL_ID: &str = "PlanterPot";

pub const DEFAULT_INVENTORY_CAPACITY: usize = 100;
