use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

const CURATED_PROMPTS: &[&str] = &[
    "A futuristic cityscape at sunset with flying cars soaring through neon-lit skyscrapers, holographic advertisements glowing in the twilight sky, and pedestrians walking on elevated walkways",
    "A cute robot having tea with a cat in a beautiful garden filled with blooming flowers, butterflies dancing in the air, and a vintage teapot on a wooden table",
    "An underwater castle with colorful fish swimming around ancient stone towers, coral reefs glowing with bioluminescent plants, and mermaids exploring the ruins",
    "A steampunk-style library with floating books arranged in spiral patterns, brass gears turning slowly, and warm golden light streaming through stained glass windows",
    "A magical forest with glowing mushrooms illuminating the path, fireflies creating a starry canopy above, and ancient trees with faces carved into their bark",
    "A cyberpunk street market at night with neon signs reflecting in puddles, vendors selling exotic tech, and hover vehicles zipping through the crowded alleyways",
    "A space station orbiting a distant planet with Earth visible in the background, astronauts working on solar panels, and stars twinkling in the vast darkness",
    "A cozy coffee shop in a rainy city with steam rising from cups, people reading books by warm lamplight, and raindrops tracing patterns on the windows",
    "A dragon flying over a medieval village with thatched roofs, villagers looking up in awe, and mountains in the distance covered in mist",
    "A surreal landscape with floating islands connected by bridges, waterfalls cascading into the void, and strange creatures roaming the ethereal terrain",
    "A vintage train station with steam engines billowing smoke, passengers in period clothing waiting on platforms, and ornate architecture from a bygone era",
    "A floating city in the clouds with airships docked at platforms, people walking on cloud bridges, and the sun setting behind distant mountain peaks",
    "A robot chef cooking in a modern kitchen with holographic recipe displays, precision tools moving automatically, and delicious aromas filling the air",
    "A crystal cave with glowing crystals of various colors, stalactites reflecting light, and a hidden underground lake shimmering with bioluminescent algae",
    "A post-apocalyptic city overgrown with nature where vines climb up skyscrapers, animals roam freely, and solar panels power the remaining technology",
    "A steampunk airship flying through clouds with brass propellers spinning, crew members on deck, and a Victorian-era city visible below",
    "A neon-lit alleyway in a cyberpunk city with holographic graffiti on walls, rain-slicked streets reflecting colorful lights, and shadowy figures in the distance",
    "A peaceful zen garden with cherry blossoms falling gently, a stone bridge over a koi pond, and meditation stones arranged in perfect harmony",
    "A pirate ship sailing through space with stars as the ocean, alien planets in the distance, and cosmic winds filling the sails",
    "A clockwork mechanism with intricate gears interlocking perfectly, brass cogs turning in harmony, and golden light revealing every detail of the mechanical wonder",
];

/// Immutable list of prompts a round can be started from.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    prompts: Vec<String>,
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self::new(CURATED_PROMPTS.iter().map(|item| (*item).to_string()).collect())
    }
}

impl PromptCatalog {
    pub fn new(prompts: Vec<String>) -> Self {
        Self {
            prompts: prompts
                .into_iter()
                .map(|prompt| prompt.trim().to_string())
                .filter(|prompt| !prompt.is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        self.prompts.choose(rng).map(String::as_str)
    }
}

/// The real prompt and its three decoys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSet {
    pub actual: String,
    pub decoys: [String; 3],
}

impl PromptSet {
    pub fn new(actual: impl Into<String>, decoys: [String; 3]) -> Self {
        Self {
            actual: actual.into(),
            decoys,
        }
    }

    /// True when every decoy is non-blank, differs from the actual prompt and
    /// from the other decoys, all compared case-insensitively.
    pub fn is_distinct(&self) -> bool {
        let mut seen = vec![self.actual.to_lowercase()];
        for decoy in &self.decoys {
            let key = decoy.to_lowercase();
            if decoy.trim().is_empty() || seen.contains(&key) {
                return false;
            }
            seen.push(key);
        }
        true
    }

    pub fn shuffled_options<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<String> {
        let mut options = Vec::with_capacity(4);
        options.push(self.actual.clone());
        options.extend(self.decoys.iter().cloned());
        options.shuffle(rng);
        options
    }
}
