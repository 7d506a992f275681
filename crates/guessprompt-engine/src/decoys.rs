use tracing::{debug, info, warn};

use crate::completion::CompletionClient;
use crate::fallback::{fallback_decoys, DecoyCollector, DECOY_COUNT};

pub const DECOY_SYSTEM_DIRECTIVE: &str = r#"You are a helpful assistant that generates detailed image generation prompts. Generate exactly 3 alternative image generation prompts that are similar but meaningfully different from the given prompt.

CRITICAL REQUIREMENTS:
- Each prompt must be LONG and DETAILED (at least 20-30 words), matching the length and detail level of the original
- Change MULTIPLE elements: subjects, actions, settings, lighting, weather, time of day, mood, or perspective
- Use DIFFERENT descriptive words and phrases - don't just change "A" to "The" or swap single words
- Each prompt should describe a similar scene but with distinct differences that would create noticeably different images
- Make them different enough that someone could distinguish between them by looking at the generated image
- Return ONLY the 3 prompts, one per line, no numbering, no explanations, no prefixes
- Each prompt should be a complete, detailed sentence describing an image

Example of GOOD variations:
Original: "A futuristic cityscape at sunset with flying cars soaring through neon-lit skyscrapers"
Variation 1: "A modern metropolis at dawn with hover vehicles gliding between glass towers, sunrise casting orange reflections"
Variation 2: "A cyberpunk urban landscape during twilight with aerial transport weaving through illuminated buildings, purple sky above"
Variation 3: "An advanced city at dusk with flying machines navigating between holographic structures, evening lights creating a neon glow"

BAD variations (too similar):
- "The futuristic cityscape at sunset with flying cars..." (only changed "A" to "The")
- "A futuristic cityscape at sunset with flying vehicles..." (only changed "cars" to "vehicles")"#;

pub fn decoy_user_message(actual: &str) -> String {
    format!(
        "Generate exactly 3 alternative image generation prompts that are similar but different from this prompt: \"{actual}\""
    )
}

/// Produces three decoy prompts. Never fails: any completion problem falls
/// back to the rule-based generator.
pub struct DecoySynthesizer {
    completion: Option<CompletionClient>,
}

impl DecoySynthesizer {
    pub fn new(completion: CompletionClient) -> Self {
        Self {
            completion: Some(completion),
        }
    }

    pub fn offline() -> Self {
        Self { completion: None }
    }

    pub fn is_offline(&self) -> bool {
        self.completion.is_none()
    }

    pub fn synthesize(&self, actual: &str) -> [String; DECOY_COUNT] {
        let actual = actual.trim();
        let Some(client) = &self.completion else {
            debug!("no completion client, using fallback decoys");
            return fallback_decoys(actual);
        };

        let text = match client.complete(DECOY_SYSTEM_DIRECTIVE, &decoy_user_message(actual)) {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "decoy completion failed, using fallback decoys");
                return fallback_decoys(actual);
            }
        };

        let mut decoys = DecoyCollector::new(actual);
        for line in parse_decoy_lines(&text) {
            if !decoys.push(&line) {
                debug!(%line, "discarding repeated decoy line");
            }
        }
        if decoys.is_empty() {
            warn!("completion produced no usable decoy lines, using fallback decoys");
            return fallback_decoys(actual);
        }
        if !decoys.is_full() {
            info!(kept = decoys.len(), "padding model decoys with fallback decoys");
            for candidate in fallback_decoys(actual) {
                decoys.push(candidate);
            }
        }
        decoys.finish()
    }
}

/// First three lines of model output that look like prompts: trimmed,
/// non-blank, not enumerated (`1.`, `2)`), not starting with "prompt".
pub fn parse_decoy_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !is_enumerated(line))
        .filter(|line| !line.to_lowercase().starts_with("prompt"))
        .take(DECOY_COUNT)
        .map(str::to_string)
        .collect()
}

fn is_enumerated(line: &str) -> bool {
    let rest = line.trim_start_matches(|ch: char| ch.is_ascii_digit());
    rest.len() < line.len() && (rest.starts_with('.') || rest.starts_with(')'))
}
