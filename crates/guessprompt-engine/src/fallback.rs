//! Rule-based decoy generation used when the completion API is unavailable
//! or returns too few usable lines.

pub const DECOY_COUNT: usize = 3;

/// `(needles, replacement)`; needles are lowercase ASCII and tried in order
/// at each position.
type Substitution = (&'static [&'static str], &'static str);

const TIME_OF_DAY_SWAPS: &[(&str, &str)] = &[
    ("at sunset", "at sunrise with golden morning light"),
    ("at night", "during the day with bright sunlight"),
    ("at dawn", "at dusk with warm evening glow"),
];

const SUBJECT_TABLES: &[(&str, &[Substitution])] = &[
    (
        "city",
        &[
            (&["cityscape", "city"], "metropolis"),
            (&["futuristic"], "modern"),
            (&["cyberpunk"], "high-tech"),
        ],
    ),
    (
        "forest",
        &[
            (&["forest"], "woodland"),
            (&["magical"], "enchanted"),
            (&["glowing"], "luminous"),
        ],
    ),
    (
        "robot",
        &[
            (&["robot"], "android"),
            (&["cute"], "friendly"),
            (&["cooking"], "preparing"),
        ],
    ),
];

const GENERIC_ADJECTIVES: &[Substitution] = &[
    (&["futuristic"], "advanced"),
    (&["magical"], "mystical"),
    (&["cozy"], "warm"),
];

const EXTRA_QUALIFIERS: &[&str] = &[
    "reimagined as a vivid painting with bold brushstrokes",
    "seen from a high vantage point under moody overcast skies",
    "captured in a dreamy soft-focus style with pastel tones",
];

/// Three decoys derived from `prompt` by fixed textual rules. Deterministic,
/// and never equal to the prompt or to each other.
pub fn fallback_decoys(prompt: &str) -> [String; DECOY_COUNT] {
    let actual = prompt.trim();
    let mut decoys = DecoyCollector::new(actual);
    decoys.push(shift_time_of_day(actual));
    decoys.push(swap_detail_clause(actual));
    decoys.push(swap_subject(actual));
    decoys.finish()
}

fn shift_time_of_day(actual: &str) -> String {
    TIME_OF_DAY_SWAPS
        .iter()
        .find(|(phrase, _)| contains_ignore_case(actual, phrase))
        .map(|(phrase, replacement)| replace_ignore_case(actual, &[*phrase], replacement))
        .unwrap_or_else(|| insert_before_period(actual, " at sunset with warm orange light"))
}

fn swap_detail_clause(actual: &str) -> String {
    let lowered = actual.to_lowercase();
    if !lowered.contains("with") {
        return insert_before_period(actual, " with dramatic lighting and rich textures");
    }
    // ASCII folding keeps byte offsets aligned with `actual`.
    match actual.to_ascii_lowercase().find(" with ") {
        Some(idx) if idx > 0 => {
            let clause = if lowered.contains("flying") {
                " featuring hovering vehicles and advanced technology"
            } else if lowered.contains("glowing") {
                " illuminated by bioluminescent plants and magical light"
            } else {
                " surrounded by vibrant colors and dynamic movement"
            };
            format!("{}{clause}", &actual[..idx])
        }
        _ => format!("{actual} featuring intricate details and atmospheric lighting"),
    }
}

fn swap_subject(actual: &str) -> String {
    if let Some((_, table)) = SUBJECT_TABLES
        .iter()
        .find(|(keyword, _)| contains_ignore_case(actual, keyword))
    {
        return apply_substitutions(actual, table);
    }
    let swapped = apply_substitutions(actual, GENERIC_ADJECTIVES);
    if swapped.contains("with") {
        swapped
    } else {
        insert_before_period(&swapped, " with atmospheric details")
    }
}

fn apply_substitutions(text: &str, table: &[Substitution]) -> String {
    table
        .iter()
        .fold(text.to_string(), |acc, (needles, replacement)| {
            replace_ignore_case(&acc, needles, replacement)
        })
}

fn insert_before_period(text: &str, clause: &str) -> String {
    let trimmed = text.trim_end();
    match trimmed.strip_suffix('.') {
        Some(stem) => format!("{stem}{clause}."),
        None => format!("{trimmed}{clause}"),
    }
}

fn contains_ignore_case(text: &str, needle: &str) -> bool {
    text.to_lowercase().contains(needle)
}

/// Replaces every occurrence of any needle, matching ASCII case-insensitively.
/// At each position the first matching needle wins, so `["cityscape", "city"]`
/// never leaves a stray `scape`.
fn replace_ignore_case(text: &str, needles: &[&str], replacement: &str) -> String {
    let lowered = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (idx, _) in lowered.char_indices() {
        if idx < cursor {
            continue;
        }
        let hit = needles
            .iter()
            .find(|needle| !needle.is_empty() && lowered[idx..].starts_with(**needle));
        if let Some(needle) = hit {
            out.push_str(&text[cursor..idx]);
            out.push_str(replacement);
            cursor = idx + needle.len();
        }
    }
    out.push_str(&text[cursor..]);
    out
}

/// Accumulates up to three decoys, rejecting blanks, the actual prompt and
/// case-insensitive duplicates.
pub(crate) struct DecoyCollector {
    actual: String,
    decoys: Vec<String>,
}

impl DecoyCollector {
    pub(crate) fn new(actual: &str) -> Self {
        Self {
            actual: actual.trim().to_string(),
            decoys: Vec::with_capacity(DECOY_COUNT),
        }
    }

    pub(crate) fn push(&mut self, candidate: impl AsRef<str>) -> bool {
        let candidate = candidate.as_ref().trim();
        if self.is_full() || candidate.is_empty() {
            return false;
        }
        let folded = candidate.to_lowercase();
        if folded == self.actual.to_lowercase()
            || self.decoys.iter().any(|existing| existing.to_lowercase() == folded)
        {
            return false;
        }
        self.decoys.push(candidate.to_string());
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.decoys.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.decoys.is_empty()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.decoys.len() >= DECOY_COUNT
    }

    /// Pads with filler variants until three decoys exist.
    pub(crate) fn finish(mut self) -> [String; DECOY_COUNT] {
        for filler in filler_variants(&self.actual) {
            if self.is_full() {
                break;
            }
            self.push(filler);
        }
        let mut ordinal = 1;
        while !self.is_full() {
            let numbered = format!("{} (variation {ordinal})", self.actual);
            self.push(numbered);
            ordinal += 1;
        }
        std::array::from_fn(|idx| std::mem::take(&mut self.decoys[idx]))
    }
}

fn filler_variants(actual: &str) -> Vec<String> {
    let words: Vec<&str> = actual.split(' ').collect();
    let mut fillers = Vec::with_capacity(EXTRA_QUALIFIERS.len() + 2);
    if words.len() > 5 {
        fillers.push(format!(
            "{} with unique artistic details and creative composition",
            words[..words.len() - 3].join(" ")
        ));
    }
    fillers.push(format!("{actual} from a different perspective with varied lighting"));
    fillers.extend(
        EXTRA_QUALIFIERS
            .iter()
            .map(|qualifier| format!("{actual} {qualifier}")),
    );
    fillers
}
