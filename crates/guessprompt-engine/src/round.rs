use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use anyhow::{anyhow, Result};
use guessprompt_contracts::events::{GameEvent, PromptSource, SessionLog};
use guessprompt_contracts::game::GameRound;
use guessprompt_contracts::jobs::GenerationRequest;
use guessprompt_contracts::prompts::{PromptCatalog, PromptSet};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::decoys::DecoySynthesizer;
use crate::poller::JobPoller;
use crate::transport::truncate_text;

const LOGGED_URL_CHARS: usize = 96;

/// Builds playable rounds: picks a prompt, generates the image and the decoys
/// concurrently, and shuffles the four options.
pub struct RoundHandler {
    poller: JobPoller,
    synthesizer: DecoySynthesizer,
    catalog: PromptCatalog,
    events: Option<Arc<SessionLog>>,
    rng: Mutex<StdRng>,
}

impl RoundHandler {
    pub fn new(poller: JobPoller, synthesizer: DecoySynthesizer) -> Self {
        Self {
            poller,
            synthesizer,
            catalog: PromptCatalog::default(),
            events: None,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_catalog(mut self, catalog: PromptCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_events(mut self, events: Arc<SessionLog>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn catalog(&self) -> &PromptCatalog {
        &self.catalog
    }

    /// The requested prompt when it is non-blank, otherwise a catalog pick.
    pub fn choose_prompt(&self, requested: Option<&str>) -> Result<String> {
        if let Some(prompt) = requested.map(str::trim).filter(|value| !value.is_empty()) {
            return Ok(prompt.to_string());
        }
        let mut rng = self.rng()?;
        self.catalog
            .pick(&mut *rng)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("prompt catalog is empty"))
    }

    pub fn new_round(&self, requested: Option<&str>) -> Result<GameRound> {
        let prompt = self.choose_prompt(requested)?;
        let source = if requested.is_some_and(|value| !value.trim().is_empty()) {
            PromptSource::Requested
        } else {
            PromptSource::Catalog
        };
        info!(%prompt, ?source, "starting round");
        self.emit(GameEvent::RoundStarted {
            prompt: prompt.clone(),
            source,
        })?;

        let (image, decoys) = thread::scope(|scope| {
            let decoys = scope.spawn(|| self.synthesizer.synthesize(&prompt));
            let image = self
                .poller
                .generate_image(&GenerationRequest::new(prompt.clone()));
            (image, decoys.join())
        });
        let decoys = decoys.map_err(|_| anyhow!("decoy synthesis thread panicked"))?;

        let image_url = match image {
            Ok(url) => url,
            Err(err) => {
                warn!(%prompt, error = %err, "round failed");
                self.emit(GameEvent::RoundFailed {
                    prompt,
                    error: err.to_string(),
                })?;
                return Err(err.into());
            }
        };
        self.emit(GameEvent::ImageReady {
            image_url: truncate_text(&image_url, LOGGED_URL_CHARS),
        })?;
        self.emit(GameEvent::DecoysReady {
            decoys: decoys.to_vec(),
            offline: self.synthesizer.is_offline(),
        })?;

        let prompts = PromptSet::new(prompt, decoys);
        if !prompts.is_distinct() {
            warn!(actual = %prompts.actual, "decoys are not distinct from the actual prompt");
        }
        let options = {
            let mut rng = self.rng()?;
            prompts.shuffled_options(&mut *rng)
        };
        let round = GameRound::new(image_url, prompts.actual, options);
        self.emit(GameEvent::RoundReady {
            round_id: round.id.clone(),
            options: round.prompt_options.clone(),
        })?;
        info!(round_id = %round.id, "round ready");
        Ok(round)
    }

    fn rng(&self) -> Result<MutexGuard<'_, StdRng>> {
        self.rng
            .lock()
            .map_err(|_| anyhow!("round rng lock poisoned"))
    }

    fn emit(&self, event: GameEvent) -> Result<()> {
        if let Some(events) = &self.events {
            events.record(event)?;
        }
        Ok(())
    }
}
