pub mod events;
pub mod extract;
pub mod game;
pub mod jobs;
pub mod prompts;
