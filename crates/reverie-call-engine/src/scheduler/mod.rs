//! Periodic workers
//!
//! Two cooperating loops drive outbound calls: the [`WindowMaterializer`]
//! turns availability windows into concrete scheduled calls, and the
//! [`DispatchWorker`] picks up due calls and starts dialing. Both are
//! plain `run_once` bodies wrapped in interval loops so tests can drive
//! them step by step.

pub mod dispatcher;
pub mod materializer;

pub use dispatcher::DispatchWorker;
pub use materializer::WindowMaterializer;

use std::sync::Arc;

use reverie_core::{Profile, Prompt};
use tokio::task::JoinHandle;
use tracing::info;

use crate::orchestrator::CallEngine;

/// The prompt list a session is materialized (and re-dispatched) with:
/// the user's active templates in position order, plus a synthetic rating
/// prompt when the profile asks for one and no template carries it.
pub(crate) fn build_prompt_list(profile: &Profile, mut prompts: Vec<Prompt>) -> Vec<Prompt> {
    if profile.include_rating_prompt && !prompts.iter().any(|p| p.is_rating) {
        prompts.push(Prompt::synthetic_rating());
    }
    prompts
}

/// Owns the two worker loops for the lifetime of the server.
pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(engine: Arc<CallEngine>) -> Self {
        let materializer = WindowMaterializer::new(engine.clone());
        let dispatcher = DispatchWorker::new(engine);

        let handles = vec![
            tokio::spawn(async move { materializer.run().await }),
            tokio::spawn(async move { dispatcher.run().await }),
        ];

        info!("✅ Scheduler started (materializer + dispatcher)");
        Self { handles }
    }

    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        info!("🛑 Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_core::{PhoneNumber, PromptId, UserId};

    fn profile(include_rating: bool) -> Profile {
        Profile {
            user_id: UserId::new(),
            phone_number: PhoneNumber::parse("+16175551212").unwrap(),
            display_name: "Alice".to_string(),
            name_pronunciation: None,
            timezone: "UTC".parse().unwrap(),
            include_rating_prompt: include_rating,
            max_retries: 2,
        }
    }

    fn plain_prompt(text: &str) -> Prompt {
        Prompt {
            prompt_id: PromptId::new(),
            prompt_text: text.to_string(),
            is_rating: false,
        }
    }

    #[test]
    fn appends_synthetic_rating_prompt() {
        let prompts = build_prompt_list(&profile(true), vec![plain_prompt("a"), plain_prompt("b")]);
        assert_eq!(prompts.len(), 3);
        assert!(prompts[2].is_rating);
    }

    #[test]
    fn respects_existing_rating_template() {
        let mut with_rating = vec![plain_prompt("a")];
        with_rating.push(Prompt {
            prompt_id: PromptId::new(),
            prompt_text: "Rate your day".to_string(),
            is_rating: true,
        });

        let prompts = build_prompt_list(&profile(true), with_rating);
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts.iter().filter(|p| p.is_rating).count(), 1);
    }

    #[test]
    fn no_rating_prompt_when_profile_opts_out() {
        let prompts = build_prompt_list(&profile(false), vec![plain_prompt("a")]);
        assert_eq!(prompts.len(), 1);
        assert!(!prompts.iter().any(|p| p.is_rating));
    }
}
