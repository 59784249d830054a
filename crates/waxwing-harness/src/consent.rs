//! Scripted consent prompts.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use waxwing_core::{
    Consent,
    friendship::{ACCEPT_ACTION, DECLINE_ACTION},
};

#[derive(Default)]
struct Script {
    answers: VecDeque<Option<String>>,
    fallback: Option<String>,
    prompts: Vec<(String, String)>,
}

/// Answers prompts from a queue, then with a fallback.
#[derive(Clone, Default)]
pub struct ScriptedConsent {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConsent {
    /// Accept every prompt.
    pub fn accepting() -> Self {
        Self::answering(Some(ACCEPT_ACTION))
    }

    /// Decline every prompt.
    pub fn declining() -> Self {
        Self::answering(Some(DECLINE_ACTION))
    }

    /// Answer every prompt with `action` (`None` dismisses).
    pub fn answering(action: Option<&str>) -> Self {
        let consent = Self::default();
        consent.lock().fallback = action.map(str::to_string);
        consent
    }

    /// Queue one answer ahead of the fallback.
    pub fn then(&self, action: Option<&str>) -> &Self {
        self.lock().answers.push_back(action.map(str::to_string));
        self
    }

    /// `(context id, text)` of every prompt shown.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.lock().prompts.clone()
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().expect("Mutex poisoned")
    }
}

#[async_trait]
impl Consent for ScriptedConsent {
    async fn prompt(&self, context_id: &str, text: &str, _actions: &[&str]) -> Option<String> {
        let mut script = self.lock();
        script.prompts.push((context_id.to_string(), text.to_string()));
        match script.answers.pop_front() {
            Some(answer) => answer,
            None => script.fallback.clone(),
        }
    }
}
