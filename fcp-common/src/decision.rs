//! Gate decisions and operator inputs
//!
//! Control loops never branch on "automated or not"; they ask a
//! [`DecisionProvider`] and act on the answer. Every question carries the
//! value the service computed itself, so the automated provider simply
//! echoes it while an operator may override it.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::config::DecisionMode;

/// Accept/reject question, e.g. "is the dataset balanced?"
#[derive(Debug, Clone)]
pub struct GateQuestion {
    pub prompt: String,
    /// Verdict computed from the report being gated
    pub recommendation: bool,
}

impl GateQuestion {
    pub fn new(prompt: impl Into<String>, recommendation: bool) -> Self {
        Self {
            prompt: prompt.into(),
            recommendation,
        }
    }
}

/// Numeric input, e.g. the training iteration count
#[derive(Debug, Clone)]
pub struct CountQuestion {
    pub prompt: String,
    pub default: u32,
}

impl CountQuestion {
    pub fn new(prompt: impl Into<String>, default: u32) -> Self {
        Self {
            prompt: prompt.into(),
            default,
        }
    }
}

/// Pick one of several ids, or none to start over
#[derive(Debug, Clone)]
pub struct ChoiceQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    pub suggestion: Option<String>,
}

impl ChoiceQuestion {
    pub fn new(prompt: impl Into<String>, options: Vec<String>, suggestion: Option<String>) -> Self {
        Self {
            prompt: prompt.into(),
            options,
            suggestion,
        }
    }
}

/// Source of gate decisions for a control loop
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn resolve_gate(&self, question: &GateQuestion) -> bool;

    async fn resolve_count(&self, question: &CountQuestion) -> u32;

    /// `None` means "no winner, restart the search"
    async fn resolve_choice(&self, question: &ChoiceQuestion) -> Option<String>;
}

/// Provider matching the configured decision mode
pub fn provider_for(mode: DecisionMode) -> Arc<dyn DecisionProvider> {
    match mode {
        DecisionMode::Automated => Arc::new(AutomatedDecisions),
        DecisionMode::Interactive => Arc::new(InteractiveDecisions),
    }
}

/// Follows every computed recommendation and default
#[derive(Debug, Clone, Copy, Default)]
pub struct AutomatedDecisions;

#[async_trait]
impl DecisionProvider for AutomatedDecisions {
    async fn resolve_gate(&self, question: &GateQuestion) -> bool {
        info!(prompt = %question.prompt, answer = question.recommendation, "Automated gate decision");
        question.recommendation
    }

    async fn resolve_count(&self, question: &CountQuestion) -> u32 {
        info!(prompt = %question.prompt, answer = question.default, "Automated count");
        question.default
    }

    async fn resolve_choice(&self, question: &ChoiceQuestion) -> Option<String> {
        info!(prompt = %question.prompt, answer = ?question.suggestion, "Automated choice");
        question.suggestion.clone()
    }
}

/// Prompts an operator on stdin
///
/// Empty or unparsable answers fall back to the computed value.
#[derive(Debug, Clone, Copy, Default)]
pub struct InteractiveDecisions;

impl InteractiveDecisions {
    async fn ask(prompt: String) -> Option<String> {
        let answer = tokio::task::spawn_blocking(move || {
            let mut stdout = std::io::stdout();
            let _ = write!(stdout, "{} ", prompt);
            let _ = stdout.flush();
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => {
                let trimmed = line.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Cannot read operator input");
                None
            }
            Err(e) => {
                warn!(error = %e, "Operator prompt task failed");
                None
            }
        }
    }
}

#[async_trait]
impl DecisionProvider for InteractiveDecisions {
    async fn resolve_gate(&self, question: &GateQuestion) -> bool {
        let hint = if question.recommendation { "Y/n" } else { "y/N" };
        let prompt = format!("{} [{}]", question.prompt, hint);
        parse_yes_no(Self::ask(prompt).await.as_deref()).unwrap_or(question.recommendation)
    }

    async fn resolve_count(&self, question: &CountQuestion) -> u32 {
        let prompt = format!("{} [{}]", question.prompt, question.default);
        match Self::ask(prompt).await {
            Some(answer) => match answer.parse::<u32>() {
                Ok(value) if value > 0 => value,
                _ => {
                    warn!(%answer, "Not a positive integer, using default {}", question.default);
                    question.default
                }
            },
            None => question.default,
        }
    }

    async fn resolve_choice(&self, question: &ChoiceQuestion) -> Option<String> {
        let prompt = format!(
            "{} {:?} (empty to restart, '=' for {:?})",
            question.prompt, question.options, question.suggestion
        );
        match Self::ask(prompt).await?.as_str() {
            "=" => question.suggestion.clone(),
            id => Some(id.to_string()),
        }
    }
}

fn parse_yes_no(answer: Option<&str>) -> Option<bool> {
    match answer?.to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Pre-recorded answers, consumed in order per question kind
///
/// When a queue runs dry the provider behaves like [`AutomatedDecisions`].
#[derive(Debug, Default)]
pub struct ScriptedDecisions {
    gates: Mutex<VecDeque<bool>>,
    counts: Mutex<VecDeque<u32>>,
    choices: Mutex<VecDeque<Option<String>>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedDecisions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gates(self, answers: impl IntoIterator<Item = bool>) -> Self {
        if let Ok(mut q) = self.gates.lock() {
            q.extend(answers);
        }
        self
    }

    pub fn with_counts(self, answers: impl IntoIterator<Item = u32>) -> Self {
        if let Ok(mut q) = self.counts.lock() {
            q.extend(answers);
        }
        self
    }

    pub fn with_choices(self, answers: impl IntoIterator<Item = Option<String>>) -> Self {
        if let Ok(mut q) = self.choices.lock() {
            q.extend(answers);
        }
        self
    }

    /// Prompts seen so far, in order
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn note(&self, prompt: &str) {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(prompt.to_string());
        }
    }

    fn next<T>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
        queue.lock().ok().and_then(|mut q| q.pop_front())
    }
}

#[async_trait]
impl DecisionProvider for ScriptedDecisions {
    async fn resolve_gate(&self, question: &GateQuestion) -> bool {
        self.note(&question.prompt);
        Self::next(&self.gates).unwrap_or(question.recommendation)
    }

    async fn resolve_count(&self, question: &CountQuestion) -> u32 {
        self.note(&question.prompt);
        Self::next(&self.counts).unwrap_or(question.default)
    }

    async fn resolve_choice(&self, question: &ChoiceQuestion) -> Option<String> {
        self.note(&question.prompt);
        Self::next(&self.choices).unwrap_or_else(|| question.suggestion.clone())
    }
}

#[async_trait]
impl<P: DecisionProvider + ?Sized> DecisionProvider for Arc<P> {
    async fn resolve_gate(&self, question: &GateQuestion) -> bool {
        (**self).resolve_gate(question).await
    }

    async fn resolve_count(&self, question: &CountQuestion) -> u32 {
        (**self).resolve_count(question).await
    }

    async fn resolve_choice(&self, question: &ChoiceQuestion) -> Option<String> {
        (**self).resolve_choice(question).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_automated_follows_recommendation() {
        let provider = AutomatedDecisions;
        assert!(provider.resolve_gate(&GateQuestion::new("Balanced?", true)).await);
        assert!(!provider.resolve_gate(&GateQuestion::new("Covered?", false)).await);
        assert_eq!(provider.resolve_count(&CountQuestion::new("Iterations?", 50)).await, 50);
        let choice = ChoiceQuestion::new("Winner?", vec!["NN1".into()], Some("NN1".into()));
        assert_eq!(provider.resolve_choice(&choice).await.as_deref(), Some("NN1"));
    }

    #[tokio::test]
    async fn test_scripted_overrides_then_falls_back() {
        let provider = ScriptedDecisions::new().with_gates([false]).with_counts([7]);
        assert!(!provider.resolve_gate(&GateQuestion::new("first", true)).await);
        assert!(provider.resolve_gate(&GateQuestion::new("second", true)).await);
        assert_eq!(provider.resolve_count(&CountQuestion::new("count", 50)).await, 7);
        assert_eq!(provider.resolve_count(&CountQuestion::new("count", 50)).await, 50);
        assert_eq!(provider.asked(), vec!["first", "second", "count", "count"]);
    }

    #[tokio::test]
    async fn test_scripted_choice_can_decline() {
        let provider = ScriptedDecisions::new().with_choices([None]);
        let question = ChoiceQuestion::new("Winner?", vec!["NN0".into()], Some("NN0".into()));
        assert_eq!(provider.resolve_choice(&question).await, None);
        assert_eq!(provider.resolve_choice(&question).await.as_deref(), Some("NN0"));
    }

    #[test]
    fn test_parse_yes_no() {
        assert_eq!(parse_yes_no(Some("Y")), Some(true));
        assert_eq!(parse_yes_no(Some("no")), Some(false));
        assert_eq!(parse_yes_no(Some("maybe")), None);
        assert_eq!(parse_yes_no(None), None);
    }
}
