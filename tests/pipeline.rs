//! End-to-end pipeline scenarios with scripted model clients.

#![allow(clippy::panic, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use mdt_rs::agent::prompt::{AGGREGATION_TEMPLATE, REASONING_PROMPT};
use mdt_rs::agent::{
    EngineConfig, LoggingContext, ModelClient, Orchestrator, ProgressEvent, ProviderChain,
    ProviderSlot, RoleRegistry, RoleSpec,
};
use mdt_rs::cache::{DiagnosisCache, ManualClock, cache_key};
use mdt_rs::core::SpecialistOutcome;
use mdt_rs::error::{AgentError, ProviderError};

/// Scripted model: answers triage, specialists and reasoning steps.
struct Clinic {
    triage: String,
    slow: Vec<&'static str>,
    reasoning: Mutex<VecDeque<String>>,
    aggregation: Option<String>,
    specialist_calls: Mutex<Vec<String>>,
    reasoning_prompts: Mutex<Vec<String>>,
}

impl Clinic {
    fn new(triage: &str) -> Self {
        Self {
            triage: triage.to_string(),
            slow: Vec::new(),
            reasoning: Mutex::new(VecDeque::new()),
            aggregation: None,
            specialist_calls: Mutex::new(Vec::new()),
            reasoning_prompts: Mutex::new(Vec::new()),
        }
    }

    fn slow(mut self, role: &'static str) -> Self {
        self.slow.push(role);
        self
    }

    fn reasoning(self, replies: &[&str]) -> Self {
        self.reasoning
            .lock()
            .unwrap()
            .extend(replies.iter().map(|r| (*r).to_string()));
        self
    }

    fn aggregation(mut self, reply: &str) -> Self {
        self.aggregation = Some(reply.to_string());
        self
    }
}

#[async_trait]
impl ModelClient for Clinic {
    fn name(&self) -> &str {
        "clinic"
    }

    async fn invoke(&self, prompt: &str) -> Result<String, AgentError> {
        if prompt.contains("分诊医生") {
            return Ok(self.triage.clone());
        }
        if prompt.starts_with(REASONING_PROMPT) {
            self.reasoning_prompts.lock().unwrap().push(prompt.to_string());
            let next = self.reasoning.lock().unwrap().pop_front();
            return next.ok_or_else(|| ProviderError::new("clinic", "no reply scripted").into());
        }
        if prompt.contains("多学科医疗团队的身份") {
            return self
                .aggregation
                .clone()
                .ok_or_else(|| ProviderError::new("clinic", "aggregation down").into());
        }

        let role = prompt.split('：').next().unwrap_or_default().to_string();
        self.specialist_calls.lock().unwrap().push(role.clone());
        if self.slow.contains(&role.as_str()) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(format!("{role} opinion"))
    }
}

fn roster() -> Arc<RoleRegistry> {
    let roles = ["A", "B", "C"]
        .iter()
        .map(|n| RoleSpec {
            name: (*n).to_string(),
            template: format!("{n}：{{medical_report}}"),
        })
        .collect();
    Arc::new(RoleRegistry::new(roles, AGGREGATION_TEMPLATE).unwrap())
}

fn config() -> EngineConfig {
    EngineConfig::builder()
        .per_task_timeout(Duration::from_secs(30))
        .specialist_retries(0)
        .max_reasoning_steps(2)
        .build()
        .unwrap()
}

const ONE_ISSUE: &str = r#"{"thought":"t","tool":"generate_structured_diagnosis","args":{"issues":[{"name":"X","reason":"Y","suggestion":"Z"}]},"final_answer":null}"#;
const NO_ISSUES: &str = r#"{"thought":"t","tool":"generate_structured_diagnosis","args":{"issues":[]},"final_answer":null}"#;

#[tokio::test(start_paused = true)]
async fn test_selected_roles_only_and_timeout_isolated() {
    let clinic = Arc::new(Clinic::new(r#"["A","B"]"#).slow("B").reasoning(&[ONE_ISSUE]));
    let orchestrator = Orchestrator::new(clinic.clone(), roster(), config()).unwrap();

    let events: Vec<ProgressEvent> = orchestrator.run("report").unwrap().collect().await;

    let results: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Specialist(r) => Some(r.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 2);

    // A finishes first; B hits its timeout.
    assert_eq!(results[0].role, "A");
    assert_eq!(results[0].outcome, SpecialistOutcome::Completed("A opinion".to_string()));
    assert_eq!(results[1].role, "B");
    assert_eq!(results[1].outcome, SpecialistOutcome::TimedOut { ms: 30_000 });

    let mut called = clinic.specialist_calls.lock().unwrap().clone();
    called.sort();
    assert_eq!(called, ["A", "B"]);

    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Final(Some("#### 1. X\n- 理由：Y\n- 建议：Z".to_string())))
    );

    // Only the completed opinion reaches the reasoning state.
    let prompts = clinic.reasoning_prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(r#""last_observation":null"#));
    assert!(prompts[0].contains("A opinion"));
    assert!(!prompts[0].contains("timed out"));
}

#[tokio::test]
async fn test_empty_issues_do_not_terminate_reasoning() {
    let clinic = Arc::new(Clinic::new(r#"["A"]"#).reasoning(&[NO_ISSUES, ONE_ISSUE]));
    let orchestrator = Orchestrator::new(clinic.clone(), roster(), config()).unwrap();

    let outcome = orchestrator.diagnose("report").await.unwrap();
    assert_eq!(outcome.diagnosis.as_deref(), Some("#### 1. X\n- 理由：Y\n- 建议：Z"));

    let prompts = clinic.reasoning_prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    // The empty observation is fed back rather than ending the loop.
    assert!(prompts[1].contains(r#""issues":[]"#));
    assert!(!prompts[1].contains(r#""last_observation":null"#));
}

#[tokio::test]
async fn test_exhausted_reasoning_uses_plain_aggregation() {
    let clinic = Arc::new(
        Clinic::new(r#"["A","C"]"#)
            .reasoning(&[NO_ISSUES, NO_ISSUES, ONE_ISSUE])
            .aggregation("three problems"),
    );
    let orchestrator = Orchestrator::new(clinic.clone(), roster(), config()).unwrap();

    let outcome = orchestrator.diagnose("report").await.unwrap();
    assert_eq!(outcome.diagnosis.as_deref(), Some("three problems"));
    // Step budget is a hard cap.
    assert_eq!(clinic.reasoning_prompts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unparseable_triage_assigns_everyone() {
    let clinic = Arc::new(Clinic::new("心内科").reasoning(&[ONE_ISSUE]));
    let orchestrator = Orchestrator::new(clinic.clone(), roster(), config()).unwrap();

    let outcome = orchestrator.diagnose("report").await.unwrap();
    assert_eq!(outcome.assignment, ["A", "B", "C"]);
    assert_eq!(outcome.specialists.len(), 3);
}

#[tokio::test]
async fn test_cached_diagnosis_round_trip_and_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let cache = Arc::new(
        DiagnosisCache::open(&dir.path().join("cache.db"))
            .unwrap()
            .with_clock(clock.clone()),
    );

    let clinic = Arc::new(Clinic::new(r#"["A","B"]"#).reasoning(&[ONE_ISSUE, ONE_ISSUE]));
    let orchestrator = Orchestrator::new(clinic.clone(), roster(), config())
        .unwrap()
        .with_cache(Arc::clone(&cache));

    let first = orchestrator.diagnose("Report text").await.unwrap();
    assert!(!first.from_cache);

    let entry = cache.get(&cache_key("report   TEXT"), Duration::from_secs(3600)).unwrap();
    assert_eq!(entry.diagnosis, first.diagnosis.clone().unwrap());
    assert!((entry.confidence - 1.0).abs() < f64::EPSILON);

    let second = orchestrator.diagnose("report text").await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.diagnosis, first.diagnosis);
    assert_eq!(clinic.reasoning_prompts.lock().unwrap().len(), 1);

    clock.advance(3_600);
    let third = orchestrator.diagnose("report text").await.unwrap();
    assert!(!third.from_cache);
    assert_eq!(clinic.reasoning_prompts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_dropping_progress_stream_cancels_specialists() {
    let clinic = Arc::new(Clinic::new(r#"["A","B","C"]"#).slow("A").slow("B").slow("C"));
    let orchestrator = Orchestrator::new(clinic.clone(), roster(), config()).unwrap();

    let mut events = orchestrator.run("report").unwrap();
    // Status, Triaged, Status: specialists are in flight after this.
    for _ in 0..3 {
        assert!(events.next().await.is_some());
    }
    drop(events);
    tokio::task::yield_now().await;

    assert!(clinic.reasoning_prompts.lock().unwrap().is_empty());
}

/// Named client whose calls always succeed.
struct Named(&'static str, AtomicUsize);

#[async_trait]
impl ModelClient for Named {
    fn name(&self) -> &str {
        self.0
    }

    async fn invoke(&self, _prompt: &str) -> Result<String, AgentError> {
        self.1.fetch_add(1, Ordering::SeqCst);
        Ok(self.0.to_string())
    }
}

#[tokio::test]
async fn test_unavailable_default_substituted_and_logged_once() {
    let logging = LoggingContext::new();
    let openai = Arc::new(Named("openai", AtomicUsize::new(0)));

    for _ in 0..3 {
        let slots = vec![
            ProviderSlot::unavailable("qwen", AgentError::NoProviderAvailable),
            ProviderSlot::available(openai.clone()),
            ProviderSlot::available(Arc::new(Named("ollama", AtomicUsize::new(0)))),
        ];
        let chain = ProviderChain::build(slots, "qwen", None, &logging).unwrap();
        assert_eq!(chain.primary(), "openai");
        assert_eq!(chain.invoke("p").await.unwrap(), "openai");
    }

    assert_eq!(logging.emitted(), 1);
    assert_eq!(openai.1.load(Ordering::SeqCst), 3);
}
