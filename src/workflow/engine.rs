use super::plan::{fallback_command, parse_plan, split_sudo};
use super::prompts::{self, DiagnosisPrompt, PlanPrompt};
use super::state::{ApprovalDecision, ApprovalStatus, RunOutcome, Step, WorkflowState};
use super::table::{next_step, resume_entry};
use crate::config::{Config, ServiceDefinition, SharedRegistry};
use crate::error::{OracleError, RemoteError, WorkflowError};
use crate::events::{EventBus, EventKind};
use crate::knowledge::KnowledgeBase;
use crate::memory::EpisodeStore;
use crate::oracle::{Oracle, OracleMessage};
use crate::remote::{CommandOutput, RemoteChannel};
use crate::security::{PlanVerdict, SecurityPolicy};
use crate::utils::{truncate_chars, truncate_with_ellipsis};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError};
use tokio_util::sync::CancellationToken;

/// Service name a fleet-wide connectivity failure is attributed to.
pub const CONNECTIVITY_SERVICE: &str = "remote-channel";

/// Fallback escalation reason when none was recorded.
pub const RETRY_LIMIT_REASON: &str = "retry limit reached";

type StepResult = Result<(), WorkflowError>;

/// Tunables the engine reads from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_retries: u32,
    /// Characters of stdout/stderr kept per command in execution summaries.
    pub output_excerpt_chars: usize,
    /// Characters of knowledge-base context included in diagnosis prompts.
    pub knowledge_context_chars: usize,
    pub remote_user: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            output_excerpt_chars: 200,
            knowledge_context_chars: 1000,
            remote_user: "sentinel".into(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.workflow.max_retries,
            output_excerpt_chars: config.workflow.output_excerpt_chars,
            knowledge_context_chars: config.knowledge.max_context_chars,
            remote_user: config.remote.user.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    Running,
    Stopped,
    Error,
}

/// Health of one service as seen by a fleet check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub status: ServiceHealth,
    pub details: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Drives [`WorkflowState`] through the remediation state machine.
pub struct RemediationEngine {
    channel: Arc<dyn RemoteChannel>,
    oracle: Arc<dyn Oracle>,
    knowledge: Option<Arc<dyn KnowledgeBase>>,
    memory: Arc<EpisodeStore>,
    services: SharedRegistry,
    policy: SecurityPolicy,
    settings: EngineSettings,
    events: EventBus,
}

impl RemediationEngine {
    pub fn new(
        channel: Arc<dyn RemoteChannel>,
        oracle: Arc<dyn Oracle>,
        memory: Arc<EpisodeStore>,
        services: SharedRegistry,
        settings: EngineSettings,
    ) -> Self {
        Self {
            channel,
            oracle,
            knowledge: None,
            memory,
            services,
            policy: SecurityPolicy::new(),
            settings,
            events: EventBus::default(),
        }
    }

    #[must_use]
    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeBase>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn knowledge(&self) -> Option<&Arc<dyn KnowledgeBase>> {
        self.knowledge.as_ref()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn memory(&self) -> &Arc<EpisodeStore> {
        &self.memory
    }

    pub fn services(&self) -> &SharedRegistry {
        &self.services
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Start a fresh run at MONITOR.
    pub async fn run(&self, cancel: &CancellationToken) -> (WorkflowState, RunOutcome) {
        let mut state = WorkflowState::new();
        let outcome = self.drive(&mut state, Step::Monitor, cancel).await;
        (state, outcome)
    }

    /// Continue a run suspended in WAITING with an operator decision.
    pub async fn resume(
        &self,
        state: &mut WorkflowState,
        decision: ApprovalDecision,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, WorkflowError> {
        if state.approval_status != ApprovalStatus::WaitingApproval {
            return Err(WorkflowError::NotWaitingForApproval);
        }
        state.apply_decision(decision);
        let entry = resume_entry(state)?;
        self.events.emit(
            EventKind::System,
            format!("Resuming run at {entry} after operator decision"),
        );
        Ok(self.drive(state, entry, cancel).await)
    }

    /// Run steps from `start` until the transition table stops.
    ///
    /// A cancelled token aborts in place: `state` keeps whatever step it
    /// reached and the outcome is [`RunOutcome::Cancelled`].
    pub async fn drive(
        &self,
        state: &mut WorkflowState,
        start: Step,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let mut step = start;
        loop {
            if cancel.is_cancelled() {
                return self.cancelled(step);
            }

            state.current_step = Some(step);
            tracing::debug!(step = %step, retry = state.retry_count, "entering step");

            let result = match step {
                Step::Monitor => self.monitor(state, cancel).await,
                Step::Diagnose => self.diagnose(state, cancel).await,
                Step::Plan => self.plan(state, cancel).await,
                Step::Approve => {
                    self.approve(state);
                    Ok(())
                }
                Step::Execute => self.execute(state, cancel).await,
                Step::Verify => self.verify(state, cancel).await,
                Step::Report => {
                    self.report(state);
                    Ok(())
                }
                Step::Escalate => {
                    self.escalate(state);
                    Ok(())
                }
                Step::Waiting => {
                    self.events.emit(
                        EventKind::Warning,
                        "Critical commands detected. Waiting for manual approval.",
                    );
                    Ok(())
                }
            };

            if let Err(e) = result {
                tracing::debug!(step = %step, "run interrupted: {e}");
                return self.cancelled(step);
            }

            match next_step(step, state, self.settings.max_retries) {
                Some(next) => step = next,
                None => return Self::outcome(step, state),
            }
        }
    }

    /// Check every registered service without starting a run.
    pub async fn check_fleet(&self) -> Vec<ServiceStatus> {
        let services = self.service_snapshot();
        let cancel = CancellationToken::new();
        match self.probe_fleet(&services, &cancel).await {
            Ok(statuses) => statuses,
            Err(e) => connectivity_snapshot(&services, &e),
        }
    }

    // ── Steps ──────────────────────────────────────────────────

    async fn monitor(&self, state: &mut WorkflowState, cancel: &CancellationToken) -> StepResult {
        self.events.emit(EventKind::Monitor, "Checking service status...");
        let services = self.service_snapshot();

        let statuses = match self.probe_fleet(&services, cancel).await {
            Ok(statuses) => statuses,
            Err(e) if e.is_cancelled() => return Err(WorkflowError::Cancelled),
            Err(e) => {
                let message = format!("Remote channel connection failed: {e}");
                self.events.emit(EventKind::Error, message.clone());
                self.publish_snapshot(
                    "Remote channel connection failed",
                    &connectivity_snapshot(&services, &e),
                );
                state.current_error = Some(message);
                state.affected_service = Some(CONNECTIVITY_SERVICE.to_string());
                return Ok(());
            }
        };

        self.publish_snapshot("Service status updated", &statuses);

        match statuses.iter().find(|s| s.status == ServiceHealth::Stopped) {
            Some(failed) => {
                state.current_error = Some(format!("Service '{}' is not active.", failed.name));
                state.affected_service = Some(failed.name.clone());
            }
            None => {
                self.events.emit(EventKind::Monitor, "All services active.");
                state.current_error = None;
                state.affected_service = None;
            }
        }
        Ok(())
    }

    async fn diagnose(&self, state: &mut WorkflowState, cancel: &CancellationToken) -> StepResult {
        self.events.emit(EventKind::Diagnose, "Analysing the problem...");
        let error = state.current_error.clone().unwrap_or_default();
        let service = state.affected_service.as_deref().unwrap_or("unknown");

        let mut memory_context = String::new();
        let mut consulted = false;

        let failed = self.memory.failed_commands(&error);
        if !failed.is_empty() {
            consulted = true;
            memory_context.push_str("COMMANDS THAT ALREADY FAILED (do NOT repeat):\n");
            memory_context.push_str(&prompts::bullet_list(&failed));
            self.events.emit(
                EventKind::Diagnose,
                format!("{} previously failed command(s) identified.", failed.len()),
            );
        }

        if let Some(similar) = self.memory.find_similar(&error).filter(|e| e.success) {
            consulted = true;
            memory_context.push_str(&format!(
                "\nPreviously successful fix: {}\n",
                similar.command
            ));
            self.events.emit(
                EventKind::Diagnose,
                "Previously successful fix found in memory.",
            );
        }

        let knowledge = self.knowledge_context(&error, cancel).await?;

        let messages = prompts::diagnosis_messages(&DiagnosisPrompt {
            service,
            error: &error,
            history: &state.diagnosis_log,
            memory_context: &memory_context,
            knowledge: &knowledge,
        });

        let diagnosis = match self.ask(&messages, cancel).await {
            Ok(text) => text,
            Err(OracleError::Cancelled) => return Err(WorkflowError::Cancelled),
            Err(e) => {
                self.events
                    .emit(EventKind::Warning, format!("Oracle diagnosis failed: {e}"));
                format!("Diagnosis unavailable: {e}")
            }
        };

        self.events.emit(
            EventKind::Diagnose,
            format!("Diagnosis: {}", truncate_with_ellipsis(&diagnosis, 200)),
        );
        state.diagnosis_log.push(diagnosis);
        state.memory_consulted = consulted;
        Ok(())
    }

    async fn plan(&self, state: &mut WorkflowState, cancel: &CancellationToken) -> StepResult {
        self.events
            .emit(EventKind::Plan, "Generating remediation plan...");
        let error = state.current_error.clone().unwrap_or_default();
        let service = state
            .affected_service
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        let diagnosis = state.last_diagnosis().unwrap_or("No diagnosis").to_string();
        let failed = self.memory.failed_commands(&error);

        let messages = prompts::plan_messages(&PlanPrompt {
            service: &service,
            error: &error,
            attempt: state.retry_count + 1,
            diagnosis: &diagnosis,
            failed_commands: &failed,
            remote_user: &self.settings.remote_user,
        });

        let raw = match self.ask(&messages, cancel).await {
            Ok(text) => text,
            Err(OracleError::Cancelled) => return Err(WorkflowError::Cancelled),
            Err(e) => {
                self.events
                    .emit(EventKind::Warning, format!("Oracle planning failed: {e}"));
                String::new()
            }
        };

        let mut commands = parse_plan(&raw);
        if commands.is_empty() {
            commands = vec![fallback_command(&service)];
            self.events.emit(
                EventKind::Plan,
                "Oracle produced no usable commands. Using the default restart.",
            );
        }

        self.events.emit(
            EventKind::Plan,
            format!("Proposed commands: {}", commands.join(" -> ")),
        );
        state.candidate_plan = Some(commands.join("\n"));
        state.approval_status = ApprovalStatus::Pending;
        Ok(())
    }

    fn approve(&self, state: &mut WorkflowState) {
        self.events
            .emit(EventKind::Approve, "Evaluating command safety...");
        let verdict = self.policy.evaluate_plan(&state.plan_commands());
        state.security_flags = verdict.flags().to_vec();

        match verdict {
            PlanVerdict::Rejected {
                command, reason, ..
            } => {
                self.events
                    .emit(EventKind::Security, format!("BLOCKED: {command} -> {reason}"));
                state.approval_status = ApprovalStatus::Rejected;
                state.escalation_reason = Some(reason);
            }
            PlanVerdict::NeedsApproval { .. } => {
                self.events.emit(
                    EventKind::Security,
                    format!(
                        "Manual approval required: {}",
                        state.security_flags.join(", ")
                    ),
                );
                state.approval_status = ApprovalStatus::WaitingApproval;
            }
            PlanVerdict::Approved { .. } => {
                self.events
                    .emit(EventKind::Approve, "Commands are safe. Executing automatically.");
                state.approval_status = ApprovalStatus::Approved;
            }
        }
    }

    async fn execute(&self, state: &mut WorkflowState, cancel: &CancellationToken) -> StepResult {
        self.events
            .emit(EventKind::Execute, "Starting command execution...");
        if state.approval_status != ApprovalStatus::Approved {
            self.events
                .emit(EventKind::Warning, "Plan not approved. Skipping execution.");
            return Ok(());
        }

        let plan = state.candidate_plan.clone().unwrap_or_default();
        let commands: Vec<&str> = state.plan_commands();
        let commands: Vec<String> = commands.into_iter().map(str::to_string).collect();
        if commands.is_empty() {
            self.events
                .emit(EventKind::Warning, "No commands to execute.");
            return Ok(());
        }

        let error = state.current_error.clone().unwrap_or_default();
        let diagnosis = state.last_diagnosis().unwrap_or_default().to_string();
        let total = commands.len();
        let mut results = Vec::with_capacity(total);
        let mut all_succeeded = true;

        for (index, command) in commands.iter().enumerate() {
            let (clean, use_sudo) = split_sudo(command);
            self.events.emit(
                EventKind::Execute,
                format!("[{}/{total}] {command}", index + 1),
            );

            match self.channel.execute(clean, use_sudo, cancel).await {
                Ok(output) => {
                    if !output.success() {
                        all_succeeded = false;
                        self.events.emit_with(
                            EventKind::Error,
                            format!("Step {} failed with exit code {}", index + 1, output.exit_code),
                            serde_json::json!({
                                "command": command,
                                "stderr": truncate_chars(&output.stderr, self.settings.output_excerpt_chars),
                            }),
                        );
                    }
                    results.push(self.summarize(command, &output));
                }
                Err(e) if e.is_cancelled() => return Err(WorkflowError::Cancelled),
                Err(e) => {
                    self.events.emit(
                        EventKind::Error,
                        format!("Exception during execution: {e}"),
                    );
                    results.push(format!("Exception: {e}"));
                    let result = results.join(" | ");
                    self.record_episode(&error, &diagnosis, &plan, &result, false);
                    state.diagnosis_log.push(result);
                    return Ok(());
                }
            }
        }

        let summary = results.join(" | ");
        self.record_episode(&error, &diagnosis, &plan, &summary, all_succeeded);
        self.events.emit(
            EventKind::Execute,
            format!(
                "Episode recorded: {}",
                if all_succeeded { "success" } else { "partial failure" }
            ),
        );
        state.diagnosis_log.push(summary);
        Ok(())
    }

    async fn verify(&self, state: &mut WorkflowState, cancel: &CancellationToken) -> StepResult {
        self.events
            .emit(EventKind::Verify, "Checking whether the service recovered...");
        let service = state.affected_service.clone().unwrap_or_default();

        if service == CONNECTIVITY_SERVICE {
            return self.verify_connectivity(state, cancel).await;
        }

        let Some(definition) = self.service_definition(&service) else {
            self.events.emit(
                EventKind::Error,
                format!("Service '{service}' not found in the registry."),
            );
            state.current_error = Some(format!(
                "Service '{service}' has no verification check configured."
            ));
            state.retry_count += 1;
            return Ok(());
        };

        match self
            .channel
            .execute(&definition.check_command, false, cancel)
            .await
        {
            Ok(output) if definition.is_running(&output.stdout) => {
                self.events
                    .emit(EventKind::Verify, format!("Service '{service}' RECOVERED."));
                state.current_error = None;
            }
            Ok(_) => {
                state.retry_count += 1;
                self.events.emit(
                    EventKind::Warning,
                    format!(
                        "Service '{service}' still down. Attempt {}.",
                        state.retry_count
                    ),
                );
            }
            Err(e) if e.is_cancelled() => return Err(WorkflowError::Cancelled),
            Err(e) => {
                self.events
                    .emit(EventKind::Error, format!("Verification failed: {e}"));
                state.current_error = Some(e.to_string());
                state.retry_count += 1;
            }
        }
        Ok(())
    }

    /// A connectivity failure is cleared once the channel answers every
    /// check again. Services found down are left to the next MONITOR.
    async fn verify_connectivity(
        &self,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
    ) -> StepResult {
        let services = self.service_snapshot();
        match self.probe_fleet(&services, cancel).await {
            Ok(statuses) => {
                self.publish_snapshot("Service status updated", &statuses);
                self.events
                    .emit(EventKind::Verify, "Remote channel RECOVERED.");
                state.current_error = None;
            }
            Err(e) if e.is_cancelled() => return Err(WorkflowError::Cancelled),
            Err(e) => {
                state.retry_count += 1;
                state.current_error = Some(format!("Remote channel connection failed: {e}"));
                self.events.emit(
                    EventKind::Warning,
                    format!(
                        "Remote channel still unreachable. Attempt {}.",
                        state.retry_count
                    ),
                );
            }
        }
        Ok(())
    }

    fn report(&self, state: &WorkflowState) {
        let service = state.affected_service.as_deref().unwrap_or("unknown");
        let plan = state.candidate_plan.as_deref().unwrap_or("N/A");
        if state.current_error.is_none() {
            self.events.emit(
                EventKind::Report,
                format!(
                    "SUCCESS: service '{service}' recovered in {} attempt(s).",
                    state.retry_count + 1
                ),
            );
            self.events
                .emit(EventKind::Report, format!("Applied fix: {plan}"));
        }
    }

    fn escalate(&self, state: &mut WorkflowState) {
        let service = state
            .affected_service
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        let reason = state
            .escalation_reason
            .get_or_insert_with(|| RETRY_LIMIT_REASON.to_string())
            .clone();
        self.events.emit_with(
            EventKind::Escalate,
            format!("CRITICAL FAILURE on '{service}': {reason}"),
            serde_json::json!({
                "service": service,
                "error": state.current_error,
                "plan": state.candidate_plan,
                "attempts": state.retry_count,
            }),
        );
        self.events
            .emit(EventKind::Escalate, "Human intervention required.");
    }

    // ── Helpers ────────────────────────────────────────────────

    fn cancelled(&self, step: Step) -> RunOutcome {
        self.events.emit(
            EventKind::Warning,
            format!("Run cancelled by operator during {step}."),
        );
        RunOutcome::Cancelled
    }

    fn outcome(step: Step, state: &WorkflowState) -> RunOutcome {
        match step {
            Step::Report => RunOutcome::Recovered {
                service: state.affected_service.clone().unwrap_or_default(),
                attempts: state.retry_count + 1,
            },
            Step::Escalate => RunOutcome::Escalated {
                reason: state
                    .escalation_reason
                    .clone()
                    .unwrap_or_else(|| RETRY_LIMIT_REASON.to_string()),
            },
            Step::Waiting => RunOutcome::WaitingApproval,
            _ => RunOutcome::Healthy,
        }
    }

    fn service_snapshot(&self) -> Vec<ServiceDefinition> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .services()
            .to_vec()
    }

    fn service_definition(&self, name: &str) -> Option<ServiceDefinition> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Check every service in registry order. Any channel failure fails the
    /// whole probe.
    async fn probe_fleet(
        &self,
        services: &[ServiceDefinition],
        cancel: &CancellationToken,
    ) -> Result<Vec<ServiceStatus>, RemoteError> {
        let mut statuses = Vec::with_capacity(services.len());
        for service in services {
            let output = self
                .channel
                .execute(&service.check_command, false, cancel)
                .await?;
            let running = service.is_running(&output.stdout);
            if running {
                tracing::info!(service = %service.name, "service ok");
            } else {
                self.events.emit(
                    EventKind::Monitor,
                    format!("{} DOWN: {}", service.name, output.stdout.trim()),
                );
            }
            statuses.push(ServiceStatus {
                name: service.name.clone(),
                status: if running {
                    ServiceHealth::Running
                } else {
                    ServiceHealth::Stopped
                },
                details: if running {
                    "Service is active".to_string()
                } else {
                    output.stdout.trim().to_string()
                },
                kind: service.kind.clone(),
            });
        }
        Ok(statuses)
    }

    fn publish_snapshot(&self, message: &str, statuses: &[ServiceStatus]) {
        let details: serde_json::Map<String, serde_json::Value> = statuses
            .iter()
            .map(|s| {
                (
                    s.name.clone(),
                    serde_json::json!({
                        "status": s.status,
                        "details": s.details,
                        "type": s.kind,
                    }),
                )
            })
            .collect();
        self.events.emit_with(
            EventKind::StatusUpdate,
            message,
            serde_json::Value::Object(details),
        );
    }

    async fn knowledge_context(
        &self,
        error: &str,
        cancel: &CancellationToken,
    ) -> Result<String, WorkflowError> {
        let Some(knowledge) = &self.knowledge else {
            self.events
                .emit(EventKind::Warning, "Knowledge base not available.");
            return Ok(String::new());
        };

        self.events
            .emit(EventKind::Diagnose, "Consulting the knowledge base...");
        let query = format!("How to fix: {error}");
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(WorkflowError::Cancelled),
            result = knowledge.query(&query) => result,
        };

        match result {
            Ok(context) => {
                Ok(truncate_chars(&context, self.settings.knowledge_context_chars).to_string())
            }
            Err(e) => {
                self.events
                    .emit(EventKind::Warning, format!("Knowledge base query failed: {e}"));
                Ok(String::new())
            }
        }
    }

    async fn ask(
        &self,
        messages: &[OracleMessage],
        cancel: &CancellationToken,
    ) -> Result<String, OracleError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(OracleError::Cancelled),
            result = self.oracle.complete(messages) => result,
        }
    }

    fn summarize(&self, command: &str, output: &CommandOutput) -> String {
        let limit = self.settings.output_excerpt_chars;
        let mut line = format!("[{command}] exit:{}", output.exit_code);
        if !output.stdout.is_empty() {
            line.push_str(" stdout:");
            line.push_str(truncate_chars(&output.stdout, limit));
        }
        if !output.stderr.is_empty() {
            line.push_str(" stderr:");
            line.push_str(truncate_chars(&output.stderr, limit));
        }
        line
    }

    fn record_episode(&self, error: &str, diagnosis: &str, plan: &str, result: &str, success: bool) {
        if let Err(e) = self
            .memory
            .save_episode(error, diagnosis, plan, result, success)
        {
            self.events
                .emit(EventKind::Warning, format!("Episode not persisted: {e}"));
        }
    }
}

/// Every service marked as errored because the channel itself failed.
fn connectivity_snapshot(services: &[ServiceDefinition], error: &RemoteError) -> Vec<ServiceStatus> {
    tracing::debug!("fleet probe failed: {error}");
    services
        .iter()
        .map(|s| ServiceStatus {
            name: s.name.clone(),
            status: ServiceHealth::Error,
            details: "Remote connection failed".to_string(),
            kind: s.kind.clone(),
        })
        .collect()
}
