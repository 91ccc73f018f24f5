// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Role agents.
//!
//! Each role's session is spawned with a prompt assembled from its
//! declared read set; afterwards the tool-use records it emitted are
//! applied to the substrate, gated by the role's write set. A write
//! outside the set fails the session (logged to PROGRESS) but never
//! the loop. Subconscious changes to governed documents travel as
//! proposals that only a Superego session can apply.

use crate::control::LoopControl;
use crate::prompt::{self, DocSlice};
use crate::DaemonError;
use anima_core::{iso_ts, parse_iso_ts, Clock, Config, DocKind, LoopEvent, Role, WriteMode};
use anima_session::{ProcessRunner, SessionEvent, SessionLauncher, SessionOutcome};
use anima_substrate::{ConversationLog, Substrate, SubstrateError};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A governed-document change proposed by Subconscious, pending
/// Superego judgement.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub doc: DocKind,
    pub content: String,
    pub reason: String,
}

/// Result of one role session.
#[derive(Debug, Default)]
pub struct RoleRun {
    pub outcome: Option<SessionOutcome>,
    pub rate_limit_until_ms: Option<u64>,
    /// Goals suggested by an Id session.
    pub goal_candidates: Vec<String>,
    /// Writes rejected by write-set enforcement.
    pub denied_writes: Vec<DocKind>,
}

struct Collected {
    tools: Vec<(String, Value)>,
    text: String,
}

/// The four role agents behind one dispatch surface.
#[derive(Clone)]
pub struct RoleAgents<R: ProcessRunner, C: Clock> {
    pub substrate: Substrate<C>,
    pub conversation: ConversationLog<C>,
    launcher: SessionLauncher<R, C>,
    control: LoopControl,
    clock: C,
    config: Config,
    proposals: Arc<Mutex<Vec<Proposal>>>,
}

impl<R: ProcessRunner, C: Clock + 'static> RoleAgents<R, C> {
    pub fn new(
        substrate: Substrate<C>,
        conversation: ConversationLog<C>,
        launcher: SessionLauncher<R, C>,
        control: LoopControl,
        clock: C,
        config: Config,
    ) -> Self {
        Self {
            substrate,
            conversation,
            launcher,
            control,
            clock,
            config,
            proposals: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn pending_proposals(&self) -> usize {
        self.proposals.lock().len()
    }

    /// Run one role session and apply its permitted writes.
    pub async fn run_role(
        &self,
        role: Role,
        extra: Option<String>,
    ) -> Result<RoleRun, DaemonError> {
        let mut slices = Vec::new();
        for &kind in role.spec().read_set {
            match self.substrate.read(kind).await {
                Ok(content) => slices.push(DocSlice {
                    kind,
                    text: content.text,
                }),
                Err(SubstrateError::Missing(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let pending = if role == Role::Ego {
            self.control.drain_pending()
        } else {
            Vec::new()
        };
        let prompt = prompt::build(role, &slices, &pending, extra.as_deref());

        let model = match role {
            Role::Subconscious => self.config.tactical_model().to_string(),
            _ => self.config.strategic_model().to_string(),
        };

        let (event_tx, event_rx) = mpsc::channel(64);
        let session = self
            .launcher
            .launch(role, &model, &prompt, event_tx)
            .await?;
        self.control.register_session(session.control());
        self.control.mark_activity(self.clock.epoch_ms());

        let collector = tokio::spawn(collect_events(
            event_rx,
            self.control.clone(),
            self.clock.clone(),
            role,
        ));

        let outcome = session.wait().await;
        self.control.clear_session();
        let now = self.clock.epoch_ms();
        self.control.mark_activity(now);

        let outcome = outcome?;
        let collected = collector.await.unwrap_or(Collected {
            tools: Vec::new(),
            text: String::new(),
        });

        let mut run = RoleRun {
            rate_limit_until_ms: outcome
                .rate_limit_until
                .as_deref()
                .and_then(parse_iso_ts),
            ..RoleRun::default()
        };

        if outcome.success {
            for (name, input) in &collected.tools {
                match self.apply_tool(role, name, input, &mut run).await {
                    Ok(()) => {}
                    Err(DaemonError::PermissionDenied { role, doc }) => {
                        warn!(%role, %doc, "write outside role set denied");
                        run.denied_writes.push(doc);
                        let note = format!("write to {doc} denied for {role}");
                        let _ = self
                            .substrate
                            .append(DocKind::Progress, "SYSTEM", &note)
                            .await;
                    }
                    Err(e) => {
                        warn!(%role, tool = %name, error = %e, "tool application failed");
                    }
                }
            }
        } else {
            let detail = if outcome.timed_out {
                "timed out".to_string()
            } else if outcome.cancelled {
                "cancelled".to_string()
            } else {
                format!("exit {:?}", outcome.exit_code)
            };
            info!(%role, detail, "session did not complete cleanly");
            let _ = self
                .substrate
                .append(
                    DocKind::Progress,
                    "SYSTEM",
                    &format!("{role} session {detail}"),
                )
                .await;
        }

        self.control
            .emit(LoopEvent::tick_complete(now, role, outcome.timed_out));
        run.outcome = Some(outcome);
        Ok(run)
    }

    /// Superego audit: judge pending proposals, write the report under
    /// `audit/`, and append a summary to PROGRESS.
    pub async fn run_audit(&self, cycle_number: u64) -> Result<RoleRun, DaemonError> {
        let proposals: Vec<Proposal> = self.proposals.lock().drain(..).collect();

        let mut extra = String::from("<<PENDING PROPOSALS>>\n");
        if proposals.is_empty() {
            extra.push_str("(none)\n");
        }
        for (i, p) in proposals.iter().enumerate() {
            extra.push_str(&format!(
                "{}. target={} reason={}\n---\n{}\n---\n",
                i + 1,
                p.doc,
                p.reason,
                p.content
            ));
        }
        extra.push_str("<<END PENDING PROPOSALS>>\n");

        let run = self.run_role(Role::Superego, Some(extra)).await?;

        // Anything the session did not apply is rejected by default;
        // the report records how many judgements were pending.
        let now = self.clock.epoch_ms();
        let report_name = format!("audit-{}.md", iso_ts(now).replace(':', "-"));
        let report_path = self.substrate.root().join("audit").join(&report_name);
        let report = format!(
            "# Audit (cycle {})\n\nproposals considered: {}\n",
            cycle_number,
            proposals.len(),
        );
        std::fs::create_dir_all(report_path.parent().unwrap_or(self.substrate.root()))?;
        std::fs::write(&report_path, report)?;

        self.substrate
            .append(
                DocKind::Progress,
                Role::Superego.label(),
                &format!("audit complete (cycle {cycle_number}), report {report_name}"),
            )
            .await?;
        Ok(run)
    }

    /// Idle path: Id produces goal candidates, a Superego gate decides
    /// which of them become PLAN tasks.
    pub async fn run_idle_path(&self) -> Result<(), DaemonError> {
        let id_run = self.run_role(Role::Id, None).await?;
        if id_run.goal_candidates.is_empty() {
            debug!("id session produced no goal candidates");
            return Ok(());
        }

        let mut extra = String::from("<<GOAL CANDIDATES>>\n");
        for goal in &id_run.goal_candidates {
            extra.push_str("- ");
            extra.push_str(goal);
            extra.push('\n');
        }
        extra.push_str("<<END GOAL CANDIDATES>>\n");

        self.run_role(Role::Superego, Some(extra)).await?;
        Ok(())
    }

    async fn apply_tool(
        &self,
        role: Role,
        name: &str,
        input: &Value,
        run: &mut RoleRun,
    ) -> Result<(), DaemonError> {
        match name {
            "write_doc" => {
                let doc = doc_arg(input)?;
                let content = str_arg(input, "content")?;
                self.check_write(role, doc)?;
                self.substrate.overwrite(doc, content).await?;
            }

            "append_doc" => {
                let doc = doc_arg(input)?;
                let text = str_arg(input, "text")?;
                self.check_write(role, doc)?;
                if doc.write_mode() != WriteMode::AppendOnly {
                    return Err(DaemonError::Substrate(SubstrateError::WrongWriteMode {
                        kind: doc,
                        expected: WriteMode::AppendOnly,
                    }));
                }
                self.substrate.append(doc, role.label(), text).await?;
            }

            "complete_task" => {
                let task = str_arg(input, "task")?;
                self.check_write(role, DocKind::Plan)?;
                self.complete_plan_task(task).await?;
            }

            "add_task" => {
                let task = str_arg(input, "task")?;
                self.check_write(role, DocKind::Plan)?;
                self.add_plan_task(task).await?;
            }

            "say" => {
                let text = str_arg(input, "text")?;
                self.check_write(role, DocKind::Conversation)?;
                self.conversation.append(role.label(), text, false).await?;
                self.control
                    .emit(LoopEvent::conversation_response(self.clock.epoch_ms(), text));
            }

            "propose" => {
                // Only Subconscious routes proposals; for everyone else
                // this is a no-op worth logging.
                if role != Role::Subconscious {
                    debug!(%role, "ignoring propose from non-subconscious role");
                    return Ok(());
                }
                let doc = doc_arg(input)?;
                let content = str_arg(input, "content")?;
                let reason = input
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                self.proposals.lock().push(Proposal {
                    doc,
                    content: content.to_string(),
                    reason,
                });
            }

            "suggest_goal" => {
                if role == Role::Id {
                    run.goal_candidates
                        .push(str_arg(input, "goal")?.to_string());
                }
            }

            other => {
                debug!(%role, tool = other, "ignoring unknown tool");
            }
        }
        Ok(())
    }

    fn check_write(&self, role: Role, doc: DocKind) -> Result<(), DaemonError> {
        if role.may_write(doc) {
            Ok(())
        } else {
            Err(DaemonError::PermissionDenied { role, doc })
        }
    }

    async fn complete_plan_task(&self, task: &str) -> Result<(), DaemonError> {
        let plan = self.substrate.read(DocKind::Plan).await?;
        let open_line = format!("- [ ] {task}");
        let done_line = format!("- [x] {task}");
        if !plan.text.contains(&open_line) {
            debug!(task, "task not found open in plan");
            return Ok(());
        }
        let updated = plan.text.replacen(&open_line, &done_line, 1);
        self.substrate.overwrite(DocKind::Plan, &updated).await?;
        Ok(())
    }

    async fn add_plan_task(&self, task: &str) -> Result<(), DaemonError> {
        let plan = self.substrate.read(DocKind::Plan).await?;
        let line = format!("- [ ] {task}");
        if plan.text.contains(&line) {
            return Ok(());
        }
        let mut updated = plan.text.trim_end().to_string();
        updated.push('\n');
        updated.push_str(&line);
        updated.push('\n');
        self.substrate.overwrite(DocKind::Plan, &updated).await?;
        Ok(())
    }
}

fn doc_arg(input: &Value) -> Result<DocKind, DaemonError> {
    input
        .get("doc")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .ok_or_else(|| {
            DaemonError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "missing or unknown doc argument",
            ))
        })
}

fn str_arg<'a>(input: &'a Value, key: &str) -> Result<&'a str, DaemonError> {
    input.get(key).and_then(Value::as_str).ok_or_else(|| {
        DaemonError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("missing {key} argument"),
        ))
    })
}

async fn collect_events<C: Clock>(
    mut rx: mpsc::Receiver<SessionEvent>,
    control: LoopControl,
    clock: C,
    role: Role,
) -> Collected {
    let mut collected = Collected {
        tools: Vec::new(),
        text: String::new(),
    };
    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Text { content } => {
                control.emit(LoopEvent::process_output(
                    clock.epoch_ms(),
                    role,
                    &content,
                ));
                collected.text.push_str(&content);
                collected.text.push('\n');
            }
            SessionEvent::ToolUse { name, input } => {
                collected.tools.push((name, input));
            }
            SessionEvent::Completed { .. } => {}
            SessionEvent::Error { message } => {
                warn!(%role, message, "session reported error");
            }
        }
    }
    collected
}

#[cfg(test)]
#[path = "roles_tests.rs"]
mod tests;
