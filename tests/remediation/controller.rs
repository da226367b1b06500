use std::sync::Arc;
use std::time::Duration;

use sentinel::controller::{RunStatus, load_checkpoint};
use sentinel::error::WorkflowError;
use sentinel::events::EventKind;
use sentinel::workflow::{ApprovalDecision, ApprovalStatus, RunOutcome};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::fakes::{self, FakeChannel, NGINX_CHECK, NGINX_DOWN, NGINX_UP, Reply, ScriptedOracle};

fn critical_oracle() -> Arc<ScriptedOracle> {
    Arc::new(ScriptedOracle::answering(&[
        "nginx died after an upgrade",
        "sudo service nginx restart",
    ]))
}

#[tokio::test]
async fn idle_controller_rejects_stop_and_resume() {
    let tmp = TempDir::new().unwrap();
    let controller = fakes::controller(
        Arc::new(FakeChannel::new()),
        Arc::new(ScriptedOracle::default()),
        tmp.path(),
    );

    assert_eq!(controller.status(), RunStatus::Idle);
    assert_eq!(controller.stop(), Err(WorkflowError::NotRunning));
    assert_eq!(
        controller.resume(ApprovalDecision::Approve).await,
        Err(WorkflowError::NotWaitingForApproval)
    );
}

#[tokio::test]
async fn second_run_is_rejected_and_stop_cancels_the_first() {
    let tmp = TempDir::new().unwrap();
    let channel = Arc::new(FakeChannel::new().script(NGINX_CHECK, &[Reply::Hang]));
    let controller = fakes::controller(
        Arc::clone(&channel),
        Arc::new(ScriptedOracle::default()),
        tmp.path(),
    );

    let handle = controller.start().unwrap();
    channel.wait_for_hang().await;

    assert_eq!(controller.status(), RunStatus::Running);
    assert_eq!(
        controller.run_now().await,
        Err(WorkflowError::AlreadyRunning)
    );
    assert!(controller.start().is_err());

    controller.stop().unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("cancelled run should finish promptly")
        .unwrap();

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(controller.status(), RunStatus::Idle);
    assert!(controller.episodes().is_empty());
    assert_eq!(controller.stop(), Err(WorkflowError::NotRunning));
}

#[tokio::test]
async fn waiting_run_is_checkpointed() {
    let tmp = TempDir::new().unwrap();
    let channel = Arc::new(FakeChannel::new().script(NGINX_CHECK, &[Reply::Out(3, NGINX_DOWN)]));
    let controller = fakes::controller(channel, critical_oracle(), tmp.path());

    assert_eq!(
        controller.run_now().await.unwrap(),
        RunOutcome::WaitingApproval
    );
    assert_eq!(controller.status(), RunStatus::Waiting);

    let saved = load_checkpoint(&tmp.path().join("checkpoint.json"))
        .unwrap()
        .expect("checkpoint should be written");
    assert_eq!(saved.approval_status, ApprovalStatus::WaitingApproval);
    assert_eq!(
        saved.candidate_plan.as_deref(),
        Some("sudo service nginx restart")
    );
}

#[tokio::test]
async fn approval_resumes_a_checkpointed_run_in_a_new_controller() {
    let tmp = TempDir::new().unwrap();
    {
        let channel =
            Arc::new(FakeChannel::new().script(NGINX_CHECK, &[Reply::Out(3, NGINX_DOWN)]));
        let controller = fakes::controller(channel, critical_oracle(), tmp.path());
        controller.run_now().await.unwrap();
    }

    let channel = Arc::new(FakeChannel::new().script(NGINX_CHECK, &[Reply::Out(0, NGINX_UP)]));
    let oracle = Arc::new(ScriptedOracle::default());
    let controller = fakes::controller(Arc::clone(&channel), Arc::clone(&oracle), tmp.path());
    assert_eq!(controller.status(), RunStatus::Waiting);

    let outcome = controller.resume(ApprovalDecision::Approve).await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Recovered {
            service: "nginx".into(),
            attempts: 1
        }
    );
    assert_eq!(
        channel.executed(),
        vec![
            ("service nginx restart".to_string(), true),
            (NGINX_CHECK.to_string(), false),
        ]
    );
    assert_eq!(oracle.call_count(), 0);
    assert_eq!(controller.status(), RunStatus::Idle);
    assert!(!tmp.path().join("checkpoint.json").exists());
    assert_eq!(controller.episodes().len(), 1);
}

#[tokio::test]
async fn rejection_escalates_without_executing() {
    let tmp = TempDir::new().unwrap();
    let channel = Arc::new(FakeChannel::new().script(NGINX_CHECK, &[Reply::Out(3, NGINX_DOWN)]));
    let controller = fakes::controller(Arc::clone(&channel), critical_oracle(), tmp.path());
    controller.run_now().await.unwrap();

    let outcome = controller.resume(ApprovalDecision::Reject).await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Escalated {
            reason: "plan rejected by operator".into()
        }
    );
    assert!(channel.remediation_commands().is_empty());
    assert!(!tmp.path().join("checkpoint.json").exists());
    assert_eq!(
        controller.resume(ApprovalDecision::Approve).await,
        Err(WorkflowError::NotWaitingForApproval)
    );
}

#[tokio::test]
async fn fresh_run_discards_a_waiting_run() {
    let tmp = TempDir::new().unwrap();
    let channel = Arc::new(FakeChannel::new().script(
        NGINX_CHECK,
        &[Reply::Out(3, NGINX_DOWN), Reply::Out(0, NGINX_UP)],
    ));
    let controller = fakes::controller(channel, critical_oracle(), tmp.path());
    controller.run_now().await.unwrap();
    assert!(tmp.path().join("checkpoint.json").exists());

    assert_eq!(controller.run_now().await.unwrap(), RunOutcome::Healthy);
    assert_eq!(controller.status(), RunStatus::Idle);
    assert!(!tmp.path().join("checkpoint.json").exists());
    assert_eq!(
        controller.snapshot().state.approval_status,
        ApprovalStatus::Pending
    );
}

#[tokio::test]
async fn watch_runs_cycles_until_shutdown() {
    let tmp = TempDir::new().unwrap();
    let channel = Arc::new(FakeChannel::new().script(NGINX_CHECK, &[Reply::Out(0, NGINX_UP)]));
    let controller = fakes::controller(
        Arc::clone(&channel),
        Arc::new(ScriptedOracle::default()),
        tmp.path(),
    );

    let shutdown = CancellationToken::new();
    let watcher = {
        let controller = Arc::clone(&controller);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            controller
                .watch(Duration::from_millis(10), shutdown)
                .await;
        })
    };

    tokio::time::sleep(Duration::from_millis(60)).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .expect("watch should stop on shutdown")
        .unwrap();

    assert!(channel.executed().len() >= 2);
    assert!(
        controller
            .snapshot()
            .last_outcome
            .is_some_and(|outcome| outcome == RunOutcome::Healthy)
    );
}

#[tokio::test]
async fn watch_skips_cycles_while_waiting() {
    let tmp = TempDir::new().unwrap();
    let channel = Arc::new(FakeChannel::new().script(NGINX_CHECK, &[Reply::Out(3, NGINX_DOWN)]));
    let controller = fakes::controller(Arc::clone(&channel), critical_oracle(), tmp.path());
    controller.run_now().await.unwrap();
    let checks_before = channel.executed().len();

    let shutdown = CancellationToken::new();
    let watcher = {
        let controller = Arc::clone(&controller);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            controller
                .watch(Duration::from_millis(10), shutdown)
                .await;
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();
    watcher.await.unwrap();

    assert_eq!(channel.executed().len(), checks_before);
    assert_eq!(controller.status(), RunStatus::Waiting);
}

#[tokio::test]
async fn run_lifecycle_is_broadcast() {
    let tmp = TempDir::new().unwrap();
    let channel = Arc::new(FakeChannel::new().script(NGINX_CHECK, &[Reply::Out(0, NGINX_UP)]));
    let controller = fakes::controller(
        channel,
        Arc::new(ScriptedOracle::default()),
        tmp.path(),
    );
    let mut events = controller.engine().events().subscribe();

    controller.run_now().await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(kinds.first(), Some(&EventKind::System));
    assert!(kinds.contains(&EventKind::Monitor));
    assert!(kinds.contains(&EventKind::StatusUpdate));
    assert_eq!(kinds.last(), Some(&EventKind::System));
}
