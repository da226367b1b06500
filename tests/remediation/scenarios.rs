use std::sync::Arc;

use sentinel::memory::EpisodeStore;
use sentinel::workflow::{ApprovalStatus, RunOutcome};
use tempfile::TempDir;

use crate::fakes::{self, FakeChannel, NGINX_CHECK, NGINX_DOWN, NGINX_UP, Reply, ScriptedOracle};

#[tokio::test]
async fn critical_plan_waits_without_executing() {
    let tmp = TempDir::new().unwrap();
    let channel = Arc::new(FakeChannel::new().script(NGINX_CHECK, &[Reply::Out(3, NGINX_DOWN)]));
    let oracle = Arc::new(ScriptedOracle::answering(&[
        "nginx crashed after a config reload",
        "sudo service nginx restart",
    ]));
    let controller = fakes::controller(Arc::clone(&channel), oracle, tmp.path());

    let outcome = controller.run_now().await.unwrap();

    assert_eq!(outcome, RunOutcome::WaitingApproval);
    assert!(channel.remediation_commands().is_empty());
    let state = controller.snapshot().state;
    assert_eq!(state.current_error.as_deref(), Some("Service 'nginx' is not active."));
    assert_eq!(state.approval_status, ApprovalStatus::WaitingApproval);
    assert_eq!(
        state.security_flags,
        vec!["CRITICAL: sudo service nginx restart".to_string()]
    );
    assert!(controller.episodes().is_empty());
}

#[tokio::test]
async fn forbidden_plan_escalates_without_executing() {
    let tmp = TempDir::new().unwrap();
    let channel = Arc::new(FakeChannel::new().script(NGINX_CHECK, &[Reply::Out(3, NGINX_DOWN)]));
    let oracle = Arc::new(ScriptedOracle::answering(&[
        "disk is corrupted",
        "sudo service nginx start\nrm -rf /",
    ]));
    let controller = fakes::controller(Arc::clone(&channel), oracle, tmp.path());

    let outcome = controller.run_now().await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Escalated {
            reason: "blocked by security policy: forbidden pattern".into()
        }
    );
    assert!(channel.remediation_commands().is_empty());
    assert!(controller.episodes().is_empty());
    assert!(!tmp.path().join("checkpoint.json").exists());
}

#[tokio::test]
async fn safe_plan_runs_automatically_and_recovers() {
    let tmp = TempDir::new().unwrap();
    let channel = Arc::new(FakeChannel::new().script(
        NGINX_CHECK,
        &[Reply::Out(3, NGINX_DOWN), Reply::Out(0, NGINX_UP)],
    ));
    let oracle = Arc::new(ScriptedOracle::answering(&[
        "nginx stopped cleanly",
        "service nginx start",
    ]));
    let controller = fakes::controller(Arc::clone(&channel), oracle, tmp.path());

    let outcome = controller.run_now().await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Recovered {
            service: "nginx".into(),
            attempts: 1
        }
    );
    assert!(
        channel
            .executed()
            .contains(&("service nginx start".to_string(), true))
    );
    let episodes = controller.episodes();
    assert_eq!(episodes.len(), 1);
    assert!(episodes[0].success);
    assert_eq!(episodes[0].command, "sudo service nginx start");
    assert_eq!(episodes[0].error, "Service 'nginx' is not active.");
}

#[tokio::test]
async fn failed_verifications_escalate_at_the_retry_limit() {
    let tmp = TempDir::new().unwrap();
    let channel = Arc::new(FakeChannel::new().script(NGINX_CHECK, &[Reply::Out(3, NGINX_DOWN)]));
    let oracle = Arc::new(ScriptedOracle::answering(&[
        "attempt one",
        "service nginx start",
        "attempt two",
        "nginx -t",
        "attempt three",
        "service nginx start",
    ]));
    let controller = fakes::controller(Arc::clone(&channel), Arc::clone(&oracle), tmp.path());

    let outcome = controller.run_now().await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Escalated {
            reason: "retry limit reached".into()
        }
    );
    assert_eq!(controller.snapshot().state.retry_count, 3);
    assert_eq!(oracle.call_count(), 6);
    assert_eq!(controller.episodes().len(), 3);
}

#[tokio::test]
async fn unreachable_host_is_diagnosed_as_connectivity() {
    let tmp = TempDir::new().unwrap();
    let channel = Arc::new(FakeChannel::new().script(NGINX_CHECK, &[Reply::Unreachable]));
    let oracle = Arc::new(ScriptedOracle::answering(&[
        "host unreachable",
        "ping -c 1 fake-host",
        "still unreachable",
        "ping -c 1 fake-host",
        "still unreachable",
        "ping -c 1 fake-host",
    ]));
    let controller = fakes::controller(Arc::clone(&channel), oracle, tmp.path());

    let outcome = controller.run_now().await.unwrap();

    assert!(matches!(outcome, RunOutcome::Escalated { .. }));
    let state = controller.snapshot().state;
    assert_eq!(state.affected_service.as_deref(), Some("remote-channel"));
    assert_eq!(state.retry_count, 3);
    assert!(
        state
            .current_error
            .as_deref()
            .unwrap()
            .starts_with("Remote channel connection failed")
    );
}

#[tokio::test]
async fn connectivity_recovers_once_the_channel_answers_again() {
    let tmp = TempDir::new().unwrap();
    let channel = Arc::new(
        FakeChannel::new().script(NGINX_CHECK, &[Reply::Unreachable, Reply::Out(0, NGINX_UP)]),
    );
    let oracle = Arc::new(ScriptedOracle::answering(&[
        "host unreachable",
        "ping -c 1 fake-host",
    ]));
    let controller = fakes::controller(Arc::clone(&channel), Arc::clone(&oracle), tmp.path());

    let outcome = controller.run_now().await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Recovered {
            service: "remote-channel".into(),
            attempts: 1,
        }
    );
    assert!(controller.snapshot().state.current_error.is_none());
    assert_eq!(oracle.call_count(), 2);
}

#[tokio::test]
async fn failed_commands_from_memory_reach_the_next_plan_prompt() {
    let tmp = TempDir::new().unwrap();
    let memory_dir = tmp.path().join("memory");
    {
        let store = EpisodeStore::open(&memory_dir).unwrap();
        store
            .save_episode(
                "Service 'nginx' is not active.",
                "port conflict",
                "sudo service nginx restart",
                "exit:1",
                false,
            )
            .unwrap();
    }

    let channel = Arc::new(FakeChannel::new().script(NGINX_CHECK, &[Reply::Out(3, NGINX_DOWN)]));
    let oracle = Arc::new(ScriptedOracle::answering(&["diag", "sudo service nginx restart"]));
    let controller = fakes::controller(channel, Arc::clone(&oracle), tmp.path());

    controller.run_now().await.unwrap();

    assert!(controller.snapshot().state.memory_consulted);
    let plan_prompt = oracle.system_prompt(1);
    assert!(plan_prompt.contains("sudo service nginx restart"));
}
