mod common;

use common::{FakeHost, HostCall, MemoryReadiness};
use microk8s_agent::core::config::{AgentConfig, GroupFailurePolicy};
use microk8s_agent::core::db;
use microk8s_agent::core::store::Store;
use microk8s_agent::plugins::charm::{Disposition, LifecycleEvent, Reconciler, run_hook};
use microk8s_agent::plugins::deferred::DeferredQueue;
use microk8s_agent::plugins::readiness::ReadinessStore;
use tempfile::tempdir;

fn queue() -> (tempfile::TempDir, DeferredQueue) {
    let tmp = tempdir().expect("tempdir");
    let store = Store::open(tmp.path()).expect("store");
    db::initialize_agent_db(store.path()).expect("init");
    let queue = DeferredQueue::open(&store).expect("queue");
    (tmp, queue)
}

#[test]
fn defer_bumps_attempts_instead_of_duplicating() {
    let (_tmp, queue) = queue();

    let first = queue.defer(LifecycleEvent::Start).unwrap();
    let second = queue.defer(LifecycleEvent::Start).unwrap();

    assert_eq!(first.event_id, second.event_id);
    assert_eq!(second.attempts, 2);
    assert_eq!(queue.pending().unwrap().len(), 1);
}

#[test]
fn pending_keeps_first_deferral_order() {
    let (_tmp, queue) = queue();
    queue.defer(LifecycleEvent::Start).unwrap();
    queue.defer(LifecycleEvent::Install).unwrap();
    queue.defer(LifecycleEvent::Start).unwrap();

    let kinds: Vec<_> = queue.pending().unwrap().into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![LifecycleEvent::Start, LifecycleEvent::Install]);
}

#[test]
fn complete_and_clear_remove_rows() {
    let (_tmp, queue) = queue();
    queue.defer(LifecycleEvent::Start).unwrap();
    queue.defer(LifecycleEvent::Install).unwrap();

    assert!(queue.complete(LifecycleEvent::Start).unwrap());
    assert!(!queue.complete(LifecycleEvent::Start).unwrap());
    assert_eq!(queue.clear().unwrap(), 1);
    assert!(queue.pending().unwrap().is_empty());
}

#[test]
fn start_alone_requests_redelivery() {
    let (_tmp, queue) = queue();
    let host = FakeHost::default();
    let readiness = MemoryReadiness::default();
    let config = AgentConfig::default();
    let reconciler = Reconciler::new(&host, &readiness, &config);

    let report = run_hook(&reconciler, &queue, LifecycleEvent::Start).unwrap();

    assert_eq!(report.disposition, Disposition::Deferred);
    assert!(report.replayed.is_empty());
    let pending = queue.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, LifecycleEvent::Start);
    assert!(!readiness.get().unwrap().ready);
    assert!(host.statuses().is_empty());
}

#[test]
fn deferred_start_is_replayed_before_the_next_hook() {
    let (_tmp, queue) = queue();
    let host = FakeHost::default();
    let readiness = MemoryReadiness::default();
    let config = AgentConfig::default();
    let reconciler = Reconciler::new(&host, &readiness, &config);

    run_hook(&reconciler, &queue, LifecycleEvent::Start).unwrap();

    // Snap shows up out of band (e.g. a manual install) before the next hook.
    host.installed.set(true);
    let report = run_hook(&reconciler, &queue, LifecycleEvent::Install).unwrap();

    assert_eq!(
        report.replayed,
        vec![(LifecycleEvent::Start, Disposition::Completed)]
    );
    assert_eq!(report.disposition, Disposition::Completed);
    assert!(queue.pending().unwrap().is_empty());
    assert!(readiness.get().unwrap().ready);

    // The replayed start ran before the install.
    let calls = host.calls();
    let status_at = calls
        .iter()
        .position(|c| matches!(c, HostCall::Status(..)))
        .unwrap();
    let install_at = calls
        .iter()
        .position(|c| matches!(c, HostCall::InstallSnap(..)))
        .unwrap();
    assert!(status_at < install_at);
}

#[test]
fn replay_that_defers_again_bumps_attempts() {
    let (_tmp, queue) = queue();
    let host = FakeHost::default();
    host.fail_snap_install.set(true);
    let readiness = MemoryReadiness::default();
    let config = AgentConfig::default();
    let reconciler = Reconciler::new(&host, &readiness, &config);

    run_hook(&reconciler, &queue, LifecycleEvent::Start).unwrap();
    let err = run_hook(&reconciler, &queue, LifecycleEvent::Install);

    assert!(err.is_err());
    let pending = queue.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, LifecycleEvent::Start);
    assert_eq!(pending[0].attempts, 2);
}

#[test]
fn same_kind_is_not_dispatched_twice_in_one_hook() {
    let (_tmp, queue) = queue();
    let host = FakeHost::default();
    let readiness = MemoryReadiness::default();
    let config = AgentConfig::default();
    let reconciler = Reconciler::new(&host, &readiness, &config);

    run_hook(&reconciler, &queue, LifecycleEvent::Start).unwrap();
    host.installed.set(true);
    let report = run_hook(&reconciler, &queue, LifecycleEvent::Start).unwrap();

    assert!(report.replayed.is_empty());
    assert_eq!(report.disposition, Disposition::Completed);
    assert_eq!(host.statuses().len(), 1);
    assert!(queue.pending().unwrap().is_empty());
}

#[test]
fn blocked_start_stays_queued_until_the_group_change_succeeds() {
    let (_tmp, queue) = queue();
    let host = FakeHost::with_snap_installed();
    host.fail_group.set(true);
    let readiness = MemoryReadiness::default();
    let config = AgentConfig {
        group_failure: GroupFailurePolicy::Block,
        ..AgentConfig::default()
    };
    let reconciler = Reconciler::new(&host, &readiness, &config);

    let report = run_hook(&reconciler, &queue, LifecycleEvent::Start).unwrap();
    assert_eq!(report.disposition, Disposition::Deferred);
    assert_eq!(queue.pending().unwrap()[0].kind, LifecycleEvent::Start);

    host.fail_group.set(false);
    let report = run_hook(&reconciler, &queue, LifecycleEvent::Install).unwrap();

    assert_eq!(
        report.replayed,
        vec![(LifecycleEvent::Start, Disposition::Completed)]
    );
    assert!(queue.pending().unwrap().is_empty());
    assert!(readiness.get().unwrap().ready);
}

#[test]
fn queue_requires_an_initialized_store() {
    let tmp = tempdir().expect("tempdir");
    let store = Store::open(tmp.path()).expect("store");
    assert!(DeferredQueue::open(&store).is_err());
}
