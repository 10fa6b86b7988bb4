use super::*;
use crate::session::{ManualClock, MemoryStorage};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

const NOW: i64 = 1_700_000_000;

fn cred(tag: &str, exp: i64) -> Credential {
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{}","exp":{}}}"#, tag, exp));
    Credential::parse(format!("h.{}.s", payload)).unwrap()
}

fn alice() -> Identity { Identity::new("alice", vec!["user".into()]) }

fn coordinator(timeout: Duration) -> Arc<RefreshCoordinator> {
    let session = Arc::new(SessionStore::new(Arc::new(MemoryStorage::default()), Arc::new(ManualClock::new(NOW))));
    Arc::new(RefreshCoordinator::new(session, timeout))
}

type CallResult = Result<(Credential, Identity), NormalizedError>;

fn gated(gate: Arc<Notify>, starts: Arc<AtomicUsize>, result: CallResult) -> impl FnOnce() -> RefreshCall {
    move || {
        starts.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            gate.notified().await;
            result
        })
    }
}

async fn wait_for_waiters(c: &RefreshCoordinator, n: usize) {
    for _ in 0..400 {
        if c.waiting() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {} waiters, saw {}", n, c.waiting());
}

fn spawn_recover(
    c: &Arc<RefreshCoordinator>,
    gate: &Arc<Notify>,
    starts: &Arc<AtomicUsize>,
    result: CallResult,
) -> tokio::task::JoinHandle<RefreshOutcome> {
    let c = Arc::clone(c);
    let call = gated(gate.clone(), starts.clone(), result);
    tokio::spawn(async move { c.recover(None, call).await })
}

#[tokio::test]
async fn concurrent_recoveries_share_one_refresh() {
    let c = coordinator(Duration::from_secs(5));
    let gate = Arc::new(Notify::new());
    let starts = Arc::new(AtomicUsize::new(0));
    let fresh = cred("fresh", NOW + 3600);

    let handles: Vec<_> = (0..3).map(|_| spawn_recover(&c, &gate, &starts, Ok((fresh.clone(), alice())))).collect();
    wait_for_waiters(&c, 3).await;
    assert_eq!(c.state(), RefreshState::Refreshing);
    gate.notify_one();

    for h in handles {
        match h.await.unwrap() {
            RefreshOutcome::Refreshed(got) => assert_eq!(got, fresh),
            RefreshOutcome::Failed(e) => panic!("unexpected failure: {}", e),
        }
    }
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(c.rounds(), 1);
    assert_eq!(c.state(), RefreshState::Idle);
    assert_eq!(c.waiting(), 0);
    assert_eq!(c.session().get_token(), Some(fresh));
    assert_eq!(c.session().current_identity(), Some(alice()));
}

#[tokio::test]
async fn failed_refresh_fails_every_waiter_and_clears_session() {
    let c = coordinator(Duration::from_secs(5));
    c.session().set_session(&cred("old", NOW + 10), &alice()).unwrap();
    let gate = Arc::new(Notify::new());
    let starts = Arc::new(AtomicUsize::new(0));
    let denied = NormalizedError::new(ErrorKind::Unauthorized, "nope", Failure::Status { status: 401, body: None });

    let handles: Vec<_> = (0..4).map(|_| spawn_recover(&c, &gate, &starts, Err(denied.clone()))).collect();
    wait_for_waiters(&c, 4).await;
    gate.notify_one();

    for h in handles {
        match h.await.unwrap() {
            RefreshOutcome::Failed(e) => assert_eq!(e.kind, ErrorKind::Unauthorized),
            RefreshOutcome::Refreshed(_) => panic!("refresh should have failed"),
        }
    }
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(c.state(), RefreshState::Idle);
    assert!(c.session().get_token().is_none());
    assert!(c.session().current_identity().is_none());
}

#[tokio::test]
async fn timeout_is_a_failed_round() {
    let c = coordinator(Duration::from_millis(30));
    c.session().set_session(&cred("old", NOW + 10), &alice()).unwrap();
    let gate = Arc::new(Notify::new()); // never released
    let starts = Arc::new(AtomicUsize::new(0));

    let a = spawn_recover(&c, &gate, &starts, Ok((cred("x", NOW + 60), alice())));
    let b = spawn_recover(&c, &gate, &starts, Ok((cred("x", NOW + 60), alice())));
    for h in [a, b] {
        match h.await.unwrap() {
            RefreshOutcome::Failed(e) => {
                assert!(matches!(e.original, Failure::Transport(TransportError::Timeout(_))));
            }
            RefreshOutcome::Refreshed(_) => panic!("timeout must fail the round"),
        }
    }
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert!(c.session().get_token().is_none());
    assert_eq!(c.state(), RefreshState::Idle);
}

#[tokio::test]
async fn replaced_credential_short_circuits() {
    let c = coordinator(Duration::from_secs(5));
    let current = cred("new", NOW + 60);
    c.session().set_session(&current, &alice()).unwrap();
    let stale = cred("old", NOW + 60);
    let starts = Arc::new(AtomicUsize::new(0));

    let out = c.recover(Some(stale.token()), gated(Arc::new(Notify::new()), starts.clone(), Ok((cred("z", NOW), alice())))).await;
    assert!(matches!(out, RefreshOutcome::Refreshed(ref got) if *got == current));
    assert_eq!(starts.load(Ordering::SeqCst), 0);
    assert_eq!(c.rounds(), 0);
}

#[tokio::test]
async fn same_rejected_token_still_refreshes() {
    let c = coordinator(Duration::from_secs(5));
    let current = cred("cur", NOW + 60);
    c.session().set_session(&current, &alice()).unwrap();
    let gate = Arc::new(Notify::new());
    gate.notify_one();
    let starts = Arc::new(AtomicUsize::new(0));
    let fresh = cred("fresh", NOW + 3600);

    let out = c.recover(Some(current.token()), gated(gate, starts.clone(), Ok((fresh.clone(), alice())))).await;
    assert!(matches!(out, RefreshOutcome::Refreshed(ref got) if *got == fresh));
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelled_waiter_does_not_disturb_the_round() {
    let c = coordinator(Duration::from_secs(5));
    let gate = Arc::new(Notify::new());
    let starts = Arc::new(AtomicUsize::new(0));
    let fresh = cred("fresh", NOW + 3600);

    let leader = spawn_recover(&c, &gate, &starts, Ok((fresh.clone(), alice())));
    let doomed = spawn_recover(&c, &gate, &starts, Ok((fresh.clone(), alice())));
    let survivor = spawn_recover(&c, &gate, &starts, Ok((fresh.clone(), alice())));
    wait_for_waiters(&c, 3).await;
    doomed.abort();
    // the originating request giving up must not cancel the refresh either
    leader.abort();
    gate.notify_one();

    match survivor.await.unwrap() {
        RefreshOutcome::Refreshed(got) => assert_eq!(got, fresh),
        RefreshOutcome::Failed(e) => panic!("unexpected failure: {}", e),
    }
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(c.session().get_token(), Some(fresh));
}

#[tokio::test]
async fn panicking_refresh_fails_the_round() {
    let c = coordinator(Duration::from_secs(5));
    fn explode() -> CallResult { panic!("boom") }
    let out = c.recover(None, || -> RefreshCall { Box::pin(async { explode() }) }).await;
    assert!(matches!(out, RefreshOutcome::Failed(_)));
    assert_eq!(c.state(), RefreshState::Idle);
}

#[tokio::test]
async fn panicking_start_still_settles_the_round() {
    let c = coordinator(Duration::from_secs(5));
    c.session().set_session(&cred("old", NOW + 60), &alice()).unwrap();
    let out = c.recover(None, || -> RefreshCall { panic!("cannot build refresh call") }).await;
    assert!(matches!(out, RefreshOutcome::Failed(_)));
    assert_eq!(c.state(), RefreshState::Idle);
    assert!(c.session().get_token().is_none());

    // the coordinator is usable again afterwards
    let gate = Arc::new(Notify::new());
    gate.notify_one();
    let starts = Arc::new(AtomicUsize::new(0));
    let fresh = cred("fresh", NOW + 3600);
    let out = c.recover(None, gated(gate, starts.clone(), Ok((fresh.clone(), alice())))).await;
    assert!(matches!(out, RefreshOutcome::Refreshed(ref got) if *got == fresh));
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_rejected_credential_is_purged_and_refreshed() {
    let session = Arc::new(SessionStore::new(Arc::new(MemoryStorage::default()), Arc::new(ManualClock::new(NOW))));
    let c = Arc::new(RefreshCoordinator::new(session, Duration::from_secs(5)));
    let stale = cred("stale", NOW - 1);
    c.session().set_session(&stale, &alice()).unwrap();
    let gate = Arc::new(Notify::new());
    gate.notify_one();
    let starts = Arc::new(AtomicUsize::new(0));
    let fresh = cred("fresh", NOW + 3600);

    let out = c.recover(Some(stale.token()), gated(gate, starts.clone(), Ok((fresh.clone(), alice())))).await;
    assert!(matches!(out, RefreshOutcome::Refreshed(ref got) if *got == fresh));
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(c.session().get_token(), Some(fresh));
}

#[tokio::test]
async fn later_round_after_idle_is_a_new_refresh() {
    let c = coordinator(Duration::from_secs(5));
    let starts = Arc::new(AtomicUsize::new(0));
    for i in 0..2 {
        let gate = Arc::new(Notify::new());
        gate.notify_one();
        let out = c.recover(None, gated(gate, starts.clone(), Ok((cred(&format!("r{}", i), NOW + 60), alice())))).await;
        assert!(matches!(out, RefreshOutcome::Refreshed(_)));
    }
    assert_eq!(starts.load(Ordering::SeqCst), 2);
    assert_eq!(c.rounds(), 2);
}
