//! Scenario 6 (`spec.md` §8): canceling a `CancelToken` a pending
//! `listener_accept` is blocked on resolves it with `Canceled` promptly.

use std::time::{Duration, Instant};

use ringrt::error::Kind;
use ringrt::net::{listener_accept, listener_bind, SocketAddress};
use ringrt::rt::{CancelToken, Scheduler, Task};

#[test]
fn cancel_token_aborts_a_pending_accept_promptly() {
    let scheduler = Scheduler::new(8).expect("failed to create ring");
    let ring = scheduler.ring().clone();
    let addr = SocketAddress::parse("127.0.0.1:18097").expect("bad test address");
    let listener = listener_bind(&ring, addr, 8).expect("bind failed");
    let cancel = CancelToken::new();

    let spawn_scheduler = scheduler.clone();
    let cancel_for_canceller = cancel.clone();

    let (result, elapsed) = scheduler.join(Task::new(async move {
        spawn_scheduler.spawn(Task::new(async move {
            std::thread::sleep(Duration::from_millis(10));
            cancel_for_canceller.cancel();
        }));
        let start = Instant::now();
        let result = listener_accept(&ring, &listener, Some(&cancel)).await;
        (result.map(|_| ()).map_err(|e| e.kind()), start.elapsed())
    }));

    assert_eq!(result, Err(Kind::Canceled));
    assert!(elapsed < Duration::from_millis(50), "cancellation took {:?}", elapsed);
}
