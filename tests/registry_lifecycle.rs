mod common;

use common::{registry, registry_with_capacity, sh_tool, wait_until, WAIT};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::TryRecvError;
use toolmux::session::{SessionEvent, SessionState, SessionStatus};

#[tokio::test]
async fn silent_kill_publishes_nothing_and_frees_the_slot() {
    let registry = registry(vec![sh_tool("a", "sleep 30", None)]);
    let mut events = registry.subscribe();

    let first = registry.get_or_create("a", false).await.unwrap();
    // Drain the spawn-time transitions.
    while events.try_recv().is_ok() {}

    assert!(registry.kill("a", true).unwrap());
    assert_eq!(first.state(), SessionState::Dead);
    assert!(registry.get("a").is_none());

    tokio::time::sleep(Duration::from_millis(100)).await;
    loop {
        match events.try_recv() {
            Ok(SessionEvent::Exited { .. }) => panic!("silent kill published an exit"),
            Ok(_) => continue,
            Err(TryRecvError::Empty) => break,
            Err(err) => panic!("unexpected: {err}"),
        }
    }

    let second = registry.get_or_create("a", false).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.is_alive());
}

#[tokio::test]
async fn loud_kill_publishes_exit_once() {
    let registry = registry(vec![sh_tool("a", "sleep 30", None)]);
    let mut events = registry.subscribe();
    registry.get_or_create("a", false).await.unwrap();

    registry.kill("a", false).unwrap();

    let mut exits = 0;
    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Exited { tool_id, exit_code } = event {
            assert_eq!(tool_id, "a");
            assert_eq!(exit_code, None);
            exits += 1;
        }
    }
    assert_eq!(exits, 1);
}

#[tokio::test]
async fn natural_exit_is_reported_and_replaced() {
    let registry = registry(vec![sh_tool("a", "printf 'bye\\n'; exit 7", None)]);
    let mut events = registry.subscribe();

    let first = registry.get_or_create("a", false).await.unwrap();
    let exit = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(SessionEvent::Exited { exit_code, .. }) = events.recv().await {
                return exit_code;
            }
        }
    })
    .await
    .expect("exit event");
    assert_eq!(exit, Some(7));
    assert_eq!(first.exit_code(), Some(7));

    // Dead sessions stay visible until someone asks for the tool again.
    assert!(registry.get("a").is_some_and(|s| !s.is_alive()));

    let second = registry.get_or_create("a", false).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn writes_to_dead_session_are_ignored() {
    let registry = registry(vec![sh_tool("a", "exit 0", None)]);
    let session = registry.get_or_create("a", false).await.unwrap();
    assert!(wait_until(WAIT, || !session.is_alive()).await);
    assert!(session.write(b"anything\r").is_ok());
    assert!(session.resize(100, 40).is_ok());
}

#[tokio::test]
async fn buffer_keeps_only_the_newest_bytes() {
    let registry = registry_with_capacity(
        vec![sh_tool(
            "a",
            "i=0; while [ $i -lt 200 ]; do printf 'line%03d\\n' $i; i=$((i+1)); done; printf END; sleep 30",
            None,
        )],
        256,
    );
    let session = registry.get_or_create("a", false).await.unwrap();

    assert!(wait_until(WAIT, || session.snapshot().ends_with(b"END")).await);
    let snapshot = session.snapshot();
    assert!(snapshot.len() <= 256);
    assert_eq!(session.buffer_len(), snapshot.len());
    let text = String::from_utf8_lossy(&snapshot);
    assert!(text.contains("line199"));
    assert!(!text.contains("line000"));

    // Everything the tool printed is either still buffered or counted as dropped.
    let dropped = session.buffer_dropped();
    assert!(dropped as usize + snapshot.len() >= 200 * "line000\n".len());
    let statuses = registry.statuses(Instant::now());
    assert_eq!(statuses[0].dropped, dropped);
}

#[tokio::test]
async fn detached_output_keeps_accumulating() {
    let registry = registry(vec![sh_tool(
        "a",
        "printf one; sleep 0.2; printf two; sleep 30",
        None,
    )]);
    let session = registry.get_or_create("a", false).await.unwrap();
    assert!(wait_until(WAIT, || session.snapshot().ends_with(b"onetwo")).await);
}

#[tokio::test]
async fn status_reports_processing_then_idle() {
    let registry = registry(vec![sh_tool("a", "printf busy; sleep 30", None)]);
    let session = registry.get_or_create("a", false).await.unwrap();
    assert!(wait_until(WAIT, || session.last_output_at().is_some()).await);

    let now = session.last_output_at().unwrap();
    let statuses = registry.statuses(now);
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].tool_id, "a");
    assert_eq!(statuses[0].display_name, "A");
    assert_eq!(statuses[0].status, SessionStatus::Processing);
    assert!(statuses[0].pid.is_some());

    let later = now + Duration::from_millis(500);
    assert_eq!(registry.statuses(later)[0].status, SessionStatus::Ready);
}

#[tokio::test]
async fn capture_response_strips_terminal_formatting() {
    let registry = registry(vec![sh_tool(
        "a",
        "printf '\\033[1mThe answer\\033[0m is 42\\r\\n'; sleep 30",
        None,
    )]);
    let session = registry.get_or_create("a", false).await.unwrap();
    assert!(wait_until(WAIT, || session.snapshot().ends_with(b"\r\n")).await);

    let text = registry.capture_response("a").unwrap();
    assert_eq!(text, "The answer is 42");
    assert!(registry.capture_response("zzz").is_err());
}

#[tokio::test]
async fn kill_all_stops_everything() {
    let registry = registry(vec![
        sh_tool("a", "sleep 30", None),
        sh_tool("b", "sleep 30", None),
    ]);
    let a = registry.get_or_create("a", false).await.unwrap();
    let b = registry.get_or_create("b", false).await.unwrap();

    registry.kill_all();

    assert!(!a.is_alive());
    assert!(!b.is_alive());
    assert!(registry.statuses(Instant::now()).is_empty());
}
