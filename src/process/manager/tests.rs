use super::*;
use crate::config::{ProgramConfig, RestartConfig};
use crate::process::types::OutputKind;
use std::sync::Mutex;
use std::time::Instant;

fn fast_backoff() -> Backoff {
    Backoff::new(Duration::from_secs(5), Duration::from_millis(100))
}

fn spawn_watch(manager: &Arc<Manager>) -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let token = CancellationToken::new();
    let watcher = Arc::clone(manager);
    let cancel = token.clone();
    let handle = tokio::spawn(async move { watcher.watch(cancel).await });
    (token, handle)
}

#[test]
fn test_manager_new() {
    let manager = Manager::new(Duration::from_secs(3), None);
    assert!(manager.programs().is_empty());
    assert_eq!(manager.close_timeout(), Duration::from_secs(3));
    assert_eq!(manager.backoff(), Backoff::default());
}

#[test]
fn test_add_program_prepares_replicas() {
    let mut manager = Manager::new(Duration::from_secs(1), None);
    manager.add_program("sleeper", "/bin/sleep 10", 3, "").unwrap();

    let program = manager.program("sleeper").unwrap();
    assert_eq!(program.processes().len(), 3);
    assert_eq!(program.user(), None);
    assert_eq!(program.group(), None);
    assert_eq!(manager.processes().count(), 3);
}

#[test]
fn test_add_duplicate_program() {
    let mut manager = Manager::new(Duration::from_secs(1), None);
    manager.add_program("dup", "/bin/true", 1, "").unwrap();

    let result = manager.add_program("dup", "/bin/false", 2, "");
    assert!(matches!(result, Err(HerderError::ProgramAlreadyExists(_))));
    assert_eq!(manager.program("dup").unwrap().command(), "/bin/true");
}

#[test]
fn test_add_invalid_programs() {
    let mut manager = Manager::new(Duration::from_secs(1), None);

    assert!(matches!(
        manager.add_program("", "/bin/true", 1, ""),
        Err(HerderError::InvalidProgram(_))
    ));
    assert!(matches!(
        manager.add_program("none", "/bin/true", 0, ""),
        Err(HerderError::InvalidProgram(_))
    ));
    assert!(matches!(
        manager.add_program("blank", "  ", 1, ""),
        Err(HerderError::InvalidProgram(_))
    ));
    assert!(manager.programs().is_empty());
}

#[test]
fn test_from_config() {
    let config = ManagerConfig {
        close_timeout_secs: 2,
        restart: RestartConfig {
            min_uptime_ms: 1000,
            restart_delay_ms: 250,
        },
        programs: vec![
            ProgramConfig {
                name: "a".to_string(),
                command: "/bin/sleep 1".to_string(),
                instances: 2,
                user: None,
                group: Some("no-such-group-herder-test".to_string()),
            },
            ProgramConfig {
                name: "b".to_string(),
                command: "/bin/true".to_string(),
                instances: 1,
                user: None,
                group: None,
            },
        ],
    };

    let manager = Manager::from_config(&config, None).unwrap();
    assert_eq!(manager.close_timeout(), Duration::from_secs(2));
    assert_eq!(
        manager.backoff(),
        Backoff::new(Duration::from_secs(1), Duration::from_millis(250))
    );
    assert_eq!(manager.processes().count(), 3);
    assert_eq!(
        manager.program("a").unwrap().group(),
        Some("no-such-group-herder-test")
    );
    assert_eq!(manager.program("b").unwrap().group(), None);
}

#[tokio::test]
async fn test_watch_starts_and_stops_everything() {
    let mut manager = Manager::new(Duration::from_secs(2), None);
    manager.add_program("sleeper", "/bin/sleep 10", 3, "").unwrap();
    let manager = Arc::new(manager);

    let (token, handle) = spawn_watch(&manager);
    tokio::time::sleep(Duration::from_millis(500)).await;

    let program = manager.program("sleeper").unwrap();
    for process in program.processes() {
        assert!(process.is_running(), "{} should be running", process.name());
        assert!(process.pid() > 0);
    }

    token.cancel();
    handle.await.unwrap();

    for process in manager.processes() {
        assert!(!process.is_running());
        assert_eq!(process.pid(), 0);
    }
}

#[tokio::test]
async fn test_add_program_after_watch_rejected() {
    let mut manager = Manager::new(Duration::from_secs(1), None);
    manager.add_program("one", "/bin/true", 1, "").unwrap();

    let token = CancellationToken::new();
    token.cancel();
    manager.watch(token).await;

    let result = manager.add_program("two", "/bin/true", 1, "");
    assert!(matches!(result, Err(HerderError::WatchStarted)));
}

#[tokio::test]
async fn test_second_watch_returns_immediately() {
    let mut manager = Manager::new(Duration::from_secs(1), None);
    manager.add_program("one", "/bin/sleep 5", 1, "").unwrap();
    let manager = Arc::new(manager);

    let (token, handle) = spawn_watch(&manager);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let begin = Instant::now();
    manager.watch(CancellationToken::new()).await;
    assert!(begin.elapsed() < Duration::from_millis(500));

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_crashing_process_is_restarted() {
    let mut manager = Manager::new(Duration::from_secs(1), None).with_backoff(fast_backoff());
    manager.add_program("crash", "/bin/false", 1, "").unwrap();
    let manager = Arc::new(manager);

    let (token, handle) = spawn_watch(&manager);
    tokio::time::sleep(Duration::from_millis(800)).await;
    token.cancel();
    handle.await.unwrap();

    let process = &manager.program("crash").unwrap().processes()[0];
    assert!(process.tried_count() >= 3, "tried {}", process.tried_count());
    assert!(process.last_error().is_some());
}

#[tokio::test]
async fn test_pending_restart_cancelled_on_shutdown() {
    let backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(2));
    let mut manager = Manager::new(Duration::from_secs(1), None).with_backoff(backoff);
    manager.add_program("flaky", "/bin/false", 2, "").unwrap();
    let manager = Arc::new(manager);

    let (token, handle) = spawn_watch(&manager);
    tokio::time::sleep(Duration::from_millis(500)).await;
    token.cancel();
    handle.await.unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    for process in manager.processes() {
        assert_eq!(process.tried_count(), 1);
        assert!(!process.is_running());
    }
}

#[tokio::test]
async fn test_restart_program_during_watch() {
    let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(5));
    let mut manager = Manager::new(Duration::from_secs(2), None).with_backoff(backoff);
    manager.add_program("svc", "/bin/sleep 30", 2, "").unwrap();
    let manager = Arc::new(manager);

    let (token, handle) = spawn_watch(&manager);
    tokio::time::sleep(Duration::from_millis(400)).await;

    let before: Vec<u32> = manager.processes().map(|p| p.pid()).collect();
    manager.restart_program("svc").await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    for (process, old_pid) in manager.processes().zip(before) {
        assert!(process.is_running());
        assert_ne!(process.pid(), old_pid);
        assert_eq!(process.tried_count(), 2);
    }

    assert!(matches!(
        manager.restart_program("missing").await,
        Err(HerderError::ProgramNotFound(_))
    ));

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_remove_program() {
    let mut manager = Manager::new(Duration::from_secs(1), None);
    manager.add_program("gone", "/bin/true", 2, "").unwrap();

    let program = manager.remove_program("gone").await.unwrap();
    assert_eq!(program.name(), "gone");
    assert!(manager.programs().is_empty());

    assert!(matches!(
        manager.remove_program("gone").await,
        Err(HerderError::ProgramNotFound(_))
    ));
}

#[tokio::test]
async fn test_output_routed_through_manager() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let handler: OutputHandler = Arc::new(move |kind: OutputKind, line: &str, process: &Process| {
        sink.lock()
            .unwrap()
            .push(format!("{}[{}] {}", process.name(), kind, line));
    });

    let mut manager = Manager::new(Duration::from_secs(1), Some(handler));
    manager.add_program("greet", "/bin/echo hello", 1, "").unwrap();
    let manager = Arc::new(manager);

    let (token, handle) = spawn_watch(&manager);
    tokio::time::sleep(Duration::from_millis(500)).await;
    token.cancel();
    handle.await.unwrap();

    let lines = lines.lock().unwrap();
    assert_eq!(lines.first().map(String::as_str), Some("greet/0[stdout] hello"));
}

#[tokio::test]
async fn test_inspections_sorted() {
    let mut manager = Manager::new(Duration::from_secs(1), None);
    manager.add_program("zeta", "/bin/true", 1, "").unwrap();
    manager.add_program("alpha", "/bin/true", 2, "").unwrap();

    let names: Vec<String> = manager.inspections().into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["alpha/0", "alpha/1", "zeta/0"]);
}
