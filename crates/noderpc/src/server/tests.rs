//! Gating, batch handling and lifecycle tests for the RPC server.

use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::thread;
use std::time::Instant;

use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::jobs::{JobState, QueueConfig};
use crate::node::NormalOperation;
use crate::protocol::{
    RPC_INVALID_REQUEST, RPC_IN_WARMUP, RPC_METHOD_NOT_FOUND, RPC_PARSE_ERROR, RPC_SHUTTING_DOWN,
    RpcError,
};
use crate::table::CommandDescriptor;

fn test_config() -> ServerConfig {
    ServerConfig {
        queue: QueueConfig {
            workers: 2,
            backlog: 16,
        },
        shutdown_grace: Duration::from_secs(5),
    }
}

fn register_fixtures(server: &RpcServer) {
    server
        .table()
        .register(CommandDescriptor::new("util", "echo", |params: &Params, help| {
            if help {
                return Ok(json!("echo ( args )"));
            }
            Ok(params.to_value())
        }));
    server
        .table()
        .register(CommandDescriptor::new("util", "fail", |_: &Params, help| {
            if help {
                return Ok(json!("fail"));
            }
            Err(RpcError::new(-6, "Insufficient funds"))
        }));
}

/// Server with fixture commands registered, started and warmed up.
#[fixture]
fn server() -> RpcServer {
    let server = RpcServer::new(test_config(), Arc::new(NormalOperation));
    register_fixtures(&server);
    server.start();
    server.warmup().mark_finished();
    server
}

#[test]
fn warmup_gates_every_command_before_hooks_run() {
    let server = RpcServer::new(test_config(), Arc::new(NormalOperation));
    register_fixtures(&server);
    let hook_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hook_calls);
    server.hooks().on_pre_command(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    server.start();
    server.warmup().set_status("Loading block index...");

    for method in ["echo", "fail", "missing"] {
        let error = server
            .execute(method, &Params::default())
            .expect_err("warming up");
        let rpc = error.to_rpc_error();
        assert_eq!(rpc.code, RPC_IN_WARMUP);
        assert_eq!(rpc.message, "Loading block index...");
    }
    assert_eq!(hook_calls.load(Ordering::SeqCst), 0);

    server.warmup().mark_finished();
    assert!(server.execute("echo", &Params::default()).is_ok());
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
}

#[rstest]
fn batch_replies_keep_order_and_isolate_failures(server: RpcServer) {
    let reply = server.handle_value(&json!([
        {"id": 1, "method": "echo", "params": [1]},
        {"id": 2, "method": "nope"},
        {"id": 3, "method": 7},
        {"id": 4, "method": "fail"},
        "garbage",
        {"id": 6, "method": "echo", "params": {"k": true}}
    ]));

    assert_eq!(
        reply,
        json!([
            {"result": [1], "error": null, "id": 1},
            {"result": null, "error": {"code": RPC_METHOD_NOT_FOUND, "message": "Method not found"}, "id": 2},
            {"result": null, "error": {"code": RPC_INVALID_REQUEST, "message": "Method must be a string"}, "id": 3},
            {"result": null, "error": {"code": -6, "message": "Insufficient funds"}, "id": 4},
            {"result": null, "error": {"code": RPC_INVALID_REQUEST, "message": "Invalid Request object"}, "id": null},
            {"result": {"k": true}, "error": null, "id": 6}
        ])
    );
}

#[rstest]
fn single_request_yields_single_reply(server: RpcServer) {
    let reply = server.handle_value(&json!({"id": "a", "method": "echo", "params": ["x"]}));
    assert_eq!(reply, json!({"result": ["x"], "error": null, "id": "a"}));
}

#[rstest]
#[case("  echo")]
#[case("echo\n")]
fn padded_method_names_are_not_found(server: RpcServer, #[case] method: &str) {
    let reply = server.handle_value(&json!({"id": 1, "method": method, "params": []}));
    assert_eq!(reply["result"], Value::Null);
    assert_eq!(reply["error"]["code"], json!(RPC_METHOD_NOT_FOUND));
}

#[rstest]
fn malformed_json_yields_parse_error_with_null_id(server: RpcServer) {
    let text = server.handle_text("{\"id\": 1, \"method\":");
    let reply: Value = serde_json::from_str(&text).expect("reply is JSON");
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["result"], Value::Null);
    assert_eq!(reply["error"]["code"], json!(RPC_PARSE_ERROR));
}

#[rstest]
fn handle_text_round_trips_a_batch(server: RpcServer) {
    let text = server.handle_text(r#"[{"id":1,"method":"echo","params":[true]}]"#);
    let reply: Value = serde_json::from_str(&text).expect("reply is JSON");
    assert_eq!(reply, json!([{"result": [true], "error": null, "id": 1}]));
}

#[rstest]
fn interrupt_refuses_new_work(server: RpcServer) {
    server.interrupt();

    assert!(!server.is_running());
    let error = server
        .execute("echo", &Params::default())
        .expect_err("shutting down");
    assert_eq!(error.code(), RPC_SHUTTING_DOWN);
    assert!(matches!(
        server.submit("echo", Params::default()),
        Err(DispatchError::ShuttingDown)
    ));
}

#[rstest]
fn registration_closes_after_start(server: RpcServer) {
    let accepted = server
        .table()
        .register(CommandDescriptor::new("util", "late", |_: &Params, _| Ok(Value::Null)));
    assert!(!accepted);
    assert!(matches!(
        server.execute("late", &Params::default()),
        Err(DispatchError::MethodNotFound { .. })
    ));
}

#[rstest]
fn submitted_commands_run_through_the_table(server: RpcServer) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&calls);
    server.hooks().on_post_command(move |command| {
        recorder.lock().expect("calls lock").push(command.name.clone());
        Ok(())
    });

    let id = server
        .submit("echo", Params::from(vec![json!(5)]))
        .expect("submit echo");

    let deadline = Instant::now() + Duration::from_secs(10);
    let snapshot = loop {
        let snapshot = server.jobs().poll(id.as_str()).expect("job known");
        if snapshot.state.is_terminal() {
            break snapshot;
        }
        assert!(Instant::now() < deadline, "job did not finish");
        thread::sleep(Duration::from_millis(2));
    };
    assert_eq!(snapshot.state, JobState::Success(json!([5])));
    assert_eq!(snapshot.label, "echo");
    assert_eq!(*calls.lock().expect("calls lock"), vec!["echo".to_owned()]);
}

#[rstest]
fn submitting_an_unknown_method_fails_fast(server: RpcServer) {
    let error = server
        .submit("missing", Params::default())
        .expect_err("unknown method");
    assert_eq!(error.code(), RPC_METHOD_NOT_FOUND);
}

#[test]
fn start_and_stop_fire_lifecycle_hooks_once() {
    let server = RpcServer::new(test_config(), Arc::new(NormalOperation));
    let events = Arc::new(Mutex::new(Vec::new()));
    let started = Arc::clone(&events);
    let stopped = Arc::clone(&events);
    server
        .hooks()
        .on_started(move || started.lock().expect("events lock").push("started"));
    server
        .hooks()
        .on_stopped(move || stopped.lock().expect("events lock").push("stopped"));

    server.start();
    server.start();
    assert!(server.is_running());
    server.stop();
    server.stop();

    assert!(!server.is_running());
    assert_eq!(*events.lock().expect("events lock"), vec!["started", "stopped"]);
}

#[test]
fn stop_clears_pending_timers() {
    let server = RpcServer::new(test_config(), Arc::new(NormalOperation));
    server
        .timers()
        .register_driver(Arc::new(crate::timer::ThreadTimerDriver::new()));
    server
        .timers()
        .run_later("flush", || {}, 3600)
        .expect("schedule");
    assert_eq!(server.timers().pending(), vec!["flush".to_owned()]);

    server.stop();

    assert!(server.timers().pending().is_empty());
}

#[test]
fn server_config_follows_loaded_configuration() {
    let config = Config {
        async_workers: 0,
        async_backlog: 3,
        shutdown_grace_ms: 250,
        ..Config::default()
    };

    let server_config = ServerConfig::from(&config);

    assert_eq!(server_config.queue.workers, 1);
    assert_eq!(server_config.queue.backlog, 3);
    assert_eq!(server_config.shutdown_grace, Duration::from_millis(250));
}
