//! Commands every server exposes: help, stop and async job management.
//!
//! Handlers hold a weak reference to the server so the command table never
//! keeps its owner alive.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use serde_json::{Value, json};

use crate::protocol::{Params, RpcError};
use crate::server::RpcServer;
use crate::table::CommandDescriptor;
use crate::validate::{ValueKind, check_object_types, check_types};
use crate::values::{help_example_cli, help_example_rpc};

const HELP_USAGE: &str = "help ( \"command\" )\n\
\n\
List all commands, or get help for a specified command.\n\
\n\
Arguments:\n\
1. \"command\"     (string, optional) The command to get help on\n\
\n\
Result:\n\
\"text\"     (string) The help text\n";

const STOP_USAGE: &str = "stop\n\nStop the noderpc server.\n";

/// Registers the builtin commands on `server`.
///
/// `on_stop` is invoked by the `stop` command and should arrange for the
/// process to shut down. Returns the number of commands registered; builtins
/// whose names are already taken are skipped.
pub fn register_builtins(
    server: &Arc<RpcServer>,
    on_stop: impl Fn() + Send + Sync + 'static,
) -> usize {
    let weak = Arc::downgrade(server);
    let descriptors = [
        help_command(weak.clone()),
        stop_command(on_stop),
        job_status_command(weak.clone()),
        job_result_command(weak.clone()),
        list_jobs_command(weak.clone()),
        cancel_job_command(weak),
    ];
    descriptors
        .into_iter()
        .map(|descriptor| server.table().register(descriptor))
        .filter(|registered| *registered)
        .count()
}

fn help_command(server: Weak<RpcServer>) -> CommandDescriptor {
    CommandDescriptor::new("control", "help", move |params: &Params, help| {
        if help {
            return Ok(Value::String(HELP_USAGE.to_owned()));
        }
        validate(params, &[("command", ValueKind::String)])?;
        let server = upgrade(&server)?;
        let name = argument(params, 0, "command")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(Value::String(server.table().help(name)))
    })
}

fn stop_command(on_stop: impl Fn() + Send + Sync + 'static) -> CommandDescriptor {
    CommandDescriptor::new("control", "stop", move |_: &Params, help| {
        if help {
            return Ok(Value::String(STOP_USAGE.to_owned()));
        }
        on_stop();
        Ok(Value::String("noderpc server stopping".to_owned()))
    })
}

fn job_status_command(server: Weak<RpcServer>) -> CommandDescriptor {
    CommandDescriptor::new("jobs", "getjobstatus", move |params: &Params, help| {
        if help {
            return Ok(Value::String(job_listing_usage(
                "getjobstatus",
                "Get the status of async jobs. Finished jobs stay in memory.",
            )));
        }
        validate(params, &[("jobids", ValueKind::Array)])?;
        let server = upgrade(&server)?;
        let ids = requested_ids(&server, argument(params, 0, "jobids"))?;
        let statuses = ids
            .iter()
            .filter_map(|id| server.jobs().poll(id).ok())
            .map(|snapshot| snapshot.to_value())
            .collect();
        Ok(Value::Array(statuses))
    })
}

fn job_result_command(server: Weak<RpcServer>) -> CommandDescriptor {
    CommandDescriptor::new("jobs", "getjobresult", move |params: &Params, help| {
        if help {
            return Ok(Value::String(job_listing_usage(
                "getjobresult",
                "Retrieve the result and status of finished async jobs, removing them from memory.",
            )));
        }
        validate(params, &[("jobids", ValueKind::Array)])?;
        let server = upgrade(&server)?;
        let ids = requested_ids(&server, argument(params, 0, "jobids"))?;
        let results = ids
            .iter()
            .filter_map(|id| server.jobs().reap(id).ok().flatten())
            .map(|snapshot| snapshot.to_value())
            .collect();
        Ok(Value::Array(results))
    })
}

fn list_jobs_command(server: Weak<RpcServer>) -> CommandDescriptor {
    CommandDescriptor::new("jobs", "listjobids", move |params: &Params, help| {
        if help {
            return Ok(Value::String(format!(
                "listjobids ( \"status\" )\n\n\
                 Returns the ids of known async jobs, optionally filtered by status.\n\n\
                 Arguments:\n\
                 1. \"status\"     (string, optional) queued, executing, success, failed or cancelled\n\n\
                 Examples:\n{}{}",
                help_example_cli("listjobids", "\"success\""),
                help_example_rpc("listjobids", "\"success\"")
            )));
        }
        validate(params, &[("status", ValueKind::String)])?;
        let server = upgrade(&server)?;
        let status = argument(params, 0, "status").and_then(Value::as_str);
        let ids = server
            .jobs()
            .list(status)
            .into_iter()
            .map(|id| Value::String(id.to_string()))
            .collect();
        Ok(Value::Array(ids))
    })
}

fn cancel_job_command(server: Weak<RpcServer>) -> CommandDescriptor {
    CommandDescriptor::new("jobs", "canceljob", move |params: &Params, help| {
        if help {
            return Ok(Value::String(format!(
                "canceljob \"jobid\"\n\n\
                 Cancel an async job. Queued jobs are cancelled immediately; running jobs\n\
                 are asked to stop and finish on their own.\n\n\
                 Arguments:\n\
                 1. \"jobid\"     (string, required) The job to cancel\n\n\
                 Result:\n\
                 true|false     (boolean) Whether a queued job was cancelled\n\n\
                 Examples:\n{}{}",
                help_example_cli("canceljob", "\"opid-...\""),
                help_example_rpc("canceljob", "\"opid-...\"")
            )));
        }
        validate(params, &[("jobid", ValueKind::String)])?;
        let server = upgrade(&server)?;
        let id = argument(params, 0, "jobid")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_parameter("Missing job id"))?;
        let cancelled = server
            .jobs()
            .cancel(id)
            .map_err(|error| error.to_rpc_error())?;
        Ok(json!(cancelled))
    })
}

fn job_listing_usage(method: &str, summary: &str) -> String {
    format!(
        "{method} ( [\"jobid\", ... ] )\n\n\
         {summary}\n\n\
         Arguments:\n\
         1. \"jobids\"     (array, optional) Job ids; all known jobs when omitted\n\n\
         Result:\n\
         [ {{ \"id\": \"opid-...\", \"method\": \"...\", \"status\": \"...\", ... }}, ... ]\n\n\
         Examples:\n{}{}",
        help_example_cli(method, "'[\"opid-...\"]'"),
        help_example_rpc(method, "[\"opid-...\"]")
    )
}

fn upgrade(server: &Weak<RpcServer>) -> Result<Arc<RpcServer>, RpcError> {
    server
        .upgrade()
        .ok_or_else(|| RpcError::internal("RPC server is no longer available"))
}

/// Reads an argument by position, or by key for named parameters.
fn argument<'a>(params: &'a Params, index: usize, key: &str) -> Option<&'a Value> {
    let value = match params {
        Params::Positional(values) => values.get(index),
        Params::Named(map) => map.get(key),
    };
    value.filter(|value| !value.is_null())
}

/// Type-checks optional arguments; nulls stand for omitted values.
fn validate(params: &Params, expected: &[(&str, ValueKind)]) -> Result<(), RpcError> {
    let outcome = match params {
        Params::Positional(values) => {
            let kinds: Vec<ValueKind> = expected.iter().map(|(_, kind)| *kind).collect();
            check_types(values, &kinds, true)
        }
        Params::Named(map) => {
            let kinds: BTreeMap<String, ValueKind> = expected
                .iter()
                .map(|(key, kind)| ((*key).to_owned(), *kind))
                .collect();
            check_object_types(map, &kinds, true)
        }
    };
    outcome.map_err(|mismatch| RpcError::type_error(mismatch.to_string()))
}

/// Resolves an optional id filter into the ids to report.
fn requested_ids(server: &RpcServer, filter: Option<&Value>) -> Result<Vec<String>, RpcError> {
    let Some(Value::Array(values)) = filter else {
        return Ok(server
            .jobs()
            .list(None)
            .into_iter()
            .map(|id| id.to_string())
            .collect());
    };
    values
        .iter()
        .map(|value| {
            value
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| RpcError::type_error("job ids must be strings"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    use rstest::{fixture, rstest};

    use super::*;
    use crate::jobs::QueueConfig;
    use crate::node::NormalOperation;
    use crate::protocol::{RPC_INVALID_PARAMETER, RPC_TYPE_ERROR};
    use crate::server::ServerConfig;

    struct Harness {
        server: Arc<RpcServer>,
        stops: Arc<AtomicUsize>,
    }

    impl Harness {
        fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
            let params = match params {
                Value::Object(map) => Params::Named(map),
                Value::Array(values) => Params::Positional(values),
                _ => Params::default(),
            };
            self.server
                .execute(method, &params)
                .map_err(|error| error.to_rpc_error())
        }

        fn finished_job(&self) -> String {
            let id = self
                .server
                .jobs()
                .submit("compute", |_| Ok(json!(42)))
                .expect("submit job");
            let deadline = Instant::now() + Duration::from_secs(10);
            while !self
                .server
                .jobs()
                .poll(id.as_str())
                .expect("job known")
                .state
                .is_terminal()
            {
                assert!(Instant::now() < deadline, "job did not finish");
                thread::sleep(Duration::from_millis(2));
            }
            id.to_string()
        }
    }

    #[fixture]
    fn harness() -> Harness {
        let config = ServerConfig {
            queue: QueueConfig {
                workers: 1,
                backlog: 8,
            },
            ..ServerConfig::default()
        };
        let server = Arc::new(RpcServer::new(config, Arc::new(NormalOperation)));
        let stops = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&stops);
        let registered = register_builtins(&server, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(registered, 6);
        server.start();
        server.warmup().mark_finished();
        Harness { server, stops }
    }

    #[rstest]
    fn help_lists_builtins_by_category(harness: Harness) {
        let text = harness.call("help", json!([])).expect("help");
        let text = text.as_str().expect("help text");
        assert!(text.starts_with("== Control ==\nhelp ( \"command\" )\nstop\n\n== Jobs ==\n"));
        assert!(text.contains("canceljob \"jobid\""));
    }

    #[rstest]
    fn help_for_a_command_returns_its_usage(harness: Harness) {
        let text = harness.call("help", json!(["stop"])).expect("help stop");
        assert_eq!(text, json!(STOP_USAGE));
        let text = harness.call("help", json!({"command": "nope"})).expect("help nope");
        assert_eq!(text, json!("help: unknown command: nope"));
    }

    #[rstest]
    fn help_rejects_non_string_argument(harness: Harness) {
        let error = harness.call("help", json!([5])).expect_err("bad type");
        assert_eq!(error.code, RPC_TYPE_ERROR);
    }

    #[rstest]
    fn stop_invokes_the_shutdown_callback(harness: Harness) {
        let reply = harness.call("stop", json!([])).expect("stop");
        assert_eq!(reply, json!("noderpc server stopping"));
        assert_eq!(harness.stops.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    fn job_status_and_result_report_finished_jobs(harness: Harness) {
        let id = harness.finished_job();

        let statuses = harness.call("getjobstatus", json!([])).expect("status");
        assert_eq!(statuses[0]["id"], json!(id));
        assert_eq!(statuses[0]["status"], json!("success"));

        let listed = harness
            .call("listjobids", json!(["success"]))
            .expect("list");
        assert_eq!(listed, json!([id]));

        let results = harness
            .call("getjobresult", json!([[id.clone()]]))
            .expect("result");
        assert_eq!(results[0]["result"], json!(42));

        let after = harness.call("getjobstatus", json!([[id]])).expect("status");
        assert_eq!(after, json!([]));
    }

    #[rstest]
    fn cancel_job_requires_a_known_id(harness: Harness) {
        let missing = harness.call("canceljob", json!([])).expect_err("no id");
        assert_eq!(missing.code, RPC_INVALID_PARAMETER);
        let unknown = harness
            .call("canceljob", json!(["opid-unknown"]))
            .expect_err("unknown id");
        assert_eq!(unknown.code, RPC_INVALID_PARAMETER);

        let id = harness.finished_job();
        assert_eq!(harness.call("canceljob", json!([id])).expect("cancel"), json!(false));
    }

    #[rstest]
    fn job_id_filters_must_be_strings(harness: Harness) {
        let error = harness
            .call("getjobstatus", json!([[1]]))
            .expect_err("numeric id");
        assert_eq!(error.code, RPC_TYPE_ERROR);
    }
}
