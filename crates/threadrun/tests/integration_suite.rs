//! Integration tests for threadrun endpoints, threads and workers.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use threadwire::CallId;
use threadwire::Envelope;
use threadwire::FunctionId;
use threadwire::Message;
use threadwire::names;
use tracing_subscriber::EnvFilter;

use threadrun::Endpoint;
use threadrun::Error;
use threadrun::Exposed;
use threadrun::Function;
use threadrun::MemoryTransport;
use threadrun::Registry;
use threadrun::RemoteError;
use threadrun::Shape;
use threadrun::StreamTransport;
use threadrun::Thread;
use threadrun::Transport;
use threadrun::Value;
use threadrun::worker::Worker;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Connects a client endpoint to a server endpoint exposing `exposed`.
fn connect(exposed: Exposed) -> (Endpoint, Endpoint) {
    init_tracing();
    let (a, b) = MemoryTransport::pair();
    let server = Endpoint::builder(b).name("server").expose(exposed).build();
    let client = Endpoint::builder(a).name("client").build();
    (client, server)
}

/// Polls `condition` until it holds, failing the test after two seconds.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn add(args: Vec<Value>) -> Result<Value, RemoteError> {
    let mut sum = 0;
    for arg in &args {
        sum += arg.as_i64().ok_or_else(|| RemoteError::new("TypeError", "expected integers"))?;
    }
    Ok(Value::Integer(sum))
}

fn sleeper() -> Exposed {
    Exposed::new()
        .method("sleep", |args| async move {
            let ms = args[0].as_i64().unwrap_or(0) as u64;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, RemoteError>(args.get(1).cloned().unwrap_or_default())
        })
        .method("hang", |_| futures::future::pending())
}

// --- Calls and errors ---

#[tokio::test]
async fn test_pure_method_matches_local_call() {
    let (client, _server) = connect(Exposed::new().sync_method("add", add));
    let thread = client.thread();

    for args in [vec![], vec![Value::Integer(2), Value::Integer(40)], vec![Value::Integer(-7); 5]] {
        let remote = thread.call("add", args.clone()).unwrap().await.unwrap();
        assert_eq!(remote, add(args).unwrap());
    }
}

#[tokio::test]
async fn test_thrown_errors_keep_name_and_message() {
    let exposed = Exposed::new()
        .sync_method("add", add)
        .sync_method("explode", |_| panic!("kaboom"))
        .sync_method("save", |_| {
            Err(anyhow::anyhow!("disk full").context("saving report").into())
        });
    let (client, _server) = connect(exposed);
    let thread = client.thread();

    match thread.call("add", vec!["x".into()]).unwrap().await.unwrap_err() {
        Error::Remote(e) => {
            assert_eq!(e.name, "TypeError");
            assert_eq!(e.message, "expected integers");
        }
        other => panic!("Expected Remote, got {:?}", other),
    }

    match thread.call("explode", vec![]).unwrap().await.unwrap_err() {
        Error::Remote(e) => {
            assert_eq!(e.name, names::PANIC);
            assert_eq!(e.message, "kaboom");
        }
        other => panic!("Expected Remote(Panic), got {:?}", other),
    }

    match thread.call("save", vec![]).unwrap().await.unwrap_err() {
        Error::Remote(e) => {
            assert_eq!(e.name, names::GENERIC);
            assert_eq!(e.message, "saving report: disk full");
            assert!(e.stack.is_some());
        }
        other => panic!("Expected Remote, got {:?}", other),
    }

    // the server survives a panicking method
    assert_eq!(thread.call("add", vec![1.into()]).unwrap().await.unwrap(), Value::Integer(1));
}

#[tokio::test]
async fn test_method_not_found() {
    let (client, _server) = connect(Exposed::new().sync_method("add", add));

    match client.thread().call("sub", vec![]).unwrap().await.unwrap_err() {
        Error::MethodNotFound(e) => assert_eq!(e.name, names::METHOD_NOT_FOUND),
        other => panic!("Expected MethodNotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_nothing_exposed_is_method_not_found() {
    init_tracing();
    let (a, b) = MemoryTransport::pair();
    let client = Endpoint::new(a);
    let _server = Endpoint::new(b);

    let err = client.call(&["anything"], vec![]).unwrap().await.unwrap_err();
    assert!(matches!(err, Error::MethodNotFound(_)));
}

#[tokio::test]
async fn test_expose_only_once() {
    let (_client, server) = connect(Exposed::new());
    assert!(matches!(server.expose(Exposed::new()), Err(Error::AlreadyExposed)));
}

#[tokio::test]
async fn test_nested_namespaces_and_shape() {
    let exposed = Exposed::new().sync_method("add", add).namespace(
        "math",
        Exposed::new().namespace(
            "signs",
            Exposed::new().sync_method("neg", |args| Ok(Value::Integer(-args[0].as_i64().unwrap_or(0)))),
        ),
    );
    let shape = exposed.shape();
    let (client, _server) = connect(exposed);

    let loose = client.thread();
    let neg = loose.namespace("math").unwrap().namespace("signs").unwrap();
    assert_eq!(neg.call("neg", vec![5.into()]).unwrap().await.unwrap(), Value::Integer(-5));

    let thread = Thread::with_shape(client.clone(), shape);
    assert!(thread.get("neg").is_none());
    assert!(thread.namespace("signs").is_none());
    let signs = thread.namespace("math").and_then(|m| m.namespace("signs")).unwrap();
    let method = signs.get("neg").unwrap();
    assert_eq!(method.path(), ["math", "signs", "neg"]);
    assert_eq!(method.call(vec![3.into()]).unwrap().await.unwrap(), Value::Integer(-3));

    assert!(matches!(thread.call("sub", vec![]), Err(Error::Undefined(_))));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_each_call_is_its_own_round_trip() {
    let counter = Arc::new(Mutex::new(0i64));
    let count = Arc::clone(&counter);
    let exposed = Exposed::new().sync_method("tick", move |_| {
        let mut n = count.lock().unwrap();
        *n += 1;
        Ok(Value::Integer(*n))
    });
    let (client, _server) = connect(exposed);
    let method = client.thread().get("tick").unwrap();

    assert_eq!(method.call(vec![]).unwrap().await.unwrap(), Value::Integer(1));
    assert_eq!(method.call(vec![]).unwrap().await.unwrap(), Value::Integer(2));
    assert_eq!(*counter.lock().unwrap(), 2);
}

// --- Functions by reference ---

#[tokio::test]
async fn test_callback_round_trip_and_release() {
    let exposed = Exposed::new().method("map", |args| async move {
        let items = args[0].as_list().unwrap_or_default().to_vec();
        let f = args[1].as_function().cloned().ok_or_else(|| RemoteError::msg("expected a function"))?;
        let mut out = Vec::new();
        for item in items {
            out.push(f.call(vec![item]).await.map_err(RemoteError::from)?);
        }
        Ok::<_, RemoteError>(Value::List(out))
    });
    let (client, _server) = connect(exposed);

    let double = Function::sync(|args| Ok(Value::Integer(args[0].as_i64().unwrap_or(0) * 2)));
    let items = Value::List(vec![1.into(), 2.into(), 3.into()]);
    let result = client.thread().call("map", vec![items, double.into()]).unwrap().await.unwrap();

    assert_eq!(result, Value::List(vec![2.into(), 4.into(), 6.into()]));
    wait_until(|| client.retained_functions() == 0).await;
}

#[tokio::test]
async fn test_function_sent_three_times_needs_three_releases() {
    let held: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let hold = Arc::clone(&held);
    let drop_one = Arc::clone(&held);
    let exposed = Exposed::new()
        .sync_method("hold", move |mut args| {
            let f = args.remove(0);
            let id = match f.as_function() {
                Some(Function::Remote(remote)) => remote.id().0 as i64,
                _ => return Err(RemoteError::msg("expected a remote function")),
            };
            hold.lock().unwrap().push(f);
            Ok(Value::Integer(id))
        })
        .sync_method("drop_one", move |_| {
            drop_one.lock().unwrap().pop();
            Ok(Value::Null)
        });
    let (client, _server) = connect(exposed);
    let thread = client.thread();
    let callback = Function::sync(|_| Ok(Value::Null));

    let mut ids = Vec::new();
    for _ in 0..3 {
        let id = thread.call("hold", vec![callback.clone().into()]).unwrap().await.unwrap();
        ids.push(FunctionId(id.as_i64().unwrap() as u64));
    }
    assert!(ids.iter().all(|id| *id == ids[0]));
    let id = ids[0];
    assert_eq!(client.retain_count(id), 3);

    for remaining in [2, 1, 0] {
        thread.call("drop_one", vec![]).unwrap().await.unwrap();
        wait_until(|| client.retain_count(id) == remaining).await;
    }
    assert_eq!(client.retained_functions(), 0);
}

#[tokio::test]
async fn test_retain_adds_an_independent_reference() {
    let slot: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let keep = Arc::clone(&slot);
    let exposed = Exposed::new().sync_method("keep_twice", move |args| {
        let Some(Function::Remote(remote)) = args[0].as_function() else {
            return Err(RemoteError::msg("expected a remote function"));
        };
        let extra = remote.retain().map_err(RemoteError::from)?;
        let id = extra.id().0 as i64;
        keep.lock().unwrap().push(extra.into());
        Ok(Value::Integer(id))
    });
    let (client, _server) = connect(exposed);
    let callback = Function::sync(|_| Ok(Value::Null));

    let id = client.thread().call("keep_twice", vec![callback.into()]).unwrap().await.unwrap();
    let id = FunctionId(id.as_i64().unwrap() as u64);

    // the argument handle is gone, the retained one stays
    wait_until(|| client.retain_count(id) == 1).await;
    let held = slot.lock().unwrap().pop();
    drop(held);
    wait_until(|| client.retain_count(id) == 0).await;
    assert_eq!(client.retained_functions(), 0);
}

#[tokio::test]
async fn test_returned_function_comes_home_as_local() {
    let (client, _server) = connect(Exposed::new().sync_method("echo", |mut args| Ok(args.remove(0))));
    let callback = Function::sync(|_| Ok("home".into()));

    let back = client.thread().call("echo", vec![callback.clone().into()]).unwrap().await.unwrap();

    let returned = back.into_function().unwrap();
    assert!(matches!(returned, Function::Local(_)));
    assert_eq!(returned, callback);
    assert_eq!(returned.call(vec![]).await.unwrap(), Value::from("home"));
    wait_until(|| client.retained_functions() == 0).await;
}

#[tokio::test]
async fn test_remote_function_from_server() {
    let (client, server) = connect(Exposed::new().sync_method("counter", |_| {
        let count = Arc::new(Mutex::new(0i64));
        Ok(Function::sync(move |_| {
            let mut n = count.lock().unwrap();
            *n += 1;
            Ok(Value::Integer(*n))
        })
        .into())
    }));

    let value = client.thread().call("counter", vec![]).unwrap().await.unwrap();
    let Some(Function::Remote(counter)) = value.into_function() else {
        panic!("Expected a remote function");
    };

    let f = Function::Remote(counter.clone());
    assert_eq!(f.call(vec![]).await.unwrap(), Value::Integer(1));
    assert_eq!(f.call(vec![]).await.unwrap(), Value::Integer(2));
    assert_eq!(server.retained_functions(), 1);

    let stale = counter.clone();
    counter.release();
    assert!(stale.is_released());
    assert!(matches!(stale.call(vec![]), Err(Error::StaleFunction(_))));
    drop(f);
    drop(stale);
    wait_until(|| server.retained_functions() == 0).await;
}

#[tokio::test]
async fn test_function_call_to_unknown_id_is_stale() {
    init_tracing();
    let (raw, b) = MemoryTransport::pair();
    let _server = Endpoint::new(b);

    let message = Message::FunctionCall { id: CallId(1), function_id: FunctionId(42), args: vec![] };
    raw.send(Envelope::new(message)).await.unwrap();

    let reply = raw.recv().await.unwrap().unwrap();
    match reply.message {
        Message::Error { id, error } => {
            assert_eq!(id, CallId(1));
            assert_eq!(error.name, names::STALE_FUNCTION);
        }
        other => panic!("Expected Error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_function_forwarded_between_channels() {
    init_tracing();
    // client -> relay -> server, with the callback living on the client
    let (client, _relay_inner) = {
        let (a, b) = MemoryTransport::pair();
        let (c, d) = MemoryTransport::pair();
        let server = Endpoint::builder(d)
            .name("server")
            .expose(Exposed::new().method("apply", |args| async move {
                let f = args[0].as_function().cloned().ok_or_else(|| RemoteError::msg("no function"))?;
                f.call(vec![args[1].clone()]).await.map_err(RemoteError::from)
            }))
            .build();
        let upstream = Endpoint::builder(c).name("relay-up").build();
        let forward = upstream.thread();
        let relay = Endpoint::builder(b)
            .name("relay")
            .expose(Exposed::new().method("apply", move |args| {
                let forward = forward.clone();
                async move {
                    let call = forward.call("apply", args).map_err(RemoteError::from)?;
                    call.await.map_err(RemoteError::from)
                }
            }))
            .build();
        (Endpoint::builder(a).name("client").build(), (relay, upstream, server))
    };

    let square = Function::sync(|args| {
        let n = args[0].as_i64().unwrap_or(0);
        Ok(Value::Integer(n * n))
    });
    let result = client.thread().call("apply", vec![square.into(), 9.into()]).unwrap().await.unwrap();
    assert_eq!(result, Value::Integer(81));
    wait_until(|| client.retained_functions() == 0).await;
}

// --- Binary payloads ---

#[tokio::test]
async fn test_bytes_transfer_without_copy() {
    let (client, _server) = connect(
        Exposed::new()
            .sync_method("echo", |mut args| Ok(args.remove(0)))
            .sync_method("len", |args| {
                Ok(Value::Integer(args[0].as_bytes().map_or(0, |b| b.len()) as i64))
            }),
    );
    let thread = client.thread();
    let payload = Bytes::from(vec![9u8; 1 << 16]);

    let len = thread.call("len", vec![payload.clone().into()]).unwrap().await.unwrap();
    assert_eq!(len, Value::Integer(1 << 16));

    let back = thread.call("echo", vec![payload.clone().into()]).unwrap().await.unwrap();
    let back = back.as_bytes().unwrap();
    assert_eq!(back, &payload);
    assert_eq!(back.as_ptr(), payload.as_ptr());
}

#[tokio::test]
async fn test_stream_transport_end_to_end() {
    init_tracing();
    let (a_out, b_in) = tokio::io::duplex(1 << 16);
    let (b_out, a_in) = tokio::io::duplex(1 << 16);
    let server = Endpoint::builder(StreamTransport::new(b_in, b_out))
        .name("stream-server")
        .expose(
            Exposed::new()
                .sync_method("add", add)
                .sync_method("reverse", |args| {
                    let mut bytes = args[0].as_bytes().cloned().unwrap_or_default().to_vec();
                    bytes.reverse();
                    Ok(Value::Bytes(bytes.into()))
                })
                .method("call_twice", |args| async move {
                    let f = args[0].as_function().cloned().ok_or_else(|| RemoteError::msg("no function"))?;
                    let first = f.call(vec![]).await.map_err(RemoteError::from)?;
                    let second = f.call(vec![]).await.map_err(RemoteError::from)?;
                    Ok::<_, RemoteError>(Value::List(vec![first, second]))
                }),
        )
        .build();
    let client = Endpoint::builder(StreamTransport::new(a_in, a_out)).name("stream-client").build();
    let thread = client.thread();

    assert_eq!(thread.call("add", vec![20.into(), 22.into()]).unwrap().await.unwrap(), Value::Integer(42));

    let reversed = thread.call("reverse", vec![Bytes::from_static(b"abc").into()]).unwrap().await.unwrap();
    assert_eq!(reversed, Value::Bytes(Bytes::from_static(b"cba")));

    let calls = Arc::new(Mutex::new(0i64));
    let seen = Arc::clone(&calls);
    let callback = Function::sync(move |_| {
        let mut n = seen.lock().unwrap();
        *n += 1;
        Ok(Value::Integer(*n))
    });
    let both = thread.call("call_twice", vec![callback.into()]).unwrap().await.unwrap();
    assert_eq!(both, Value::List(vec![1.into(), 2.into()]));
    wait_until(|| client.retained_functions() == 0).await;

    server.close();
    tokio::time::timeout(Duration::from_secs(2), client.closed()).await.unwrap();
}

// --- Concurrency, close, cancellation ---

#[tokio::test]
async fn test_fast_call_resolves_before_slow_call() {
    let (client, _server) = connect(sleeper());
    let thread = client.thread();
    let order = Arc::new(Mutex::new(Vec::new()));

    let slow = thread.call("sleep", vec![100.into(), "A".into()]).unwrap();
    let fast = thread.call("sleep", vec![10.into(), "B".into()]).unwrap();

    let record = |call: threadrun::PendingCall, order: Arc<Mutex<Vec<Value>>>| async move {
        let value = call.await.unwrap();
        order.lock().unwrap().push(value.clone());
        value
    };
    let (a, b) = tokio::join!(record(slow, Arc::clone(&order)), record(fast, Arc::clone(&order)));

    assert_eq!(a, Value::from("A"));
    assert_eq!(b, Value::from("B"));
    assert_eq!(*order.lock().unwrap(), vec![Value::from("B"), Value::from("A")]);
}

#[tokio::test]
async fn test_randomized_latencies_match_by_id() {
    let (client, _server) = connect(sleeper());
    let thread = client.thread();
    let mut rng = rand::thread_rng();

    let calls: Vec<_> = (0..20i64)
        .map(|i| {
            let delay: i64 = rng.gen_range(0..30);
            thread.call("sleep", vec![delay.into(), i.into()]).unwrap()
        })
        .collect();

    let results = futures::future::join_all(calls).await;
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), Value::Integer(i as i64));
    }
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_close_rejects_every_pending_call() {
    let (client, _server) = connect(sleeper());
    let thread = client.thread();

    let calls: Vec<_> = (0..5).map(|_| thread.call("hang", vec![]).unwrap()).collect();
    assert_eq!(client.pending_calls(), 5);

    client.close();
    client.close();

    for result in futures::future::join_all(calls).await {
        assert!(matches!(result, Err(Error::Closed)));
    }
    assert!(client.is_closed());
    assert!(matches!(thread.call("hang", vec![]), Err(Error::Closed)));
}

#[tokio::test]
async fn test_peer_close_rejects_pending_calls() {
    let (client, server) = connect(sleeper());
    let calls: Vec<_> = (0..3).map(|_| client.call(&["hang"], vec![]).unwrap()).collect();

    server.close();

    for result in futures::future::join_all(calls).await {
        assert!(result.unwrap_err().is_closed());
    }
    tokio::time::timeout(Duration::from_secs(2), client.closed()).await.unwrap();
}

#[tokio::test]
async fn test_dropping_every_handle_closes_the_peer() {
    let (client, server) = connect(sleeper());
    drop(client);
    tokio::time::timeout(Duration::from_secs(2), server.closed()).await.unwrap();
    assert!(server.is_closed());
}

#[tokio::test]
async fn test_cancellation_is_local() {
    let (client, _server) = connect(sleeper());
    let thread = client.thread();

    let call = thread.call("sleep", vec![100.into(), "late".into()]).unwrap();
    let result = call.cancel_on(tokio::time::sleep(Duration::from_millis(10))).await;
    assert!(matches!(result, Err(Error::Canceled)));
    assert_eq!(client.pending_calls(), 0);

    // the late response is discarded and the channel keeps working
    tokio::time::sleep(Duration::from_millis(150)).await;
    let value = thread.call("sleep", vec![0.into(), "next".into()]).unwrap().await.unwrap();
    assert_eq!(value, Value::from("next"));
}

#[tokio::test]
async fn test_cancel_signal_after_response_is_ignored() {
    let (client, _server) = connect(sleeper());
    let call = client.call(&["sleep"], vec![0.into(), "done".into()]).unwrap();
    let result = call.cancel_on(tokio::time::sleep(Duration::from_secs(5))).await;
    assert_eq!(result.unwrap(), Value::from("done"));
}

#[tokio::test]
async fn test_call_timeout() {
    init_tracing();
    let (a, b) = MemoryTransport::pair();
    let _server = Endpoint::builder(b).expose(sleeper()).build();
    let client = Endpoint::builder(a).call_timeout(Duration::from_millis(20)).build();

    let err = client.call(&["sleep"], vec![200.into()]).unwrap().await.unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert_eq!(client.pending_calls(), 0);

    let ok = client.call(&["sleep"], vec![0.into(), true.into()]).unwrap().await.unwrap();
    assert_eq!(ok, Value::Bool(true));
}

#[tokio::test]
async fn test_dropped_call_is_forgotten() {
    let (client, _server) = connect(sleeper());
    let call = client.call(&["hang"], vec![]).unwrap();
    assert_eq!(client.pending_calls(), 1);
    drop(call);
    assert_eq!(client.pending_calls(), 0);
}

// --- Workers and registry ---

#[tokio::test]
async fn test_worker_spawn_and_terminate() {
    init_tracing();
    let worker = Worker::spawn("calc", |_host| {
        Exposed::new()
            .sync_method("add", add)
            .method("hang", |_| futures::future::pending())
    })
    .await
    .unwrap();
    assert_eq!(worker.name(), "calc");

    let thread = worker.thread();
    assert_eq!(thread.call("add", vec![1.into(), 2.into()]).unwrap().await.unwrap(), Value::Integer(3));

    let hanging = thread.call("hang", vec![]).unwrap();
    worker.terminate().await.unwrap();

    assert!(matches!(hanging.await, Err(Error::Closed)));
    assert!(matches!(thread.call("add", vec![]), Err(Error::Closed)));
}

#[tokio::test]
async fn test_worker_calls_back_into_host() {
    init_tracing();
    let host = Exposed::new().sync_method("greet", |args| {
        Ok(format!("hello, {}", args[0].as_str().unwrap_or("stranger")).into())
    });
    let worker = Worker::spawn_exposing("greeter", host, |host: Thread| {
        Exposed::new().method("greet_via_host", move |args| {
            let host = host.clone();
            async move {
                let call = host.call("greet", args).map_err(RemoteError::from)?;
                call.await.map_err(RemoteError::from)
            }
        })
    })
    .await
    .unwrap();

    let greeting = worker.thread().call("greet_via_host", vec!["worker".into()]).unwrap().await.unwrap();
    assert_eq!(greeting, Value::from("hello, worker"));
    worker.terminate().await.unwrap();
}

#[tokio::test]
async fn test_worker_setup_panic_is_spawn_error() {
    init_tracing();
    let result = Worker::spawn("broken", |_| -> Exposed { panic!("setup failed") }).await;
    assert!(matches!(result, Err(Error::Spawn(_))));
}

#[tokio::test]
async fn test_registry_teardown_closes_endpoints() {
    let registry = Registry::new();
    let (client, _server) = connect(sleeper());
    let id = registry.register(client.clone());

    let (found, endpoint) = registry.find("client").unwrap();
    assert_eq!(found, id);
    let pending = endpoint.call(&["hang"], vec![]).unwrap();

    registry.teardown();
    assert!(matches!(pending.await, Err(Error::Closed)));
    assert!(client.is_closed());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_shape_from_worker_exposed() {
    let shape = Shape::new().method("add");
    let worker = Worker::spawn("shaped", |_| Exposed::new().sync_method("add", add)).await.unwrap();
    let thread = Thread::with_shape(worker.endpoint().clone(), shape);

    assert!(thread.get("sub").is_none());
    assert_eq!(thread.call("add", vec![4.into(), 4.into()]).unwrap().await.unwrap(), Value::Integer(8));
    worker.terminate().await.unwrap();
}
