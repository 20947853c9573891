//! Async instrumentation: same messages as sync, per-task frames, cancellation.

use std::sync::Arc;
use std::time::Duration;

use devlog::{
    callable, capture_trace, log_on_end, log_on_error, log_on_start, redact, CapturedTrace,
    Completion, Failure, FrameRegistry, MemorySink,
};
use tracing::Level;

#[derive(Debug, thiserror::Error)]
#[error("division by zero")]
struct ZeroDivision;

async fn divide((a, b): (i32, i32)) -> Result<i32, ZeroDivision> {
    tokio::task::yield_now().await;
    if b == 0 {
        Err(ZeroDivision)
    } else {
        Ok(a / b)
    }
}

fn memory() -> Arc<MemorySink> {
    Arc::new(MemorySink::new("async"))
}

#[tokio::test]
async fn async_start_matches_sync_text() {
    let sink = memory();
    let sync = log_on_start()
        .sink(sink.clone())
        .wrap(callable!("divide"), |(a, b): (i32, i32)| Ok::<_, Failure>(a / b))
        .expect("valid template");
    let wrapped = log_on_start()
        .sink(sink.clone())
        .wrap_async(callable!("divide"), |args: (i32, i32)| async move {
            divide(args).await.map_err(Failure::from)
        })
        .expect("valid template");

    assert!(wrapped.is_async());
    assert!(!sync.is_async());

    sync.call((6, 3)).expect("divides");
    assert_eq!(wrapped.call((6, 3)).await.expect("divides"), 2);

    let messages = sink.messages(Level::INFO);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0], messages[1]);
    assert_eq!(messages[1], "Start func divide with args (6, 3), kwargs {}");
}

#[tokio::test]
async fn async_start_logs_only_when_polled() {
    let sink = memory();
    let wrapped = log_on_start()
        .sink(sink.clone())
        .wrap_async(callable!("divide"), |args: (i32, i32)| async move {
            divide(args).await.map_err(Failure::from)
        })
        .expect("valid template");

    let pending = wrapped.call((4, 2));
    assert!(sink.is_empty());
    pending.await.expect("divides");
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn async_end_logs_result() {
    let sink = memory();
    let wrapped = log_on_end()
        .sink(sink.clone())
        .message("{callable} returned {result}")
        .wrap_async(callable!("divide"), |args: (i32, i32)| async move {
            divide(args).await.map_err(Failure::from)
        })
        .expect("valid template");

    assert_eq!(wrapped.call((9, 3)).await.expect("divides"), 3);
    assert!(wrapped.call((9, 0)).await.is_err());

    assert_eq!(sink.messages(Level::INFO), vec!["divide returned 3"]);
}

#[tokio::test]
async fn async_error_reports_failure() {
    let sink = memory();
    let wrapped = log_on_error()
        .sink(sink.clone())
        .wrap_async(callable!("divide"), divide)
        .expect("valid template");

    let failure = wrapped.call((1, 0)).await.unwrap_err();
    assert!(failure.is::<ZeroDivision>());
    assert!(failure.already_reported());

    let errors = sink.messages(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Error in func divide with args (1, 0), kwargs {}\n"));
    assert!(errors[0].ends_with("ZeroDivision: division by zero."));
}

#[tokio::test]
async fn async_error_suppresses_when_asked() {
    let sink = memory();
    let wrapped = log_on_error()
        .sink(sink.clone())
        .reraise(false)
        .wrap_async(callable!("divide"), divide)
        .expect("valid template");

    assert_eq!(
        wrapped.call((8, 4)).await.expect("divides"),
        Completion::Returned(2)
    );
    assert!(wrapped.call((8, 0)).await.expect("suppressed").is_suppressed());
    assert_eq!(sink.messages(Level::ERROR).len(), 1);
}

#[tokio::test]
async fn async_redacted_arguments_stay_masked() {
    let sink = memory();
    let wrapped = log_on_start()
        .sink(sink.clone())
        .trace_stack(true)
        .capture_locals(true)
        .wrap_async(callable!("store"), |(token,): (String,)| async move {
            tokio::task::yield_now().await;
            Ok::<_, Failure>(token.len())
        })
        .expect("valid template");

    // Source lines are shown as written, so the literal stays off the call line.
    let token = redact("tok-abcdef".to_string());
    let len = wrapped.call((token,)).await.expect("stores");

    assert_eq!(len, 10);
    for (_, message) in sink.records() {
        assert!(!message.contains("tok-abcdef"));
    }
    assert_eq!(
        sink.messages(Level::INFO),
        vec!["Start func store with args (***,), kwargs {}"]
    );
}

#[tokio::test]
async fn interleaved_tasks_see_only_their_own_frames() {
    let sink = memory();
    let wrapped = log_on_start()
        .sink(sink)
        .wrap_async(callable!("tagged"), |(_tag,): (u32,)| async move {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            Ok::<_, Failure>(capture_trace(&FrameRegistry::builtin(), false, true))
        })
        .expect("valid template");

    let (first, second) = tokio::join!(wrapped.call((1_u32,)), wrapped.call((2_u32,)));
    let first = first.expect("traces");
    let second = second.expect("traces");

    let locals_of = |trace: &CapturedTrace| -> Vec<Vec<(String, String)>> {
        trace
            .frames()
            .iter()
            .filter_map(|frame| frame.locals().map(<[_]>::to_vec))
            .collect()
    };
    assert_eq!(
        locals_of(&first),
        vec![vec![
            ("args".to_string(), "(1,)".to_string()),
            ("kwargs".to_string(), "{}".to_string()),
        ]]
    );
    assert_eq!(
        locals_of(&second),
        vec![vec![
            ("args".to_string(), "(2,)".to_string()),
            ("kwargs".to_string(), "{}".to_string()),
        ]]
    );

    let outside = capture_trace(&FrameRegistry::builtin(), true, true);
    assert!(outside.frames().iter().all(|frame| frame.locals().is_none()));
}

#[tokio::test]
async fn dropping_a_pending_call_reports_cancellation() {
    let sink = memory();
    let wrapped = log_on_error()
        .sink(sink.clone())
        .wrap_async(callable!("slow"), |_: ()| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, Failure>(())
        })
        .expect("valid template");

    let outcome = tokio::time::timeout(Duration::from_millis(10), wrapped.call(())).await;
    assert!(outcome.is_err());

    let errors = sink.messages(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Error in func slow with args (), kwargs {}\n"));
    assert!(errors[0].contains("Traceback (most recent call last):"));
    assert!(errors[0].ends_with("Cancelled: call was cancelled before completing."));
}

#[tokio::test]
async fn cancellation_respects_the_kind_filter() {
    let sink = memory();
    let wrapped = log_on_error()
        .sink(sink.clone())
        .on_error::<ZeroDivision>()
        .wrap_async(callable!("slow"), |_: ()| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ZeroDivision>(())
        })
        .expect("valid template");

    let outcome = tokio::time::timeout(Duration::from_millis(10), wrapped.call(())).await;
    assert!(outcome.is_err());
    assert!(sink.is_empty());
}

#[tokio::test]
async fn nested_cancellation_is_reported_once() {
    let sink = memory();
    let inner = log_on_error()
        .sink(sink.clone())
        .wrap_async(callable!("inner"), |_: ()| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, Failure>(())
        })
        .expect("valid template");
    let outer = log_on_error()
        .sink(sink.clone())
        .wrap_async(callable!("outer"), |_: ()| inner.call(()))
        .expect("valid template");

    let outcome = tokio::time::timeout(Duration::from_millis(10), outer.call(())).await;
    assert!(outcome.is_err());

    let errors = sink.messages(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Error in func inner with args (), kwargs {}\n"));
    assert!(errors[0].ends_with("Cancelled: call was cancelled before completing."));

    // A later cancellation is a new one.
    let again = tokio::time::timeout(Duration::from_millis(10), outer.call(())).await;
    assert!(again.is_err());
    assert_eq!(sink.messages(Level::ERROR).len(), 2);
}

#[tokio::test]
async fn nested_cancellation_goes_to_the_first_accepting_layer() {
    let sink = memory();
    let inner = log_on_error()
        .sink(sink.clone())
        .on_error::<ZeroDivision>()
        .wrap_async(callable!("inner"), |_: ()| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, Failure>(())
        })
        .expect("valid template");
    let outer = log_on_error()
        .sink(sink.clone())
        .wrap_async(callable!("outer"), |_: ()| inner.call(()))
        .expect("valid template");

    let outcome = tokio::time::timeout(Duration::from_millis(10), outer.call(())).await;
    assert!(outcome.is_err());

    let errors = sink.messages(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Error in func outer with args (), kwargs {}\n"));
}

#[tokio::test]
async fn panicking_target_is_not_reported_as_cancelled() {
    let sink = memory();
    let wrapped = Arc::new(
        log_on_error()
            .sink(sink.clone())
            .wrap_async(callable!("fragile"), |(fail,): (bool,)| async move {
                tokio::task::yield_now().await;
                assert!(!fail, "fragile target");
                Ok::<_, Failure>(())
            })
            .expect("valid template"),
    );

    let task = tokio::spawn(async move { wrapped.call((true,)).await });
    assert!(task.await.unwrap_err().is_panic());
    assert!(sink.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn instrumented_calls_run_on_spawned_tasks() {
    let sink = memory();
    let wrapped = Arc::new(
        log_on_end()
            .sink(sink.clone())
            .message("{result}")
            .wrap_async(callable!("divide"), |args: (i32, i32)| async move {
                divide(args).await.map_err(Failure::from)
            })
            .expect("valid template"),
    );

    let handles: Vec<_> = (1..=4)
        .map(|n| {
            let wrapped = Arc::clone(&wrapped);
            tokio::spawn(async move { wrapped.call((n * 10, n)).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.expect("joins").expect("divides"), 10);
    }

    assert_eq!(sink.messages(Level::INFO), vec!["10"; 4]);
}
