//! Property tests for redaction, formatting and failure deduplication.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use devlog::{
    callable, capture_trace, format_value, kw, log_on_error, log_on_start, redact, redact_with,
    render_for_log, Completion, DenyList, Failure, FrameRegistry, MemorySink, Signature,
};
use proptest::prelude::*;
use tracing::Level;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct LayerError(String);

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

// Strategy: masks that never collide with the rendered value
fn arb_mask() -> impl Strategy<Value = String> {
    prop::string::string_regex("<[A-Z*]{1,8}>").unwrap()
}

type Layer = Box<dyn Fn(()) -> Result<Completion<()>, Failure>>;

fn nested_layers(depth: usize, sink: &Arc<MemorySink>, reraise_outer: bool) -> Layer {
    let innermost = log_on_error()
        .sink(sink.clone())
        .wrap(callable!("layer"), |_: ()| Err::<(), _>(LayerError("deep".to_string())))
        .unwrap();
    let mut current: Layer = Box::new(move |args| innermost.call(args));

    for level in 1..depth {
        let reraise = level + 1 < depth || reraise_outer;
        let wrapped = log_on_error()
            .sink(sink.clone())
            .reraise(reraise)
            .wrap(callable!("layer"), move |args: ()| current(args))
            .unwrap();
        current = Box::new(move |args| wrapped.call(args).map(|_| Completion::Returned(())));
    }
    current
}

proptest! {
    /// Property: rendering yields the mask, every other operation sees the value
    #[test]
    fn proptest_redacted_is_transparent(value in any::<i32>(), other in any::<i32>(), mask in arb_mask()) {
        let wrapped = redact_with(value, mask.clone());

        prop_assert_eq!(render_for_log(&wrapped), mask.clone());
        prop_assert_eq!(format!("{:?}", wrapped), mask.clone());
        prop_assert_eq!(format!("{}", wrapped), mask);

        prop_assert_eq!(wrapped == other, value == other);
        prop_assert_eq!(wrapped < other, value < other);
        prop_assert_eq!(wrapped.cmp(&redact(other)), value.cmp(&other));
        prop_assert_eq!(hash_of(&wrapped), hash_of(&value));
        prop_assert_eq!(*wrapped, value);
        prop_assert_eq!(wrapped.checked_add(other), value.checked_add(other));
    }

    /// Property: redacted strings delegate container operations
    #[test]
    fn proptest_redacted_string_delegates(text in "[a-z]{0,16}") {
        let wrapped = redact(text.clone());

        prop_assert_eq!(wrapped.len(), text.len());
        prop_assert_eq!(wrapped.to_uppercase(), text.to_uppercase());
        prop_assert_eq!(wrapped.chars().count(), text.chars().count());
        prop_assert!(wrapped == text.as_str());
        prop_assert_eq!(render_for_log(&wrapped), "***");
    }

    /// Property: the target never receives a wrapper and messages never show the value
    #[test]
    fn proptest_target_receives_inner_value(secret in "[a-z]{12,20}") {
        let sink = Arc::new(MemorySink::new("prop"));
        let wrapped = log_on_start()
            .sink(sink.clone())
            .trace_stack(true)
            .capture_locals(true)
            .wrap(callable!("echo"), |(value,): (String,)| Ok::<_, Failure>(value))
            .unwrap();

        let received = wrapped.call((redact(secret.clone()),)).unwrap();

        prop_assert_eq!(&received, &secret);
        for (_, message) in sink.records() {
            prop_assert!(!message.contains(&secret));
        }
    }

    /// Property: N nested on-error layers log one failure exactly once
    #[test]
    fn proptest_nested_layers_report_once(depth in 2usize..8, reraise_outer in any::<bool>()) {
        let sink = Arc::new(MemorySink::new("nested"));
        let call = nested_layers(depth, &sink, reraise_outer);

        let outcome = call(());

        prop_assert_eq!(sink.messages(Level::ERROR).len(), 1);
        if reraise_outer {
            let failure = outcome.unwrap_err();
            prop_assert!(failure.already_reported());
            prop_assert!(failure.is::<LayerError>());
        } else {
            prop_assert!(outcome.is_ok());
        }
    }

    /// Property: args/kwargs text matches the call, denied names are masked
    #[test]
    fn proptest_args_and_bound_formatting(a in any::<i64>(), b in any::<i64>()) {
        let sink = Arc::new(MemorySink::new("fmt"));
        let plain = log_on_start()
            .sink(sink.clone())
            .message("Start {args} {kwargs}")
            .wrap(callable!("f"), |(x, y): (i64, i64)| Ok::<_, Failure>(x.wrapping_add(y)))
            .unwrap();
        plain.call((a, b)).unwrap();

        let bound = log_on_start()
            .sink(sink.clone())
            .bind_params(Signature::new(["arg1", "arg2"]))
            .redact_params(["arg1"])
            .message("{arg1} {arg2}")
            .wrap(callable!("f"), |(x, y): (i64, i64)| Ok::<_, Failure>(x.wrapping_add(y)))
            .unwrap();
        bound.call((a, kw("arg2", b))).unwrap();

        prop_assert_eq!(
            sink.messages(Level::INFO),
            vec![format!("Start ({}, {}) {{}}", a, b), format!("*** {}", b)]
        );
    }

    /// Property: deny-listed names are masked, all others render through Debug
    #[test]
    fn proptest_format_value_rules(
        value in "[a-z]{1,10}",
        name in "[a-z]{1,6}",
        denied in prop::collection::vec("[a-z]{1,6}", 0..4),
    ) {
        let deny: DenyList = denied.iter().cloned().collect();
        let rendered = format_value(&value.as_str(), &name, Some(&deny));

        if denied.contains(&name) {
            prop_assert_eq!(rendered, "***");
        } else {
            prop_assert_eq!(rendered, format!("{:?}", value));
        }
    }
}

#[test]
fn traces_without_internal_frames_never_show_registered_files() {
    let sink = Arc::new(MemorySink::new("trace"));
    let registry = FrameRegistry::builtin();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let slot = Arc::clone(&seen);

    let wrapped = log_on_start()
        .sink(sink)
        .wrap(callable!("inspect"), move |_: ()| {
            let filtered = capture_trace(&FrameRegistry::builtin(), false, false);
            let full = capture_trace(&FrameRegistry::builtin(), true, false);
            slot.lock().unwrap().push((filtered, full));
            Ok::<_, Failure>(())
        })
        .unwrap();
    wrapped.call(()).unwrap();

    let seen = seen.lock().unwrap();
    let (filtered, full) = &seen[0];
    assert!(filtered
        .frames()
        .iter()
        .all(|frame| !registry.is_internal(frame.file())));
    assert!(full
        .frames()
        .iter()
        .any(|frame| registry.is_internal(frame.file())));
    assert!(full.len() > filtered.len());
    assert!(filtered
        .frames()
        .iter()
        .any(|frame| frame.function().contains("traces_without_internal_frames")));
}
