//! Messages routed through `tracing`, captured with a buffer-backed subscriber.

use std::io;
use std::sync::{Arc, Mutex};

use devlog::{callable, log_on_error, log_on_start, Failure, LogSink, MemorySink, TracingSink};
use tracing::Level;

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Buffer {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn captured<F: FnOnce()>(f: F) -> String {
    let buffer = Buffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .without_time()
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    buffer.contents()
}

#[test]
fn tracing_sink_tags_events_with_logger_name() {
    let output = captured(|| {
        let sink = TracingSink::new("app::auth");
        sink.emit(Level::WARN, "user locked out");
        sink.emit(Level::DEBUG, "attempts = 5");
    });

    assert!(output.contains("WARN"));
    assert!(output.contains("user locked out"));
    assert!(output.contains("attempts = 5"));
    assert_eq!(output.matches("logger=app::auth").count(), 2);
}

#[test]
fn default_sink_is_named_after_the_calling_module() {
    let output = captured(|| {
        let wrapped = log_on_start()
            .wrap(callable!("lookup"), |(id,): (u32,)| Ok::<_, Failure>(id))
            .unwrap();
        assert_eq!(wrapped.sink_name(), module_path!());
        wrapped.call((42_u32,)).unwrap();
    });

    assert!(output.contains("INFO"));
    assert!(output.contains("Start func lookup with args (42,), kwargs {}"));
    assert!(output.contains(&format!("logger={}", module_path!())));
}

#[test]
fn handler_receives_a_copy_of_default_sink_messages() {
    let handler = Arc::new(MemorySink::new("handler"));
    let output = captured(|| {
        let wrapped = log_on_error()
            .handler(handler.clone())
            .reraise(false)
            .message("{callable} failed")
            .wrap(callable!("fetch"), |_: ()| {
                Err::<(), _>(io::Error::new(io::ErrorKind::NotFound, "missing"))
            })
            .unwrap();
        assert!(wrapped.call(()).unwrap().is_suppressed());
    });

    assert!(output.contains("ERROR"));
    assert!(output.contains("fetch failed"));
    assert_eq!(handler.messages(Level::ERROR), vec!["fetch failed"]);
}

#[test]
fn sink_and_handler_together_warn_and_ignore_the_handler() {
    let sink = Arc::new(MemorySink::new("sink"));
    let handler = Arc::new(MemorySink::new("handler"));
    let output = captured(|| {
        let wrapped = log_on_start()
            .sink(sink.clone())
            .handler(handler.clone())
            .wrap(callable!("ping"), |_: ()| Ok::<_, Failure>(()))
            .unwrap();
        wrapped.call(()).unwrap();
    });

    assert!(output.contains("WARN"));
    assert!(output.contains("sink and handler are both set, the handler will be ignored"));
    assert!(output.contains("callable=\"ping\""));
    assert_eq!(sink.len(), 1);
    assert!(handler.is_empty());
}
