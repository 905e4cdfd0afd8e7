//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the logging subsystem once, before anything else
//! - Route records by level: info/warn to stdout, error to stderr
//! - Attach call site and a stack trace to error records
//! - Flush buffered records on every exit path
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging, JSON on both sinks
//! - Each sink is a non-blocking writer whose worker thread serializes writes
//! - Writers block instead of dropping records when the queue is full
//! - `Logger` owns the worker guards; `flush` consumes it, so it runs once

use std::backtrace::Backtrace;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_appender::non_blocking::{
    NonBlocking, NonBlockingBuilder, WorkerGuard, DEFAULT_BUFFERED_LINES_LIMIT,
};
use tracing_subscriber::filter::{filter_fn, LevelFilter, ParseError};
use tracing_subscriber::fmt::format::{JsonFields, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

/// Upper bound on how long `Logger::flush` waits for a stalled sink.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Error type for logger initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("invalid log filter '{filter}': {source}")]
    Filter {
        filter: String,
        #[source]
        source: ParseError,
    },
    #[error("failed to install global logger: {0}")]
    Install(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

/// Handle to the process log sinks.
///
/// Dropping or flushing it stops both writer threads after they drain.
#[must_use = "dropping the logger flushes and closes both sinks"]
pub struct Logger {
    guards: Vec<WorkerGuard>,
    backlogs: Vec<Arc<Backlog>>,
}

impl Logger {
    /// Build the logger against process stdout/stderr and install it globally.
    pub fn install(default_filter: &str) -> Result<Self, LoggerError> {
        let filter = env_filter(default_filter)?;
        let (logger, dispatch) = Self::build(io::stdout(), io::stderr(), filter);
        tracing::dispatcher::set_global_default(dispatch)?;
        Ok(logger)
    }

    /// Build the sinks without installing them.
    ///
    /// The returned dispatch can be scoped with `tracing::dispatcher::with_default`.
    pub fn build<O, E>(stdout: O, stderr: E, filter: EnvFilter) -> (Self, Dispatch)
    where
        O: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        Self::build_buffered(stdout, stderr, filter, DEFAULT_BUFFERED_LINES_LIMIT)
    }

    fn build_buffered<O, E>(
        stdout: O,
        stderr: E,
        filter: EnvFilter,
        buffered_lines: usize,
    ) -> (Self, Dispatch)
    where
        O: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        let (out_writer, out_guard, out_backlog) = sink(stdout, buffered_lines, "log-stdout");
        let (err_writer, err_guard, err_backlog) = sink(stderr, buffered_lines, "log-stderr");

        let stdout_layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(out_writer)
            .with_filter(filter_fn(|meta| *meta.level() > Level::ERROR));

        let error_format = tracing_subscriber::fmt::format()
            .json()
            .flatten_event(true)
            .with_file(true)
            .with_line_number(true);
        let stderr_layer = tracing_subscriber::fmt::layer()
            .fmt_fields(JsonFields::new())
            .event_format(WithStacktrace::new(error_format))
            .with_writer(err_writer)
            .with_filter(LevelFilter::ERROR);

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(stderr_layer);

        let logger = Self {
            guards: vec![out_guard, err_guard],
            backlogs: vec![out_backlog, err_backlog],
        };
        (logger, Dispatch::new(subscriber))
    }

    /// Block until every buffered record has been written, then close the sinks.
    ///
    /// A sink that stops making progress is abandoned after `FLUSH_TIMEOUT`.
    pub fn flush(self) {
        let deadline = Instant::now() + FLUSH_TIMEOUT;
        while !self.backlogs.iter().all(|backlog| backlog.is_drained()) {
            if Instant::now() >= deadline {
                eprintln!("log sinks did not drain within {:?}", FLUSH_TIMEOUT);
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        drop(self.guards);
    }
}

/// Lines handed to a sink's queue versus lines its worker has written.
#[derive(Debug, Default)]
struct Backlog {
    queued: AtomicU64,
    written: AtomicU64,
}

impl Backlog {
    fn is_drained(&self) -> bool {
        self.written.load(Ordering::Acquire) >= self.queued.load(Ordering::Acquire)
    }
}

fn sink<W>(writer: W, buffered_lines: usize, name: &str) -> (Queued, WorkerGuard, Arc<Backlog>)
where
    W: Write + Send + 'static,
{
    let backlog = Arc::new(Backlog::default());
    let drained = Drained {
        inner: writer,
        backlog: Arc::clone(&backlog),
    };
    let (inner, guard) = NonBlockingBuilder::default()
        .lossy(false)
        .buffered_lines_limit(buffered_lines)
        .thread_name(name)
        .finish(drained);
    let queued = Queued {
        inner,
        backlog: Arc::clone(&backlog),
    };
    (queued, guard, backlog)
}

/// Producer side of a sink. Each formatted record is one write.
#[derive(Clone)]
struct Queued {
    inner: NonBlocking,
    backlog: Arc<Backlog>,
}

impl Write for Queued {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.backlog.queued.fetch_add(1, Ordering::AcqRel);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> MakeWriter<'a> for Queued {
    type Writer = Queued;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Worker side of a sink. The worker hands over each queued line with one `write_all`.
struct Drained<W> {
    inner: W,
    backlog: Arc<Backlog>,
}

impl<W: Write> Write for Drained<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let result = self.inner.write_all(buf);
        // Counted even on failure, so a broken sink cannot stall `flush`.
        self.backlog.written.fetch_add(1, Ordering::AcqRel);
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Resolve the log filter: `RUST_LOG` wins, then the configured default.
pub fn env_filter(default_filter: &str) -> Result<EnvFilter, LoggerError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_filter).map_err(|source| LoggerError::Filter {
            filter: default_filter.to_string(),
            source,
        }),
    }
}

/// Event formatter that appends a `stacktrace` field to JSON records.
pub struct WithStacktrace<F> {
    inner: F,
}

impl<F> WithStacktrace<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<S, N, F> FormatEvent<S, N> for WithStacktrace<F>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    F: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut record = String::new();
        self.inner.format_event(ctx, Writer::new(&mut record), event)?;

        let stacktrace = Backtrace::force_capture().to_string();
        writer.write_str(&attach_stacktrace(&record, &stacktrace))
    }
}

fn attach_stacktrace(record: &str, stacktrace: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(record.trim_end()) {
        Ok(serde_json::Value::Object(mut fields)) => {
            fields.insert(
                "stacktrace".to_string(),
                serde_json::Value::String(stacktrace.to_string()),
            );
            format!("{}\n", serde_json::Value::Object(fields))
        }
        // Not a JSON object; emit untouched.
        _ => record.to_string(),
    }
}
