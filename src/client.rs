use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use futures::FutureExt;
use tracing::warn;

use crate::message::{LogLevel, LogRecord, CODE_FATAL, CODE_PANIC, TEXT_UNKNOWN_PANIC};
use crate::rabbitmq::connection::Supervisor;
use crate::rabbitmq::errors::Result;
use crate::rabbitmq::publisher::Publisher;
use crate::rabbitmq::transport::Transport;

/// Builds log records for one service and ships them through a [`Publisher`].
pub struct LogClient<T: Transport> {
    publisher: Publisher<T>,
    service: String,
    project: Option<String>,
}

impl<T: Transport> LogClient<T> {
    pub fn new(publisher: Publisher<T>, service: &str, project: Option<&str>) -> Self {
        install_panic_trace_hook();
        Self {
            publisher,
            service: service.to_string(),
            project: project.map(str::to_string),
        }
    }

    pub async fn send(&self, level: LogLevel, text: impl Into<String>, code: Option<u32>) -> Result<()> {
        let record = LogRecord::new(level, &self.service, text)
            .with_project(self.project.as_deref())
            .with_code(code);
        let body = record.to_json()?;
        self.publisher.publish(&body).await?;
        Ok(())
    }

    pub async fn info(&self, text: impl Into<String>) -> Result<()> {
        self.send(LogLevel::Info, text, None).await
    }

    pub async fn info_with_code(&self, text: impl Into<String>, code: u32) -> Result<()> {
        self.send(LogLevel::Info, text, Some(code)).await
    }

    pub async fn error(&self, text: impl Into<String>) -> Result<()> {
        self.send(LogLevel::Error, text, None).await
    }

    pub async fn error_with_code(&self, text: impl Into<String>, code: u32) -> Result<()> {
        self.send(LogLevel::Error, text, Some(code)).await
    }

    pub async fn fatal(&self, text: impl Into<String>) -> Result<()> {
        self.send(LogLevel::Fatal, text, Some(CODE_FATAL)).await
    }

    /// Runs `future`, turning a panic into a fatal log record instead of unwinding further.
    ///
    /// Returns `None` if the future panicked.
    pub async fn guarded<F: Future>(&self, future: F) -> Option<F::Output> {
        install_panic_trace_hook();
        take_panic_trace();

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(output) => Some(output),
            Err(payload) => {
                if let Err(e) = self.report_panic(payload.as_ref()).await {
                    warn!("failed to report panic: {}", e);
                }
                None
            }
        }
    }

    /// Sends a caught panic payload at fatal level together with its backtrace.
    ///
    /// The backtrace is the one recorded at the panic site on this thread; without one (no
    /// panic recorded since the last report) the current stack is used.
    pub async fn report_panic(&self, payload: &(dyn Any + Send)) -> Result<()> {
        let trace = take_panic_trace().unwrap_or_else(|| Backtrace::force_capture().to_string());
        let text = format!("{}:\n{}", panic_message(payload), trace);
        self.send(LogLevel::Fatal, text, Some(CODE_PANIC)).await
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn publisher(&self) -> &Publisher<T> {
        &self.publisher
    }

    pub fn supervisor(&self) -> &Supervisor<T> {
        self.publisher.supervisor()
    }
}

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chains a panic hook that records the backtrace of the panicking thread before unwinding,
/// so a later [`LogClient::report_panic`] on that thread can ship the panic site's stack.
/// The previously installed hook still runs. Installing twice is a no-op.
pub fn install_panic_trace_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            // Thread-local storage may already be gone when a thread panics during teardown.
            let _ = PANIC_TRACE.try_with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn take_panic_trace() -> Option<String> {
    PANIC_TRACE.with(|slot| slot.borrow_mut().take())
}

/// Human-readable text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    if let Some(err) = payload.downcast_ref::<Box<dyn std::error::Error + Send + Sync>>() {
        return err.to_string();
    }
    if let Some(err) = payload.downcast_ref::<anyhow::Error>() {
        return err.to_string();
    }

    warn!(type_id = ?(*payload).type_id(), "{}", TEXT_UNKNOWN_PANIC);
    TEXT_UNKNOWN_PANIC.to_string()
}
