//! Log output
//!
//! Components log through `tracing`; [`init_logging`] installs the global
//! subscriber once per script. Every line starts with the configured prefix
//! so script output can be picked out of a busy page console.

use crate::config::LogConfig;
use crate::result::{WatchError, WatchResult};
use std::fmt;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Event formatter that writes a fixed prefix before the wrapped format
#[derive(Debug, Clone)]
pub struct PrefixedFormat<F> {
    prefix: String,
    inner: F,
}

impl<F> PrefixedFormat<F> {
    /// Prefix every event formatted by `inner`
    pub fn new(prefix: impl Into<String>, inner: F) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    /// The prefix written before each line
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl<S, N, F> FormatEvent<S, N> for PrefixedFormat<F>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    F: FormatEvent<S, N>,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        if !self.prefix.is_empty() {
            write!(writer, "{} ", self.prefix)?;
        }
        self.inner.format_event(ctx, writer, event)
    }
}

fn env_filter(config: &LogConfig) -> WatchResult<EnvFilter> {
    EnvFilter::try_new(&config.level)
        .map_err(|err| WatchError::logging(format!("invalid log level `{}`: {err}", config.level)))
}

/// Install the global subscriber. Fails if the level does not parse or a
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> WatchResult<()> {
    let filter = env_filter(config)?;
    install(filter, &config.prefix)
}

#[cfg(not(target_arch = "wasm32"))]
fn install(filter: EnvFilter, prefix: &str) -> WatchResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .event_format(PrefixedFormat::new(prefix, tracing_subscriber::fmt::format()))
        .try_init()
        .map_err(|err| WatchError::logging(err.to_string()))
}

#[cfg(target_arch = "wasm32")]
fn install(filter: EnvFilter, prefix: &str) -> WatchResult<()> {
    console_error_panic_hook::set_once();
    // the devtools console timestamps lines itself
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(console::ConsoleMakeWriter)
        .event_format(PrefixedFormat::new(
            prefix,
            tracing_subscriber::fmt::format().without_time(),
        ))
        .try_init()
        .map_err(|err| WatchError::logging(err.to_string()))
}

#[cfg(target_arch = "wasm32")]
mod console {
    use std::io;
    use tracing::{Level, Metadata};
    use tracing_subscriber::fmt::MakeWriter;
    use wasm_bindgen::JsValue;

    /// Routes each event to the console method matching its level
    #[derive(Debug, Clone, Copy)]
    pub struct ConsoleMakeWriter;

    /// Buffers one formatted event; emitted on drop
    #[derive(Debug)]
    pub struct ConsoleWriter {
        level: Level,
        buffer: Vec<u8>,
    }

    impl io::Write for ConsoleWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffer.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for ConsoleWriter {
        fn drop(&mut self) {
            let text = String::from_utf8_lossy(&self.buffer);
            let line = JsValue::from_str(text.trim_end());
            if self.level == Level::ERROR {
                web_sys::console::error_1(&line);
            } else if self.level == Level::WARN {
                web_sys::console::warn_1(&line);
            } else if self.level == Level::INFO {
                web_sys::console::info_1(&line);
            } else {
                web_sys::console::debug_1(&line);
            }
        }
    }

    impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
        type Writer = ConsoleWriter;

        fn make_writer(&'a self) -> Self::Writer {
            ConsoleWriter {
                level: Level::INFO,
                buffer: Vec::new(),
            }
        }

        fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
            ConsoleWriter {
                level: *meta.level(),
                buffer: Vec::new(),
            }
        }
    }
}
