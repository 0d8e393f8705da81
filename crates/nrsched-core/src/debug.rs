use core::fmt;
use std::fs::OpenOptions;
use std::sync::Once;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, fmt as tracingfmt};

/// if `cond` is false, logs a warning with your message.
#[macro_export]
macro_rules! assert_warn {
    ($cond:expr, $($arg:tt)+) => {{
        if !$cond {
            tracing::warn!(
                target: module_path!(),
                "assertion warning: `{}` failed: {} at {}:{}",
                stringify!($cond),
                format_args!($($arg)+),
                file!(),
                line!(),
            );
        }
    }};
}

/// Width of the location column. Messages start after it.
const LOCATION_COLUMN_WIDTH: usize = 64;

struct AlignedFormatter;

/// Pulls the `slot` field out of an event so it can be printed in front of the location
struct SlotVisitor {
    slot: Option<String>,
}

impl tracing::field::Visit for SlotVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "slot" {
            self.slot = Some(format!("{:?}", value));
        }
    }
}

/// "crates/nrsched-harq/src/repository.rs" becomes "[harq] repository.rs",
/// "bins/harq-sim/src/sim.rs" becomes "[harq-sim] sim.rs"
fn short_source_path(file_path: &str) -> String {
    let Some(src_idx) = file_path.find("/src/") else {
        return file_path.to_string();
    };
    let before_src = &file_path[..src_idx];
    let after_src = &file_path[src_idx + 5..];

    let crate_dir = before_src.rsplit('/').next().unwrap_or("unknown");
    let crate_name = crate_dir.strip_prefix("nrsched-").unwrap_or(crate_dir);

    match after_src.rfind('/') {
        Some(last_slash) => {
            let module = after_src[..last_slash].split('/').next().unwrap_or("");
            format!("[{}/{}] {}", crate_name, module, &after_src[last_slash + 1..])
        }
        None => format!("[{}] {}", crate_name, after_src),
    }
}

impl<S, N> FormatEvent<S, N> for AlignedFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let mut visitor = SlotVisitor { slot: None };
        event.record(&mut visitor);
        let has_slot = visitor.slot.is_some();
        let slot_str = visitor.slot.unwrap_or_default();

        let (color_level, color_reset) = if writer.has_ansi_escapes() {
            let color = match *metadata.level() {
                tracing::Level::ERROR => "\x1b[31m",
                tracing::Level::WARN => "\x1b[33m",
                tracing::Level::INFO => "\x1b[32m",
                tracing::Level::DEBUG => "\x1b[34m",
                tracing::Level::TRACE => "\x1b[35m",
            };
            (color, "\x1b[0m")
        } else {
            ("", "")
        };

        // Format: "LEVEL slot [crate/module] file:line: message"
        let location = format!(
            "{}{:<5}{} {:>9} {}:{}:",
            color_level,
            metadata.level(),
            color_reset,
            slot_str,
            short_source_path(metadata.file().unwrap_or("unknown")),
            metadata.line().unwrap_or(0)
        );

        let mut message_buf = String::new();
        ctx.field_format().format_fields(format::Writer::new(&mut message_buf), event)?;

        // The slot is already in the location column
        if has_slot {
            if let Some(slot_idx) = message_buf.find("slot=") {
                match message_buf[slot_idx..].find(' ') {
                    Some(space_idx) => message_buf.replace_range(slot_idx..slot_idx + space_idx + 1, ""),
                    None => message_buf.truncate(slot_idx),
                }
            }
        }

        write!(writer, "{:<width$} {}", location, message_buf, width = LOCATION_COLUMN_WIDTH)?;
        writeln!(writer)
    }
}

static INIT_LOG: Once = Once::new();

fn with_directives(mut filter: EnvFilter, directives: &[&str]) -> EnvFilter {
    for directive in directives {
        match directive.parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("ignoring invalid log directive {}: {}", directive, e),
        }
    }
    filter
}

/// Sets up logging with maximum verbosity (trace level)
/// Mainly for unit tests
pub fn setup_logging_verbose() {
    setup_logging(EnvFilter::new("trace"), None);
}

/// Sets up default logging to stdout and optionally, a verbose log file
/// Returns a guard, that needs to be kept alive for logging to file to work
pub fn setup_logging_default(verbose_logfile: Option<String>) -> Option<WorkerGuard> {
    let logfile_and_filter = verbose_logfile.map(|file| (file, get_default_logfile_filter()));
    setup_logging(get_default_stdout_filter(), logfile_and_filter)
}

pub fn get_default_stdout_filter() -> EnvFilter {
    with_directives(
        EnvFilter::new("info"),
        &[
            // Per-slot HARQ bookkeeping is far too chatty for the console
            "nrsched_harq::repository=info",
            "nrsched_harq::cell_harq_manager=info",
            "nrsched_harq::diag=info",
            "harq_sim=info",
        ],
    )
}

fn get_default_logfile_filter() -> EnvFilter {
    EnvFilter::new("debug")
}

/// Sets up logging to stdout and optionally, a verbose log file
/// If an output file is requested, returns Some<WorkerGuard>. Keep this value alive
/// or logging to file may cease working. If no output file is provided, returns None.
fn setup_logging(stdout_filter: EnvFilter, outfile: Option<(String, EnvFilter)>) -> Option<WorkerGuard> {
    let Some((outfile, outfile_filter)) = outfile else {
        INIT_LOG.call_once(|| {
            let stdout_layer = tracingfmt::layer().event_format(AlignedFormatter);
            tracing_subscriber::registry()
                .with(stdout_layer.with_filter(stdout_filter))
                .init();
        });
        return None;
    };

    let file = match OpenOptions::new().create(true).append(true).open(&outfile) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to open log file {}: {}", outfile, e);
            return setup_logging(get_default_stdout_filter(), None);
        }
    };
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    INIT_LOG.call_once(|| {
        let file_layer = tracingfmt::layer()
            .event_format(AlignedFormatter)
            .with_writer(file_writer)
            .with_ansi(false);
        let stdout_layer = tracingfmt::layer().event_format(AlignedFormatter);

        tracing_subscriber::registry()
            .with(file_layer.with_filter(outfile_filter))
            .with(stdout_layer.with_filter(stdout_filter))
            .init();
    });

    Some(guard)
}
