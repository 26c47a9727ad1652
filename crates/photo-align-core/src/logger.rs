//! Stderr logging for the photo-align crates.
//!
//! [`init_with_level`] installs a `log` backend that prints
//! `[elapsed LEVEL module] message`. Records from the photo-align crates pass
//! at the requested level, everything else is capped at `warn` so `-vvv` does
//! not drown alignment output in dependency chatter. With the `tracing`
//! feature, [`init_tracing`] installs a `tracing-subscriber` with the same
//! split as its default filter.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const OWN_CRATES: [&str; 3] = ["photo_align", "photo_align_core", "photo_align_features"];

fn is_own_target(target: &str) -> bool {
    let root = target.split("::").next().unwrap_or(target);
    OWN_CRATES.contains(&root)
}

/// Threshold for records logged under `target`.
fn threshold(level: LevelFilter, target: &str) -> LevelFilter {
    if is_own_target(target) {
        level
    } else {
        level.min(LevelFilter::Warn)
    }
}

/// `photo_align::pipeline` prints as `pipeline`, foreign targets stay whole.
fn short_target(target: &str) -> &str {
    match target.split_once("::") {
        Some((root, rest)) if OWN_CRATES.contains(&root) => rest,
        _ => target,
    }
}

struct CrateLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for CrateLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= threshold(self.level, metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let ms = self.started.elapsed().as_secs_f64() * 1e3;
        let tag = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{ms:9.1}ms {tag} {}] {}",
            short_target(record.target()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<CrateLogger> = OnceLock::new();

/// Install the stderr logger; photo-align records pass at `level`.
///
/// Only the first call installs anything.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| CrateLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Default `EnvFilter` directives for `level`.
#[cfg(feature = "tracing")]
fn default_directives(level: LevelFilter) -> String {
    let own = level.to_string().to_ascii_lowercase();
    let other = level.min(LevelFilter::Warn).to_string().to_ascii_lowercase();
    OWN_CRATES
        .iter()
        .fold(other, |acc, krate| format!("{acc},{krate}={own}"))
}

/// Install a `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise photo-align spans and events pass at
/// `level` and dependencies at `warn`. `try_init` also routes `log` records
/// into the subscriber.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool, level: LevelFilter) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_are_capped_at_warn() {
        assert_eq!(
            threshold(LevelFilter::Trace, "photo_align::pipeline"),
            LevelFilter::Trace
        );
        assert_eq!(
            threshold(LevelFilter::Debug, "photo_align_features"),
            LevelFilter::Debug
        );
        assert_eq!(threshold(LevelFilter::Trace, "rayon_core"), LevelFilter::Warn);
        assert_eq!(threshold(LevelFilter::Error, "image::codecs"), LevelFilter::Error);
        assert!(!is_own_target("photo_align_extra::x"));
    }

    #[test]
    fn own_targets_drop_the_crate_prefix() {
        assert_eq!(short_target("photo_align::pipeline"), "pipeline");
        assert_eq!(short_target("photo_align_core::ransac"), "ransac");
        assert_eq!(short_target("photo_align"), "photo_align");
        assert_eq!(short_target("image::codecs::png"), "image::codecs::png");
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn tracing_defaults_follow_the_level() {
        assert_eq!(
            default_directives(LevelFilter::Debug),
            "warn,photo_align=debug,photo_align_core=debug,photo_align_features=debug"
        );
        assert!(default_directives(LevelFilter::Error).starts_with("error,"));
    }
}
