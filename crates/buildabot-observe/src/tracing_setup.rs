//! Tracing subscriber initialization with structured logging and optional
//! OpenTelemetry trace export.
//!
//! # Usage
//!
//! ```no_run
//! use buildabot_observe::tracing_setup::{init_tracing, TracingOptions};
//!
//! // Warnings and errors only, human-readable
//! init_tracing(&TracingOptions::default()).unwrap();
//!
//! // Debug output as JSON, spans exported to stdout via OpenTelemetry
//! init_tracing(&TracingOptions { verbosity: 2, json: true, otel: true, ..Default::default() }).unwrap();
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use std::sync::OnceLock;

/// Stores the OTel tracer provider so it can be shut down cleanly on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Crates whose events the verbosity flags control.
const OWN_CRATES: &[&str] = &[
    "buildabot_api",
    "buildabot_core",
    "buildabot_infra",
    "buildabot_observe",
    "bab",
];

/// How the CLI wants log output shaped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TracingOptions {
    /// 0 = warn, 1 = info, 2 = debug, 3+ = trace.
    pub verbosity: u8,
    /// Only errors. Wins over `verbosity`.
    pub quiet: bool,
    /// Emit one JSON object per event instead of text.
    pub json: bool,
    /// Bridge spans to OpenTelemetry with a stdout exporter.
    pub otel: bool,
}

impl TracingOptions {
    /// Filter directive used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> String {
        let level = if self.quiet {
            "error"
        } else {
            match self.verbosity {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        };
        let mut directive = String::from("warn");
        for krate in OWN_CRATES {
            directive.push_str(&format!(",{krate}={level}"));
        }
        directive
    }
}

/// Initialize the global tracing subscriber.
///
/// - Installs a structured `fmt` layer on stderr, as text or JSON.
/// - When `options.otel` is set, additionally bridges tracing spans to
///   OpenTelemetry using a stdout exporter.
/// - `RUST_LOG` overrides the level derived from the options.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set.
pub fn init_tracing(options: &TracingOptions) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(options.default_directive()))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(options.verbosity >= 2)
        .with_span_events(if options.verbosity >= 3 {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    let otel_layer = options.otel.then(|| {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("build-a-bot");

        // Store the provider for shutdown and register it globally.
        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        tracing_opentelemetry::layer().with_tracer(tracer)
    });

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer);

    if options.json {
        registry.with(fmt_layer.json()).try_init()?;
    } else {
        registry.with(fmt_layer).try_init()?;
    }

    Ok(())
}

/// Flush pending traces and shut down the OpenTelemetry tracer provider.
///
/// Safe to call even when OTel was not enabled (no-op in that case).
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_levels() {
        let quiet = TracingOptions {
            quiet: true,
            verbosity: 3,
            ..Default::default()
        };
        assert!(quiet.default_directive().contains("buildabot_core=error"));

        let verbose = TracingOptions {
            verbosity: 2,
            ..Default::default()
        };
        let directive = verbose.default_directive();
        assert!(directive.starts_with("warn,"));
        assert!(directive.contains("buildabot_infra=debug"));
    }

    #[test]
    fn test_default_directive_parses() {
        for verbosity in 0..4 {
            let options = TracingOptions {
                verbosity,
                ..Default::default()
            };
            assert!(EnvFilter::try_new(options.default_directive()).is_ok());
        }
    }
}
