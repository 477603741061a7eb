//! Observability setup for build-a-bot: tracing subscriber and optional
//! OpenTelemetry export.

pub mod tracing_setup;
