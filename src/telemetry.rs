use log::trace;

/// Sink for named numeric channels. Each module publishes under its own prefix.
pub trait Telemetry {
    fn put_number(&self, key: &str, value: f64);
}

/// Emits every channel as a `trace!` record under the `telemetry` target.
/// Enable with `RUST_LOG=telemetry=trace`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn put_number(&self, key: &str, value: f64) {
        trace!(target: "telemetry", "{} = {}", key, value);
    }
}
