//! Shared utilities: the top-level error type and logging setup.

pub mod error;
pub mod logging;

pub use error::WorkerError;

#[cfg(test)]
mod tests {
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
        logging::init("not-a-level");
    }
}
