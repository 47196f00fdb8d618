//! Real-time duplex audio bridge between a microphone, a remote
//! conversational model and the speakers, with tool calls for looking up
//! and "calling" local businesses.
//!
//! * [`audio`]: PCM codec, capture pipeline, playback scheduler, `cpal` devices.
//! * [`session`]: lifecycle state machine, transport seam, presentation handle.
//! * [`tools`]: tool executor and its reference data.
//! * [`config`]: `settings.toml` and the API credential.

pub mod audio;
pub mod config;
pub mod session;
pub mod tools;

/// Install `env_logger` for hosts that do not bring their own logger.
///
/// Defaults to `info`; override with `RUST_LOG`.  Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_logging_twice_is_harmless() {
        super::init_logging();
        super::init_logging();
        log::info!("logger installed");
    }
}
