#![cfg(not(target_arch = "wasm32"))]

use std::backtrace::Backtrace;
use std::fs::File;
use std::io::Write;
use std::panic;

use anyhow::Context as _;
use instanced_bars::config::{DemoConfig, CONFIG_ENV};
use log::{info, LevelFilter};

const CRASH_LOG: &str = "bars_crash.log";

fn main() -> anyhow::Result<()> {
    setup_diagnostics();

    let config = load_config()?;
    info!("starting instanced bars ({:?})", config.variant);
    instanced_bars::run_native(config).context("demo terminated")?;
    Ok(())
}

/// First CLI argument, then `BARS_CONFIG`, then the built-in defaults.
fn load_config() -> anyhow::Result<DemoConfig> {
    let path = std::env::args().nth(1).or_else(|| std::env::var(CONFIG_ENV).ok());
    match path {
        Some(path) => {
            info!("loading config from {path}");
            DemoConfig::load(&path).with_context(|| format!("loading config {path}"))
        }
        None => Ok(DemoConfig::default()),
    }
}

/// Logger and crash report hook.
fn setup_diagnostics() {
    env_logger::Builder::new()
        .filter_level(if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .filter_module("wgpu_core", LevelFilter::Warn)
        .filter_module("wgpu_hal", LevelFilter::Warn)
        .filter_module("naga", LevelFilter::Warn)
        .format_timestamp_millis()
        .format_target(false)
        .parse_default_env()
        .init();

    panic::set_hook(Box::new(|panic_info| {
        let backtrace = Backtrace::force_capture();

        let msg = match panic_info.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => &s[..],
                None => "Box<dyn Any>",
            },
        };
        let location = panic_info
            .location()
            .map_or("unknown location".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));

        let crash_msg = format!("=== CRASH ===\nReason: {msg}\nLocation: {location}\n\nStack Trace:\n{backtrace}");
        eprintln!("\x1b[31;1m{crash_msg}\x1b[0m");

        if let Ok(mut file) = File::create(CRASH_LOG) {
            let _ = file.write_all(crash_msg.as_bytes());
            eprintln!("crash report saved to {CRASH_LOG}");
        }
    }));
}
