//! Fault-injection plugin for exercising forwarder error paths
//!
//! Every entry point here misbehaves in a controlled way: slow answers,
//! clean failures, panics and hard aborts. The integration tests drive
//! these to check that each failure mode comes back to the caller as the
//! right error instead of a hang or a broken pipe.

use clap::Parser;
use gangway::registry::Args as CallArgs;
use gangway::{CallError, Registry, RegistryError, Value};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Fault-injection plugin served over the gangway call protocol"
)]
struct Args {
    /// List the registered functions and exit
    #[arg(long)]
    list: bool,
}

fn build_registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new("faultlib")?;
    registry.register("describe", describe)?;
    registry.register("echo", echo)?;
    registry.register("sleep_ms", sleep_ms)?;
    registry.register("fail", fail)?;
    registry.register("panic", explode)?;
    registry.register("abort", abort)?;
    Ok(registry)
}

fn describe(args: &CallArgs<'_>) -> Result<Value, CallError> {
    args.expect_len(0)?;
    Ok(Value::from(format!("faultlib {}", env!("CARGO_PKG_VERSION"))))
}

/// Return the single argument unchanged
fn echo(args: &CallArgs<'_>) -> Result<Value, CallError> {
    args.expect_len(1)?;
    Ok(args.value(0)?.clone())
}

/// Sleep for the given number of milliseconds, then return it
fn sleep_ms(args: &CallArgs<'_>) -> Result<Value, CallError> {
    args.expect_len(1)?;
    let millis = args.int(0)?;
    if millis < 0 {
        return Err(CallError::failed("sleep duration must be non-negative"));
    }
    info!("Sleeping for {} ms", millis);
    std::thread::sleep(Duration::from_millis(millis as u64));
    Ok(Value::Int(millis))
}

/// Fail cleanly with the given message
fn fail(args: &CallArgs<'_>) -> Result<Value, CallError> {
    let message = if args.is_empty() {
        "deliberate failure".to_string()
    } else {
        args.text(0)?.to_string()
    };
    Err(CallError::failed(message))
}

/// Panic with the given message
fn explode(args: &CallArgs<'_>) -> Result<Value, CallError> {
    let message = if args.is_empty() {
        "deliberate panic".to_string()
    } else {
        args.text(0)?.to_string()
    };
    panic!("{}", message);
}

/// Kill the process without writing a response
fn abort(args: &CallArgs<'_>) -> Result<Value, CallError> {
    args.expect_len(0)?;
    info!("Aborting on request");
    std::process::abort();
}

fn main() {
    let args = Args::parse();

    // Log to stderr only; stdout belongs to the wire protocol
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let registry = match build_registry() {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("faultlib: {err}");
            std::process::exit(1);
        }
    };

    if args.list {
        for name in registry.function_names() {
            println!("{name}");
        }
        return;
    }

    if let Err(err) = gangway::serve(&registry) {
        eprintln!("faultlib: {err}");
        std::process::exit(1);
    }
}
