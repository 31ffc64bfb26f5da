use std::io::{self, Read, Write};

use echo_core::{EchoEngine, LoadOptions, OutputSink};

mod input;
mod output;

/// Log records go to stderr as JSONL, next to the command events.
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .format(|buf, record| {
            let line = serde_json::json!({
                "type": "log",
                "level": record.level().to_string().to_lowercase(),
                "target": record.target(),
                "message": record.args().to_string(),
            });
            writeln!(buf, "{}", line)
        })
        .init();
}

async fn run(output: &output::JsonOutputSink) -> io::Result<()> {
    let mut json_str = String::new();
    io::stdin().read_to_string(&mut json_str)?;

    let json_input: input::JsonInput = serde_json::from_str(&json_str).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid JSON input: {}", e),
        )
    })?;
    init_logging(json_input.flags.verbose);

    let mut engine = EchoEngine::load_with_options(LoadOptions {
        home: json_input.home.clone(),
        message_id: json_input.message_id.clone(),
    })?;
    log::debug!("home: {}", engine.home().display());

    echo_core::execute_command(&mut engine, &json_input.command, output).await
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // --json-schema: print input schema and exit
    if args.iter().any(|a| a == "--json-schema") {
        let schema = schemars::schema_for!(input::JsonInput);
        let text = serde_json::to_string_pretty(&schema).map_err(io::Error::other)?;
        println!("{}", text);
        return Ok(());
    }

    if args.iter().any(|a| a == "--version") {
        println!("echo-json {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let output = output::JsonOutputSink;
    let result = run(&output).await;
    output.emit_done(&result);
    // the done signal already carries the error; keep it the last stderr line
    if result.is_err() {
        std::process::exit(1);
    }
    Ok(())
}
