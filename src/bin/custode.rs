use anyhow::Result;
use custode::cli::{actions, actions::Action, start, telemetry};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    // Start the program
    let (action, globals) = start()?;

    // Handle the action
    let result = match action {
        Action::Server { .. } => actions::server::handle(action, globals).await,
    };

    telemetry::shutdown_tracer();

    result
}
