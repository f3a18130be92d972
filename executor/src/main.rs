use clap::Parser;
use kubently_common::args::ExecutorArgs;
use kubently_common::shutdown::shutdown_signal;
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

mod api;
mod capability;
mod command;
mod kubectl;
mod run;

/// Credential/authentication fatal — spec.md §6. Distinct from the generic
/// `1` every other error path exits with.
const EXIT_AUTH_FAILURE: i32 = 2;

#[tokio::main]
async fn main() {
    kubently_common::init();
    tracing_subscriber::fmt::init();

    let args = ExecutorArgs::parse();
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel_clone.cancel();
    });

    println!(
        "{}{}",
        "🔌 Starting kubently-executor • cluster_id=".green(),
        args.cluster_id.clone().green().dimmed(),
    );

    let result = run::run(args, cancel).await;

    match &result {
        Ok(()) => println!("{}", "🛑 kubently-executor shut down gracefully.".red()),
        Err(e) => eprintln!("{} {e:#}", "💀 kubently-executor exiting:".red()),
    }

    if let Err(e) = result {
        if e.downcast_ref::<run::AuthFailure>().is_some() {
            std::process::exit(EXIT_AUTH_FAILURE);
        }
        std::process::exit(1);
    }
}
