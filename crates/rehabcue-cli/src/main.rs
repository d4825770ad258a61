use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "rehabcue", version, about = "RehabCue exercise session player")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exercise library management
    Exercise {
        #[command(subcommand)]
        action: commands::exercise::ExerciseAction,
    },
    /// Session template management
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Play a session in the terminal
    Play(commands::play::PlayArgs),
    /// Session journal
    Journal {
        #[command(subcommand)]
        action: commands::journal::JournalAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Generate shell completions
    Completions(commands::completions::CompletionsArgs),
}

/// Logs go to stderr so JSON on stdout stays machine readable.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("REHABCUE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Exercise { action } => commands::exercise::run(action),
        Commands::Session { action } => commands::session::run(action),
        Commands::Play(args) => commands::play::run(args),
        Commands::Journal { action } => commands::journal::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions(args) => commands::completions::run::<Cli>(args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
