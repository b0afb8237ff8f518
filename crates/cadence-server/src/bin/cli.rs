//! Cadence CLI
//!
//! Operator commands for the adaptive review store.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use cadence_core::{Config, LearningState, ReviewRating, ReviewService};

/// Cadence - adaptive review scheduling CLI
#[derive(Parser)]
#[command(name = "cadence")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the Cadence adaptive review scheduler")]
#[command(long_about = "Cadence schedules multiple-choice review items per learner with FSRS.\n\nUse it to import item catalogs, inspect learner progress and run the HTTP API.")]
struct Cli {
    /// Custom data directory (overrides CADENCE_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import items from a JSON array file
    Import {
        /// Path to the items JSON file
        file: PathBuf,
    },

    /// List catalog topics
    Topics,

    /// Show a learner's progress and card statistics
    Stats {
        /// Learner id
        #[arg(long)]
        user: String,
    },

    /// List a learner's due items, oldest first
    Due {
        /// Learner id
        #[arg(long)]
        user: String,
        /// Maximum items to list
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show the next due date for each possible rating of a card
    Preview {
        /// Learner id
        #[arg(long)]
        user: String,
        /// Item id
        #[arg(long)]
        item: String,
    },

    /// Reset a card's memory model (back to Learning, due now)
    Reset {
        /// Learner id
        #[arg(long)]
        user: String,
        /// Item id
        #[arg(long)]
        item: String,
    },

    /// Run the HTTP API
    Serve {
        /// Port to bind the API to
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir;
    }

    match cli.command {
        Commands::Import { file } => run_import(&config, file),
        Commands::Topics => run_topics(&config),
        Commands::Stats { user } => run_stats(&config, &user),
        Commands::Due { user, limit } => run_due(&config, &user, limit),
        Commands::Preview { user, item } => run_preview(&config, &user, &item),
        Commands::Reset { user, item } => run_reset(&config, &user, &item),
        Commands::Serve { port } => run_serve(config, port),
    }
}

fn open(config: &Config) -> anyhow::Result<ReviewService> {
    Ok(ReviewService::from_config(config)?)
}

/// Run import command
fn run_import(config: &Config, file: PathBuf) -> anyhow::Result<()> {
    println!("{}", "=== Cadence Import ===".cyan().bold());
    println!();
    println!("Loading items from: {}", file.display());

    let content = std::fs::read_to_string(&file)?;
    let service = open(config)?;
    let report = service.import_items(&content)?;

    println!();
    println!("{}: {}", "Imported".white().bold(), report.imported.to_string().green());
    println!("{}: {}", "Topics".white().bold(), report.topics.join(", "));
    println!("{}: {}", "Catalog Size".white().bold(), service.storage().count_items()?);

    Ok(())
}

/// Run topics command
fn run_topics(config: &Config) -> anyhow::Result<()> {
    let service = open(config)?;
    let topics = service.topics()?;

    println!("{}", "=== Cadence Topics ===".cyan().bold());
    println!();

    if topics.is_empty() {
        println!("{}", "No items imported yet.".dimmed());
        return Ok(());
    }

    for topic in &topics {
        println!("  {}", topic);
    }
    println!();
    println!("{}: {}", "Total".white().bold(), topics.len());

    Ok(())
}

/// Run stats command
fn run_stats(config: &Config, user: &str) -> anyhow::Result<()> {
    let service = open(config)?;
    let summary = service.progress_summary(user)?;
    let due = service.due_count(user)?;

    println!("{}", format!("=== Progress for {} ===", user).cyan().bold());
    println!();

    println!("{}: {}", "Answered".white().bold(), summary.total_answered);
    println!("{}: {}", "Correct".white().bold(), summary.total_correct);
    println!("{}: {:.2}%", "Accuracy".white().bold(), summary.accuracy);
    println!("{}: {}", "Current Streak".white().bold(), summary.current_streak);
    println!("{}: {}", "Best Streak".white().bold(), summary.best_streak);
    println!("{}: {} ({} in review)", "Due Now".white().bold(), due.due_count, due.review_count);

    println!();
    println!("{}", "=== Cards ===".yellow().bold());
    let cards = &summary.cards;
    println!("{}: {}", "Total Cards".white().bold(), cards.total_cards);
    println!("{}: {}", "Total Reps".white().bold(), cards.total_reps);
    println!("{}: {}", "Total Lapses".white().bold(), cards.total_lapses);
    println!("{}: {:.1}%", "Retention Rate".white().bold(), cards.retention_rate * 100.0);

    if cards.total_cards > 0 {
        println!();
        for stats in &cards.by_state {
            print_state_bar(stats.state, stats.count, cards.total_cards);
        }
    }

    if !summary.topics.is_empty() {
        println!();
        println!("{}", "=== Topics ===".magenta().bold());
        for topic in &summary.topics {
            println!("  {:30} {:>5} answered", topic.topic, topic.items_answered);
        }
    }

    Ok(())
}

/// Print a state distribution bar
fn print_state_bar(state: LearningState, count: i64, total: i64) {
    let percentage = if total > 0 {
        (count as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    let bar_width: usize = 30;
    let filled = ((percentage / 100.0) * bar_width as f64) as usize;
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(bar_width.saturating_sub(filled)));
    let colored_bar = match state {
        LearningState::New => bar.white(),
        LearningState::Learning => bar.yellow(),
        LearningState::Review => bar.green(),
        LearningState::Relearning => bar.red(),
    };

    println!(
        "  {:12} [{:30}] {:>4} ({:>5.1}%)",
        state.as_str(),
        colored_bar,
        count,
        percentage
    );
}

/// Run due command
fn run_due(config: &Config, user: &str, limit: usize) -> anyhow::Result<()> {
    let service = open(config)?;
    let due = service.due_items(user, limit)?;

    println!("{}", format!("=== Due for {} ===", user).cyan().bold());
    println!();

    if due.is_empty() {
        println!("{}", "Nothing due.".dimmed());
        return Ok(());
    }

    for entry in &due {
        println!(
            "  {} {:20} {:12} {:>10} recall {:>5.1}%  {}",
            entry.card.due_date.format("%Y-%m-%d %H:%M"),
            truncate(&entry.item.id, 20),
            entry.card.state.as_str(),
            entry.item.topic,
            entry.retrievability * 100.0,
            truncate(&entry.item.text, 50).dimmed()
        );
    }

    Ok(())
}

/// Run preview command
fn run_preview(config: &Config, user: &str, item: &str) -> anyhow::Result<()> {
    let service = open(config)?;
    let previews = service.preview(user, item)?;

    println!("{}", format!("=== Preview {} / {} ===", user, item).cyan().bold());
    println!();

    for preview in &previews {
        let label = match preview.rating {
            ReviewRating::Again => preview.rating.as_str().red(),
            ReviewRating::Hard => preview.rating.as_str().yellow(),
            ReviewRating::Good => preview.rating.as_str().green(),
            ReviewRating::Easy => preview.rating.as_str().cyan(),
        };
        println!(
            "  {:8} -> {:12} due {} ({} days)",
            label,
            preview.state.as_str(),
            preview.due_date.format("%Y-%m-%d %H:%M"),
            preview.scheduled_days
        );
    }

    Ok(())
}

/// Run reset command
fn run_reset(config: &Config, user: &str, item: &str) -> anyhow::Result<()> {
    let service = open(config)?;
    let card = service.reset_card(user, item)?;

    println!("{}", "=== Cadence Reset ===".cyan().bold());
    println!();
    println!(
        "{} Card {} / {} is {} again (version {})",
        "OK".green().bold(),
        user,
        item,
        card.state.as_str(),
        card.version
    );

    Ok(())
}

/// Run serve command
fn run_serve(mut config: Config, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.port = port;
    }

    println!("{}", "=== Cadence API ===".cyan().bold());
    println!();
    println!(
        "Starting API at {}...",
        format!("http://127.0.0.1:{}", config.port).cyan()
    );

    let service = Arc::new(open(&config)?);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        cadence_server::api::serve(service, config.port)
            .await
            .map_err(|e| anyhow::anyhow!("API error: {}", e))
    })
}

/// Truncate a string for display (UTF-8 safe)
fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_chars {
        s
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
