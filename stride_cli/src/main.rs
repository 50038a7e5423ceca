use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use stride_core::adapter::StepDataAdapter;
use stride_core::config::ProviderKind;
use stride_core::dates::DayZone;
use stride_core::leaderboard::Leaderboard;
use stride_core::level::level_for;
use stride_core::sources::{CsvRecordProvider, InflatingProvider, InflationHandle};
use stride_core::*;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "stride")]
#[command(about = "Daily step tracker with levels", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the level for a step count
    Level {
        steps: StepCount,
    },

    /// Load and show a day's steps (default)
    Today {
        /// Day to show (YYYY-MM-DD), never after today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// CSV file of step records to read from
        #[arg(long)]
        records: Option<PathBuf>,
    },

    /// Load today, then pull-to-refresh a number of times
    Refresh {
        /// CSV file of step records to read from
        #[arg(long)]
        records: Option<PathBuf>,

        /// Number of refreshes
        #[arg(long, default_value_t = 1)]
        times: usize,

        /// Dev mode - add synthetic steps before each refresh
        #[arg(long)]
        inflate: bool,
    },

    /// Print the animation frames between two step counts
    Animate {
        #[arg(long)]
        from: StepCount,

        #[arg(long)]
        to: StepCount,

        /// Frames per second (defaults to the configured frame interval)
        #[arg(long)]
        fps: Option<u32>,
    },

    /// Keep today's count fresh, polling the provider
    Watch {
        /// CSV file of step records to read from
        #[arg(long)]
        records: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },

    /// Show the leaderboard
    Leaderboard {
        /// Set your own step count first
        #[arg(long)]
        steps: Option<StepCount>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        stride_core::logging::init_with_level("debug");
    } else {
        stride_core::logging::init();
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Some(Commands::Level { steps }) => cmd_level(steps, cli.json),
        Some(Commands::Today { date, records }) => {
            cmd_today(&config, date, records.as_deref(), cli.json).await
        }
        Some(Commands::Refresh {
            records,
            times,
            inflate,
        }) => cmd_refresh(&config, records.as_deref(), times, inflate, cli.json).await,
        Some(Commands::Animate { from, to, fps }) => cmd_animate(&config, from, to, fps, cli.json),
        Some(Commands::Watch { records, seconds }) => {
            cmd_watch(&config, records.as_deref(), seconds, cli.json).await
        }
        Some(Commands::Leaderboard { steps }) => cmd_leaderboard(steps, cli.json).await,
        None => {
            // Default to "today"
            cmd_today(&config, None, None, cli.json).await
        }
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Adapter over the configured backend
///
/// A record file (from the command line or the config) backs the provider;
/// without one the placeholder counts are used. With `inflate`, today's
/// queries get synthetic steps through the returned handle.
fn build_adapter(
    config: &Config,
    records: Option<&Path>,
    inflate: bool,
) -> Result<(StepDataAdapter, Option<InflationHandle>)> {
    let zone = DayZone::Local;
    let mut provider_config = config.provider.clone();
    let records = match records {
        Some(path) => {
            provider_config.kind = ProviderKind::HealthConnect;
            Some(path.to_path_buf())
        }
        None => provider_config.records_csv.clone(),
    };

    let csv = match records {
        Some(path) => CsvRecordProvider::new(path),
        None if inflate => {
            return Err(Error::Config(
                "--inflate needs a record file (--records or provider.records_csv)".into(),
            ))
        }
        None => {
            let adapter = StepDataAdapter::from_config(&provider_config, None, zone);
            return Ok((adapter, None));
        }
    };

    if inflate {
        let inflating =
            InflatingProvider::new(csv, zone.today(), zone, config.dev.inflate_steps);
        let handle = inflating.handle();
        let provider: Arc<dyn HealthProvider> = Arc::new(inflating);
        Ok((
            StepDataAdapter::from_config(&provider_config, Some(provider), zone),
            Some(handle),
        ))
    } else {
        let provider: Arc<dyn HealthProvider> = Arc::new(csv);
        Ok((
            StepDataAdapter::from_config(&provider_config, Some(provider), zone),
            None,
        ))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_level(steps: StepCount, json: bool) -> Result<()> {
    let info = calculate_level_info(steps);
    if json {
        return print_json(&info);
    }

    println!("Steps:     {}", steps);
    println!("Level:     {}", info.current_level);
    println!(
        "Progress:  {}/{} ({:.1}%)",
        info.progress_in_current_level,
        info.total_steps_for_current_level,
        info.progress_percentage
    );
    println!("To next:   {}", info.steps_to_next_level);
    Ok(())
}

#[derive(Serialize)]
struct DayOutput {
    date: NaiveDate,
    steps: StepCount,
    previous_day_steps: StepCount,
    change_vs_previous_day: DayChange,
    level: LevelInfo,
    source: Option<String>,
    last_updated: String,
}

impl DayOutput {
    fn from_view(view: &StepView) -> Self {
        Self {
            date: view.date,
            steps: view.steps,
            previous_day_steps: view.previous_day_steps,
            change_vs_previous_day: view.change_vs_previous_day,
            level: view.target,
            source: view.dominant_source.clone(),
            last_updated: view.last_updated.clone(),
        }
    }
}

fn display_day(view: &StepView) {
    let label = if view.is_today {
        "Today".to_string()
    } else {
        view.date_label.clone()
    };
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {}", label);
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!("  {} steps", view.steps);
    println!(
        "  Level {}  [{}] {}/{}",
        view.target.current_level,
        progress_bar(view.target.progress_fraction(), 20),
        view.target.progress_in_current_level,
        view.target.total_steps_for_current_level
    );
    println!(
        "  {} steps to level {}",
        view.target.steps_to_next_level,
        view.target.current_level + 1
    );
    let change = view.change_vs_previous_day;
    println!(
        "  Previous day: {} steps ({}{}%)",
        view.previous_day_steps,
        if change.is_increase { "↑" } else { "↓" },
        change.percent
    );
    if let Some(ref source) = view.dominant_source {
        println!("  Main source: {}", source);
    }
    println!("  {}", view.last_updated);
    println!();
}

fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

async fn cmd_today(
    config: &Config,
    date: Option<NaiveDate>,
    records: Option<&Path>,
    json: bool,
) -> Result<()> {
    let (adapter, _) = build_adapter(config, records, false)?;
    let session = StepSession::from_config(Arc::new(adapter), config);

    let report = match date {
        Some(date) => session
            .select_date(date)
            .await
            .ok_or_else(|| Error::Other(format!("{} is after today", date)))?,
        None => match session.load_initial().await {
            Some(report) => report,
            None => return Err(Error::Other("session already loaded".into())),
        },
    };
    if let Some(ref e) = report.error {
        tracing::warn!("Showing zero steps: {}", e);
    }

    let view = session.view();
    session.shutdown();

    if json {
        print_json(&DayOutput::from_view(&view))
    } else {
        display_day(&view);
        Ok(())
    }
}

async fn cmd_refresh(
    config: &Config,
    records: Option<&Path>,
    times: usize,
    inflate: bool,
    json: bool,
) -> Result<()> {
    let (adapter, inflation) = build_adapter(config, records, inflate)?;
    let session = StepSession::from_config(Arc::new(adapter), config);

    session.load_initial().await;
    if !json {
        println!("Loaded {} steps", session.view().steps);
    }

    let mut reports = Vec::with_capacity(times);
    for _ in 0..times {
        if let Some(ref handle) = inflation {
            handle.bump();
        }
        let report = session.refresh(SyncTrigger::UserRefresh).await;
        if !json {
            if let Some(ref notice) = report.notice {
                println!("[{:?}] {}", notice.kind(), notice.message());
            }
            if report.transition.has_leveled_up {
                println!("  ★ Level up! Now level {}", level_for(report.current));
            }
        }
        reports.push(report);
    }

    let view = session.view();
    session.shutdown();

    if json {
        return print_json(&reports);
    }
    println!("Now {} steps, level {}", view.steps, view.target.current_level);
    Ok(())
}

#[derive(Serialize)]
struct FrameOutput {
    at_ms: u128,
    #[serde(flatten)]
    frame: AnimationFrame,
    flash_edge: bool,
    /// Level-up overlay opacity
    overlay: f64,
}

fn cmd_animate(
    config: &Config,
    from: StepCount,
    to: StepCount,
    fps: Option<u32>,
    json: bool,
) -> Result<()> {
    let every = match fps {
        Some(0) => return Err(Error::Config("--fps must be greater than 0".into())),
        Some(fps) => Duration::from_secs(1) / fps,
        None => config.animation.frame_interval(),
    };

    let mut animator = StepAnimator::at_rest(from, config.animation.clone());
    let initial_flash = animator.frame(Duration::ZERO).flash;
    let mut watcher = FlashWatcher::new(initial_flash);
    let mut pulse = FlashPulse::new(initial_flash, &config.animation);
    let transition = animator.animate_to(Duration::ZERO, to);

    let frames: Vec<FrameOutput> = animator
        .frames(Duration::ZERO, every)
        .map(|(at, frame)| FrameOutput {
            at_ms: at.as_millis(),
            frame,
            flash_edge: watcher.observe(frame.flash),
            overlay: pulse.update(at, frame.flash),
        })
        .collect();

    if json {
        return print_json(&frames);
    }

    if transition.has_leveled_up {
        println!(
            "{} → {} steps: level up (+{} level{})",
            from,
            to,
            transition.levels_gained,
            if transition.levels_gained == 1 { "" } else { "s" }
        );
    } else {
        println!("{} → {} steps", from, to);
    }
    for out in &frames {
        println!(
            "{:>5}ms  steps {:>6}  level {:>3}  [{}] {:>5.1}%  glow {:.2}{}",
            out.at_ms,
            out.frame.steps,
            out.frame.level,
            progress_bar(out.frame.progress, 20),
            out.frame.progress * 100.0,
            out.overlay,
            if out.flash_edge { "  FLASH" } else { "" }
        );
    }
    Ok(())
}

async fn cmd_watch(
    config: &Config,
    records: Option<&Path>,
    seconds: u64,
    json: bool,
) -> Result<()> {
    let (adapter, _) = build_adapter(config, records, false)?;
    let session = Arc::new(StepSession::from_config(Arc::new(adapter), config));
    session.load_initial().await;

    let cancel = CancellationToken::new();
    let poller = {
        let session = session.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { session.run_polling(cancel).await })
    };

    let mut last_shown = None;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            _ = ticker.tick() => {
                let view = session.view();
                if last_shown != Some(view.steps) {
                    last_shown = Some(view.steps);
                    if json {
                        println!("{}", serde_json::to_string(&DayOutput::from_view(&view))?);
                    } else {
                        println!(
                            "{} steps, level {} ({})",
                            view.steps, view.target.current_level, view.last_updated
                        );
                    }
                }
            }
        }
    }

    cancel.cancel();
    session.shutdown();
    if let Err(e) = poller.await {
        tracing::warn!("Polling task ended abnormally: {}", e);
    }
    Ok(())
}

async fn cmd_leaderboard(steps: Option<StepCount>, json: bool) -> Result<()> {
    let board = Leaderboard::mock();
    if let Some(steps) = steps {
        board.update_current_user_steps(steps).await;
    }
    let standings = board.standings().await;

    if json {
        return print_json(&standings);
    }

    println!("\n  Leaderboard");
    println!("─────────────────────────────────────────");
    for standing in &standings {
        println!(
            "{} {:>2}. {:<10} {:>6} steps  lvl {:>2}",
            if standing.is_current_user { "→" } else { " " },
            standing.rank,
            standing.entry.name,
            standing.entry.steps,
            standing.level
        );
    }
    println!();
    Ok(())
}
