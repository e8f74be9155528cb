use anyhow::Result;
use clap::{Parser, Subcommand};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ttc_ridership::pipeline::DEFAULT_URL;
use ttc_ridership::{
    dates, open_store, DomSession, Outcome, Pipeline, PipelineConfig, Selectors, SnapshotDom,
    StoreFormat, TransportMode, WebDriver,
};

#[derive(Parser)]
#[clap(name = "ttc-ridership", version, about = "Collects the daily ridership counters published by the Tbilisi Transport Company")]
struct Cli {
    /// More logging for each occurrence, up to trace
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape today's counters and append them to the dataset
    Collect(CollectArgs),
    /// Save the page HTML and report what the selectors find in it
    Snapshot(SnapshotArgs),
    /// Print summary statistics for the collected dataset
    Stats(StatsArgs),
}

#[derive(Parser)]
struct CollectArgs {
    #[clap(long, default_value = DEFAULT_URL)]
    url: String,
    /// Where the dataset lives, created on first run
    #[clap(long, default_value = "data/ttc_passengers.json")]
    data_file: PathBuf,
    /// json or csv, guessed from the file extension when omitted
    #[clap(long)]
    format: Option<StoreFormat>,
    /// A running chromedriver to drive the page with
    #[clap(long, default_value = "http://localhost:9515")]
    webdriver_url: String,
    /// Show the browser window instead of running headless
    #[clap(long)]
    headed: bool,
    /// How long the page gets to render its counters
    #[clap(long, default_value_t = 20)]
    timeout_secs: u64,
    /// Grace period for the counter animation to finish
    #[clap(long, default_value_t = 3)]
    settle_secs: u64,
    /// Fail instead of using today's date when the page shows no date label
    #[clap(long)]
    no_date_fallback: bool,
    /// Collect from a saved HTML file instead of the live page
    #[clap(long)]
    from_snapshot: Option<PathBuf>,
}

#[derive(Parser)]
struct SnapshotArgs {
    #[clap(long, default_value = DEFAULT_URL)]
    url: String,
    #[clap(long, default_value = "debug_page.html")]
    out: PathBuf,
}

#[derive(Parser)]
struct StatsArgs {
    #[clap(long, default_value = "data/ttc_passengers.json")]
    data_file: PathBuf,
    /// json or csv, guessed from the file extension when omitted
    #[clap(long)]
    format: Option<StoreFormat>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => log::Level::Info,
        1 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    simple_logger::init_with_level(level)?;

    match cli.command {
        Command::Collect(args) => collect(args),
        Command::Snapshot(args) => snapshot(args),
        Command::Stats(args) => stats(args),
    }
}

fn resolve_format(flag: Option<StoreFormat>, path: &Path) -> StoreFormat {
    flag.or_else(|| StoreFormat::from_path(path))
        .unwrap_or(StoreFormat::Json)
}

fn collect(args: CollectArgs) -> Result<()> {
    let format = resolve_format(args.format, &args.data_file);
    let mut store = open_store(format, &args.data_file)?;
    let config = PipelineConfig {
        url: args.url,
        render_timeout: Duration::from_secs(args.timeout_secs),
        settle_delay: if args.from_snapshot.is_some() {
            Duration::ZERO
        } else {
            Duration::from_secs(args.settle_secs)
        },
        fallback_to_today: !args.no_date_fallback,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config);

    let outcome = match args.from_snapshot {
        Some(path) => {
            log::info!("collecting from snapshot {}", path.display());
            let mut dom = SnapshotDom::from_file(&path)?;
            pipeline.run(&mut dom, store.as_mut())?
        }
        None => {
            let mut dom = WebDriver::new_session(&args.webdriver_url, !args.headed)?;
            let result = pipeline.run(&mut dom, store.as_mut());
            if let Err(e) = dom.quit() {
                log::warn!("webdriver session teardown failed: {}", e);
            }
            result?
        }
    };

    match outcome {
        Outcome::Recorded(observation) => {
            println!("Saved: {}", observation);
            println!("Total records: {}", store.load_all()?.len());
        }
        Outcome::SkippedDuplicate(date) => {
            println!(
                "Nothing to do: {} is already recorded",
                dates::format_canonical(date)
            );
        }
    }
    Ok(())
}

fn snapshot(args: SnapshotArgs) -> Result<()> {
    log::info!("fetching {}", args.url);
    let response = reqwest::blocking::get(&args.url)?.error_for_status()?;
    let html = response.text()?;
    fs::write(&args.out, &html)?;
    let hash = Sha256::digest(html.as_bytes());
    println!(
        "Saved {} bytes to {} (sha256 {:x})",
        html.len(),
        args.out.display(),
        hash
    );

    // dry-run the selectors so a layout change is visible at a glance
    let mut dom = SnapshotDom::from_html(&html);
    let selectors = Selectors::default();
    for selector in &selectors.date_label {
        match dom.find(selector) {
            Ok(element) => {
                let text = dom.text(&element)?;
                println!("date selector `{}`: {:?}", selector, text.trim());
            }
            Err(_) => println!("date selector `{}`: no match", selector),
        }
    }
    let items = dom.find_all(&selectors.traffic_item)?;
    println!("traffic items: {}", items.len());
    for item in &items {
        let classes = dom.class_list(item)?.join(" ");
        let value = match dom.find_in(item, &selectors.counter_value) {
            Ok(counter) => dom.text(&counter)?.trim().to_owned(),
            Err(_) => "<no counter element>".to_owned(),
        };
        println!("  [{}] {}", classes, value);
    }
    Ok(())
}

fn stats(args: StatsArgs) -> Result<()> {
    let format = resolve_format(args.format, &args.data_file);
    let store = open_store(format, &args.data_file)?;
    let observations = store.load_all()?;

    println!("Ridership dataset:");
    println!("  File: {}", args.data_file.display());
    println!("  Records: {}", observations.len());
    if observations.is_empty() {
        return Ok(());
    }
    let first = observations.iter().map(|o| o.date).min();
    let last = observations.iter().map(|o| o.date).max();
    if let (Some(first), Some(last)) = (first, last) {
        println!(
            "  Date range: {} to {}",
            dates::format_canonical(first),
            dates::format_canonical(last)
        );
    }
    for mode in TransportMode::ALL.iter() {
        let counts: Vec<u32> = observations.iter().filter_map(|o| o.count(*mode)).collect();
        if counts.is_empty() {
            println!("  {}: no data", mode);
            continue;
        }
        let total: u64 = counts.iter().map(|c| u64::from(*c)).sum();
        if let (Some(min), Some(max)) = (counts.iter().min(), counts.iter().max()) {
            println!(
                "  {}: {} days, min {}, max {}, mean {}",
                mode,
                counts.len(),
                min,
                max,
                total / counts.len() as u64
            );
        }
    }
    Ok(())
}
