use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rollcall_core::{Identification, Identify, ModelPaths, ReferenceMatcher, Threshold};
use rollcall_hw::Camera;
use rollcall_ledger::Ledger;
use std::path::PathBuf;

mod config;
mod kiosk;
mod overlay;
mod worker;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall face-recognition attendance")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webcam kiosk (default)
    Kiosk,
    /// Match a single image against the reference photos
    Verify {
        /// Image file to identify
        image: PathBuf,
    },
    /// Print attendance for a day
    Attendance {
        /// Day to show, YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// List V4L2 capture devices
    Devices,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::Config::from_env();

    match cli.command.unwrap_or(Commands::Kiosk) {
        Commands::Kiosk => kiosk::run(&config)?,
        Commands::Verify { image } => {
            let frame = image::open(&image)
                .with_context(|| format!("cannot read {}", image.display()))?
                .to_luma8();
            let mut matcher =
                ReferenceMatcher::load(&ModelPaths::in_dir(&config.model_dir), &config.images_dir)?;
            let threshold = Threshold(config.distance_threshold);

            match matcher.identify(&frame)? {
                Identification::EmptyReferences => {
                    println!("No reference photos in {}", config.images_dir.display());
                }
                Identification::NoFace => println!("No face found in {}", image.display()),
                Identification::Closest(candidate) => {
                    let verdict = if threshold.accepts(candidate.distance) {
                        "ACCEPT"
                    } else {
                        "REJECT"
                    };
                    println!("Identity:   {}", candidate.identity);
                    println!("Reference:  {}", candidate.reference.display());
                    println!("Distance:   {:.4}", candidate.distance);
                    println!("Confidence: {:.2}", candidate.confidence());
                    println!("Result:     {verdict} (threshold {:.2})", threshold.0);
                }
            }
        }
        Commands::Attendance { date } => {
            let date = date.unwrap_or_else(rollcall_ledger::today);
            let ledger = Ledger::open(&config.ledger_path)?;
            let entries = ledger.entries_on(date)?;
            if entries.is_empty() {
                println!("No attendance on {date}");
            }
            for entry in entries {
                println!("{:<24} {} {}", entry.name, entry.date, entry.time);
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}
