use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use challenges::config::ChallengeConfig;
use challenges::manager::ChallengeManager;
use challenges::model::Record;
use challenges::parser::{self, Command};
use challenges::storage::SegmentStore;

type Manager = ChallengeManager<SegmentStore>;

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = "Challenge record shell", long_about = None)]
struct Args {
    /// Directory holding challenge.dat and challenge_member.dat
    #[clap(long, default_value = "challenge-data")]
    data_dir: PathBuf,

    /// JSON config (full group size, id floor, medal limits)
    #[clap(long)]
    config: Option<PathBuf>,
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,challenges=info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_level(true)
        .init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("[\u{2717}] {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => ChallengeConfig::from_json_file(path)?,
        None => ChallengeConfig::default(),
    };

    let store = SegmentStore::open(&args.data_dir, config.strict_durability)?;
    let manager = ChallengeManager::new(store, config);
    let report = manager.load_from_store()?;

    print_banner();
    println!("Loaded {} challenges from {}", report.records, args.data_dir.display());
    if report.orphan_members > 0 {
        println!("[\u{26a0}\u{fe0f}] Skipped {} member rows without a challenge.", report.orphan_members);
    }
    println!("Type 'HELP' for supported commands or 'EXIT' to quit.\n");

    let stdin = io::stdin();
    let mut buffer = String::new();

    loop {
        print!("challenges> ");
        io::stdout().flush()?;
        buffer.clear();

        if stdin.lock().read_line(&mut buffer)? == 0 { break; }
        if buffer.trim().is_empty() { continue; }

        match parser::parse_command(&buffer) {
            Ok(Command::Exit) => break,
            Ok(cmd) => {
                if let Err(e) = execute_command(&manager, cmd) {
                    println!("[\u{26a0}\u{fe0f} Error] {}", e);
                }
            }
            Err(e) => println!("[\u{2717} Syntax Error] {}", e),
        }
    }
    Ok(())
}

fn print_banner() {
    println!("\n==================================================");
    println!("   Challenge Records Shell");
    println!("==================================================\n");
}

fn print_help() {
    println!("\n--- Available Commands ---");
    println!("1. RECORD:  RECORD <activity> <secs> [player:spec[:guild], ...] [AT <unix>]");
    println!("2. BEST:    BEST <activity>");
    println!("3. GUILD:   GUILD <guild> [<activity>]");
    println!("4. MEMBER:  MEMBER <player> [<activity>]");
    println!("5. SHOW:    SHOW <challenge id>");
    println!("6. STATS:   STATS");
    println!("7. EXIT:    Quit\n");
}

fn print_record(record: Option<Record>) -> Result<(), String> {
    match record {
        Some(r) => println!("{}", serde_json::to_string_pretty(&r).map_err(|e| e.to_string())?),
        None => println!("(no record)"),
    }
    Ok(())
}

fn print_records(records: Vec<Record>) -> Result<(), String> {
    if records.is_empty() {
        println!("(no records)");
        return Ok(());
    }
    for r in records {
        println!(
            "  activity {:>5}  #{:<8} {:>6}s  {:<6}  {} member(s)",
            r.activity_id,
            r.id,
            r.duration_secs,
            r.medal,
            r.roster.len()
        );
    }
    Ok(())
}

fn execute_command(manager: &Manager, cmd: Command) -> Result<(), String> {
    match cmd {
        Command::Help => { print_help(); Ok(()) },
        Command::Record { activity_id, duration_secs, participants, at } => {
            let completion = match at {
                Some(ts) => manager.record_completion_at(activity_id, duration_secs, &participants, ts),
                None => manager.record_completion(activity_id, duration_secs, &participants),
            }
            .map_err(|e| e.to_string())?;

            if let Some(e) = &completion.persist_error {
                println!("[\u{26a0}\u{fe0f}] Recorded in memory only: {}", e);
            }
            println!("[\u{2713}] Challenge #{} recorded.", completion.record.id);
            print_record(Some(completion.record))
        },
        Command::Best { activity_id } => print_record(manager.best_server_record(activity_id)),
        Command::Guild { guild_id, activity_id: Some(activity_id) } => {
            print_record(manager.best_guild_record(guild_id, activity_id))
        },
        Command::Guild { guild_id, activity_id: None } => print_records(manager.guild_records(guild_id)),
        Command::Member { participant_id, activity_id: Some(activity_id) } => {
            print_record(manager.best_participant_record(participant_id, activity_id))
        },
        Command::Member { participant_id, activity_id: None } => {
            print_records(manager.participant_records(participant_id))
        },
        Command::Show { id } => print_record(manager.record(id)),
        Command::Stats => {
            let stats = manager.stats().ok_or("state unavailable")?;
            println!("Challenges: {}", stats.records);
            println!("Activities: {}", stats.activities);
            println!("Next id:    {}", stats.next_id);
            Ok(())
        },
        Command::Exit => Ok(()),
    }
}
