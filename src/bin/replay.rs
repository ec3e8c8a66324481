use nostr_engagement::{
    CountingMetrics, CurrentUser, Error, ErrorKind, Event, ReactionStore, Settings,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::env;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

const USAGE: &str = "replay <events.jsonl> [--user <pubkey> | --everyone] [--settings <file>]";

#[derive(Serialize)]
struct Summary {
    reactions: u64,
    reacted_by_user: bool,
    comments: u64,
    reposts: usize,
    reposted_by_user: bool,
    bookmarked_by_user: bool,
    zapped_msats: u64,
}

fn main() -> Result<(), Error> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }

    let env_filter = EnvFilter::from_default_env();
    let max_level = match env_filter.max_level_hint() {
        Some(l) => l,
        None => LevelFilter::ERROR,
    };
    let show_debug = cfg!(debug_assertions) || max_level <= LevelFilter::DEBUG;
    tracing_subscriber::fmt::fmt()
        .with_target(false)
        .with_file(show_debug)
        .with_line_number(show_debug)
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let mut input: Option<PathBuf> = None;
    let mut user = CurrentUser::Nobody;
    let mut settings_path = Settings::default_path();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--user" => match args.next() {
                Some(pk) => user = CurrentUser::Pubkey(pk),
                None => return Err(usage("--user needs a pubkey")),
            },
            "--everyone" => user = CurrentUser::Everyone,
            "--settings" => match args.next() {
                Some(p) => settings_path = Some(PathBuf::from(p)),
                None => return Err(usage("--settings needs a path")),
            },
            _ if input.is_none() => input = Some(PathBuf::from(arg)),
            _ => return Err(usage(&format!("Unexpected argument {}", arg))),
        }
    }

    let input = match input {
        Some(i) => i,
        None => return Err(usage("Missing events file")),
    };

    let settings = match settings_path {
        Some(p) => Settings::load(&p)?,
        None => Settings::default(),
    };

    let metrics = Arc::new(CountingMetrics::new());
    let store = ReactionStore::from_settings(&settings, metrics.clone());

    let reader = BufReader::new(std::fs::File::open(&input)?);
    let mut batch: Vec<Event> = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(&line) {
            Ok(event) => batch.push(event),
            Err(e) => tracing::warn!("Line {}: {}", lineno + 1, e),
        }
        if batch.len() >= 500 {
            store.add_events(&batch, &user);
            batch.clear();
        }
    }
    store.add_events(&batch, &user);

    let summary: BTreeMap<String, Summary> = store
        .snapshot()
        .iter()
        .map(|(root, stats)| {
            (
                root.clone(),
                Summary {
                    reactions: stats.reaction_count,
                    reacted_by_user: stats.reacted_by_user.is_some(),
                    comments: stats.comment_count,
                    reposts: stats.reposted_by.len(),
                    reposted_by_user: stats.reposted_by_user,
                    bookmarked_by_user: stats.bookmarked_by_user,
                    zapped_msats: stats.zapped_msats,
                },
            )
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&summary)?);

    for (name, count) in metrics.read_all() {
        tracing::info!("{}: {}", name, count);
    }

    Ok(())
}

fn usage(message: &str) -> Error {
    ErrorKind::Usage(message.to_owned(), USAGE.to_owned()).into()
}
