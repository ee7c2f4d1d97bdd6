use anyhow::{Context, Result};
use clap::Parser;
use recflow::{config::DEFAULT_CONFIG_PATH, ingest, Config, Details};
use std::path::PathBuf;

/// Submit a finished recording to the recflow daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Absolute path of the recording
    #[arg(long, value_parser = non_empty)]
    path: String,

    /// Channel the recording was made from
    #[arg(long, value_parser = non_empty)]
    channel: String,

    /// Programme title
    #[arg(long, value_parser = non_empty)]
    title: String,

    /// Recorder status, "OK" for a clean recording
    #[arg(long, value_parser = non_empty)]
    status: String,

    /// Programme description
    #[arg(long, value_parser = non_empty)]
    description: String,

    /// Path to configuration file, used to find the socket
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Socket to submit to, overrides the configuration
    #[arg(short, long)]
    socket: Option<PathBuf>,
}

fn non_empty(value: &str) -> Result<String, String> {
    if value.trim().is_empty() {
        Err("must not be empty".to_string())
    } else {
        Ok(value.to_string())
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env().format_timestamp_secs().init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => println!("ok"),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let socket = match args.socket {
        Some(socket) => socket,
        None => {
            let config_path = args.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
            Config::load_config(Some(&config_path))
                .context("Failed to load configuration")?
                .socket_path
        }
    };

    let details = Details {
        path: args.path,
        channel: args.channel,
        title: args.title,
        status: args.status,
        description: args.description,
    };
    details.validate()?;

    log::debug!("submitting {} to {}", details.path, socket.display());
    ingest::submit(&socket, &details).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_fields_required() {
        let err = Args::try_parse_from(["recflow-submit", "--path", "/rec/a.ts"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_empty_field_rejected() {
        let err = Args::try_parse_from([
            "recflow-submit", "--path", "/rec/a.ts", "--channel", "", "--title", "A",
            "--status", "OK", "--description", "d",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn test_full_arguments_parse() {
        let args = Args::try_parse_from([
            "recflow-submit", "--path", "/rec/a.ts", "--channel", "BBC1", "--title", "A",
            "--status", "OK", "--description", "d", "--socket", "/tmp/r.sock",
        ])
        .unwrap();
        assert_eq!(args.channel, "BBC1");
        assert_eq!(args.socket, Some(PathBuf::from("/tmp/r.sock")));
    }
}
