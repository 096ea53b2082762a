use chat_stream::PipelineConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Which stages the content pipeline runs
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Router envelope, tags, embedded JSON and BBCode
    Full,
    /// Everything except BBCode conversion
    Server,
    /// Tags and BBCode only
    Markup,
}

impl Preset {
    pub fn config(self) -> PipelineConfig {
        match self {
            Preset::Full => PipelineConfig::full(),
            Preset::Server => PipelineConfig::server(),
            Preset::Markup => PipelineConfig::markup(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a message to the configured webhook and stream the reply
    Send {
        /// Message text
        message: String,

        /// Chat to send the message in
        #[arg(long, default_value = "cli")]
        chat_id: String,

        /// User id forwarded to the webhook
        #[arg(long, default_value = "cli-user")]
        user_id: String,

        /// Display name forwarded to the webhook
        #[arg(long, default_value = "cli")]
        username: String,

        /// Record the raw response to a file
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Play back a recording or a raw line-delimited response
    Replay {
        /// Recording JSON or NDJSON body
        file: PathBuf,

        /// Bytes per chunk when replaying a raw body
        #[arg(long, default_value_t = 16)]
        chunk_size: usize,

        /// Ignore recorded chunk timing
        #[arg(long)]
        fast: bool,

        /// User message the replayed response answers
        #[arg(long, default_value = "replay")]
        message: String,
    },

    /// Parse a complete raw assistant text in one pass
    Parse {
        /// File with the raw text
        file: PathBuf,
    },
}

/// Define the application arguments
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Pipeline preset, overrides the config file
    #[arg(long)]
    pub preset: Option<Preset>,

    /// Leave BBCode untouched
    #[arg(long)]
    pub no_bbcode: bool,

    /// Do not unwrap router envelopes
    #[arg(long)]
    pub no_router: bool,

    /// Enable verbose logging (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn parse() -> Self {
        <Args as Parser>::parse()
    }

    /// Apply the command line overrides on top of the configured pipeline
    pub fn pipeline_config(&self, configured: PipelineConfig) -> PipelineConfig {
        let mut config = self.preset.map(Preset::config).unwrap_or(configured);
        if self.no_bbcode {
            config.bbcode = false;
        }
        if self.no_router {
            config.router_envelope = false;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_command() {
        let args = Args::try_parse_from(["test", "parse", "reply.txt"]).expect("Failed to parse args");

        assert_eq!(args.verbose, 0);
        assert!(args.preset.is_none());
        match args.command {
            Command::Parse { file } => assert_eq!(file, PathBuf::from("reply.txt")),
            _ => panic!("Expected parse command"),
        }
    }

    #[test]
    fn test_replay_defaults() {
        let args = Args::try_parse_from(["test", "-vv", "replay", "rec.json"])
            .expect("Failed to parse replay args");
        assert_eq!(args.verbose, 2);

        match args.command {
            Command::Replay {
                chunk_size, fast, ..
            } => {
                assert_eq!(chunk_size, 16);
                assert!(!fast);
            }
            _ => panic!("Expected replay command"),
        }
    }

    #[test]
    fn test_pipeline_overrides() {
        let args = Args::try_parse_from(["test", "--preset", "server", "--no-router", "parse", "x"])
            .expect("Failed to parse args");
        let config = args.pipeline_config(PipelineConfig::full());
        assert!(!config.bbcode);
        assert!(!config.router_envelope);
        assert!(config.embedded_json);

        let args = Args::try_parse_from(["test", "--no-bbcode", "parse", "x"]).expect("Failed to parse args");
        assert_eq!(
            args.pipeline_config(PipelineConfig::markup()),
            PipelineConfig {
                router_envelope: false,
                embedded_json: false,
                bbcode: false,
            }
        );
    }

    #[test]
    fn test_send_requires_message() {
        assert!(Args::try_parse_from(["test", "send"]).is_err());

        let args = Args::try_parse_from(["test", "send", "Oi", "--chat-id", "c1"]).expect("Failed to parse send args");
        match args.command {
            Command::Send {
                message, chat_id, record, ..
            } => {
                assert_eq!(message, "Oi");
                assert_eq!(chat_id, "c1");
                assert!(record.is_none());
            }
            _ => panic!("Expected send command"),
        }
    }
}
