use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Prism LLM gateway client
#[derive(Debug, Parser)]
#[command(name = "prism", about = "Talk to any configured LLM provider through one canonical interface")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "prism.toml", env = "PRISM_CONFIG", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one prompt and print the reply
    Chat(ChatArgs),
    /// Same as `chat`, printing Responses API JSON
    Responses(ChatArgs),
    /// List the models a provider offers
    Models {
        /// Configured provider name
        #[arg(short, long)]
        provider: String,
    },
}

#[derive(Debug, clap::Args)]
pub struct ChatArgs {
    /// Configured provider name
    #[arg(short, long)]
    pub provider: String,

    /// Model identifier, with or without the provider prefix
    #[arg(short, long)]
    pub model: String,

    /// Print the reply as it is generated
    #[arg(long)]
    pub stream: bool,

    /// System prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Attach the upstream JSON to every event
    #[arg(long)]
    pub raw: bool,

    pub prompt: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_arguments() {
        let args = Args::try_parse_from([
            "prism", "chat", "--provider", "local", "--model", "llama3.2", "--stream", "hello",
        ])
        .unwrap();

        let Command::Chat(chat) = args.command else {
            panic!("expected chat");
        };
        assert_eq!(chat.provider, "local");
        assert!(chat.stream);
        assert_eq!(chat.prompt, "hello");
        assert_eq!(args.config, PathBuf::from("prism.toml"));
    }

    #[test]
    fn responses_shares_chat_arguments() {
        let args = Args::try_parse_from(["prism", "responses", "-p", "local", "-m", "llama3.2", "hi"]).unwrap();

        let Command::Responses(responses) = args.command else {
            panic!("expected responses");
        };
        assert_eq!(responses.model, "llama3.2");
        assert!(!responses.stream);
    }

    #[test]
    fn config_flag_after_subcommand() {
        let args = Args::try_parse_from(["prism", "models", "-p", "openai", "--config", "other.toml"]).unwrap();
        assert_eq!(args.config, PathBuf::from("other.toml"));
    }
}
