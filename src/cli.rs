//! Command-line arguments and plain-text rendering.

use clap::Parser;

use crate::chain::driver::MAX_STEPS_LIMIT;
use crate::chain::profile::PROFILE_NAMES;
use crate::chain::ChainEntry;

pub const DEFAULT_CONFIG_PATH: &str = "config/chain.toml";

const AFTER_HELP: &str = "\
ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${VAR_NAME} syntax.

    RUST_LOG              Log level filter for tracing
                          (e.g. debug, reasoning_chain=debug,warn)
    OPENAI_API_KEY        API key, when the config references it

EXAMPLES:
    reasoning-chain \"Which is larger, 1.11 or 1.3?\"
    reasoning-chain -p classic -s 5 --json \"How many r's are in strawberry?\"
    RUST_LOG=debug reasoning-chain -m gpt-4o-mini \"Is 1001 prime?\"";

#[derive(Parser, Debug)]
#[command(name = "reasoning-chain")]
#[command(version, about, long_about = None, after_help = AFTER_HELP)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Model to use (overrides [llm] model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Chain profile
    #[arg(short, long, value_parser = PROFILE_NAMES.to_vec())]
    pub profile: Option<String>,

    /// Maximum reasoning steps
    #[arg(short = 's', long, value_parser = clap::value_parser!(u32).range(1..=MAX_STEPS_LIMIT as i64))]
    pub max_steps: Option<u32>,

    /// Sampling temperature, 0.0-1.0
    #[arg(short, long, value_parser = parse_temperature)]
    pub temperature: Option<f32>,

    /// Print the full trace as JSON when done
    #[arg(long)]
    pub json: bool,

    /// Question to reason about (all words are joined)
    #[arg(required = true)]
    pub prompt: Vec<String>,
}

impl Cli {
    pub fn prompt_text(&self) -> String {
        self.prompt.join(" ")
    }
}

fn parse_temperature(raw: &str) -> Result<f32, String> {
    let value: f32 = raw.parse().map_err(|_| format!("`{raw}` is not a number"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not in 0.0..=1.0"))
    }
}

/// Text block for one chain entry.
pub fn format_entry(entry: &ChainEntry) -> String {
    if entry.is_final() {
        return format!("=== {} ===\n{}\n", entry.label, entry.content);
    }
    let confidence = entry
        .confidence
        .map(|c| format!(", confidence {c:.2}"))
        .unwrap_or_default();
    format!(
        "--- {} ({:.2}s{confidence}) ---\n{}\n",
        entry.label,
        entry.elapsed.as_secs_f64(),
        entry.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("reasoning-chain").chain(args.iter().copied()))
    }

    #[test]
    fn test_command_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse(&["--help"]).unwrap_err().kind(), ErrorKind::DisplayHelp);
        assert_eq!(parse(&["-h"]).unwrap_err().kind(), ErrorKind::DisplayHelp);
        assert_eq!(parse(&["-V"]).unwrap_err().kind(), ErrorKind::DisplayVersion);
        assert_eq!(
            parse(&["question", "--version"]).unwrap_err().kind(),
            ErrorKind::DisplayVersion
        );
    }

    #[test]
    fn test_prompt_only_uses_defaults() {
        let cli = parse(&["Which", "is", "larger,", "1.11", "or", "1.3?"]).unwrap();
        assert_eq!(cli.prompt_text(), "Which is larger, 1.11 or 1.3?");
        assert_eq!(cli.config, DEFAULT_CONFIG_PATH);
        assert!(cli.model.is_none());
        assert!(cli.max_steps.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn test_all_options() {
        let cli = parse(&[
            "-c", "/etc/chain.toml", "-m", "gpt-4o-mini", "-p", "classic", "-s", "5", "-t", "0.7",
            "--json", "Is 1001 prime?",
        ])
        .unwrap();
        assert_eq!(cli.config, "/etc/chain.toml");
        assert_eq!(cli.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(cli.profile.as_deref(), Some("classic"));
        assert_eq!(cli.max_steps, Some(5));
        assert_eq!(cli.temperature, Some(0.7));
        assert!(cli.json);
        assert_eq!(cli.prompt_text(), "Is 1001 prime?");
    }

    #[test]
    fn test_double_dash_allows_dash_prompt() {
        let cli = parse(&["--", "-1", "or", "1?"]).unwrap();
        assert_eq!(cli.prompt_text(), "-1 or 1?");
    }

    #[test]
    fn test_missing_prompt() {
        assert_eq!(
            parse(&["--json"]).unwrap_err().kind(),
            ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_max_steps_range() {
        assert_eq!(parse(&["-s", "32", "q"]).unwrap().max_steps, Some(32));
        assert_eq!(parse(&["-s", "1", "q"]).unwrap().max_steps, Some(1));
        assert!(parse(&["-s", "0", "q"]).is_err());
        assert!(parse(&["-s", "33", "q"]).is_err());
        assert!(parse(&["-s", "many", "q"]).is_err());
    }

    #[test]
    fn test_temperature_range() {
        assert_eq!(parse(&["-t", "0", "q"]).unwrap().temperature, Some(0.0));
        assert!(parse(&["-t", "1.5", "q"]).is_err());
        assert!(parse(&["-t", "hot", "q"]).is_err());
    }

    #[test]
    fn test_unknown_profile_and_option() {
        assert!(parse(&["-p", "socratic", "q"]).is_err());
        assert_eq!(
            parse(&["--verbose", "q"]).unwrap_err().kind(),
            ErrorKind::UnknownArgument
        );
    }

    #[test]
    fn test_format_step_entry() {
        let entry = ChainEntry {
            label: "Step 1: Compare".to_string(),
            content: "0.3 > 0.11".to_string(),
            elapsed: Duration::from_millis(1250),
            confidence: Some(0.8),
        };
        assert_eq!(
            format_entry(&entry),
            "--- Step 1: Compare (1.25s, confidence 0.80) ---\n0.3 > 0.11\n"
        );
    }

    #[test]
    fn test_format_final_entry() {
        let entry = ChainEntry {
            label: ChainEntry::FINAL_LABEL.to_string(),
            content: "1.3".to_string(),
            elapsed: Duration::from_secs(1),
            confidence: None,
        };
        assert_eq!(format_entry(&entry), "=== Final Answer ===\n1.3\n");
    }
}
