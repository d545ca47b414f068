//! Command-line interface.
//!
//! Argument values override the `"*"` default profile and the top-level
//! settings from the config file.

use clap::Parser;
use std::path::PathBuf;

const EXAMPLES: &str = "\
Examples:
  xget --config xget.toml --nick test irc.rizon.net/#news/ginpachi-sensei/1
  xget irc.rizon.net/#news/ginpachi-sensei/41..46
  xget '#news@irc.rizon.net/ginpachi-sensei/1..9|2&15'
  xget --files list1.txt:list2.txt";

#[derive(Debug, Parser)]
#[command(name = "xget", version, about = "Batch XDCC download client", after_help = EXAMPLES)]
pub struct Cli {
    /// XDCC addresses, e.g. irc.server.com/#chan/bot/pack with ranges like
    /// 41..46, 1..9|2, joined with &
    pub addresses: Vec<String>,

    /// Config file location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// IRC nick
    #[arg(long)]
    pub nick: Option<String>,

    /// IRC USER for ident
    #[arg(long)]
    pub user: Option<String>,

    /// IRC PASS for ident
    #[arg(long)]
    pub pass: Option<String>,

    /// Realname for the USER ident
    #[arg(long)]
    pub realname: Option<String>,

    /// Password for NickServ identification
    #[arg(long)]
    pub nickserv: Option<String>,

    /// Colon-separated list of files to read addresses from, one per line
    #[arg(long, value_delimiter = ':')]
    pub files: Vec<PathBuf>,

    /// Output directory to save files to
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Don't download files that already exist at their full size
    #[arg(long)]
    pub skip_existing: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_addresses_and_flags() {
        let cli = Cli::parse_from([
            "xget",
            "--nick",
            "tester",
            "--skip-existing",
            "--files",
            "a.txt:b.txt",
            "irc.example.com/#c/bot/1",
        ]);
        assert_eq!(cli.nick.as_deref(), Some("tester"));
        assert!(cli.skip_existing);
        assert_eq!(cli.files, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
        assert_eq!(cli.addresses, vec!["irc.example.com/#c/bot/1".to_string()]);
    }
}
