use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::calendar::CalendarMonth;
use crate::filter::{ImportanceFilter, MissionFilter, StatusFilter};
use crate::mission::MissionStatus;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "mission",
    version,
    about = "Plan dated missions on a calendar and track weekly progress",
    infer_subcommands = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "missionrc")]
    pub missionrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a hosted account.
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Sign in (hosted) or switch local profile.
    Login {
        #[arg(long, required_unless_present = "profile", requires = "password")]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long, conflicts_with = "email")]
        profile: Option<String>,
    },

    Logout,

    Add(AddArgs),

    List(ListArgs),

    Show {
        id: String,
    },

    Edit(EditArgs),

    Delete {
        id: String,
    },

    /// todo -> in_progress
    Start {
        id: String,
    },

    /// in_progress -> completed
    Done {
        id: String,
    },

    /// completed -> todo
    Reopen {
        id: String,
    },

    Calendar(CalendarArgs),

    Stats(FilterArgs),

    #[command(subcommand)]
    Category(CategoryCommand),

    Version,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// all, todo, in_progress or completed
    #[arg(long, default_value = "all")]
    pub status: StatusFilter,

    /// all or 1-5
    #[arg(long, default_value = "all")]
    pub importance: ImportanceFilter,
}

impl FilterArgs {
    pub fn filter(&self) -> MissionFilter {
        MissionFilter::new(self.status, self.importance)
    }
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(long, default_value = "today")]
    pub date: String,

    /// Minutes.
    #[arg(long, default_value_t = 30)]
    pub duration: u32,

    #[arg(long, default_value_t = 1)]
    pub importance: u8,

    #[arg(long)]
    pub description: Option<String>,

    /// HH:MM
    #[arg(long)]
    pub time: Option<String>,

    #[arg(long)]
    pub priority: Option<i32>,

    #[arg(long = "tag", action = ArgAction::Append)]
    pub tags: Vec<String>,

    /// Category id prefix or name.
    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub status: Option<MissionStatus>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Only missions scheduled on this day.
    #[arg(long)]
    pub date: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,

    #[arg(long)]
    pub clear_description: bool,

    #[arg(long)]
    pub date: Option<String>,

    #[arg(long)]
    pub duration: Option<u32>,

    #[arg(long)]
    pub importance: Option<u8>,

    #[arg(long)]
    pub status: Option<MissionStatus>,

    #[arg(long, conflicts_with = "clear_time")]
    pub time: Option<String>,

    #[arg(long)]
    pub clear_time: bool,

    #[arg(long, conflicts_with = "clear_priority")]
    pub priority: Option<i32>,

    #[arg(long)]
    pub clear_priority: bool,

    /// Replaces the tag set.
    #[arg(long = "tag", action = ArgAction::Append, conflicts_with = "clear_tags")]
    pub tags: Vec<String>,

    #[arg(long)]
    pub clear_tags: bool,

    #[arg(long, conflicts_with = "clear_category")]
    pub category: Option<String>,

    #[arg(long)]
    pub clear_category: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CalendarArgs {
    /// YYYY-MM; defaults to the current month.
    #[arg(long)]
    pub month: Option<CalendarMonth>,

    /// Day whose missions are listed under the grid.
    #[arg(long)]
    pub select: Option<String>,

    /// Pad to whole weeks.
    #[arg(long)]
    pub padded: bool,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCommand {
    List,

    Add {
        name: String,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        icon: Option<String>,
    },

    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long, conflicts_with = "clear_icon")]
        icon: Option<String>,
        #[arg(long)]
        clear_icon: bool,
    },

    Delete {
        id: String,
    },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls `rc.key=value` / `rc.key:value` words out of the argument list.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<OsString> {
        words.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&["mission", "rc.color=off", "list", "rc.profile:work"]))
            .expect("preprocess");
        assert_eq!(pre.cleaned_args, args(&["mission", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.profile".to_string(), "work".to_string()),
            ]
        );
    }

    #[test]
    fn parses_add_with_defaults() {
        let cli = GlobalCli::try_parse_from(["mission", "add", "Write", "report"]).expect("parse");
        let Some(Command::Add(add)) = cli.command else {
            panic!("expected add command");
        };
        assert_eq!(add.title, vec!["Write", "report"]);
        assert_eq!(add.date, "today");
        assert_eq!(add.duration, 30);
        assert_eq!(add.importance, 1);
        assert_eq!(add.status, None);
    }

    #[test]
    fn parses_typed_filters_and_prefixed_commands() {
        let cli = GlobalCli::try_parse_from([
            "mission",
            "cale",
            "--month",
            "2024-06",
            "--status",
            "in_progress",
            "--importance",
            "3",
        ])
        .expect("parse");
        let Some(Command::Calendar(cal)) = cli.command else {
            panic!("expected calendar command");
        };
        assert_eq!(cal.month, Some(CalendarMonth { year: 2024, month: 6 }));
        assert_eq!(cal.filter.status, StatusFilter::Only(MissionStatus::InProgress));
        assert_eq!(cal.filter.importance, ImportanceFilter::Exactly(3));

        assert!(GlobalCli::try_parse_from(["mission", "list", "--importance", "9"]).is_err());
    }

    #[test]
    fn login_needs_email_and_password_or_profile() {
        assert!(GlobalCli::try_parse_from(["mission", "login", "--profile", "work"]).is_ok());
        assert!(
            GlobalCli::try_parse_from(["mission", "login", "--email", "a@b.c", "--password", "pw"])
                .is_ok()
        );
        assert!(GlobalCli::try_parse_from(["mission", "login", "--email", "a@b.c"]).is_err());
        assert!(GlobalCli::try_parse_from(["mission", "login"]).is_err());
    }

    #[test]
    fn rc_flag_parses_key_value() {
        let cli = GlobalCli::try_parse_from(["mission", "--rc", "color=off", "stats"]).expect("parse");
        assert_eq!(cli.rc_overrides.len(), 1);
        assert_eq!(cli.rc_overrides[0].key, "color");
        assert_eq!(cli.rc_overrides[0].value, "off");
    }
}
