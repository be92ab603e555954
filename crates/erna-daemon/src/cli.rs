use clap::{Parser, Subcommand};
use erna_core::{Location, Timestamp, UserId};

#[derive(Parser)]
#[command(name = "erna")]
#[command(about = "Random lunch groups per location", long_about = None)]
pub struct Cli {
    /// Config file (falls back to ERNA_CONFIG, then ~/.erna/erna.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the trigger loop until Ctrl-C
    Run,

    /// Put a user on a location's waiting list
    Join { location: Location, user: UserId },

    /// Take a user off their waiting list
    Leave { user: UserId },

    /// Show which waiting list holds a user
    Where { user: UserId },

    /// Schedule a one-off round for a location
    Schedule {
        location: Location,
        /// RFC 3339 or `YYYY-MM-DDTHH:MM` (UTC)
        datetime: Timestamp,
        /// Who scheduled it
        #[arg(long)]
        user: UserId,
        #[arg(long, default_value = "")]
        title: String,
    },

    /// Show the next scheduled and recurring round for a location
    Next { location: Location },

    /// Skip every round on a given day
    Skip {
        /// `YYYY-MM-DD` or any timestamp on that day (UTC)
        date: Timestamp,
        #[arg(long)]
        user: UserId,
    },

    /// List pending scheduled events and skips
    List,

    /// Fire a single round now, or at `--at`
    Fire {
        #[arg(long)]
        at: Option<Timestamp>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn schedule_parses_typed_arguments() {
        let cli = Cli::try_parse_from([
            "erna",
            "schedule",
            "hq",
            "2030-01-09T12:00",
            "--user",
            "alice",
            "--title",
            "lunch",
        ])
        .unwrap();
        let Commands::Schedule {
            location,
            datetime,
            user,
            title,
        } = cli.cmd
        else {
            panic!("expected schedule");
        };
        assert_eq!(location.as_str(), "hq");
        assert_eq!(datetime.as_str(), "2030-01-09T12:00:00Z");
        assert_eq!(user.as_str(), "alice");
        assert_eq!(title, "lunch");
    }

    #[test]
    fn invalid_location_is_rejected() {
        assert!(Cli::try_parse_from(["erna", "join", " hq", "alice"]).is_err());
    }
}
