//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - serve: run the gateway on a Unix socket or stdio
//! - tools / resources: list what the services expose
//! - call / read: run one tool or resource read in-process

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// JobBuilda - job, quote, invoice and compliance backend for electrical contractors
#[derive(Parser, Debug)]
#[command(name = "jobbuilda")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway
    Serve {
        /// Serve a single session on stdin/stdout instead of the Unix socket
        #[arg(long)]
        stdio: bool,
    },

    /// List every tool with its required arguments
    Tools,

    /// List every resource URI template
    Resources,

    /// Call a tool
    Call {
        /// Tool name (e.g., create_quote)
        tool: String,

        /// Tenant the call acts for
        #[arg(short, long)]
        tenant: String,

        /// Actor recorded on the emitted event
        #[arg(short, long, default_value = "cli")]
        actor: String,

        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Read a resource
    Read {
        /// Resource URI (e.g., jobbuilda://invoices?status=sent)
        uri: String,

        /// Tenant to read as
        #[arg(short, long)]
        tenant: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["jobbuilda"]).is_err());
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::try_parse_from(["jobbuilda", "tools", "-v", "-c", "/etc/jobbuilda.yml"]).unwrap();
        assert!(cli.is_verbose());
        assert_eq!(cli.config, Some(PathBuf::from("/etc/jobbuilda.yml")));
        assert!(matches!(cli.command, Commands::Tools));
    }

    #[test]
    fn test_serve() {
        let cli = Cli::try_parse_from(["jobbuilda", "serve"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { stdio: false }));

        let cli = Cli::try_parse_from(["jobbuilda", "serve", "--stdio"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { stdio: true }));
    }

    #[test]
    fn test_call() {
        let cli = Cli::try_parse_from([
            "jobbuilda",
            "call",
            "send_quote",
            "--tenant",
            "acme",
            "--args",
            r#"{"quote_id": "q1"}"#,
        ])
        .unwrap();
        match cli.command {
            Commands::Call {
                tool,
                tenant,
                actor,
                args,
            } => {
                assert_eq!(tool, "send_quote");
                assert_eq!(tenant, "acme");
                assert_eq!(actor, "cli");
                assert!(args.contains("q1"));
            }
            other => panic!("Expected call command, got {:?}", other),
        }
    }

    #[test]
    fn test_call_requires_tenant() {
        assert!(Cli::try_parse_from(["jobbuilda", "call", "send_quote"]).is_err());
    }

    #[test]
    fn test_read() {
        let cli = Cli::try_parse_from(["jobbuilda", "read", "jobbuilda://quotes", "-t", "acme"]).unwrap();
        match cli.command {
            Commands::Read { uri, tenant } => {
                assert_eq!(uri, "jobbuilda://quotes");
                assert_eq!(tenant, "acme");
            }
            other => panic!("Expected read command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
