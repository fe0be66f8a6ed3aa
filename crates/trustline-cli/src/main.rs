//! Trustline CLI - establish trust for credentials from the command line.
//!
//! This is the entry point for the `trustline` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Authenticate LDAP users, verify signed tokens and inspect credential bundles.
#[derive(Parser, Debug)]
#[command(name = "trustline")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging.
    #[arg(long, global = true, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authenticate against a directory and print the user's claims.
    Ldap {
        /// JSON file holding the LDAP metadata map.
        #[arg(long)]
        metadata: PathBuf,

        /// Overall timeout in seconds, defaulting to the authenticator config.
        #[arg(long, env = "TRUSTLINE_LDAP_TIMEOUT")]
        timeout: Option<u64>,
    },

    /// Verify a signed token and print its claims.
    Verify {
        /// The token.
        #[arg(long, required_unless_present = "header")]
        token: Option<String>,

        /// An `Authorization` header value carrying the token.
        #[arg(long, conflicts_with = "token")]
        header: Option<String>,

        /// PEM file of the signer certificate.
        #[arg(long, env = "TRUSTLINE_SIGNER_CERT")]
        cert: PathBuf,

        /// Print structured claims as JSON.
        #[arg(long, default_value = "false")]
        structured: bool,
    },

    /// Print a token's claims WITHOUT verifying it.
    Claims {
        /// The token.
        #[arg(long)]
        token: String,
    },

    /// Parse an application credential bundle and summarize it.
    Bundle {
        /// JSON bundle file.
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "trustline_cli=debug,trustline_auth=debug,trustline_ldap=debug,warn"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let output = match args.command {
        Command::Ldap { metadata, timeout } => commands::ldap(&metadata, timeout).await?,
        Command::Verify {
            token,
            header,
            cert,
            structured,
        } => {
            let token = commands::token_argument(token.as_deref(), header.as_deref())?;
            commands::verify(token, &cert, structured)?
        }
        Command::Claims { token } => commands::claims(&token)?,
        Command::Bundle { file } => commands::bundle(&file)?,
    };

    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn verify_takes_token_or_header() {
        let args =
            Args::try_parse_from(["trustline", "verify", "--token", "t", "--cert", "c.pem"])
                .unwrap();
        assert!(matches!(args.command, Command::Verify { token: Some(_), .. }));

        let args = Args::try_parse_from([
            "trustline",
            "verify",
            "--header",
            "Bearer t",
            "--cert",
            "c.pem",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::Verify { header: Some(_), .. }));

        assert!(Args::try_parse_from([
            "trustline",
            "verify",
            "--token",
            "t",
            "--header",
            "Bearer t",
            "--cert",
            "c.pem",
        ])
        .is_err());
    }

    #[test]
    fn ldap_timeout_is_optional() {
        let args =
            Args::try_parse_from(["trustline", "ldap", "--metadata", "ldap.json"]).unwrap();
        match args.command {
            Command::Ldap { timeout, .. } => assert_eq!(timeout, None),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
