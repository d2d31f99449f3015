//! Operator CLI for minting admin tokens.
//!
//! With JWT auth enabled the protected routes need a bearer token. There is
//! no login endpoint; an operator with access to the configured secret mints
//! one from the server binary:
//!
//! ```text
//! licensa_server token create --subject ops --scopes licenses:read,licenses:write
//! ```
//!
//! # Security
//!
//! Anyone who can read `auth.jwt_secret` can mint tokens with any scope.

use tracing::info;

use crate::config::AuthConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::server::auth::JwtValidator;

/// CLI command result for token operations.
#[derive(Debug, PartialEq, Eq)]
pub enum TokenCommand {
    /// Mint a new token
    Create { subject: String, scopes: Vec<String> },
    /// No command (run server normally)
    None,
}

/// Parse CLI arguments for token commands.
///
/// `args[0]` is the program name. Anything other than `token create` falls
/// through to [`TokenCommand::None`].
pub fn parse_token_command(args: &[String]) -> TokenCommand {
    if args.len() < 3 || args[1] != "token" || args[2] != "create" {
        return TokenCommand::None;
    }

    let mut subject = String::from("admin");
    let mut scopes = vec!["licenses:*".to_string()];

    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--subject" | "-s" if i + 1 < args.len() => {
                subject = args[i + 1].clone();
                i += 2;
            }
            "--scopes" if i + 1 < args.len() => {
                scopes = args[i + 1]
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                i += 2;
            }
            _ => i += 1,
        }
    }

    TokenCommand::Create { subject, scopes }
}

/// Execute a token command.
///
/// Returns `Ok(true)` when a command ran and the process should exit.
pub fn execute_token_command(config: &AuthConfig, cmd: TokenCommand) -> LicenseResult<bool> {
    match cmd {
        TokenCommand::Create { subject, scopes } => {
            if scopes.is_empty() {
                return Err(LicenseError::Config(
                    "token create needs at least one scope".to_string(),
                ));
            }

            let validator = JwtValidator::from_config(config)?;
            let scope_refs: Vec<&str> = scopes.iter().map(String::as_str).collect();
            let token = validator.create_token(&subject, &scope_refs)?;

            info!(subject = %subject, scopes = %scopes.join(" "), "Minted admin token");

            println!("Token created successfully!");
            println!("───────────────────────────────────────────");
            println!("Subject: {}", subject);
            println!("Scopes:  {}", scopes.join(" "));
            println!("Expires: in {} seconds", config.token_expiration_secs);
            println!("───────────────────────────────────────────");
            println!("{}", token);

            Ok(true)
        }
        TokenCommand::None => Ok(false),
    }
}
