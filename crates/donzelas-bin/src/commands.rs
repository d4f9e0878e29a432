//! CLI command implementations.

use donzelas_config::{Config, Paths};
use donzelas_session::{SessionConfig, SessionManager};
use std::io::{self, Write};
use std::sync::Arc;
use supabase_gateway::SupabaseGateway;
use token_vault::{FileTokenStore, SessionVault};

/// Environment variable consulted before prompting for a password.
const PASSWORD_ENV: &str = "DONZELAS_PASSWORD";

/// Build the session manager over the on-disk vault and start its
/// retry-queue worker.
fn build_manager(config: &Config, paths: &Paths) -> SessionManager {
    let gateway = SupabaseGateway::new(
        config.supabase_url.as_str(),
        config.supabase_anon_key.as_str(),
    );
    let vault = SessionVault::new(Box::new(FileTokenStore::new(paths.vault_file())));

    let manager = SessionManager::new(Arc::new(gateway), vault, SessionConfig::default());
    manager.start();
    manager
}

/// Resolve the account email: the flag value, or an interactive prompt.
fn resolve_email(flag: Option<&str>) -> anyhow::Result<String> {
    if let Some(email) = flag {
        return Ok(email.to_string());
    }

    print!("Email: ");
    io::stdout().flush()?;
    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    let email = email.trim().to_string();

    if email.is_empty() {
        anyhow::bail!("Email is required");
    }

    Ok(email)
}

/// Read the account password from the environment, or prompt without echo.
fn read_password() -> anyhow::Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            return Ok(password);
        }
    }

    let password = rpassword::prompt_password("Password: ")?;

    if password.is_empty() {
        anyhow::bail!("Password is required");
    }

    Ok(password)
}

/// Login with email and password.
pub async fn login(config: &Config, paths: &Paths, email: Option<&str>) -> anyhow::Result<()> {
    let manager = build_manager(config, paths);
    manager.restore().await?;

    if manager.is_authenticated() {
        let who = manager
            .session_meta()?
            .and_then(|meta| meta.email)
            .unwrap_or_else(|| "user".to_string());
        println!("Already logged in as {}", who);
        return Ok(());
    }

    let email = resolve_email(email)?;
    let password = read_password()?;

    println!("Logging in...");
    let outcome = manager.sign_in(&email, &password).await?;

    println!(
        "Logged in as {}",
        outcome.email.as_deref().unwrap_or("user")
    );
    if !outcome.profile_complete {
        println!("Profile is incomplete.");
    }

    Ok(())
}

/// Create a new account.
pub async fn signup(
    config: &Config,
    paths: &Paths,
    email: Option<&str>,
    phone: Option<&str>,
) -> anyhow::Result<()> {
    let manager = build_manager(config, paths);
    manager.restore().await?;

    if manager.is_authenticated() {
        anyhow::bail!("Already logged in; run 'donzelas logout' first");
    }

    let email = resolve_email(email)?;
    let password = read_password()?;

    println!("Creating account...");
    let outcome = manager.sign_up(&email, &password, phone).await?;

    if manager.is_authenticated() {
        println!(
            "Account created. Logged in as {}",
            outcome.email.as_deref().unwrap_or("user")
        );
    } else {
        println!("Account created. Check your inbox for a confirmation link, then run 'donzelas login'.");
    }

    Ok(())
}

/// Logout and clear the stored session.
pub async fn logout(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let manager = build_manager(config, paths);

    if manager.session_meta()?.is_none() {
        println!("Not logged in");
        return Ok(());
    }

    manager.sign_out().await?;
    println!("Logged out");

    Ok(())
}

/// Check authentication status.
pub async fn status(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let manager = build_manager(config, paths);
    let state = manager.restore().await?;

    if !state.is_authenticated() {
        println!("Auth:     not logged in");
        return Ok(());
    }

    println!("Auth:     logged in");
    if let Some(meta) = manager.session_meta()? {
        println!("User ID:  {}", meta.user_id);
        if let Some(email) = meta.email {
            println!("Email:    {}", email);
        }
        println!("Expires:  {}", meta.expires_at.to_rfc3339());
    }

    Ok(())
}

/// Show the signed-in user and cached profile.
pub async fn whoami(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let manager = build_manager(config, paths);
    let state = manager.restore().await?;

    if !state.is_authenticated() {
        anyhow::bail!("Not logged in");
    }

    if let Some(meta) = manager.session_meta()? {
        println!("User ID:  {}", meta.user_id);
        if let Some(email) = meta.email {
            println!("Email:    {}", email);
        }
    }

    match manager.cached_profile() {
        Some(profile) => {
            if let Some(name) = profile.name {
                println!("Name:     {}", name);
            }
            if let Some(city) = profile.city {
                println!("City:     {}", city);
            }
            if let Some(account_type) = profile.account_type {
                println!("Account:  {}", account_type);
            }
        }
        None => println!("Profile:  unavailable"),
    }

    Ok(())
}
