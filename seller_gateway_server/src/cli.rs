use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_help();
        display_envs();
    }
    has_cli_args
}

fn display_help() {
    println!(
        "\nseller_gateway_server\n\n\
         The server takes no command-line arguments. Configuration is via environment\n\
         variables (a .env file in the working directory is honoured):\n\n\
         \x20 SGW_HOST / SGW_PORT           bind address\n\
         \x20 SGW_DATABASE_URL              SQLite database URL\n\
         \x20 SGW_VAULT_KEY                 base64 256-bit key for credential encryption\n\
         \x20 SGW_APP_CALLBACK_URL          where OAuth callbacks redirect the browser\n\
         \x20 SGW_SHUTDOWN_GRACE_SECS       grace period for in-flight webhook jobs\n\
         \x20 SGW_MELI_API_URL              marketplace API base URL\n\
         \x20 SGW_MELI_CLIENT_ID            marketplace application id\n\
         \x20 SGW_MELI_CLIENT_SECRET        marketplace application secret\n\
         \x20 SGW_MELI_REDIRECT_URL         OAuth redirect URL registered with the app\n\
         \x20 SGW_SMTP_URL / SGW_MAIL_FROM  outbound mail (optional)\n\
         \x20 SGW_LINK_NOTIFY_EMAIL         notify this address on new links (optional)\n"
    );
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 9] = [
        "RUST_LOG",
        "SGW_HOST",
        "SGW_PORT",
        "SGW_DATABASE_URL",
        "SGW_APP_CALLBACK_URL",
        "SGW_SHUTDOWN_GRACE_SECS",
        "SGW_MELI_API_URL",
        "SGW_MELI_CLIENT_ID",
        "SGW_MELI_REDIRECT_URL",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
