// Last.fm authentication helper using rustfm-scrobble-proxy

use anyhow::{Context, Result};
use rustfm_scrobble_proxy::Scrobbler;
use std::io::{self, BufRead, Write};

fn prompt(label: &str, input: &mut impl BufRead) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Exchange a Last.fm username/password for a session key
///
/// The session key goes into the `[lastfm]` section of the config, the
/// password is never stored.
pub fn authenticate(api_key: &str, api_secret: &str) -> Result<String> {
    println!("Starting Last.fm authentication...\n");

    let mut scrobbler = Scrobbler::new(api_key, api_secret);

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let username = prompt("Last.fm Username", &mut input)?;
    let password = prompt("Last.fm Password", &mut input)?;

    println!("\nAuthenticating with Last.fm...");
    let session = scrobbler
        .authenticate_with_password(&username, &password)
        .context("Last.fm rejected the credentials")?;
    println!("Session key obtained successfully!\n");

    Ok(session.key)
}
