//! Drive a session end to end: start, navigate, dump telemetry, stop.
//!
//! Needs a local Chrome/Chromium:
//! `cargo run -p browser --example drive`

use browser::{Session, SessionConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let session = Session::new(SessionConfig::default());
    session.start(true).await?;

    let page = session.page()?;
    page.navigate("https://example.com", 30_000).await?;
    println!("title: {}", page.title().await?);

    session.wait_for_network_idle(10_000).await?;
    for entry in session.read_network(None, false) {
        println!("{} {} -> {:?}", entry.method, entry.url, entry.status);
    }
    for entry in session.read_console(None, false) {
        println!("[{}] {}", entry.level, entry.text);
    }

    session.stop().await?;
    Ok(())
}
