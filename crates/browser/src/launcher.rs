//! Chrome process management: find an executable, spawn it with remote
//! debugging enabled, wait for the DevTools endpoint to answer.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::error::BrowserError;
use crate::session::SessionConfig;

/// How long we give Chrome to bring up its DevTools endpoint.
const STARTUP_DEADLINE: Duration = Duration::from_secs(15);
const STARTUP_POLL: Duration = Duration::from_millis(200);

/// A Chrome process we own for the lifetime of one session.
pub struct ChromeHandle {
    child: Child,
    pub endpoint: String,
}

impl ChromeHandle {
    /// Best-effort kill. Errors are logged, not surfaced; there is nothing
    /// a caller can do about a process that refuses to die.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!("failed to kill chrome: {}", e);
        }
    }
}

/// Locate a Chrome/Chromium executable for this platform.
pub fn find_chrome() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    const CANDIDATES: &[&str] = &[
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    ];

    #[cfg(target_os = "linux")]
    const CANDIDATES: &[&str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
    ];

    #[cfg(target_os = "windows")]
    const CANDIDATES: &[&str] = &[
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    ];

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    const CANDIDATES: &[&str] = &[];

    CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

/// Spawn Chrome and wait until its DevTools endpoint answers.
pub async fn launch(config: &SessionConfig, headless: bool) -> Result<ChromeHandle, BrowserError> {
    let chrome_path = match &config.chrome_path {
        Some(path) => path.clone(),
        None => find_chrome().ok_or(BrowserError::ChromeNotFound)?,
    };

    let profile_dir = config.profile_path();
    if let Err(e) = std::fs::create_dir_all(&profile_dir) {
        tracing::warn!(dir = %profile_dir.display(), "failed to create profile dir: {}", e);
    }

    tracing::info!(
        chrome = %chrome_path.display(),
        port = config.debug_port,
        headless,
        "launching chrome"
    );

    let mut command = Command::new(&chrome_path);
    command
        .arg(format!("--remote-debugging-port={}", config.debug_port))
        .arg(format!("--user-data-dir={}", profile_dir.display()))
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--metrics-recording-only")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    if headless {
        command.arg("--headless=new");
    }

    let child = command
        .spawn()
        .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

    let endpoint = config.endpoint();
    let mut handle = ChromeHandle { child, endpoint };

    let deadline = tokio::time::Instant::now() + STARTUP_DEADLINE;
    loop {
        tokio::time::sleep(STARTUP_POLL).await;
        if endpoint_alive(&handle.endpoint).await {
            tracing::debug!(endpoint = %handle.endpoint, "devtools endpoint is up");
            return Ok(handle);
        }
        if tokio::time::Instant::now() >= deadline {
            handle.kill().await;
            return Err(BrowserError::LaunchFailed(
                "devtools endpoint did not come up in time".to_string(),
            ));
        }
    }
}

async fn endpoint_alive(endpoint: &str) -> bool {
    reqwest::get(format!("{}/json/version", endpoint))
        .await
        .is_ok()
}
