//! Navigator that opens URLs in the system browser

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    navigation::Navigator,
};
use tokio::process::Command;
use tracing::info;

/// Opens the authorize URL with the platform's default URL handler.
#[derive(Debug, Clone, Default)]
pub struct SystemBrowserNavigator;

impl SystemBrowserNavigator {
    pub fn new() -> Self {
        Self
    }

    fn command(url: &str) -> Command {
        let (program, args) = launcher(std::env::consts::OS, url);
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd
    }
}

/// Program and arguments that hand `url` to the default handler on `os`.
///
/// The URL is always a single argument and never passes through a shell, so
/// `&` separators in the query reach the browser intact.
fn launcher<'a>(os: &str, url: &'a str) -> (&'static str, Vec<&'a str>) {
    match os {
        "macos" => ("open", vec![url]),
        "windows" => ("rundll32", vec!["url.dll,FileProtocolHandler", url]),
        _ => ("xdg-open", vec![url]),
    }
}

#[async_trait]
impl Navigator for SystemBrowserNavigator {
    async fn navigate(&self, url: &str) -> Result<()> {
        let status = Self::command(url).status().await?;
        if !status.success() {
            return Err(BridgeError::OperationFailed(format!(
                "URL handler exited with {}",
                status
            )));
        }
        info!("Opened authorize page in system browser");
        Ok(())
    }
}
