//! Interactive prompt loop driving the batch workflows.

use std::{str::FromStr, sync::Arc};

use anyhow::{Result, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, Lines};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    adb::{DeviceId, locate_device},
    console::Reporter,
    local_packages::{delete_packages, find_packages},
    task::{BatchReport, BatchRunner},
};

const MENU: &str = "Choose an action:
1. Download apps
2. Install apps
3. Download and install apps
4. Delete all package files in this directory
q. Quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Download,
    InstallLocal,
    DownloadAndInstall,
    DeleteLocal,
    Quit,
}

impl FromStr for MenuChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "1" => Self::Download,
            "2" => Self::InstallLocal,
            "3" => Self::DownloadAndInstall,
            "4" => Self::DeleteLocal,
            "q" => Self::Quit,
            other => bail!("unknown menu choice {other:?}"),
        })
    }
}

pub struct Menu<R> {
    runner: BatchRunner,
    reporter: Arc<dyn Reporter>,
    input: Lines<R>,
}

impl<R: AsyncBufRead + Unpin> Menu<R> {
    pub fn new(runner: BatchRunner, reporter: Arc<dyn Reporter>, input: R) -> Self {
        Self { runner, reporter, input: input.lines() }
    }

    /// Prompts until the operator quits, closes stdin, or presses Ctrl-C at the prompt
    pub async fn run(mut self) -> Result<()> {
        loop {
            self.reporter.highlight(MENU);
            self.reporter.prompt("Enter a choice: ");
            let Some(line) = self.read_line().await? else {
                info!("Input closed, exiting");
                self.reporter.info("Exiting.");
                return Ok(());
            };
            match line.parse::<MenuChoice>() {
                Ok(MenuChoice::Quit) => {
                    info!("Quit selected");
                    self.reporter.info("Exiting.");
                    return Ok(());
                }
                Ok(MenuChoice::DeleteLocal) => {
                    if let Err(e) = self.delete_local().await {
                        self.reporter.error(&format!("{e:#}"));
                    }
                }
                Ok(choice) => self.run_batch(choice).await,
                Err(e) => {
                    warn!(input = %line, error = %e, "Invalid menu input");
                    self.reporter.error("Invalid choice, please try again.");
                }
            }
        }
    }

    /// Next trimmed input line, or `None` on end of input or Ctrl-C
    async fn read_line(&mut self) -> Result<Option<String>> {
        tokio::select! {
            line = self.input.next_line() => Ok(line?.map(|line| line.trim().to_string())),
            _ = tokio::signal::ctrl_c() => Ok(None),
        }
    }

    async fn run_batch(&self, choice: MenuChoice) {
        let device = match choice {
            MenuChoice::InstallLocal | MenuChoice::DownloadAndInstall => match self.locate().await {
                Some(device) => Some(device),
                None => return,
            },
            _ => None,
        };

        let token = CancellationToken::new();
        let work = async {
            match (choice, &device) {
                (MenuChoice::Download, _) => self.runner.download_only(&token).await,
                (MenuChoice::InstallLocal, Some(device)) => {
                    self.runner.install_local(device, &token).await
                }
                (MenuChoice::DownloadAndInstall, Some(device)) => {
                    self.runner.download_and_install(device, &token).await
                }
                _ => Ok(BatchReport::default()),
            }
        };
        tokio::pin!(work);

        let result = tokio::select! {
            result = &mut work => result,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling batch");
                self.reporter.warn("Cancelling, waiting for running tasks to stop...");
                token.cancel();
                work.await
            }
        };
        if let Err(e) = result {
            self.reporter.error(&format!("{e:#}"));
        }
    }

    async fn locate(&self) -> Option<DeviceId> {
        self.reporter.info("Checking for devices...");
        match locate_device(self.runner.bridge()).await {
            Ok(device) => {
                self.reporter.success(&format!("Found device {device}"));
                Some(device)
            }
            Err(e) => {
                self.reporter.error(&e.to_string());
                None
            }
        }
    }

    async fn delete_local(&mut self) -> Result<()> {
        let extension = self.runner.extension().to_string();
        let packages = find_packages(self.runner.work_dir(), &extension).await?;
        if packages.is_empty() {
            self.reporter.warn(&format!("No .{extension} files in the current directory."));
            return Ok(());
        }

        self.reporter.warn(&format!("The following {} files will be deleted:", packages.len()));
        for package in &packages {
            self.reporter.warn(&format!("  {} ({})", package.file_name(), package.display_size()));
        }
        self.reporter.prompt("Delete them? (y/n): ");

        let answer = self.read_line().await?.unwrap_or_default().to_ascii_lowercase();
        match answer.as_str() {
            "y" | "yes" => {
                for (package, result) in delete_packages(&packages).await {
                    match result {
                        Ok(()) => self.reporter.success(&format!("Deleted {}", package.file_name())),
                        Err(e) => self
                            .reporter
                            .error(&format!("Failed to delete {}: {e:#}", package.file_name())),
                    }
                }
            }
            "n" | "no" | "" => self.reporter.warn("Deletion cancelled."),
            _ => self.reporter.error("Invalid input, nothing was deleted."),
        }
        Ok(())
    }
}
