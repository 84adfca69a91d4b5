mod entry;
mod settings;
mod status;

pub use entry::{LOCAL_INSTALL_MARKER, LedgerEntry};
pub use settings::Settings;
pub use status::{DownloadStatus, InstallStatus};
