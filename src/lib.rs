/*!
# encedit

encedit lets people edit encrypted files transparently. Given `report.pdf.enc`,
it decrypts the file to `report.pdf`, opens it in the program the host
associates with it, waits until the user is done, encrypts the result back
into `report.pdf.enc` and removes the plaintext.

While a session runs, the original ciphertext is parked in a journal file
(`~report.pdf.enc.bak`) next to the artifact. Whatever goes wrong, the journal
is put back so the ciphertext is never lost.

## Architecture

- `cli`: Command-line interface handling using clap
- `config`: Configuration loading and validation
- `errors`: Error handling infrastructure
- `crypto`: Streaming AES-256-CBC codec and text normalization
- `lock`: Probing whether another process still holds a file
- `launcher`: Handing a file to its default program
- `watch`: Deciding when an editing session is over
- `lifecycle`: The controller tying everything together, plus recovery
- `audit`: Event log, remote reporting and tracing of lifecycle steps

## Usage Example

```rust,no_run
use encedit::audit::Audit;
use encedit::crypto::CipherCodec;
use encedit::launcher::SystemLauncher;
use encedit::lifecycle::Controller;
use encedit::Config;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> encedit::AppResult<()> {
    let config = Config::load()?;
    let controller = Controller::new(
        CipherCodec::new(config.cipher.clone()),
        Arc::new(SystemLauncher::new(config.opener.clone(), config.timings.launch_grace)),
        config.timings.clone(),
        Audit::tracing_only("example"),
    );

    let report = controller
        .run(Path::new("report.pdf.enc"), CancellationToken::new())
        .await?;
    println!("{:?}", report);
    Ok(())
}
```
*/

/// Event recording: log file, remote reports and tracing
pub mod audit;
/// Command-line interface for parsing and handling user arguments
pub mod cli;
/// Configuration loading and management
pub mod config;
/// Application-wide constants
pub mod constants;
/// Encryption and decryption of artifacts
pub mod crypto;
/// Error types and utilities for error handling
pub mod errors;
/// Opening files in their default program
pub mod launcher;
/// The edit session lifecycle
pub mod lifecycle;
/// Exclusive-access probing
pub mod lock;
/// Session completion watchers
pub mod watch;

// Re-export important types for convenience
pub use cli::CliArgs;
pub use config::{Config, Timings};
pub use errors::{AppError, AppResult};
pub use lifecycle::{Controller, RunReport, RunState};
