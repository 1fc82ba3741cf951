//! bgremove-studio command-line tool
//!
//! Removes backgrounds from a batch of images, optionally composites a new
//! background and writes the results to a directory or a ZIP archive.

#[cfg(feature = "cli")]
use bgremove_studio::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("bgremove-studio was built without the `cli` feature");
    std::process::exit(2);
}
