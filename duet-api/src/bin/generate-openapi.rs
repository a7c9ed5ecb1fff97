//! Writes the OpenAPI document of the DUET service.
//!
//! `generate-openapi [PATH]` writes to PATH, or to stdout without one.

use duet_api::ApiDoc;

fn main() -> std::io::Result<()> {
    let json = ApiDoc::to_json().map_err(std::io::Error::other)?;
    match std::env::args().nth(1) {
        Some(path) => std::fs::write(path, json + "\n"),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}
