//! Gatehouse CLI - OAuth login server
//!
//! Run with: cargo run -- <command>
//! Or after build: ./target/release/gatehouse <command>

#[tokio::main]
async fn main() {
    // Client secrets and the JWT key usually come from .env
    let _ = dotenvy::dotenv();

    if let Err(e) = gatehouse::cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
