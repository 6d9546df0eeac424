#[tokio::main]
async fn main() {
    if let Err(e) = soc2_extract_lib::run().await {
        eprintln!("soc2-extract: {e}");
        std::process::exit(1);
    }
}
