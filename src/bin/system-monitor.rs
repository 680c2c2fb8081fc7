use hostmon::monitor_modules::Variant;

#[tokio::main]
async fn main() {
    match hostmon::app::run(Variant::Combined).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("[ERROR] {e}");
            std::process::exit(1);
        }
    }
}
