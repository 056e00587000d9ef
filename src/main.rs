fn main() {
    env_logger::init();
    if let Err(e) = maquette::cli::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
