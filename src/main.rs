fn main() {
    if let Err(err) = palaver::cli::main() {
        eprintln!("❌ Error: {err}");
        std::process::exit(1);
    }
}
