fn main() {
    if let Err(err) = bank_merge::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
