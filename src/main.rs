fn main() {
    if let Err(err) = sheet_matcher::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
