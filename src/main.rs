fn main() {
    if let Err(err) = inspection_analytics::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
